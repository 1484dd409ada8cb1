//! Client connections from `/api/connections`, aggregated per user,
//! peer host and node

use async_trait::async_trait;
use prometheus_client::registry::Registry;
use rabbit_reply::{ObjectStats, Reply, DEFAULT_IDENTIFIERS};

use super::{
    enabled_metrics, label_set, register_gauges, self_label, Exporter, GaugeFamily, LabelSet,
    MetricSpec, NodeInfo, ScrapeContext,
};
use crate::cli::Config;
use crate::client::ScrapeError;

/// Fields of a connection document read as labels
const CONNECTION_LABEL_KEYS: &[&str] = &["vhost", "node", "peer_host", "user", "state"];

/// Gauges summed over the connections sharing labels
#[rustfmt::skip]
const CONNECTION_GAUGES: &[MetricSpec] = &[
    MetricSpec::new("channels", "connection_channels", "number of channels in use"),
    MetricSpec::new("recv_oct", "connection_received_bytes", "received bytes"),
    MetricSpec::new("recv_cnt", "connection_received_packets", "received packets"),
    MetricSpec::new("send_oct", "connection_send_bytes", "send bytes"),
    MetricSpec::new("send_cnt", "connection_send_packets", "send packets"),
    MetricSpec::new("send_pend", "connection_send_pending", "Send queue size"),
];

/// Exports connection statistics. Connections with the same labels
/// are summed
#[derive(Debug, Clone)]
pub struct ConnectionsExporter {
    /// Gauges that are not excluded
    gauges: Vec<MetricSpec>,
}

impl ConnectionsExporter {
    /// Management API endpoint
    const ENDPOINT: &'static str = "connections";

    /// Build the exporter, dropping excluded metrics
    pub fn new(config: &Config) -> Self {
        Self {
            gauges: enabled_metrics(CONNECTION_GAUGES, config),
        }
    }

    /// Register the metrics of the connections in `reply`
    pub(crate) fn export(&self, node: &NodeInfo, reply: &dyn Reply, registry: &mut Registry) {
        let connections = reply.object_stats(CONNECTION_LABEL_KEYS, DEFAULT_IDENTIFIERS);
        let rows: Vec<(LabelSet, &ObjectStats)> = connections
            .iter()
            .map(|conn| {
                let labels = label_set([
                    ("cluster", node.cluster.as_str()),
                    ("vhost", conn.label("vhost")),
                    ("node", conn.label("node")),
                    ("peer_host", conn.label("peer_host")),
                    ("user", conn.label("user")),
                    ("self", self_label(node, conn.label("node"))),
                ]);
                (labels, conn)
            })
            .collect();
        register_gauges(registry, &self.gauges, &rows);

        let status = GaugeFamily::default();
        for (labels, conn) in &rows {
            let mut with_state = labels.clone();
            with_state.push(("state".to_string(), conn.label("state").to_string()));
            status.get_or_create(&with_state).inc();
        }
        registry.register(
            "connection_status",
            "Number of connections in a certain state aggregated per label combination.",
            status,
        );
    }
}

#[async_trait]
impl Exporter for ConnectionsExporter {
    async fn collect(
        &self,
        ctx: &ScrapeContext<'_>,
        registry: &mut Registry,
    ) -> Result<(), ScrapeError> {
        let reply = ctx.client.fetch(Self::ENDPOINT).await?;
        self.export(ctx.node, reply.as_ref(), registry);
        Ok(())
    }
}
