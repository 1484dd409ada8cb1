//! Cluster wide totals from `/api/overview`

use prometheus_client::registry::Registry;
use rabbit_reply::Reply;
use tracing::debug;

use super::{enabled_metrics, label_set, GaugeFamily, MetricSpec, NodeInfo};
use crate::cli::Config;
use crate::client::{RabbitClient, ScrapeError};

/// Gauges read from the overview
const OVERVIEW_GAUGES: &[MetricSpec] = &[
    MetricSpec::new("object_totals.channels", "channels", "Number of channels."),
    MetricSpec::new("object_totals.connections", "connections", "Number of connections."),
    MetricSpec::new("object_totals.consumers", "consumers", "Number of message consumers."),
    MetricSpec::new("object_totals.queues", "queues", "Number of queues in use."),
    MetricSpec::new("object_totals.exchanges", "exchanges", "Number of exchanges in use."),
    MetricSpec::new(
        "queue_totals.messages",
        "queue_messages_global",
        "Number ready and unacknowledged messages in cluster.",
    ),
    MetricSpec::new(
        "queue_totals.messages_ready",
        "queue_messages_ready_global",
        "Number of messages ready to be delivered to clients.",
    ),
    MetricSpec::new(
        "queue_totals.messages_unacknowledged",
        "queue_messages_unacknowledged_global",
        "Number of messages delivered to clients but not yet acknowledged.",
    ),
];

/// Exports the overview and reports which node the exporter is
/// connected to. It runs first in every scrape, and the other
/// exporters label their metrics with its result.
#[derive(Debug, Clone)]
pub struct OverviewExporter {
    /// Gauges that are not excluded
    gauges: Vec<MetricSpec>,
}

impl OverviewExporter {
    /// Management API endpoint
    const ENDPOINT: &'static str = "overview";

    /// Build the exporter, dropping excluded metrics
    pub fn new(config: &Config) -> Self {
        Self {
            gauges: enabled_metrics(OVERVIEW_GAUGES, config),
        }
    }

    /// Fetch the overview, register its metrics and return the node
    /// description
    pub async fn collect(
        &self,
        client: &RabbitClient,
        registry: &mut Registry,
    ) -> Result<NodeInfo, ScrapeError> {
        let reply = client.fetch(Self::ENDPOINT).await?;
        Ok(self.export(reply.as_ref(), registry))
    }

    /// Register the metrics of a decoded overview
    pub(crate) fn export(&self, reply: &dyn Reply, registry: &mut Registry) -> NodeInfo {
        let info = NodeInfo::from_reply(reply);
        let overview = reply.metric_map();
        debug!(metrics = overview.len(), node = %info.node, "Overview data");

        let labels = label_set([("cluster", info.cluster.as_str())]);
        for spec in &self.gauges {
            if let Some(value) = overview.get(spec.key) {
                let gauge = GaugeFamily::default();
                gauge.get_or_create(&labels).set(*value);
                registry.register(spec.name, spec.help, gauge);
            }
        }

        let version = GaugeFamily::default();
        version
            .get_or_create(&label_set([
                ("cluster", info.cluster.as_str()),
                ("node", info.node.as_str()),
                ("rabbitmq", info.rabbitmq_version.as_str()),
                ("erlang", info.erlang_version.as_str()),
            ]))
            .set(1.0);
        registry.register(
            "version_info",
            "A metric with a constant '1' value labeled by the versions of the connected node.",
            version,
        );
        info
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cli::test::config;
    use crate::exporter::test::{json_reply, render, sample};

    const OVERVIEW: &str = r#"{
        "management_version": "3.7.0",
        "rabbitmq_version": "3.7.0",
        "erlang_version": "20.1",
        "cluster_name": "rabbit@my-rabbit",
        "node": "rabbit@my-rabbit",
        "object_totals": {"channels": 3, "connections": 2, "consumers": 1, "exchanges": 8, "queues": 4},
        "queue_totals": {"messages": 48, "messages_ready": 40, "messages_unacknowledged": 8}
    }"#;

    #[test]
    fn overview_gauges() {
        let exporter = OverviewExporter::new(&config(&["--exclude-metrics=object_totals.consumers"]));
        let mut registry = Registry::with_prefix("rabbitmq");
        let info = exporter.export(json_reply(OVERVIEW).as_ref(), &mut registry);
        assert_eq!(info.node, "rabbit@my-rabbit");
        assert_eq!(info.total_queues, 4.0);

        let text = render(&registry);
        let cluster = r#"cluster="rabbit@my-rabbit""#;
        assert_eq!(sample(&text, "rabbitmq_queues", cluster), Some(4.0));
        assert_eq!(sample(&text, "rabbitmq_channels", cluster), Some(3.0));
        assert_eq!(sample(&text, "rabbitmq_queue_messages_ready_global", cluster), Some(40.0));
        assert_eq!(sample(&text, "rabbitmq_consumers", cluster), None);
        assert_eq!(
            sample(
                &text,
                "rabbitmq_version_info",
                r#"cluster="rabbit@my-rabbit",node="rabbit@my-rabbit",rabbitmq="3.7.0",erlang="20.1""#
            ),
            Some(1.0)
        );
    }

    #[test]
    fn missing_values_are_not_exported() {
        let exporter = OverviewExporter::new(&config(&[]));
        let mut registry = Registry::with_prefix("rabbitmq");
        let info = exporter.export(json_reply(r#"{"node":"rabbit@a"}"#).as_ref(), &mut registry);
        assert_eq!(info.cluster, "");
        let text = render(&registry);
        assert!(!text.contains("rabbitmq_queues"));
        assert!(text.contains("rabbitmq_version_info"));
    }
}
