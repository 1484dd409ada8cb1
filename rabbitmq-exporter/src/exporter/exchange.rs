//! Per exchange message rates from `/api/exchanges`

use async_trait::async_trait;
use prometheus_client::registry::Registry;
use rabbit_reply::{ObjectStats, Reply, DEFAULT_IDENTIFIERS};

use super::{
    enabled_metrics, label_set, register_counters, Exporter, LabelSet, MetricSpec, NodeInfo,
    ScrapeContext,
};
use crate::cli::Config;
use crate::client::ScrapeError;

/// Fields of an exchange document read as labels
const EXCHANGE_LABEL_KEYS: &[&str] = &["vhost", "name"];

#[rustfmt::skip]
const EXCHANGE_COUNTERS: &[MetricSpec] = &[
    MetricSpec::new("message_stats.publish", "exchange_messages_published", "Count of messages published."),
    MetricSpec::new("message_stats.publish_in", "exchange_messages_published_in", "Count of messages published in to an exchange, i.e. not taking account of routing."),
    MetricSpec::new("message_stats.publish_out", "exchange_messages_published_out", "Count of messages published out of an exchange, i.e. taking account of routing."),
    MetricSpec::new("message_stats.confirm", "exchange_messages_confirmed", "Count of messages confirmed."),
    MetricSpec::new("message_stats.deliver", "exchange_messages_delivered", "Count of messages delivered in acknowledgement mode to consumers."),
    MetricSpec::new("message_stats.deliver_no_ack", "exchange_messages_delivered_noack", "Count of messages delivered in no-acknowledgement mode to consumers."),
    MetricSpec::new("message_stats.get", "exchange_messages_get", "Count of messages delivered in acknowledgement mode in response to basic.get."),
    MetricSpec::new("message_stats.get_no_ack", "exchange_messages_get_noack", "Count of messages delivered in no-acknowledgement mode in response to basic.get."),
    MetricSpec::new("message_stats.ack", "exchange_messages_ack", "Count of messages acknowledged."),
    MetricSpec::new("message_stats.redeliver", "exchange_messages_redelivered", "Count of subset of messages in deliver_get which had the redelivered flag set."),
    MetricSpec::new("message_stats.return_unroutable", "exchange_messages_returned", "Count of messages returned to publisher as unroutable."),
];

/// Exports message counters of every exchange that has them
#[derive(Debug, Clone)]
pub struct ExchangeExporter {
    /// Counters that are not excluded
    counters: Vec<MetricSpec>,
}

impl ExchangeExporter {
    /// Management API endpoint
    const ENDPOINT: &'static str = "exchanges";

    /// Build the exporter, dropping excluded metrics
    pub fn new(config: &Config) -> Self {
        Self {
            counters: enabled_metrics(EXCHANGE_COUNTERS, config),
        }
    }

    /// Register the metrics of the exchanges in `reply`
    pub(crate) fn export(&self, node: &NodeInfo, reply: &dyn Reply, registry: &mut Registry) {
        let exchanges = reply.object_stats(EXCHANGE_LABEL_KEYS, DEFAULT_IDENTIFIERS);
        let rows: Vec<(LabelSet, &ObjectStats)> = exchanges
            .iter()
            .map(|exchange| {
                let labels = label_set([
                    ("cluster", node.cluster.as_str()),
                    ("vhost", exchange.label("vhost")),
                    ("exchange", exchange.label("name")),
                ]);
                (labels, exchange)
            })
            .collect();
        register_counters(registry, &self.counters, &rows, false);
    }
}

#[async_trait]
impl Exporter for ExchangeExporter {
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
