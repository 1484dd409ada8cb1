//! Per queue metrics from `/api/queues`

use async_trait::async_trait;
use chrono::NaiveDateTime;
use prometheus_client::registry::Registry;
use rabbit_reply::{ObjectStats, Reply, DEFAULT_IDENTIFIERS};
use tracing::{debug, warn};

use super::{
    enabled_metrics, label_set, register_counters, register_gauges, self_label, Exporter,
    GaugeFamily, LabelSet, MetricSpec, NodeInfo, ScrapeContext,
};
use crate::cli::{Config, QueueFilters};
use crate::client::ScrapeError;

/// Fields of a queue document read as labels
const QUEUE_LABEL_KEYS: &[&str] = &["vhost", "name", "durable", "policy", "state", "node", "idle_since"];

/// Format of `idle_since`
const IDLE_SINCE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Gauges read from each queue
#[rustfmt::skip]
const QUEUE_GAUGES: &[MetricSpec] = &[
    MetricSpec::new("messages_ready", "queue_messages_ready", "Number of messages ready to be delivered to clients."),
    MetricSpec::new("messages_unacknowledged", "queue_messages_unacknowledged", "Number of messages delivered to clients but not yet acknowledged."),
    MetricSpec::new("messages", "queue_messages", "Sum of ready and unacknowledged messages (queue depth)."),
    MetricSpec::new("messages_ready_ram", "queue_messages_ready_ram", "Number of messages from messages_ready which are resident in ram."),
    MetricSpec::new("messages_unacknowledged_ram", "queue_messages_unacknowledged_ram", "Number of messages from messages_unacknowledged which are resident in ram."),
    MetricSpec::new("messages_ram", "queue_messages_ram", "Total number of messages which are resident in ram."),
    MetricSpec::new("messages_persistent", "queue_messages_persistent", "Total number of persistent messages in the queue (will always be 0 for transient queues)."),
    MetricSpec::new("message_bytes", "queue_message_bytes", "Sum of the size of all message bodies in the queue. This does not include the message properties (including headers) or any overhead."),
    MetricSpec::new("message_bytes_ready", "queue_message_bytes_ready", "Like message_bytes but counting only those messages ready to be delivered to clients."),
    MetricSpec::new("message_bytes_unacknowledged", "queue_message_bytes_unacknowledged", "Like message_bytes but counting only those messages delivered to clients but not yet acknowledged."),
    MetricSpec::new("message_bytes_ram", "queue_message_bytes_ram", "Like message_bytes but counting only those messages which are in RAM."),
    MetricSpec::new("message_bytes_persistent", "queue_message_bytes_persistent", "Like message_bytes but counting only those messages which are persistent."),
    MetricSpec::new("consumers", "queue_consumers", "Number of consumers."),
    MetricSpec::new("consumer_utilisation", "queue_consumer_utilisation", "Fraction of the time (between 0.0 and 1.0) that the queue is able to immediately deliver messages to consumers."),
    MetricSpec::new("memory", "queue_memory", "Bytes of memory consumed by the Erlang process associated with the queue, including stack, heap and internal structures."),
    MetricSpec::new("head_message_timestamp", "queue_head_message_timestamp", "The timestamp property of the first message in the queue, if present."),
    MetricSpec::new("arguments.x-max-length-bytes", "queue_max_length_bytes", "Total body size for ready messages a queue can contain before it starts to drop them from its head."),
    MetricSpec::new("arguments.x-max-length", "queue_max_length", "How many (ready) messages a queue can contain before it starts to drop them from its head."),
    MetricSpec::new("garbage_collection.min_heap_size", "queue_gc_min_heap", "Minimum heap size in words"),
    MetricSpec::new("garbage_collection.min_bin_vheap_size", "queue_gc_min_vheap", "Minimum binary virtual heap size in words"),
    MetricSpec::new("garbage_collection.fullsweep_after", "queue_gc_collections_before_fullsweep", "Maximum generational collections before fullsweep"),
    MetricSpec::new("slave_nodes_len", "queue_slaves_nodes_len", "Number of slave nodes attached to the queue"),
    MetricSpec::new("synchronised_slave_nodes_len", "queue_synchronised_slave_nodes_len", "Number of slave nodes in sync to the queue"),
];

/// Counters read from each queue. Queues without the value report 0
#[rustfmt::skip]
const QUEUE_COUNTERS: &[MetricSpec] = &[
    MetricSpec::new("disk_reads", "queue_disk_reads", "Total number of times messages have been read from disk by this queue since it started."),
    MetricSpec::new("disk_writes", "queue_disk_writes", "Total number of times messages have been written to disk by this queue since it started."),
    MetricSpec::new("message_stats.publish", "queue_messages_published", "Count of messages published."),
    MetricSpec::new("message_stats.confirm", "queue_messages_confirmed", "Count of messages confirmed."),
    MetricSpec::new("message_stats.deliver", "queue_messages_delivered", "Count of messages delivered in acknowledgement mode to consumers."),
    MetricSpec::new("message_stats.deliver_no_ack", "queue_messages_delivered_noack", "Count of messages delivered in no-acknowledgement mode to consumers."),
    MetricSpec::new("message_stats.get", "queue_messages_get", "Count of messages delivered in acknowledgement mode in response to basic.get."),
    MetricSpec::new("message_stats.get_no_ack", "queue_messages_get_noack", "Count of messages delivered in no-acknowledgement mode in response to basic.get."),
    MetricSpec::new("message_stats.redeliver", "queue_messages_redelivered", "Count of subset of messages in deliver_get which had the redelivered flag set."),
    MetricSpec::new("message_stats.return", "queue_messages_returned", "Count of messages returned to publisher as unroutable."),
    MetricSpec::new("message_stats.ack", "queue_messages_ack", "Count of messages acknowledged."),
    MetricSpec::new("reductions", "queue_reductions", "Number of reductions which take place on this process."),
    MetricSpec::new("garbage_collection.minor_gcs", "queue_gc_minor_collections", "Number of minor GCs"),
];

/// Seconds since the epoch of an `idle_since` timestamp
fn parse_idle_since(idle_since: &str) -> Result<f64, chrono::ParseError> {
    let time = NaiveDateTime::parse_from_str(idle_since, IDLE_SINCE_FORMAT)?;
    Ok(time.and_utc().timestamp() as f64)
}

/// Exports every queue that passes the vhost and queue filters
#[derive(Debug, Clone)]
pub struct QueueExporter {
    /// Gauges that are not excluded
    gauges: Vec<MetricSpec>,
    /// Counters that are not excluded
    counters: Vec<MetricSpec>,
    /// Which queues to export
    filters: QueueFilters,
    /// Skip all queues when the cluster has more than this, 0 for no
    /// limit
    max_queues: usize,
}

impl QueueExporter {
    /// Management API endpoint
    const ENDPOINT: &'static str = "queues";

    /// Build the exporter, dropping excluded metrics
    pub fn new(config: &Config) -> Self {
        Self {
            gauges: enabled_metrics(QUEUE_GAUGES, config),
            counters: enabled_metrics(QUEUE_COUNTERS, config),
            filters: config.filters.clone(),
            max_queues: config.max_queues,
        }
    }

    /// Whether the cluster has too many queues to export them
    fn too_many_queues(&self, node: &NodeInfo) -> bool {
        self.max_queues > 0 && node.total_queues > self.max_queues as f64
    }

    /// Register the metrics of the queues in `reply`
    pub(crate) fn export(&self, node: &NodeInfo, reply: &dyn Reply, registry: &mut Registry) {
        let queues = reply.object_stats(QUEUE_LABEL_KEYS, DEFAULT_IDENTIFIERS);
        let queues: Vec<&ObjectStats> = queues
            .iter()
            .filter(|queue| self.filters.matches(queue.label("vhost"), queue.label("name")))
            .collect();
        debug!(queues = queues.len(), "Queue data");

        let rows: Vec<(LabelSet, &ObjectStats)> = queues
            .iter()
            .map(|queue| {
                let labels = label_set([
                    ("cluster", node.cluster.as_str()),
                    ("vhost", queue.label("vhost")),
                    ("queue", queue.label("name")),
                    ("durable", queue.label("durable")),
                    ("policy", queue.label("policy")),
                    ("self", self_label(node, queue.label("node"))),
                ]);
                (labels, *queue)
            })
            .collect();

        register_gauges(registry, &self.gauges, &rows);
        register_counters(registry, &self.counters, &rows, true);

        let state_metric = GaugeFamily::default();
        let idle_since_metric = GaugeFamily::default();
        for (labels, queue) in &rows {
            let mut state = queue.label("state");
            let idle_since = queue.label("idle_since");
            if !idle_since.is_empty() {
                match parse_idle_since(idle_since) {
                    Ok(seconds) => {
                        // other states, such as flow, are kept
                        if state == "running" {
                            state = "idle";
                        }
                        idle_since_metric.get_or_create(labels).set(seconds);
                    }
                    Err(err) => warn!(error = %err, idle_since, "error parsing idle since time"),
                }
            }
            let mut with_state = labels.clone();
            with_state.push(("state".to_string(), state.to_string()));
            state_metric.get_or_create(&with_state).set(1.0);
        }
        registry.register(
            "queue_state",
            "A metric with a value of constant '1' if the queue is in a certain state",
            state_metric,
        );
        registry.register(
            "queue_idle_since_seconds",
            "starttime where the queue switched to idle state; in seconds since epoch (1970).",
            idle_since_metric,
        );
    }
}

#[async_trait]
impl Exporter for QueueExporter {
    async fn collect(
        &self,
        ctx: &ScrapeContext<'_>,
        registry: &mut Registry,
    ) -> Result<(), ScrapeError> {
        if self.too_many_queues(ctx.node) {
            debug!(
                max_queues = self.max_queues,
                total_queues = ctx.node.total_queues,
                "MaxQueues exceeded."
            );
            return Ok(());
        }
        let reply = ctx.client.fetch(Self::ENDPOINT).await?;
        self.export(ctx.node, reply.as_ref(), registry);
        Ok(())
    }
}
