//! Per node resource usage from `/api/nodes`

use async_trait::async_trait;
use prometheus_client::registry::Registry;
use rabbit_reply::{ObjectStats, Reply, DEFAULT_IDENTIFIERS};

use super::{
    enabled_metrics, label_set, register_gauges, self_label, Exporter, LabelSet, MetricSpec,
    NodeInfo, ScrapeContext,
};
use crate::cli::Config;
use crate::client::ScrapeError;

/// Fields of a node document read as labels
const NODE_LABEL_KEYS: &[&str] = &["name"];

#[rustfmt::skip]
const NODE_GAUGES: &[MetricSpec] = &[
    MetricSpec::new("uptime", "uptime", "Uptime in milliseconds"),
    MetricSpec::new("running", "running", "number of running nodes"),
    MetricSpec::new("mem_used", "node_mem_used", "Memory used in bytes"),
    MetricSpec::new("mem_limit", "node_mem_limit", "Point at which the memory alarm will go off"),
    MetricSpec::new("mem_alarm", "node_mem_alarm", "Whether the memory alarm has gone off"),
    MetricSpec::new("disk_free", "node_disk_free", "Disk free space in bytes."),
    MetricSpec::new("disk_free_alarm", "node_disk_free_alarm", "Whether the disk alarm has gone off."),
    MetricSpec::new("disk_free_limit", "node_disk_free_limit", "Point at which the disk alarm will go off."),
    MetricSpec::new("fd_used", "fd_used", "Used File descriptors"),
    MetricSpec::new("fd_total", "fd_available", "File descriptors available"),
    MetricSpec::new("sockets_used", "sockets_used", "File descriptors used as sockets."),
    MetricSpec::new("sockets_total", "sockets_available", "File descriptors available for use as sockets"),
    MetricSpec::new("partitions_len", "partitions", "Current Number of network partitions. 0 is ok. If the cluster is splitted the value is at least 2"),
];

/// Exports resource usage of every cluster node
#[derive(Debug, Clone)]
pub struct NodeExporter {
    /// Gauges that are not excluded
    gauges: Vec<MetricSpec>,
}

impl NodeExporter {
    /// Management API endpoint
    const ENDPOINT: &'static str = "nodes";

    /// Build the exporter, dropping excluded metrics
    pub fn new(config: &Config) -> Self {
        Self {
            gauges: enabled_metrics(NODE_GAUGES, config),
        }
    }

    /// Register the metrics of the nodes in `reply`
    pub(crate) fn export(&self, node: &NodeInfo, reply: &dyn Reply, registry: &mut Registry) {
        let nodes = reply.object_stats(NODE_LABEL_KEYS, DEFAULT_IDENTIFIERS);
        let rows: Vec<(LabelSet, &ObjectStats)> = nodes
            .iter()
            .map(|member| {
                let name = member.label("name");
                let labels = label_set([
                    ("cluster", node.cluster.as_str()),
                    ("node", name),
                    ("self", self_label(node, name)),
                ]);
                (labels, member)
            })
            .collect();
        register_gauges(registry, &self.gauges, &rows);
    }
}

#[async_trait]
impl Exporter for NodeExporter {
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
