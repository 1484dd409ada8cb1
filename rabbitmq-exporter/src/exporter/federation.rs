//! Federation link states from `/api/federation-links`

use async_trait::async_trait;
use prometheus_client::registry::Registry;
use rabbit_reply::Reply;

use super::{label_set, self_label, Exporter, GaugeFamily, NodeInfo, ScrapeContext};
use crate::client::ScrapeError;

/// Fields of a federation link read as labels
const FEDERATION_LABEL_KEYS: &[&str] = &["vhost", "status", "node", "queue", "exchange"];

/// Links are identified by `id`, some have no `name`
const FEDERATION_IDENTIFIERS: &[&str] = &["id", "name"];

/// Exports a constant `1` per federation link, labeled with its status
#[derive(Debug, Clone, Copy, Default)]
pub struct FederationExporter;

impl FederationExporter {
    /// Management API endpoint
    const ENDPOINT: &'static str = "federation-links";

    /// Register the states of the links in `reply`
    pub(crate) fn export(node: &NodeInfo, reply: &dyn Reply, registry: &mut Registry) {
        let state = GaugeFamily::default();
        for link in reply.object_stats(FEDERATION_LABEL_KEYS, FEDERATION_IDENTIFIERS) {
            let labels = label_set([
                ("cluster", node.cluster.as_str()),
                ("vhost", link.label("vhost")),
                ("node", link.label("node")),
                ("queue", link.label("queue")),
                ("exchange", link.label("exchange")),
                ("self", self_label(node, link.label("node"))),
                ("status", link.label("status")),
            ]);
            state.get_or_create(&labels).set(1.0);
        }
        registry.register(
            "federation_state",
            "A metric with a value of constant '1' for each federation in a certain state",
            state,
        );
    }
}

#[async_trait]
impl Exporter for FederationExporter {
    async fn collect(
        &self,
        ctx: &ScrapeContext<'_>,
        registry: &mut Registry,
    ) -> Result<(), ScrapeError> {
        let reply = ctx.client.fetch(Self::ENDPOINT).await?;
        Self::export(ctx.node, reply.as_ref(), registry);
        Ok(())
    }
}
