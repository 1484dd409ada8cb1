//! Shovel states from `/api/shovels`

use async_trait::async_trait;
use prometheus_client::registry::Registry;
use rabbit_reply::{Reply, DEFAULT_IDENTIFIERS};

use super::{label_set, self_label, Exporter, GaugeFamily, NodeInfo, ScrapeContext};
use crate::client::ScrapeError;

/// Fields of a shovel document read as labels
const SHOVEL_LABEL_KEYS: &[&str] = &["vhost", "name", "type", "node", "state"];

/// Exports a constant `1` per shovel, labeled with its state
#[derive(Debug, Clone, Copy, Default)]
pub struct ShovelExporter;

impl ShovelExporter {
    /// Management API endpoint
    const ENDPOINT: &'static str = "shovels";

    /// Register the states of the shovels in `reply`
    pub(crate) fn export(node: &NodeInfo, reply: &dyn Reply, registry: &mut Registry) {
        let state = GaugeFamily::default();
        for shovel in reply.object_stats(SHOVEL_LABEL_KEYS, DEFAULT_IDENTIFIERS) {
            let labels = label_set([
                ("cluster", node.cluster.as_str()),
                ("vhost", shovel.label("vhost")),
                ("shovel", shovel.label("name")),
                ("type", shovel.label("type")),
                ("self", self_label(node, shovel.label("node"))),
                ("state", shovel.label("state")),
            ]);
            state.get_or_create(&labels).set(1.0);
        }
        registry.register(
            "shovel_state",
            "A metric with a value of constant '1' for each shovel in a certain state",
            state,
        );
    }
}

#[async_trait]
impl Exporter for ShovelExporter {
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::exporter::test::{json_reply, node_info, render, sample};

    #[test]
    fn shovel_states() {
        let reply = json_reply(
            r#"[
                {"name": "move-orders", "vhost": "/", "type": "dynamic", "node": "rabbit@a", "state": "running"},
                {"name": "static-1", "vhost": "/", "type": "static", "node": "rabbit@b", "state": "terminated"}
            ]"#,
        );
        let mut registry = Registry::with_prefix("rabbitmq");
        ShovelExporter::export(&node_info(), reply.as_ref(), &mut registry);
        let text = render(&registry);
        assert_eq!(
            sample(
                &text,
                "rabbitmq_shovel_state",
                r#"cluster="c",vhost="/",shovel="move-orders",type="dynamic",self="1",state="running""#
            ),
            Some(1.0)
        );
        assert_eq!(
            sample(
                &text,
                "rabbitmq_shovel_state",
                r#"cluster="c",vhost="/",shovel="static-1",type="static",self="0",state="terminated""#
            ),
            Some(1.0)
        );
    }
}
