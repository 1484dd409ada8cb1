//! Exporters turn one management API endpoint into Prometheus metrics.
//!
//! Each exporter fetches its endpoint through the [`RabbitClient`] of
//! the [`ScrapeContext`], normalizes the reply with [`rabbit_reply`] and
//! registers metric families on the [`Registry`] of the current scrape.
//! Most metrics come from a table of [`MetricSpec`]s mapping a source
//! key of the reply to an exported name. Source keys listed in
//! `--exclude-metrics` are dropped from every table when the exporter
//! is built.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::AtomicU64;

use async_trait::async_trait;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use rabbit_reply::{ObjectStats, Reply};
use tracing::warn;

use crate::cli::Config;
use crate::client::{RabbitClient, ScrapeError};

mod connections;
mod exchange;
mod federation;
mod node;
mod overview;
mod queue;
mod shovel;

pub use connections::ConnectionsExporter;
pub use exchange::ExchangeExporter;
pub use federation::FederationExporter;
pub use node::NodeExporter;
pub use overview::OverviewExporter;
pub use queue::QueueExporter;
pub use shovel::ShovelExporter;

/// Label names and values of one series
pub(crate) type LabelSet = Vec<(String, String)>;

/// Gauges keyed by their labels
pub(crate) type GaugeFamily = Family<LabelSet, Gauge<f64, AtomicU64>>;

/// Counters keyed by their labels
pub(crate) type CounterFamily = Family<LabelSet, Counter<f64, AtomicU64>>;

/// Build a label set from name/value pairs
pub(crate) fn label_set<const N: usize>(pairs: [(&str, &str); N]) -> LabelSet {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// An exported metric and the reply key its value is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MetricSpec {
    /// Dotted key in the normalized reply
    pub(crate) key: &'static str,
    /// Exported name, without the `rabbitmq_` prefix. Counters get a
    /// `_total` suffix when they are encoded
    pub(crate) name: &'static str,
    /// Help text
    pub(crate) help: &'static str,
}

impl MetricSpec {
    /// Map `key` to the metric `name`
    pub(crate) const fn new(key: &'static str, name: &'static str, help: &'static str) -> Self {
        Self { key, name, help }
    }
}

/// The entries of `table` that `config` does not exclude
pub(crate) fn enabled_metrics(table: &[MetricSpec], config: &Config) -> Vec<MetricSpec> {
    table
        .iter()
        .filter(|spec| !config.is_excluded(spec.key))
        .copied()
        .collect()
}

/// Register one gauge family per metric, with a series for each object
/// that has the metric's key. Values for the same labels are summed
pub(crate) fn register_gauges(
    registry: &mut Registry,
    specs: &[MetricSpec],
    rows: &[(LabelSet, &ObjectStats)],
) {
    for spec in specs {
        let family = GaugeFamily::default();
        let mut found = false;
        for (labels, object) in rows {
            if let Some(value) = object.metric(spec.key) {
                family.get_or_create(labels).inc_by(value);
                found = true;
            }
        }
        if found {
            registry.register(spec.name, spec.help, family);
        }
    }
}

/// Register one counter family per metric. Objects without its key
/// report 0 when `missing_is_zero`, and nothing otherwise
pub(crate) fn register_counters(
    registry: &mut Registry,
    specs: &[MetricSpec],
    rows: &[(LabelSet, &ObjectStats)],
    missing_is_zero: bool,
) {
    for spec in specs {
        let family = CounterFamily::default();
        let mut found = false;
        for (labels, object) in rows {
            let value = match object.metric(spec.key) {
                Some(value) => value,
                None if missing_is_zero => 0.0,
                None => continue,
            };
            family.get_or_create(labels).inc_by(value);
            found = true;
        }
        if found {
            registry.register(spec.name, spec.help, family);
        }
    }
}

/// The node the exporter talks to, as reported by `/api/overview`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInfo {
    /// Erlang node name, `rabbit@host`
    pub node: String,
    /// Name of the cluster the node belongs to
    pub cluster: String,
    /// Broker version
    pub rabbitmq_version: String,
    /// Erlang/OTP version
    pub erlang_version: String,
    /// Number of queues in the cluster
    pub total_queues: f64,
}

impl NodeInfo {
    /// Read the node description from an overview reply. Missing
    /// fields are empty
    pub fn from_reply(reply: &dyn Reply) -> Self {
        let text = |key: &str| reply.get_string(key).unwrap_or_default();
        Self {
            node: text("node"),
            cluster: text("cluster_name"),
            rabbitmq_version: text("rabbitmq_version"),
            erlang_version: text("erlang_version"),
            total_queues: reply
                .metric_map()
                .get("object_totals.queues")
                .copied()
                .unwrap_or_default(),
        }
    }
}

/// What an exporter gets to work with during one scrape
#[derive(Debug, Clone, Copy)]
pub struct ScrapeContext<'a> {
    /// Client for the management API
    pub client: &'a RabbitClient,
    /// Last known overview of the node. Empty until the first
    /// successful overview scrape
    pub node: &'a NodeInfo,
}

/// `"1"` if `node` is the node the exporter is connected to
pub(crate) fn self_label(info: &NodeInfo, node: &str) -> &'static str {
    if node == info.node {
        "1"
    } else {
        "0"
    }
}

/// Collects the metrics of one management API endpoint
#[async_trait]
pub trait Exporter: fmt::Debug + Send + Sync {
    /// Fetch the endpoint and register the resulting metrics on
    /// `registry`. On error nothing is registered
    async fn collect(
        &self,
        ctx: &ScrapeContext<'_>,
        registry: &mut Registry,
    ) -> Result<(), ScrapeError>;
}

/// Creates an exporter from the configuration
pub type ExporterFactory = fn(&Config) -> Box<dyn Exporter>;

/// Name of the exporter that always runs
pub const OVERVIEW: &str = "overview";

/// Exporters that can be enabled by name with `--exporters`
#[derive(Clone)]
pub struct ExporterRegistry {
    /// Factories by exporter name
    factories: BTreeMap<&'static str, ExporterFactory>,
}

impl fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        let mut exporters = Self::empty();
        exporters.register("queue", |config| Box::new(QueueExporter::new(config)));
        exporters.register("exchange", |config| Box::new(ExchangeExporter::new(config)));
        exporters.register("node", |config| Box::new(NodeExporter::new(config)));
        exporters.register("connections", |config| {
            Box::new(ConnectionsExporter::new(config))
        });
        exporters.register("shovel", |_| Box::new(ShovelExporter));
        exporters.register("federation", |_| Box::new(FederationExporter));
        exporters
    }
}

impl ExporterRegistry {
    /// A registry without any exporters
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Make an exporter available as `name`, replacing any exporter
    /// of the same name
    pub fn register(&mut self, name: &'static str, factory: ExporterFactory) {
        self.factories.insert(name, factory);
    }

    /// Names of the available exporters
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Build the exporters named in `config.exporters`, in order and
    /// without duplicates. The overview exporter always runs and is
    /// not built here. Unknown names are logged and ignored.
    pub fn build(&self, config: &Config) -> Vec<(&'static str, Box<dyn Exporter>)> {
        let mut enabled: Vec<(&'static str, Box<dyn Exporter>)> = Vec::new();
        for name in config.exporters.iter().map(|name| name.trim()) {
            if name == OVERVIEW || enabled.iter().any(|(known, _)| *known == name) {
                continue;
            }
            match self.factories.get_key_value(name) {
                Some((name, factory)) => enabled.push((*name, factory(config))),
                None => warn!(exporter = name, "Unknown exporter"),
            }
        }
        enabled
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::cli::test::config;
    use prometheus_client::encoding::text::encode;
    use rabbit_reply::{make_reply, Format};

    /// A reply decoded from a JSON body
    pub(crate) fn json_reply(body: &str) -> Box<dyn Reply> {
        make_reply(Format::Json, body.as_bytes())
    }

    /// Text exposition of `registry`
    pub(crate) fn render(registry: &Registry) -> String {
        let mut text = String::new();
        encode(&mut text, registry).unwrap();
        text
    }

    /// Value of the series `name{labels}` in `text`, where `labels` is
    /// written as in the exposition format, `a="1",b="2"`
    pub(crate) fn sample(text: &str, name: &str, labels: &str) -> Option<f64> {
        let series = if labels.is_empty() {
            format!("{name} ")
        } else {
            format!("{name}{{{labels}}} ")
        };
        text.lines()
            .find_map(|line| line.strip_prefix(&series))
            .map(|value| value.trim().parse().unwrap())
    }

    /// Node info for a connected node `rabbit@a` in cluster `c`
    pub(crate) fn node_info() -> NodeInfo {
        NodeInfo {
            node: "rabbit@a".into(),
            cluster: "c".into(),
            ..NodeInfo::default()
        }
    }

    #[test]
    fn node_info_from_overview() {
        let reply = json_reply(
            r#"{"node":"rabbit@a","cluster_name":"c","rabbitmq_version":"3.7.0",
                "erlang_version":"20.1","object_totals":{"queues":12}}"#,
        );
        let info = NodeInfo::from_reply(reply.as_ref());
        assert_eq!(info.node, "rabbit@a");
        assert_eq!(info.cluster, "c");
        assert_eq!(info.rabbitmq_version, "3.7.0");
        assert_eq!(info.total_queues, 12.0);

        let empty = NodeInfo::from_reply(json_reply("not json").as_ref());
        assert_eq!(empty, NodeInfo::default());
    }

    #[test]
    fn self_labels() {
        let info = node_info();
        assert_eq!(self_label(&info, "rabbit@a"), "1");
        assert_eq!(self_label(&info, "rabbit@b"), "0");
    }

    #[test]
    fn excluded_metrics() {
        let table = [
            MetricSpec::new("a", "metric_a", ""),
            MetricSpec::new("b.c", "metric_b", ""),
        ];
        let enabled = enabled_metrics(&table, &config(&["--exclude-metrics=b.c,unknown"]));
        assert_eq!(enabled, vec![table[0]]);
    }

    #[test]
    fn registry_builds_requested() {
        let exporters = ExporterRegistry::default();
        assert_eq!(
            exporters.names().collect::<Vec<_>>(),
            vec!["connections", "exchange", "federation", "node", "queue", "shovel"]
        );
        let built = exporters.build(&config(&["--exporters=queue,overview,bogus,node,queue"]));
        let names: Vec<_> = built.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["queue", "node"]);

        assert!(ExporterRegistry::empty().build(&config(&[])).is_empty());
    }

    #[test]
    fn counters_and_gauges() {
        let reply = json_reply(r#"[{"name":"a","n":1,"m":2},{"name":"b","m":3},{"name":"a","n":4}]"#);
        let objects = reply.object_stats(&["name"], rabbit_reply::DEFAULT_IDENTIFIERS);
        let rows: Vec<_> = objects
            .iter()
            .map(|object| (label_set([("name", object.label("name"))]), object))
            .collect();
        let mut registry = Registry::with_prefix("test");
        register_gauges(&mut registry, &[MetricSpec::new("n", "n", "n")], &rows);
        register_counters(&mut registry, &[MetricSpec::new("m", "m", "m")], &rows, true);
        register_counters(&mut registry, &[MetricSpec::new("x", "x", "x")], &rows, false);
        let text = render(&registry);
        assert_eq!(sample(&text, "test_n", r#"name="a""#), Some(5.0));
        assert_eq!(sample(&text, "test_n", r#"name="b""#), None);
        assert_eq!(sample(&text, "test_m_total", r#"name="a""#), Some(2.0));
        assert_eq!(sample(&text, "test_m_total", r#"name="b""#), Some(3.0));
        assert!(!text.contains("test_x"));
    }
}
