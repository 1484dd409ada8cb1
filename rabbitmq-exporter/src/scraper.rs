//! Runs all exporters for one `/metrics` request

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cli::Config;
use crate::client::RabbitClient;
use crate::exporter::{
    label_set, Exporter, ExporterRegistry, GaugeFamily, NodeInfo, OverviewExporter, ScrapeContext,
    OVERVIEW,
};

/// Prefix of every exported metric name
pub const METRIC_PREFIX: &str = "rabbitmq";

/// Per module status of one scrape
#[derive(Debug, Default)]
struct ModuleMetrics {
    /// Whether the module's endpoint could be scraped
    up: GaugeFamily,
    /// How long the module took
    duration: GaugeFamily,
}

impl ModuleMetrics {
    /// Record the result of `module`. Durations are only known once
    /// the node is
    fn record(&self, node: &NodeInfo, module: &str, up: bool, elapsed: Duration) {
        let labels = label_set([
            ("cluster", node.cluster.as_str()),
            ("node", node.node.as_str()),
            ("module", module),
        ]);
        if !node.cluster.is_empty() && !node.node.is_empty() {
            self.duration
                .get_or_create(&labels)
                .set(elapsed.as_secs_f64());
        }
        self.up
            .get_or_create(&labels)
            .set(if up { 1.0 } else { 0.0 });
    }

    /// Add the module metrics to `registry`
    fn register(self, registry: &mut Registry) {
        registry.register(
            "module_up",
            "Was the last scrape of rabbitmq successful per module.",
            self.up,
        );
        registry.register(
            "module_scrape_duration_seconds",
            "Duration of the last scrape in seconds",
            self.duration,
        );
    }
}

/// Collects metrics from every enabled exporter
#[derive(Debug)]
pub struct Scraper {
    /// Client shared by all exporters
    client: RabbitClient,
    /// Always enabled, runs first
    overview: OverviewExporter,
    /// Enabled exporters and their names
    exporters: Vec<(&'static str, Box<dyn Exporter>)>,
    /// The node as of the last successful overview. Held for the
    /// whole scrape, so scrapes never overlap
    node: Mutex<NodeInfo>,
    /// Whether every module succeeded in the last scrape
    last_scrape_ok: AtomicBool,
}

impl Scraper {
    /// Build the exporters enabled in `config` from `exporters`
    pub fn new(config: &Config, client: RabbitClient, exporters: &ExporterRegistry) -> Self {
        let exporters = exporters.build(config);
        info!(
            rabbit_url = %client.base_url(),
            exporters = ?exporters.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            "Enabled exporters"
        );
        Self {
            client,
            overview: OverviewExporter::new(config),
            exporters,
            node: Mutex::new(NodeInfo::default()),
            // healthy until the first scrape says otherwise
            last_scrape_ok: AtomicBool::new(true),
        }
    }

    /// Whether every module succeeded in the last scrape
    pub fn last_scrape_ok(&self) -> bool {
        self.last_scrape_ok.load(Ordering::Relaxed)
    }

    /// Run every exporter and return the collected metrics. A failing
    /// exporter is logged and reported as down in `module_up`, the
    /// others still run.
    pub async fn scrape(&self) -> Registry {
        let mut node = self.node.lock().await;
        let start = Instant::now();
        let mut registry = Registry::with_prefix(METRIC_PREFIX);
        let modules = ModuleMetrics::default();
        let mut all_up = true;

        let module_start = Instant::now();
        let overview_up = match self.overview.collect(&self.client, &mut registry).await {
            Ok(info) => {
                *node = info;
                true
            }
            Err(err) => {
                warn!(error = %err, "retrieving overview failed");
                false
            }
        };
        modules.record(&node, OVERVIEW, overview_up, module_start.elapsed());
        all_up &= overview_up;

        let ctx = ScrapeContext {
            client: &self.client,
            node: &node,
        };
        for (name, exporter) in &self.exporters {
            let module_start = Instant::now();
            let up = match exporter.collect(&ctx, &mut registry).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(exporter = name, error = %err, "retrieving {name} failed");
                    false
                }
            };
            modules.record(&node, name, up, module_start.elapsed());
            all_up &= up;
        }

        modules.register(&mut registry);

        let up = GaugeFamily::default();
        up.get_or_create(&label_set([
            ("cluster", node.cluster.as_str()),
            ("node", node.node.as_str()),
        ]))
        .set(if all_up { 1.0 } else { 0.0 });
        registry.register("up", "Was the last scrape of rabbitmq successful.", up);

        let build_info = GaugeFamily::default();
        build_info
            .get_or_create(&label_set([("version", env!("CARGO_PKG_VERSION"))]))
            .set(1.0);
        registry.register(
            "exporter_build_info",
            "A metric with a constant '1' value labeled by the version of the exporter.",
            build_info,
        );

        self.last_scrape_ok.store(all_up, Ordering::Relaxed);
        info!(duration = ?start.elapsed(), up = all_up, "Metrics updated");
        registry
    }

    /// Scrape and encode the result in the OpenMetrics text format
    pub async fn render(&self) -> Result<String, std::fmt::Error> {
        let registry = self.scrape().await;
        let mut text = String::new();
        encode(&mut text, &registry)?;
        debug!(bytes = text.len(), "Encoded metrics");
        Ok(text)
    }
}
