//! `rabbitmq-exporter` command line tool. See the library
//! documentation for details

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::{Context, IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use rabbitmq_exporter::cli::{Config, LogFormat};
use rabbitmq_exporter::client::RabbitClient;
use rabbitmq_exporter::exporter::ExporterRegistry;
use rabbitmq_exporter::scraper::Scraper;
use rabbitmq_exporter::server;

/// Timeout of the `--check-url` request
const CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Install the global log subscriber. The level is taken from
/// `RUST_LOG` and defaults to `info`
fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Tty => subscriber.pretty().init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

/// Fetch `url` once. Used as a container health check, where no
/// `curl` is available
async fn check_url(url: Url) -> bool {
    let client = match reqwest::Client::builder().timeout(CHECK_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            println!("Error checking url: {err}");
            return false;
        }
    };
    match client.get(url).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => true,
        Ok(response) => {
            println!("Error checking url: Unexpected http code {}", response.status());
            false
        }
        Err(err) => {
            println!("Error checking url: {err}");
            false
        }
    }
}

/// Wait for SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        interrupt = tokio::signal::ctrl_c() => interrupt.map(|()| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

/// Wait for Ctrl-C
#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "Ctrl-C")
}

/// Serve metrics until a termination signal arrives
async fn tokio_main(config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting RabbitMQ exporter");
    info!(
        publish_addr = %config.publish_addr,
        publish_port = config.publish_port,
        rabbit_url = %config.rabbit_url,
        rabbit_user = %config.credentials.rabbit_user,
        rabbit_capabilities = %config.rabbit_capabilities,
        exporters = ?config.exporters,
        exclude_metrics = ?config.exclude_metrics,
        include_queues = %config.filters.include_queues,
        skip_queues = %config.filters.skip_queues,
        include_vhost = %config.filters.include_vhost,
        skip_vhost = %config.filters.skip_vhost,
        timeout = config.timeout,
        max_queues = config.max_queues,
        "Active Configuration"
    );

    let client = RabbitClient::new(&config)
        .into_diagnostic()
        .wrap_err("Unable to set up the management API client")?;
    let scraper = Arc::new(Scraper::new(&config, client, &ExporterRegistry::default()));

    let metrics_addr = config.publish_socket();
    let cancel = CancellationToken::new();
    let mut metrics_server = tokio::spawn(server::start_metrics_server(
        metrics_addr,
        scraper,
        cancel.clone(),
    ));

    tokio::select! {
        result = &mut metrics_server => {
            result
                .into_diagnostic()?
                .into_diagnostic()
                .wrap_err_with(|| format!("Metrics server on {metrics_addr} failed"))?;
            return Ok(());
        }
        signal = shutdown_signal() => {
            let signal = signal.into_diagnostic()?;
            info!("Got signal {}. Shutting down", signal);
            cancel.cancel();
        }
    }

    metrics_server.await.into_diagnostic()?.into_diagnostic()?;
    info!("Shutting down");
    Ok(())
}

#[doc(hidden)]
fn main() -> Result<()> {
    let config = Config::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    if let Some(url) = config.check_url.clone() {
        let healthy = rt.block_on(check_url(url));
        std::process::exit(if healthy { 0 } else { 1 });
    }

    init_logging(config.log_format);
    rt.block_on(tokio_main(config))
}
