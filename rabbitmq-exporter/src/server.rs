//! HTTP server exposing the collected metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tracing::{error, info};

use crate::scraper::Scraper;

/// Content type of the `/metrics` reply
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Landing page
const INDEX: &str = "<html>
<head><title>RabbitMQ Exporter</title></head>
<body>
<h1>RabbitMQ Exporter</h1>
<p><a href='/metrics'>Metrics</a></p>
</body>
</html>
";

/// Routes of the exporter
pub fn router(scraper: Arc<Scraper>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(scraper)
}

/// Start a HTTP server to report metrics on `metrics_addr`. It runs
/// until `cancel` is cancelled
pub async fn start_metrics_server(
    metrics_addr: SocketAddr,
    scraper: Arc<Scraper>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(metrics_addr).await?;
    serve(listener, scraper, cancel).await
}

/// Serve metrics on an already bound `listener`
pub async fn serve(
    listener: TcpListener,
    scraper: Arc<Scraper>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    info!("Starting metrics server on {}", listener.local_addr()?);
    axum::serve(listener, router(scraper))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    info!("Metrics server shutting down");
    Ok(())
}

/// Scrape the management API and return the metrics as the reply to
/// the prometheus scrape
async fn metrics(State(scraper): State<Arc<Scraper>>) -> Response {
    match scraper.render().await {
        Ok(text) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], text).into_response(),
        Err(err) => {
            error!(error = %err, "Unable to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// 200 if the last scrape succeeded, 504 otherwise
async fn health(State(scraper): State<Arc<Scraper>>) -> StatusCode {
    if scraper.last_scrape_ok() {
        StatusCode::OK
    } else {
        StatusCode::GATEWAY_TIMEOUT
    }
}

/// Link to the metrics
async fn index() -> Html<&'static str> {
    Html(INDEX)
}
