use std::time::Instant;

use axum::{
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global tracing subscriber. `RUST_LOG` wins over the
/// configured level when set.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

pub fn install_metrics() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new().install_recorder().map_err(|e| e.to_string())
}

/// Wraps each routed request in a span and records request count and latency
/// keyed by the matched route template, not the raw path.
pub async fn track_requests<B>(req: Request<B>, next: Next<B>) -> Response {
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let span = tracing::info_span!("http.request", method = %method, route = %route);
    let started = Instant::now();
    let response = next.run(req).instrument(span.clone()).await;
    let elapsed = started.elapsed();
    let status = response.status().as_u16().to_string();

    span.in_scope(|| {
        tracing::debug!(status = %status, latency_ms = elapsed.as_millis() as u64, "request completed");
    });
    metrics::increment_counter!(
        "rollbook_http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    );
    metrics::histogram!(
        "rollbook_http_request_duration_seconds",
        elapsed.as_secs_f64(),
        "method" => method,
        "route" => route
    );
    response
}
