//! HTTP routes: the health endpoint and the Prometheus metrics endpoint.

use crate::metrics::MetricsRegistry;
use crate::render::{Presenter, presenter_for};
use axum::{
    Router,
    extract::{ConnectInfo, State, connect_info::Connected},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    serve::IncomingStream,
};
use selfcheck::{Protocol, RequestContext, SelfCheck, X_REQUEST_ID};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Addresses of an accepted connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    /// Address the connection was accepted on
    pub local_addr: Option<SocketAddr>,
    pub remote_addr: SocketAddr,
}

impl Connected<IncomingStream<'_>> for ConnectionInfo {
    fn connect_info(target: IncomingStream<'_>) -> Self {
        Self {
            local_addr: target.local_addr().ok(),
            remote_addr: target.remote_addr(),
        }
    }
}

/// Shared state of the health endpoint
#[derive(Clone)]
pub struct HealthState {
    pub engine: SelfCheck,
    pub presenter: Arc<dyn Presenter>,
    pub metrics: Option<Arc<MetricsRegistry>>,

    /// Protocol the listener serves
    pub protocol: Protocol,

    /// Used when the connection's local address is unknown
    pub fallback_addr: SocketAddr,
}

impl HealthState {
    /// State rendering in the engine's configured format
    pub fn new(engine: SelfCheck, fallback_addr: SocketAddr) -> Self {
        let presenter = presenter_for(engine.format());
        Self {
            engine,
            presenter,
            metrics: None,
            protocol: Protocol::Http,
            fallback_addr,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }
}

/// Router serving the health endpoint at `path`
pub fn health_routes(path: &str, state: HealthState) -> Router {
    Router::new()
        .route(path, get(health_handler))
        .with_state(state)
}

/// Router serving the Prometheus endpoint at `path`
pub fn metrics_routes(path: &str, registry: Arc<MetricsRegistry>) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(registry)
}

/// Handler for the health endpoint
async fn health_handler(
    State(state): State<HealthState>,
    connect_info: Option<ConnectInfo<ConnectionInfo>>,
    headers: HeaderMap,
) -> Response {
    let local_addr = connect_info
        .and_then(|ConnectInfo(info)| info.local_addr)
        .unwrap_or(state.fallback_addr);

    let mut ctx = RequestContext::new(state.protocol, local_addr);
    if let Some(request_id) = headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        ctx = ctx.with_request_id(request_id);
    }

    let started = Instant::now();
    let report = state.engine.run(&ctx).await;
    if let Some(ref metrics) = state.metrics {
        metrics.record_run(&report, started.elapsed());
    }

    state.presenter.render(&report)
}

/// Handler for the metrics endpoint
async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> Response {
    match registry.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}
