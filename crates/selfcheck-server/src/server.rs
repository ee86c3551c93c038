//! Main self-check server implementation.

use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::notifier::{ChannelHook, Notifier};
use crate::routes::{ConnectionInfo, HealthState, health_routes, metrics_routes};
use anyhow::Context;
use axum::{Router, routing::get};
use selfcheck::FailureNotice;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Self-check server
pub struct SelfcheckServer {
    config: Config,
}

impl SelfcheckServer {
    /// Create a new self-check server
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bind the configured listen address and serve until the listener fails
    pub async fn run(self) -> anyhow::Result<()> {
        let listen_addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("failed to bind {listen_addr}"))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        let (app, notifier) = self.build(local_addr)?;

        let notifier_handle = tokio::spawn(notifier.run());

        info!(listen_addr = %local_addr, health_path = %self.config.server.health_path, "Self-check server listening");
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<ConnectionInfo>(),
        )
        .await?;

        // the router held the last notice sender, so the notifier drains and exits
        join_notifier(notifier_handle).await;
        info!("Self-check server stopped");
        Ok(())
    }

    /// Build the router and the notifier task feeding on its failures
    pub fn build(&self, local_addr: SocketAddr) -> anyhow::Result<(Router, Notifier)> {
        let health_path = self.config.server.health_path.as_str();
        anyhow::ensure!(health_path != "/ping", "health path /ping is reserved");
        anyhow::ensure!(
            !self.config.metrics.enabled || self.config.metrics.path != health_path,
            "health and metrics paths must differ"
        );

        let metrics = if self.config.metrics.enabled {
            info!(path = %self.config.metrics.path, "Metrics enabled");
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            info!("Metrics disabled");
            None
        };

        let (notice_tx, notice_rx) =
            mpsc::channel::<FailureNotice>(self.config.alerting.channel_size);
        let notifier = Notifier::new(
            notice_rx,
            self.config.alerting.webhook_url.clone(),
            self.config.alerting.batch_delay,
            self.config.alerting.max_batch,
            metrics.clone(),
        )?;
        let hook = ChannelHook::new(notice_tx, metrics.clone());

        let engine = self
            .config
            .build_engine(Arc::new(hook))
            .context("failed to load health checks")?;
        info!(
            checks = engine.registry().len(),
            timeout = ?engine.timeout(),
            format = ?engine.format(),
            "Health checks loaded"
        );

        let mut state = HealthState::new(engine, local_addr);
        if let Some(ref registry) = metrics {
            state = state.with_metrics(registry.clone());
        }

        let mut app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .merge(health_routes(health_path, state));
        if let Some(registry) = metrics {
            app = app.merge(metrics_routes(&self.config.metrics.path, registry));
        }

        let app = app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
        Ok((app, notifier))
    }
}

/// Wait for the notifier to drain. Returns false if it panicked or was cancelled.
async fn join_notifier(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Notifier task did not complete");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_join_notifier_clean_exit() {
        assert!(join_notifier(tokio::spawn(async {})).await);
    }

    #[tokio::test]
    async fn test_join_notifier_reports_panic() {
        let handle = tokio::spawn(async { panic!("webhook client exploded") });
        assert!(!join_notifier(handle).await);
    }

    #[tokio::test]
    async fn test_join_notifier_reports_cancellation() {
        let handle = tokio::spawn(tokio::time::sleep(Duration::from_secs(30)));
        handle.abort();
        assert!(!join_notifier(handle).await);
    }
}
