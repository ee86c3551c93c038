//! Self-check server
//!
//! Hosts the [`selfcheck`] engine behind an axum router. Every request to the
//! health path runs all configured checks against the server itself and
//! answers with the report as HTML or JSON.
//!
//! # Components
//!
//! - **Routes**: health endpoint, Prometheus endpoint and `/ping`
//! - **Render**: HTML and JSON presenters for run reports
//! - **Notifier**: batches failure notices and posts them to a webhook
//! - **Config**: YAML configuration with validation

pub mod config;
pub mod metrics;
pub mod notifier;
pub mod render;
pub mod routes;
pub mod server;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use metrics::MetricsRegistry;
pub use notifier::{ChannelHook, Notifier};
pub use render::{HtmlPresenter, JsonPresenter, Presenter, presenter_for};
pub use routes::{ConnectionInfo, HealthState, health_routes, metrics_routes};
pub use server::SelfcheckServer;
pub use telemetry::{TelemetryGuard, init_telemetry, setup_tracing};
