//! Self-diagnostic health checks for a running web server.
//!
//! A [`SelfCheck`] holds a static list of endpoints and the body fragments
//! each must return. Every run probes all of them against the server's own
//! local address, keeping the logical hostname in the `Host` header:
//! - one GET per check, all checks in flight at once
//! - same-domain redirects followed, up to 10 hops
//! - every hop raced against a timeout
//! - outcomes classified as `none`, `error`, `timeout`, `statusCode` or `body`
//!
//! The resulting [`RunReport`] splits outcomes into passed and failed and
//! derives the HTTP status of the health response: 500 when anything
//! failed, 200 when something passed, 404 when nothing ran.
//!
//! # Example
//!
//! ```no_run
//! use selfcheck::{Protocol, RequestContext, SelfCheck};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SelfCheck::builder()
//!     .checks("/status 200 OK\n/ping pong\n")
//!     .timeout(Duration::from_secs(2))
//!     .build()?;
//!
//! let ctx = RequestContext::new(Protocol::Http, "127.0.0.1:8080".parse()?)
//!     .with_request_id("4f2a");
//! let report = engine.run(&ctx).await;
//!
//! println!("{}", serde_json::to_string(&report.view())?);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod engine;
pub mod error;
pub mod hook;
pub mod probe;
pub mod registry;
pub mod resolver;
pub mod types;

pub use classify::classify;
pub use engine::{ChecksSource, RequestContext, SelfCheck, SelfCheckBuilder, X_REQUEST_ID};
pub use error::{ChecksError, HookError, ProbeError, SetupError};
pub use hook::{FailureHook, FailureNotice, FnHook, NoopHook};
pub use probe::{MAX_BODY_BYTES, ProbeResponse, Prober};
pub use registry::CheckRegistry;
pub use resolver::{DomainResolver, ResolvedRequest, is_same_domain};
pub use types::{Check, Outcome, OutcomeView, Protocol, Reason, ReportFormat, ReportView, RunReport};
