//! Run orchestration: fan out one probe per check, join, partition.

use crate::classify::classify;
use crate::error::SetupError;
use crate::hook::{FailureHook, FailureNotice, NoopHook};
use crate::probe::Prober;
use crate::registry::CheckRegistry;
use crate::resolver::DomainResolver;
use crate::types::{Outcome, Protocol, Reason, ReportFormat, RunReport};
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default per-hop probe timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Request correlation header, read from the trigger and sent on every probe
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Where the checks come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksSource {
    /// Path to a checks file
    File(PathBuf),
    /// Checks text held in memory
    Inline(String),
}

impl ChecksSource {
    fn load(&self) -> Result<CheckRegistry, SetupError> {
        let registry = match self {
            ChecksSource::File(path) => CheckRegistry::load(path)?,
            ChecksSource::Inline(text) => CheckRegistry::parse(text)?,
        };
        Ok(registry)
    }
}

/// Inputs taken from the request that triggered a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// `https` when the triggering connection was encrypted
    pub protocol: Protocol,

    /// Local address the triggering connection was accepted on
    pub local_addr: SocketAddr,

    /// Value of the trigger's `X-Request-ID` header
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(protocol: Protocol, local_addr: SocketAddr) -> Self {
        Self {
            protocol,
            local_addr,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// The self-check engine.
///
/// Holds the immutable check registry and probes every check against the
/// server that received the triggering request.
#[derive(Clone)]
pub struct SelfCheck {
    registry: Arc<CheckRegistry>,
    prober: Prober,
    format: ReportFormat,
    user_agent: String,
    on_failure: Arc<dyn FailureHook>,
}

impl SelfCheck {
    pub fn builder() -> SelfCheckBuilder {
        SelfCheckBuilder::default()
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    pub fn timeout(&self) -> Duration {
        self.prober.timeout()
    }

    /// Probe every registered check concurrently and build the report.
    ///
    /// Waits for every check; a slow check delays the report but never
    /// changes another check's outcome.
    pub async fn run(&self, ctx: &RequestContext) -> RunReport {
        let started = Instant::now();
        let resolver = DomainResolver::new(ctx.protocol, ctx.local_addr);
        let headers = self.probe_headers(ctx.request_id.as_deref());

        let probes = self
            .registry
            .iter()
            .map(|(url, expected)| self.run_check(url, expected, &headers, &resolver));
        let outcomes = join_all(probes).await;

        let report = RunReport::from_outcomes(outcomes);
        info!(
            request_id = ctx.request_id.as_deref().unwrap_or(""),
            passed = report.passed.len(),
            failed = report.failed.len(),
            status = report.status_code,
            duration_ms = started.elapsed().as_millis(),
            "Self-check run complete"
        );

        if !report.failed.is_empty() {
            self.notify_failure(ctx, &report);
        }

        report
    }

    async fn run_check(
        &self,
        url: &str,
        expected: &[String],
        headers: &HeaderMap,
        resolver: &DomainResolver,
    ) -> Outcome {
        let start = Instant::now();
        let result = self.prober.probe(url, headers, resolver).await;
        let outcome = classify(url, result, expected, start.elapsed());

        match outcome.reason {
            Reason::Pass => {
                debug!(url, elapsed_ms = outcome.elapsed.as_millis(), "Check passed");
            }
            reason => {
                warn!(
                    url,
                    %reason,
                    status = outcome.status_code,
                    error = outcome.error.as_deref(),
                    elapsed_ms = outcome.elapsed.as_millis(),
                    "Check failed"
                );
            }
        }

        outcome
    }

    fn probe_headers(&self, request_id: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        let request_id = request_id
            .and_then(|id| HeaderValue::from_str(id).ok())
            .unwrap_or_else(|| HeaderValue::from_static(""));
        headers.insert(X_REQUEST_ID, request_id);
        headers
    }

    /// Fire and forget: the hook runs on its own task
    fn notify_failure(&self, ctx: &RequestContext, report: &RunReport) {
        let hook = self.on_failure.clone();
        let notice = FailureNotice {
            request_id: ctx.request_id.clone(),
            failed: report.failed.clone(),
        };

        let handle = tokio::spawn(async move { hook.on_failure(notice).await });
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Failure hook returned an error"),
                Err(e) => warn!(error = %e, "Failure hook did not complete"),
            }
        });
    }
}

impl std::fmt::Debug for SelfCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfCheck")
            .field("checks", &self.registry.len())
            .field("timeout", &self.prober.timeout())
            .field("format", &self.format)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

/// Typed options for [`SelfCheck`], validated by [`SelfCheckBuilder::build`]
#[derive(Default)]
pub struct SelfCheckBuilder {
    source: Option<ChecksSource>,
    timeout: Option<Duration>,
    format: ReportFormat,
    on_failure: Option<Arc<dyn FailureHook>>,
    user_agent: Option<String>,
    max_redirects: Option<usize>,
}

impl SelfCheckBuilder {
    /// Read checks from a file (required unless [`Self::checks`] is used)
    pub fn checks_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(ChecksSource::File(path.into()));
        self
    }

    /// Use checks text held in memory
    pub fn checks(mut self, text: impl Into<String>) -> Self {
        self.source = Some(ChecksSource::Inline(text.into()));
        self
    }

    pub fn source(mut self, source: ChecksSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Per-hop timeout, 3 seconds by default
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn on_failure(mut self, hook: impl FailureHook + 'static) -> Self {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    pub fn on_failure_arc(mut self, hook: Arc<dyn FailureHook>) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    /// Load the checks and build the engine.
    ///
    /// Fails on a missing source, a zero timeout, or an invalid checks source.
    pub fn build(self) -> Result<SelfCheck, SetupError> {
        let source = self.source.ok_or(SetupError::MissingSource)?;
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(SetupError::InvalidTimeout);
        }

        let registry = source.load()?;
        let mut prober = Prober::new(timeout)?;
        if let Some(max_redirects) = self.max_redirects {
            prober = prober.with_max_redirects(max_redirects);
        }

        Ok(SelfCheck {
            registry: Arc::new(registry),
            prober,
            format: self.format,
            user_agent: self.user_agent.unwrap_or_else(default_user_agent),
            on_failure: self.on_failure.unwrap_or_else(|| Arc::new(NoopHook)),
        })
    }
}

fn default_user_agent() -> String {
    format!("selfcheck/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    #[test]
    fn test_builder_requires_source() {
        let err = SelfCheck::builder().build().unwrap_err();
        assert!(matches!(err, SetupError::MissingSource));
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let err = SelfCheck::builder()
            .checks("/status")
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidTimeout));
    }

    #[test]
    fn test_builder_fails_fast_on_bad_checks() {
        let err = SelfCheck::builder()
            .checks("/ok\ngopher://old.example/\n")
            .build()
            .unwrap_err();
        assert!(matches!(err, SetupError::Checks(_)));
    }

    #[test]
    fn test_builder_defaults() {
        let engine = SelfCheck::builder().checks("/status 200 OK").build().unwrap();

        assert_eq!(engine.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(engine.format(), ReportFormat::Html);
        assert_eq!(engine.registry().len(), 1);
        assert!(engine.user_agent.starts_with("selfcheck/"));
    }

    #[test]
    fn test_probe_headers() {
        let engine = SelfCheck::builder()
            .checks("")
            .user_agent("probe-test/1.0")
            .build()
            .unwrap();

        let headers = engine.probe_headers(Some("abc-123"));
        assert_eq!(headers[USER_AGENT], "probe-test/1.0");
        assert_eq!(headers[X_REQUEST_ID], "abc-123");

        let headers = engine.probe_headers(None);
        assert_eq!(headers[X_REQUEST_ID], "");
    }

    #[tokio::test]
    async fn test_no_checks_is_not_found() {
        let engine = SelfCheck::builder().checks("# empty\n").build().unwrap();
        let report = engine.run(&RequestContext::new(Protocol::Http, local())).await;

        assert_eq!(report.status_code, 404);
        assert!(report.passed.is_empty());
        assert!(report.failed.is_empty());
    }
}
