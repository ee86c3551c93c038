//! Self-check types and structures.

use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Protocol of the inbound connection that triggered a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// Pick the protocol from whether the originating connection is encrypted
    pub fn from_encrypted(encrypted: bool) -> Self {
        if encrypted {
            Protocol::Https
        } else {
            Protocol::Http
        }
    }

    /// URL scheme without the trailing colon
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// A registered probe target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// URL as written in the checks source (relative path or absolute URL)
    pub url: String,

    /// Substrings that must all appear in the response body
    pub expected: Vec<String>,
}

/// Why a check failed, or `Pass` when it did not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    #[serde(rename = "none")]
    Pass,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "statusCode")]
    StatusCode,
    #[serde(rename = "body")]
    Body,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Pass => "none",
            Reason::Error => "error",
            Reason::Timeout => "timeout",
            Reason::StatusCode => "statusCode",
            Reason::Body => "body",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one check during one run
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Original check URL (not the final redirected URL)
    pub url: String,

    /// Wall-clock duration of the whole probe chain
    pub elapsed: Duration,

    /// Classified reason
    pub reason: Reason,

    /// Response status code, when a response was received
    pub status_code: Option<u16>,

    /// Response body, when a response was received
    pub body: Option<String>,

    /// Transport error detail (never set for timeouts)
    pub error: Option<String>,
}

impl Outcome {
    /// Create an outcome for a received response
    pub fn response(
        url: impl Into<String>,
        elapsed: Duration,
        reason: Reason,
        status_code: u16,
        body: String,
    ) -> Self {
        Self {
            url: url.into(),
            elapsed,
            reason,
            status_code: Some(status_code),
            body: Some(body),
            error: None,
        }
    }

    /// Create a timeout outcome
    pub fn timeout(url: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            url: url.into(),
            elapsed,
            reason: Reason::Timeout,
            status_code: None,
            body: None,
            error: None,
        }
    }

    /// Create an error outcome
    pub fn error(url: impl Into<String>, elapsed: Duration, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            elapsed,
            reason: Reason::Error,
            status_code: None,
            body: None,
            error: Some(message.into()),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.reason == Reason::Pass
    }

    /// Serializable projection with the body stripped
    pub fn view(&self) -> OutcomeView<'_> {
        OutcomeView {
            url: &self.url,
            elapsed: round_to_millis(self.elapsed),
            reason: self.reason,
            status_code: self.status_code,
            error: self.error.as_deref(),
        }
    }
}

/// Body-free view of an [`Outcome`] for external serialization
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeView<'a> {
    pub url: &'a str,

    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,

    pub reason: Reason,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl OutcomeView<'_> {
    /// Elapsed time as shown to humans, e.g. `12ms` or `1s 250ms`
    pub fn display_elapsed(&self) -> String {
        humantime::format_duration(self.elapsed).to_string()
    }
}

fn round_to_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis().min(u64::MAX as u128) as u64)
}

/// Aggregate of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Outcomes with reason `none`, sorted by URL
    pub passed: Vec<Outcome>,

    /// All other outcomes, sorted by URL
    pub failed: Vec<Outcome>,

    /// Derived HTTP status for the triggering response
    pub status_code: u16,
}

impl RunReport {
    /// Partition, sort and derive the status code
    pub fn from_outcomes(outcomes: Vec<Outcome>) -> Self {
        let (mut passed, mut failed): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(Outcome::is_pass);
        passed.sort_by(|a, b| a.url.cmp(&b.url));
        failed.sort_by(|a, b| a.url.cmp(&b.url));

        let status_code = if !failed.is_empty() {
            500
        } else if !passed.is_empty() {
            200
        } else {
            404
        };

        Self {
            passed,
            failed,
            status_code,
        }
    }

    pub fn total(&self) -> usize {
        self.passed.len() + self.failed.len()
    }

    /// Serializable `{ "passed": [...], "failed": [...] }` view
    pub fn view(&self) -> ReportView<'_> {
        ReportView {
            passed: self.passed.iter().map(Outcome::view).collect(),
            failed: self.failed.iter().map(Outcome::view).collect(),
        }
    }
}

/// Body-free view of a [`RunReport`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView<'a> {
    pub passed: Vec<OutcomeView<'a>>,
    pub failed: Vec<OutcomeView<'a>>,
}

/// Output format of the presentation adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Html,
    Json,
}
