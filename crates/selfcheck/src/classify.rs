//! Outcome classification.

use crate::error::ProbeError;
use crate::probe::ProbeResponse;
use crate::types::{Outcome, Reason};
use std::error::Error as _;
use std::time::Duration;

/// Map a probe result to an outcome.
///
/// Decision order: timeout, other error, status outside `200..400`, missing
/// expected fragment, pass. Fragments are matched as plain substrings.
pub fn classify(
    url: &str,
    result: Result<ProbeResponse, ProbeError>,
    expected: &[String],
    elapsed: Duration,
) -> Outcome {
    match result {
        Err(e) if e.is_timeout() => Outcome::timeout(url, elapsed),
        Err(e) => Outcome::error(url, elapsed, error_chain(&e)),
        Ok(response) => {
            let reason = if !(200..400).contains(&response.status_code) {
                Reason::StatusCode
            } else if expected
                .iter()
                .any(|fragment| !response.body.contains(fragment.as_str()))
            {
                Reason::Body
            } else {
                Reason::Pass
            };

            Outcome::response(url, elapsed, reason, response.status_code, response.body)
        }
    }
}

/// Render an error with its sources, e.g. `error sending request: tcp connect error: refused`
fn error_chain(err: &ProbeError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
