//! Checks file loading.
//!
//! The format is line oriented:
//!
//! ```text
//! # comment
//! timeout=3s                  option lines are reserved and ignored
//! /status 200 OK              url, then the expected body substring
//! /status "healthy"           repeated urls accumulate substrings
//! http://api.example.com/v1   absolute urls select a virtual host
//! ```

use crate::error::ChecksError;
use crate::types::Check;
use reqwest::Url;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Read-only mapping from check URL to expected body fragments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckRegistry {
    checks: BTreeMap<String, Vec<String>>,
}

impl CheckRegistry {
    /// Load and validate a checks file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChecksError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ChecksError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let registry = Self::parse(&contents)?;
        info!(path = %path.display(), checks = registry.len(), "Loaded checks file");
        Ok(registry)
    }

    /// Parse checks from text
    pub fn parse(contents: &str) -> Result<Self, ChecksError> {
        let mut checks: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (index, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((name, value)) = parse_option(line) {
                debug!(name, value, "Ignoring option line");
                continue;
            }

            let (url, expected) = match line.split_once(char::is_whitespace) {
                Some((url, rest)) => (url, rest.trim()),
                None => (line, ""),
            };
            validate_url(index + 1, url)?;

            let fragments = checks.entry(url.to_string()).or_default();
            if !expected.is_empty() {
                fragments.push(expected.to_string());
            }
        }

        Ok(Self { checks })
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Expected fragments for a URL
    pub fn get(&self, url: &str) -> Option<&[String]> {
        self.checks.get(url).map(Vec::as_slice)
    }

    /// URLs and their fragments, in URL order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.checks
            .iter()
            .map(|(url, expected)| (url.as_str(), expected.as_slice()))
    }

    /// Owned checks, in URL order
    pub fn checks(&self) -> Vec<Check> {
        self.iter()
            .map(|(url, expected)| Check {
                url: url.to_string(),
                expected: expected.to_vec(),
            })
            .collect()
    }
}

/// `name=value` where the name is a bare identifier
fn parse_option(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    let is_identifier = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    is_identifier.then(|| (name, value.trim()))
}

fn validate_url(line: usize, url: &str) -> Result<(), ChecksError> {
    if url.starts_with('/') {
        let base = Url::parse("http://localhost/").map_err(|e| invalid(line, url, e))?;
        base.join(url).map_err(|e| invalid(line, url, e))?;
        return Ok(());
    }

    match Url::parse(url) {
        Ok(parsed) => match parsed.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ChecksError::UnsupportedScheme {
                line,
                url: url.to_string(),
                scheme: scheme.to_string(),
            }),
        },
        Err(_) if !url.contains(':') => Err(ChecksError::RelativePath {
            line,
            url: url.to_string(),
        }),
        Err(e) => Err(invalid(line, url, e)),
    }
}

fn invalid(line: usize, url: &str, reason: impl std::fmt::Display) -> ChecksError {
    ChecksError::InvalidUrl {
        line,
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
