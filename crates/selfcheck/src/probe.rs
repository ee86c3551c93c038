//! Probe execution: one GET per hop, same-domain redirects, per-hop timeout.

use crate::error::ProbeError;
use crate::resolver::{DomainResolver, ResolvedRequest, is_same_domain};
use reqwest::header::{HeaderMap, LOCATION};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Maximum number of redirects followed for a single check
pub const MAX_REDIRECTS: usize = 10;

/// Status codes treated as redirects
pub const REDIRECT_CODES: [u16; 4] = [301, 302, 303, 307];

/// Bytes of a response body kept for classification; the rest is discarded
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Final response of a probe chain
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ProbeResponse {
    pub fn is_redirect(&self) -> bool {
        REDIRECT_CODES.contains(&self.status_code)
    }

    fn location(&self) -> Option<String> {
        self.headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }
}

/// Runs single checks against the local server
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    timeout_duration: Duration,
    max_redirects: usize,
    max_body_bytes: usize,
}

impl Prober {
    /// Create a prober with a client suited to loopback probing.
    ///
    /// Automatic redirects are disabled so that every hop goes through the
    /// same-domain check. Certificates are not verified: the transport host
    /// is the local IP while the certificate names the public hostname.
    pub fn new(timeout_duration: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .connect_timeout(timeout_duration)
            .no_proxy()
            .build()?;

        Ok(Self::with_client(client, timeout_duration))
    }

    /// Create a prober around an existing client
    pub fn with_client(client: reqwest::Client, timeout_duration: Duration) -> Self {
        Self {
            client,
            timeout_duration,
            max_redirects: MAX_REDIRECTS,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_duration
    }

    /// Probe `url`, following same-domain redirects.
    ///
    /// `headers` are sent on every hop; the resolver's `Host` and
    /// `X-Forwarded-Proto` take precedence over them.
    pub async fn probe(
        &self,
        url: &str,
        headers: &HeaderMap,
        resolver: &DomainResolver,
    ) -> Result<ProbeResponse, ProbeError> {
        let mut request = resolver.resolve(url)?;
        let mut redirects = 0;

        loop {
            let response = self.fetch(&request, headers).await?;
            if !response.is_redirect() {
                return Ok(response);
            }

            if redirects >= self.max_redirects {
                return Err(ProbeError::TooManyRedirects(redirects));
            }

            let Some(location) = response.location() else {
                debug!(url, status = response.status_code, "Redirect without location");
                return Ok(response);
            };

            let next = resolver.resolve_against(&request.logical, &location)?;
            if !is_same_domain(&request.hostname, &next.hostname) {
                debug!(
                    url,
                    from = %request.hostname,
                    to = %next.hostname,
                    "Not following cross-domain redirect"
                );
                return Ok(response);
            }

            redirects += 1;
            debug!(url, hop = redirects, to = %next.logical, "Following redirect");
            request = next;
        }
    }

    /// One hop: request and body read, raced against the timeout
    async fn fetch(
        &self,
        request: &ResolvedRequest,
        headers: &HeaderMap,
    ) -> Result<ProbeResponse, ProbeError> {
        let mut merged = headers.clone();
        merged.extend(request.headers.clone());

        let exchange = async {
            let mut response = self
                .client
                .get(request.target.clone())
                .headers(merged)
                .send()
                .await?;
            let status_code = response.status().as_u16();
            let headers = response.headers().clone();

            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                let room = self.max_body_bytes - body.len();
                if chunk.len() > room {
                    body.extend_from_slice(&chunk[..room]);
                    debug!(url = %request.logical, limit = self.max_body_bytes, "Response body truncated");
                    break;
                }
                body.extend_from_slice(&chunk);
            }

            Ok::<_, reqwest::Error>(ProbeResponse {
                status_code,
                headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        };

        match timeout(self.timeout_duration, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.is_timeout() => Err(ProbeError::Timeout(self.timeout_duration)),
            Ok(Err(e)) => Err(ProbeError::Transport(e)),
            Err(_) => Err(ProbeError::Timeout(self.timeout_duration)),
        }
    }
}
