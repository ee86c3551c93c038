//! Loopback resolution of check URLs.
//!
//! Every probe is sent to the server's own local address. The hostname the
//! check was written against survives as the `Host` header so virtual-host
//! routing keeps working, and it is the hostname that redirect targets are
//! compared against.

use crate::error::ProbeError;
use crate::types::Protocol;
use reqwest::Url;
use reqwest::header::{HOST, HeaderMap, HeaderName, HeaderValue};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Header carrying the protocol of the triggering connection
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Hostname assumed for relative check URLs
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// A check URL rewritten to target the local server
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    /// URL the request is actually sent to (local ip and port)
    pub target: Url,

    /// URL as the application sees it (logical hostname)
    pub logical: Url,

    /// Logical hostname, also sent as `Host`
    pub hostname: String,

    /// Local address the request connects to
    pub host: IpAddr,

    /// Local port the request connects to
    pub port: u16,

    /// `Host` and `X-Forwarded-Proto`
    pub headers: HeaderMap,
}

/// Maps check URLs onto the address of the connection that triggered the run
#[derive(Debug, Clone)]
pub struct DomainResolver {
    protocol: Protocol,
    local_addr: SocketAddr,
}

impl DomainResolver {
    /// Create a resolver for one run.
    ///
    /// Unspecified bind addresses (`0.0.0.0`, `::`) are replaced with the
    /// loopback address of the same family.
    pub fn new(protocol: Protocol, local_addr: SocketAddr) -> Self {
        Self {
            protocol,
            local_addr: loopback(local_addr),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolve a check URL, relative or absolute.
    ///
    /// Relative URLs are joined against `{protocol}://localhost/` first.
    pub fn resolve(&self, url: &str) -> Result<ResolvedRequest, ProbeError> {
        let base = Url::parse(&format!("{}://{}/", self.protocol.scheme(), DEFAULT_HOSTNAME))
            .map_err(|e| invalid_url(url, e))?;
        self.resolve_against(&base, url)
    }

    /// Resolve `url` against an already resolved logical URL (redirect targets)
    pub fn resolve_against(&self, base: &Url, url: &str) -> Result<ResolvedRequest, ProbeError> {
        let logical = base.join(url).map_err(|e| invalid_url(url, e))?;
        self.rewrite(logical)
    }

    fn rewrite(&self, logical: Url) -> Result<ResolvedRequest, ProbeError> {
        let hostname = logical
            .host_str()
            .ok_or_else(|| invalid_url(logical.as_str(), "missing host"))?
            .to_string();

        let mut target = logical.clone();
        target
            .set_scheme(self.protocol.scheme())
            .map_err(|_| invalid_url(logical.as_str(), "unsupported scheme"))?;
        target
            .set_ip_host(self.local_addr.ip())
            .map_err(|_| invalid_url(logical.as_str(), "cannot set local host"))?;
        target
            .set_port(Some(self.local_addr.port()))
            .map_err(|_| invalid_url(logical.as_str(), "cannot set local port"))?;
        target.set_fragment(None);

        let mut headers = HeaderMap::new();
        headers.insert(
            HOST,
            HeaderValue::from_str(&hostname).map_err(|e| invalid_url(logical.as_str(), e))?,
        );
        headers.insert(
            X_FORWARDED_PROTO,
            HeaderValue::from_static(self.protocol.scheme()),
        );

        Ok(ResolvedRequest {
            target,
            logical,
            hostname,
            host: self.local_addr.ip(),
            port: self.local_addr.port(),
            headers,
        })
    }
}

/// Whether a redirect from host `a` to host `b` stays within the same domain.
///
/// Hosts match when equal or when either is a dot-suffix subdomain of the
/// other, so `a.b.com` and `b.com` match in both directions.
pub fn is_same_domain(a: &str, b: &str) -> bool {
    let a = normalize_host(a);
    let b = normalize_host(b);
    a == b || is_subdomain_of(&a, &b) || is_subdomain_of(&b, &a)
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_subdomain_of(child: &str, parent: &str) -> bool {
    !parent.is_empty()
        && child.len() > parent.len()
        && child.ends_with(parent)
        && child.as_bytes()[child.len() - parent.len() - 1] == b'.'
}

fn loopback(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}

fn invalid_url(url: &str, reason: impl std::fmt::Display) -> ProbeError {
    ProbeError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> DomainResolver {
        DomainResolver::new(Protocol::Http, "127.0.0.1:8080".parse().unwrap())
    }

    #[test]
    fn test_relative_url_targets_local_address() {
        let req = resolver().resolve("/health?full=1").unwrap();

        assert_eq!(req.target.as_str(), "http://127.0.0.1:8080/health?full=1");
        assert_eq!(req.logical.as_str(), "http://localhost/health?full=1");
        assert_eq!(req.hostname, "localhost");
        assert_eq!(req.port, 8080);
        assert_eq!(req.headers[HOST], "localhost");
        assert_eq!(req.headers[X_FORWARDED_PROTO], "http");
    }

    #[test]
    fn test_absolute_url_keeps_logical_host() {
        let req = resolver().resolve("http://api.example.com:9999/v1#frag").unwrap();

        assert_eq!(req.target.as_str(), "http://127.0.0.1:8080/v1");
        assert_eq!(req.hostname, "api.example.com");
        assert_eq!(req.headers[HOST], "api.example.com");
    }

    #[test]
    fn test_https_protocol_is_forwarded() {
        let resolver = DomainResolver::new(Protocol::Https, "10.0.0.5:8443".parse().unwrap());
        let req = resolver.resolve("http://shop.example.com/cart").unwrap();

        assert_eq!(req.target.as_str(), "https://10.0.0.5:8443/cart");
        assert_eq!(req.headers[X_FORWARDED_PROTO], "https");
    }

    #[test]
    fn test_unspecified_bind_maps_to_loopback() {
        let v4 = DomainResolver::new(Protocol::Http, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(v4.local_addr(), "127.0.0.1:3000".parse().unwrap());

        let v6 = DomainResolver::new(Protocol::Http, "[::]:3000".parse().unwrap());
        let req = v6.resolve("/x").unwrap();
        assert_eq!(req.target.as_str(), "http://[::1]:3000/x");
    }

    #[test]
    fn test_redirect_location_resolves_against_logical_url() {
        let r = resolver();
        let first = r.resolve("http://www.example.com/a/b").unwrap();
        let next = r.resolve_against(&first.logical, "c?d=1").unwrap();

        assert_eq!(next.logical.as_str(), "http://www.example.com/a/c?d=1");
        assert_eq!(next.target.as_str(), "http://127.0.0.1:8080/a/c?d=1");
    }

    #[test]
    fn test_non_http_location_is_rejected() {
        let r = resolver();
        let base = r.resolve("/").unwrap().logical;
        let err = r.resolve_against(&base, "mailto:ops@example.com").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidUrl { .. }));
    }

    #[test]
    fn test_same_domain_predicate() {
        assert!(is_same_domain("localhost", "localhost"));
        assert!(is_same_domain("a.b.com", "b.com"));
        assert!(is_same_domain("b.com", "a.b.com"));
        assert!(is_same_domain("WWW.Example.com", "example.com."));

        assert!(!is_same_domain("example.com", "example.org"));
        assert!(!is_same_domain("evilb.com", "b.com"));
        assert!(!is_same_domain("b.com", ""));
        assert!(!is_same_domain("localhost", "attacker.example"));
    }
}
