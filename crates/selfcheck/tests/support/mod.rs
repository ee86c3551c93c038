//! Probed application used by the integration tests.

#![allow(dead_code)]

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::ServerConfig;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::Service;

/// Size of the `/large` body before its `tail` marker
pub const LARGE_BODY_BYTES: usize = 2 * 1024 * 1024;

/// A running application and its request counters
pub struct TestApp {
    pub addr: SocketAddr,
    pub loop_hits: Arc<AtomicUsize>,
}

impl TestApp {
    pub fn loop_hits(&self) -> usize {
        self.loop_hits.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct AppState {
    loop_hits: Arc<AtomicUsize>,
}

/// Serve the test application on an ephemeral loopback port
pub async fn spawn_app() -> TestApp {
    let loop_hits = Arc::new(AtomicUsize::new(0));
    let app = router(loop_hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { addr, loop_hits }
}

/// Serve the test application over TLS with a self-signed certificate
/// issued for `hostname` only, never for the loopback address
pub async fn spawn_tls_app(hostname: &str) -> TestApp {
    let loop_hits = Arc::new(AtomicUsize::new(0));
    let app = router(loop_hits.clone());
    let acceptor = TlsAcceptor::from(Arc::new(tls_config(hostname)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let app = app.clone();
            tokio::spawn(async move {
                let Ok(stream) = acceptor.accept(stream).await else {
                    return;
                };
                let svc = service_fn(move |req: Request<Incoming>| {
                    let mut app = app.clone();
                    async move { app.call(req).await }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    TestApp { addr, loop_hits }
}

fn tls_config(hostname: &str) -> ServerConfig {
    let mut params = CertificateParams::new(vec![hostname.to_string()]).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, hostname);
    params.distinguished_name = dn;

    let key_pair = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap()
}

fn router(loop_hits: Arc<AtomicUsize>) -> Router {
    let state = AppState { loop_hits };

    Router::new()
        .route("/status", get(|| async { "service: 200 OK" }))
        .route("/ping", get(|| async { "pong" }))
        .route(
            "/unavailable",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "too late"
            }),
        )
        .route("/large", get(|| async { "a".repeat(LARGE_BODY_BYTES) + "tail" }))
        .route("/redirect", get(|| async { found("/status") }))
        .route("/redirect/:code", get(redirect_with_code))
        .route("/loop", get(redirect_loop))
        .route("/offsite", get(|| async { found("http://attacker.example/collect") }))
        .route("/subdomain", get(|| async { found("http://api.localhost/whoami") }))
        .route("/bare-redirect", get(|| async { StatusCode::FOUND }))
        .route("/whoami", get(whoami))
        .route("/headers", get(echo_headers))
        .with_state(state)
}

/// An address nothing listens on
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn found(location: &'static str) -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, location)], "moved")
}

async fn redirect_with_code(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::FOUND);
    (status, [(header::LOCATION, "/status")])
}

async fn redirect_loop(State(state): State<AppState>) -> impl IntoResponse {
    state.loop_hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FOUND, [(header::LOCATION, "/loop")])
}

async fn whoami(headers: HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    format!("host={host}")
}

async fn echo_headers(headers: HeaderMap) -> String {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    format!(
        "host={} ua={} request-id={} proto={}",
        get("host"),
        get("user-agent"),
        get("x-request-id"),
        get("x-forwarded-proto"),
    )
}
