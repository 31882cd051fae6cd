//! Single-request HTTP(S) probe with per-phase timing.
//!
//! The probe walks DNS, TCP, TLS and HTTP/1.1 by hand so each milestone can be
//! stamped. Classification is transport level only: any response that arrives
//! in full is `online`, whatever its status code.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http_body_util::{BodyExt, Empty};
use hyper::header::{CONNECTION, HOST, USER_AGENT};
use hyper::{Method, Request, Uri};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::outcome::{Milestones, ProbeErrorKind, ProbeFailure, ProbeOutcome};
use super::tls::describe_certificate;
use crate::db::entities::monitored_target;

pub const DEFAULT_USER_AGENT: &str = concat!("uptime-sentinel/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait TargetProber: Send + Sync {
    /// Never fails: transport problems come back as an offline outcome.
    async fn probe(&self, target: &monitored_target::Model) -> ProbeOutcome;
}

/// A probe destination after scheme defaulting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeUrl {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub authority: String,
    pub path_and_query: String,
}

/// Prefixes `https://` when the input carries no scheme, then validates.
pub fn normalize_target_url(raw: &str) -> Result<ProbeUrl, ProbeFailure> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProbeFailure::new(ProbeErrorKind::InvalidUrl, "empty url"));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let uri = candidate
        .parse::<Uri>()
        .map_err(|e| invalid(format!("{candidate}: {e}")))?;

    let secure = match uri.scheme_str() {
        Some("https") => true,
        Some("http") => false,
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    };
    let authority = uri
        .authority()
        .ok_or_else(|| invalid(format!("{candidate}: missing host")))?;
    let host = authority
        .host()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    if host.is_empty() {
        return Err(invalid(format!("{candidate}: missing host")));
    }
    let port = authority.port_u16().unwrap_or(if secure { 443 } else { 80 });
    let path_and_query = uri
        .path_and_query()
        .map(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .unwrap_or("/")
        .to_string();

    Ok(ProbeUrl {
        secure,
        host,
        port,
        authority: authority.as_str().to_string(),
        path_and_query,
    })
}

fn invalid(message: String) -> ProbeFailure {
    ProbeFailure::new(ProbeErrorKind::InvalidUrl, message)
}

/// Builds a client config trusting the platform's root store.
pub fn native_tls_config() -> Result<Arc<ClientConfig>, rustls::Error> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!(error = %e, "Failed to load a native root certificate.");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(added, ignored, "Loaded native root certificates.");

    let mut config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

struct Exchange {
    status_code: u16,
    snippet: Vec<u8>,
    peer_certificate: Option<Vec<u8>>,
}

/// Aborts the HTTP connection driver when the probe future is dropped, so a
/// timed out probe leaves nothing running behind it.
struct ConnectionGuard(JoinHandle<()>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct HttpProber {
    timeout: Duration,
    snippet_limit: usize,
    user_agent: String,
    tls: TlsConnector,
}

impl HttpProber {
    pub fn new(
        timeout: Duration,
        snippet_limit: usize,
        user_agent: impl Into<String>,
    ) -> Result<Self, rustls::Error> {
        Ok(Self::with_tls_config(
            timeout,
            snippet_limit,
            user_agent,
            native_tls_config()?,
        ))
    }

    pub fn with_tls_config(
        timeout: Duration,
        snippet_limit: usize,
        user_agent: impl Into<String>,
        tls_config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            timeout,
            snippet_limit,
            user_agent: user_agent.into(),
            tls: TlsConnector::from(tls_config),
        }
    }

    pub async fn probe_url(&self, raw_url: &str) -> ProbeOutcome {
        let checked_at = Utc::now();
        let mut milestones = Milestones::start_now();

        let url = match normalize_target_url(raw_url) {
            Ok(url) => url,
            Err(failure) => {
                return ProbeOutcome::offline(checked_at, milestones.timings(Instant::now()), failure)
            }
        };

        let result = tokio::time::timeout(self.timeout, self.exchange(&url, &mut milestones)).await;
        let timings = milestones.timings(Instant::now());

        match result {
            Ok(Ok(exchange)) => {
                let mut outcome = ProbeOutcome::online(checked_at, exchange.status_code, timings);
                outcome.tls = exchange
                    .peer_certificate
                    .as_deref()
                    .and_then(|der| describe_certificate(der, Utc::now()));
                if !exchange.snippet.is_empty() {
                    outcome.body_snippet =
                        Some(String::from_utf8_lossy(&exchange.snippet).into_owned());
                }
                outcome
            }
            Ok(Err(failure)) => ProbeOutcome::offline(checked_at, timings, failure),
            Err(_) => ProbeOutcome::offline(
                checked_at,
                timings,
                ProbeFailure::new(
                    ProbeErrorKind::Timeout,
                    format!("no complete response within {}ms", self.timeout.as_millis()),
                ),
            ),
        }
    }

    async fn exchange(&self, url: &ProbeUrl, m: &mut Milestones) -> Result<Exchange, ProbeFailure> {
        let addrs: Vec<SocketAddr> = lookup_host((url.host.as_str(), url.port))
            .await
            .map_err(|e| ProbeFailure::new(ProbeErrorKind::DnsResolution, format!("{}: {e}", url.host)))?
            .collect();
        if addrs.is_empty() {
            return Err(ProbeFailure::new(
                ProbeErrorKind::DnsResolution,
                format!("{}: no addresses", url.host),
            ));
        }
        m.dns = Some(Instant::now());

        let stream = connect_any(&addrs).await?;
        m.tcp = Some(Instant::now());

        if !url.secure {
            return self.send_request(url, stream, m).await;
        }

        let server_name = ServerName::try_from(url.host.clone())
            .map_err(|e| ProbeFailure::new(ProbeErrorKind::InvalidUrl, e.to_string()))?;
        let tls_stream = self
            .tls
            .connect(server_name, stream)
            .await
            .map_err(|e| ProbeFailure::new(ProbeErrorKind::TlsHandshake, e.to_string()))?;
        m.tls = Some(Instant::now());

        let peer_certificate = tls_stream
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|leaf| leaf.as_ref().to_vec());

        let mut exchange = self.send_request(url, tls_stream, m).await?;
        exchange.peer_certificate = peer_certificate;
        Ok(exchange)
    }

    async fn send_request<S>(
        &self,
        url: &ProbeUrl,
        io: S,
        m: &mut Milestones,
    ) -> Result<Exchange, ProbeFailure>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(io))
            .await
            .map_err(protocol_error)?;
        let _guard = ConnectionGuard(tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "Probe connection closed with error.");
            }
        }));

        let request = Request::builder()
            .method(Method::GET)
            .uri(url.path_and_query.as_str())
            .header(HOST, url.authority.as_str())
            .header(USER_AGENT, self.user_agent.as_str())
            .header(CONNECTION, "close")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeFailure::new(ProbeErrorKind::InvalidUrl, e.to_string()))?;

        let response = sender.send_request(request).await.map_err(protocol_error)?;
        m.first_byte = Some(Instant::now());
        let status_code = response.status().as_u16();

        let mut body = response.into_body();
        let mut snippet = Vec::with_capacity(self.snippet_limit.min(4096));
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(protocol_error)?;
            if let Ok(data) = frame.into_data() {
                let room = self.snippet_limit.saturating_sub(snippet.len());
                snippet.extend_from_slice(&data[..room.min(data.len())]);
            }
        }
        m.end = Some(Instant::now());

        Ok(Exchange {
            status_code,
            snippet,
            peer_certificate: None,
        })
    }
}

#[async_trait]
impl TargetProber for HttpProber {
    async fn probe(&self, target: &monitored_target::Model) -> ProbeOutcome {
        self.probe_url(&target.url).await
    }
}

async fn connect_any(addrs: &[SocketAddr]) -> Result<TcpStream, ProbeFailure> {
    let mut last_error: Option<io::Error> = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            ProbeFailure::new(ProbeErrorKind::ConnectionRefused, e.to_string())
        }
        Some(e) => ProbeFailure::new(ProbeErrorKind::Connection, e.to_string()),
        None => ProbeFailure::new(ProbeErrorKind::Connection, "no address to connect to"),
    })
}

fn protocol_error(e: hyper::Error) -> ProbeFailure {
    ProbeFailure::new(ProbeErrorKind::Protocol, e.to_string())
}
