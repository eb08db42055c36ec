//! REST Client with Zero-Copy Networking
//!
//! Uses hyper with tokio for async HTTP/1.1.
//! Features:
//! - Automatic HTTPS with rustls (memory-safe TLS)
//! - Per-request connect and total timeouts
//! - Capped response bodies
//! - JSON error-detail extraction for non-2xx statuses

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use rustls::ClientConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// How much of an error payload is kept as detail text.
const DETAIL_LIMIT: usize = 300;

/// REST client errors
#[derive(Debug, Error)]
pub enum RestError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Body read error: {0}")]
    Body(String),

    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Invalid JSON payload: {0}")]
    Json(String),
}

impl RestError {
    /// Remote status code, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// REST client configuration
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Total request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: "casa/0.1".to_string(),
            max_body_size: 4 * 1024 * 1024, // 4 MB
        }
    }
}

/// REST response wrapper
#[derive(Debug)]
pub struct RestResponse {
    /// Status code
    pub status: StatusCode,
    /// Response body
    pub body: Bytes,
    /// Total exchange time
    pub elapsed: Duration,
}

impl RestResponse {
    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, RestError> {
        serde_json::from_slice(&self.body).map_err(|e| RestError::Json(e.to_string()))
    }

    /// Body as text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Append query parameters to a base URL.
pub fn build_url(base: &str, params: &[(&str, String)]) -> Result<String, RestError> {
    let mut url = url::Url::parse(base).map_err(|e| RestError::InvalidUrl(e.to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Ok(url.into())
}

/// JSON REST client used by every remote integration
pub struct RestClient {
    /// Configuration
    config: RestConfig,
    /// TLS connector shared across requests
    tls: TlsConnector,
    /// Statistics
    stats: ClientStats,
}

/// Client statistics
#[derive(Debug, Default)]
struct ClientStats {
    requests_made: AtomicU64,
    requests_failed: AtomicU64,
    bytes_downloaded: AtomicU64,
}

impl RestClient {
    /// Create a new REST client
    pub fn new(config: RestConfig) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        debug!(
            "REST client initialized (timeout: {:?}, connect: {:?})",
            config.timeout, config.connect_timeout
        );

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
            stats: ClientStats::default(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RestConfig::default())
    }

    /// Perform a GET request
    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Result<RestResponse, RestError> {
        self.request(Method::GET, url, headers, None).await
    }

    /// Perform a request with an optional JSON body
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<&serde_json::Value>,
    ) -> Result<RestResponse, RestError> {
        let start = Instant::now();
        self.stats.requests_made.fetch_add(1, Ordering::Relaxed);

        let result = tokio::time::timeout(self.config.timeout, self.exchange(method.clone(), url, headers, body))
            .await
            .map_err(|_| RestError::Timeout(self.config.timeout))
            .and_then(|inner| inner);

        match result {
            Ok((status, bytes)) => {
                let elapsed = start.elapsed();
                self.stats
                    .bytes_downloaded
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                debug!(
                    "REST {} {} -> {} ({} bytes, {:?})",
                    method,
                    url,
                    status,
                    bytes.len(),
                    elapsed
                );

                if status.as_u16() >= 400 {
                    self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                    return Err(RestError::Status {
                        status: status.as_u16(),
                        detail: error_detail(&bytes),
                    });
                }

                Ok(RestResponse {
                    status,
                    body: bytes,
                    elapsed,
                })
            }
            Err(err) => {
                self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    /// Connect, send, and collect one request/response exchange.
    async fn exchange(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<&serde_json::Value>,
    ) -> Result<(StatusCode, Bytes), RestError> {
        // 1. Parse URL
        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| RestError::InvalidUrl(e.to_string()))?;

        let host = uri
            .host()
            .ok_or_else(|| RestError::InvalidUrl("No host in URL".to_string()))?
            .to_string();
        let is_https = uri.scheme_str() == Some("https");
        let port = uri
            .port_u16()
            .unwrap_or(if is_https { 443 } else { 80 });

        // 2. Build request
        let payload = match body {
            Some(value) => {
                Bytes::from(serde_json::to_vec(value).map_err(|e| RestError::Json(e.to_string()))?)
            }
            None => Bytes::new(),
        };

        let mut request = Request::builder()
            .method(method)
            .uri(&uri)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "application/json")
            .header("Host", &host)
            .body(Full::new(payload))
            .map_err(|e| RestError::Http(e.to_string()))?;
        if body.is_some() {
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        for (name, value) in headers.iter() {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        // 3. Connect with its own timeout
        let addr = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            tokio::net::TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| RestError::Timeout(self.config.connect_timeout))?
        .map_err(|e| RestError::ConnectionFailed(e.to_string()))?;

        // 4. Handshake and send; TLS and plain streams are distinct types
        let response = if is_https {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|_| RestError::Tls("Invalid server name".to_string()))?;
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| RestError::Tls(e.to_string()))?;

            let io = hyper_util::rt::TokioIo::new(tls_stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| RestError::Http(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("Connection error: {}", e);
                }
            });

            sender
                .send_request(request)
                .await
                .map_err(|e| RestError::Http(e.to_string()))?
        } else {
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| RestError::Http(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("Connection error: {}", e);
                }
            });

            sender
                .send_request(request)
                .await
                .map_err(|e| RestError::Http(e.to_string()))?
        };

        // 5. Collect body with size limit
        let status = response.status();
        let limited = Limited::new(response.into_body(), self.config.max_body_size);
        let collected = limited
            .collect()
            .await
            .map_err(|e| RestError::Body(e.to_string()))?;

        Ok((status, collected.to_bytes()))
    }

    /// (requests made, requests failed, bytes downloaded)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.requests_made.load(Ordering::Relaxed),
            self.stats.requests_failed.load(Ordering::Relaxed),
            self.stats.bytes_downloaded.load(Ordering::Relaxed),
        )
    }
}

/// Pull a useful detail string out of an error payload.
///
/// JSON bodies with an "errors" field keep just that field; anything else
/// is truncated raw text.
fn error_detail(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(errors) = value.get("errors") {
            return errors.to_string();
        }
    }
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(empty body)".to_string();
    }
    trimmed.chars().take(DETAIL_LIMIT).collect()
}
