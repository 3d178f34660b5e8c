//! HTTP transport seam.
//!
//! The runner only needs "send this spec, tell me the status or why it
//! failed". Timing is measured by the caller on the tokio clock, so
//! implementations stay free of bookkeeping.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::HarnessResult;
use crate::request::{RequestBody, RequestSpec};

/// A response that made it back over the wire, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Transport-level failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Dns,
    Tls,
    /// The response started but the body could not be read.
    Read,
    Other,
}

impl TransportErrorKind {
    pub fn is_timeout(self) -> bool {
        self == Self::Timeout
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Connect => write!(f, "CONNECT_ERROR"),
            Self::Dns => write!(f, "DNS_ERROR"),
            Self::Tls => write!(f, "TLS_ERROR"),
            Self::Read => write!(f, "READ_ERROR"),
            Self::Other => write!(f, "TRANSPORT_ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

/// Issues a single HTTP attempt.
///
/// Trait exists so tests can script responses without a live service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, spec: &RequestSpec) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> HarnessResult<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, spec: &RequestSpec) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(spec.method.as_str().as_bytes())
            .map_err(|e| TransportError::new(TransportErrorKind::Other, e.to_string()))?;

        let mut request = self
            .client
            .request(method, &spec.url)
            .timeout(spec.timeout);

        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if spec.method.sends_body() {
            request = match &spec.body {
                Some(RequestBody::Json(value)) => request.json(value),
                Some(RequestBody::Text(text)) => request.body(text.clone()),
                None => request,
            };
        }

        let response = request.send().await.map_err(|e| classify_reqwest_error(&e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            let mut err = classify_reqwest_error(&e);
            if err.kind != TransportErrorKind::Timeout {
                err.kind = TransportErrorKind::Read;
            }
            err
        })?;

        Ok(HttpResponse { status, body })
    }
}

/// Map a reqwest error onto a transport category.
///
/// DNS and TLS failures surface as connect errors in reqwest, so they are
/// told apart by the messages of the underlying causes.
pub fn classify_reqwest_error(err: &reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else {
        let causes = source_chain(err).to_ascii_lowercase();
        if causes.contains("dns error") || causes.contains("failed to lookup address") {
            TransportErrorKind::Dns
        } else if causes.contains("tls")
            || causes.contains("ssl")
            || causes.contains("certificate")
        {
            TransportErrorKind::Tls
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Read
        } else {
            TransportErrorKind::Other
        }
    };
    TransportError::new(kind, err.to_string())
}

fn source_chain(err: &reqwest::Error) -> String {
    let mut parts = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
