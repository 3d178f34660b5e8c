//! Request specifications.
//!
//! A [`RequestSpec`] is an opaque, immutable description of one call. The
//! harness never interprets the query or body; it hands the spec to an
//! [`HttpTransport`](crate::transport::HttpTransport) and classifies what
//! comes back.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Default per-attempt timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether a request body is sent with this method.
    pub fn sends_body(&self) -> bool {
        !matches!(self, Self::Get | Self::Head | Self::Options)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
}

/// One call to issue, repeated for every iteration of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Label used in records and summaries (e.g. "auth/signup").
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<RequestBody>,
    /// Upper bound for a single attempt, including reading the body.
    pub timeout: Duration,
}

impl RequestSpec {
    pub fn new(name: impl Into<String>, method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn get(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Get, url)
    }

    pub fn post(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Post, url)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject specs that could never produce a meaningful attempt.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.timeout.is_zero() {
            return Err(HarnessError::config(format!(
                "request '{}' has a zero timeout",
                self.name
            )));
        }
        let url = reqwest::Url::parse(&self.url).map_err(|e| {
            HarnessError::config(format!("request '{}' has invalid URL: {e}", self.name))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HarnessError::config(format!(
                "request '{}' uses unsupported scheme '{}'",
                self.name,
                url.scheme()
            )));
        }
        Ok(())
    }
}
