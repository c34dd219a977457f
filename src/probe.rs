use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::cases::encode_query;

const BODY_PREVIEW_CHARS: usize = 200;

/// Transport-level failure. An HTTP error status is an observation, never a `ProbeError`.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid request url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to '{url}' timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("request to '{url}' failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Response payload as observed, without judging it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ProbeBody {
    Empty,
    Json(Value),
    /// Body that is not JSON; keeps a short prefix for the report.
    Unparsed(String),
}

impl ProbeBody {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Self::Empty;
        }
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Unparsed(
                String::from_utf8_lossy(bytes)
                    .chars()
                    .take(BODY_PREVIEW_CHARS)
                    .collect(),
            ),
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: StatusCode,
    pub body: ProbeBody,
    pub latency: Duration,
}

/// Seam between the runner and the service under test.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<ProbeResponse, ProbeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// `GET` prober bound to one base URL. Every request carries the configured timeout.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    base_url: String,
    timeout: Duration,
    auth: Option<BasicAuth>,
}

impl HttpProbe {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ProbeError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
            auth: None,
        })
    }

    pub fn with_basic_auth(mut self, auth: Option<BasicAuth>) -> Self {
        self.auth = auth;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute request URL. An empty or relative base URL fails here, not at config load.
    pub fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<Url, ProbeError> {
        let raw = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut url = Url::parse(&raw).map_err(|source| ProbeError::InvalidUrl {
            url: raw.clone(),
            source,
        })?;
        if !query.is_empty() {
            url.set_query(Some(&encode_query(query)));
        }
        Ok(url)
    }

    fn classify(&self, url: &Url, err: reqwest::Error) -> ProbeError {
        if err.is_timeout() {
            ProbeError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            ProbeError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    #[instrument(level = "debug", skip(self, query), fields(query = %encode_query(query)))]
    async fn probe(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<ProbeResponse, ProbeError> {
        let url = self.url_for(path, query)?;
        let mut request = self.client.get(url.clone()).timeout(self.timeout);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|err| self.classify(&url, err))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.classify(&url, err))?;
        let latency = started.elapsed();

        debug!(
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            "probe completed"
        );

        Ok(ProbeResponse {
            status,
            body: ProbeBody::from_bytes(&bytes),
            latency,
        })
    }
}
