use crate::query::Query;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

pub type Row = Map<String, Value>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error("{0}")]
    Transport(String),
    #[error("request timed out after {0:.2}s")]
    Timeout(f64),
    #[error("{0}")]
    Server(String),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

/// Status and body of a `/load` call, before the body is interpreted.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadResponse {
    /// `None` when the API answered without a `data` field.
    pub rows: Option<Vec<Row>>,
}

impl LoadResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self, LoadError> {
        let mut body: Value = match serde_json::from_str(&raw.body) {
            Ok(value) => value,
            Err(e) if raw.status.is_success() => {
                return Err(LoadError::UnexpectedShape(format!("body is not JSON: {e}")));
            }
            Err(_) => return Err(LoadError::Transport(http_failure(raw.status))),
        };

        if let Some(error) = body.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                Value::Null => "Unknown error".to_string(),
                other => other.to_string(),
            };
            return Err(LoadError::Server(message));
        }
        if !raw.status.is_success() {
            return Err(LoadError::Transport(http_failure(raw.status)));
        }

        let Some(obj) = body.as_object_mut() else {
            return Err(LoadError::UnexpectedShape("body is not a JSON object".into()));
        };
        let Some(data) = obj.remove("data") else {
            return Ok(LoadResponse { rows: None });
        };
        let Value::Array(items) = data else {
            return Err(LoadError::UnexpectedShape("`data` is not an array".into()));
        };

        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(row) => rows.push(row),
                _ => {
                    return Err(LoadError::UnexpectedShape(format!(
                        "`data[{index}]` is not an object"
                    )));
                }
            }
        }
        Ok(LoadResponse { rows: Some(rows) })
    }
}

fn http_failure(status: StatusCode) -> String {
    format!(
        "HTTP Error {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn load(&self, query: &Query) -> Result<RawResponse, LoadError>;
}

pub struct CubeClient {
    base_url: String,
    token: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl CubeClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, LoadError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::Transport(e.to_string()))?;
        Ok(Self::with_http(base_url, token, timeout, http))
    }

    /// Uses a caller-built reqwest client, e.g. one with proxy settings.
    pub fn with_http(
        base_url: &str,
        token: &str,
        timeout: Duration,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            token: token.to_string(),
            timeout,
            http,
        }
    }

    pub fn load_url(&self) -> String {
        format!("{}/load", self.base_url)
    }
}

/// Accepts both `.../cubejs-api/v1` and `.../cubejs-api/v1/load`.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/load")
        .unwrap_or(trimmed)
        .to_string()
}

impl Transport for CubeClient {
    async fn load(&self, query: &Query) -> Result<RawResponse, LoadError> {
        let param = query
            .to_param()
            .map_err(|e| LoadError::Transport(e.to_string()))?;
        tracing::debug!(url = %self.load_url(), query = %param, "sending load request");

        let response = self
            .http
            .get(self.load_url())
            .query(&[("query", param.as_str())])
            .header("Authorization", &self.token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "load response received");
        Ok(RawResponse { status, body })
    }
}

impl CubeClient {
    fn classify(&self, e: reqwest::Error) -> LoadError {
        if e.is_timeout() {
            LoadError::Timeout(self.timeout.as_secs_f64())
        } else {
            LoadError::Transport(e.to_string())
        }
    }
}
