use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::QueryEngineSettings;
use crate::error::QauthError;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Value>,
    #[serde(default)]
    pub row_count: Option<u64>,
}

impl QueryResult {
    /// Reported row count, or the number of rows returned when the engine
    /// did not report one.
    pub fn row_count(&self) -> u64 {
        self.row_count.unwrap_or(self.rows.len() as u64)
    }
}

/// The SQL engine. It validates the bearer token; callers only learn about
/// that through [`QauthError::QueryUnauthorized`] and [`QauthError::QueryForbidden`].
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(&self, query: &str, bearer: &str) -> Result<QueryResult, QauthError>;
}

pub struct HttpQueryEngine {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpQueryEngine {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn from_settings(settings: &QueryEngineSettings) -> Self {
        Self::new(&settings.url)
            .with_timeout(Duration::from_millis(settings.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl QueryEngine for HttpQueryEngine {
    async fn execute(&self, query: &str, bearer: &str) -> Result<QueryResult, QauthError> {
        tracing::debug!(url = %self.url, "executing query");
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(bearer)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|e| QauthError::QueryFailed {
                status: None,
                body: format!("request failed: {e}"),
            })?;

        let status = resp.status();
        match status.as_u16() {
            401 => return Err(QauthError::QueryUnauthorized),
            403 => return Err(QauthError::QueryForbidden),
            _ => {}
        }

        let body = resp.text().await.map_err(|e| QauthError::QueryFailed {
            status: Some(status.as_u16()),
            body: format!("failed to read body: {e}"),
        })?;
        if !status.is_success() {
            return Err(QauthError::QueryFailed {
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| QauthError::QueryFailed {
            status: Some(status.as_u16()),
            body: format!("unparseable query response: {e}"),
        })
    }
}
