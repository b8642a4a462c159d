#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::error::Result;
use crate::metrics::MetricsCollector;

/// Client-server API namespace every operation lives under.
const API_PREFIX: &str = "/_matrix/client/r0";

/// Thin adapter over a pooled HTTP client for the Matrix client-server
/// API: prefixes the namespace, attaches the access token as a query
/// credential, and records latency under a stable operation label.
///
/// No retries and no timeout handling here; a non-200 status surfaces
/// unchanged to the caller.
#[derive(Clone)]
pub struct MatrixClient {
    http: reqwest::Client,
    base_url: String,
    metrics: Arc<MetricsCollector>,
}

impl MatrixClient {
    pub fn new(base_url: impl Into<String>, metrics: Arc<MetricsCollector>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Full wire path for an endpoint, token appended when present.
    fn url(&self, endpoint: &str, token: Option<&str>) -> String {
        match token {
            Some(token) => format!(
                "{}{}/{}?access_token={}",
                self.base_url, API_PREFIX, endpoint, token
            ),
            None => format!("{}{}/{}", self.base_url, API_PREFIX, endpoint),
        }
    }

    /// Issue a request. `label` groups the call for metrics and must be
    /// a fixed alias for room-scoped endpoints so the label stays stable
    /// across rooms; `None` labels the call with the endpoint itself.
    pub async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        token: Option<&str>,
        label: Option<&str>,
    ) -> Result<(Value, StatusCode)> {
        let label = label.unwrap_or(endpoint);
        let url = self.url(endpoint, token);

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        self.metrics.record_request(
            label,
            started.elapsed().as_millis() as u64,
            status.is_success(),
        );

        // Some success responses carry empty or non-JSON bodies.
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((body, status))
    }

    pub async fn get(
        &self,
        endpoint: &str,
        token: Option<&str>,
        label: Option<&str>,
    ) -> Result<(Value, StatusCode)> {
        self.send(Method::GET, endpoint, None, token, label).await
    }

    pub async fn post(
        &self,
        endpoint: &str,
        body: &Value,
        token: Option<&str>,
        label: Option<&str>,
    ) -> Result<(Value, StatusCode)> {
        self.send(Method::POST, endpoint, Some(body), token, label)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MatrixClient {
        let metrics = Arc::new(MetricsCollector::new("test".to_string()));
        MatrixClient::new("http://localhost:8008/", metrics)
    }

    #[test]
    fn test_url_without_token() {
        let c = client();
        assert_eq!(
            c.url("login", None),
            "http://localhost:8008/_matrix/client/r0/login"
        );
    }

    #[test]
    fn test_url_appends_token_as_query_credential() {
        let c = client();
        assert_eq!(
            c.url("sync", Some("tok1")),
            "http://localhost:8008/_matrix/client/r0/sync?access_token=tok1"
        );
    }

    #[test]
    fn test_trailing_slash_stripped_from_base() {
        let metrics = Arc::new(MetricsCollector::new("test".to_string()));
        let c = MatrixClient::new("http://host:8008///", metrics);
        assert_eq!(
            c.url("sync", None),
            "http://host:8008/_matrix/client/r0/sync"
        );
    }
}
