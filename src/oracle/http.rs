//! HTTP JSON oracle adapter.

use super::{ImpactOracle, OracleRequest, OracleResponse};
use crate::http::{HttpClientConfig, LazyClient};
use crate::{Error, Result};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

/// Oracle reached over HTTP.
///
/// POSTs the [`OracleRequest`] as JSON to the endpoint and parses the body
/// with [`OracleResponse::parse`].
pub struct HttpOracle {
    endpoint: String,
    api_key: Option<SecretString>,
    client: LazyClient,
}

impl HttpOracle {
    /// Creates an adapter for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            client: LazyClient::new(HttpClientConfig::default()),
        }
    }

    /// Sets the bearer key.
    #[must_use]
    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Sets HTTP client timeouts.
    #[must_use]
    pub fn with_http_config(mut self, config: HttpClientConfig) -> Self {
        self.client = LazyClient::new(config);
        self
    }

    /// Returns the endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Statuses worth retrying.
fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status.as_u16() == StatusCode::TOO_MANY_REQUESTS.as_u16()
        || status.as_u16() == StatusCode::REQUEST_TIMEOUT.as_u16()
}

impl ImpactOracle for HttpOracle {
    fn name(&self) -> &'static str {
        "http"
    }

    fn assess(&self, request: &OracleRequest) -> Result<OracleResponse> {
        tracing::debug!(
            oracle = "http",
            endpoint = %self.endpoint,
            target = %request.target_repo,
            "Calling impact oracle"
        );

        let mut builder = self
            .client
            .get()
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else if e.is_request() {
                "request"
            } else {
                "unknown"
            };
            tracing::warn!(
                oracle = "http",
                error = %e,
                error_kind = error_kind,
                "Oracle request failed"
            );
            Error::TransientOracle(format!("{error_kind} error: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(oracle = "http", status = %status, "Oracle returned error status");
            let cause = format!("oracle returned status {status}: {body}");
            return Err(if is_retryable_status(status) {
                Error::TransientOracle(cause)
            } else {
                Error::OracleUnavailable(cause)
            });
        }

        let body = response
            .text()
            .map_err(|e| Error::TransientOracle(format!("failed to read oracle response: {e}")))?;
        OracleResponse::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_configuration() {
        let oracle = HttpOracle::new("http://localhost:9000/assess")
            .with_api_key(SecretString::from("k".to_string()))
            .with_http_config(HttpClientConfig {
                timeout_ms: 10,
                connect_timeout_ms: 10,
            });
        assert_eq!(oracle.endpoint(), "http://localhost:9000/assess");
        assert_eq!(oracle.name(), "http");
        assert!(oracle.api_key.is_some());
    }

    #[test_case(StatusCode::INTERNAL_SERVER_ERROR, true)]
    #[test_case(StatusCode::BAD_GATEWAY, true)]
    #[test_case(StatusCode::TOO_MANY_REQUESTS, true)]
    #[test_case(StatusCode::UNAUTHORIZED, false)]
    #[test_case(StatusCode::NOT_FOUND, false)]
    fn test_retryable_status(status: StatusCode, expected: bool) {
        assert_eq!(is_retryable_status(status), expected);
    }

    #[test]
    fn test_unreachable_endpoint_is_transient() {
        let oracle = HttpOracle::new("http://127.0.0.1:9/assess").with_http_config(
            HttpClientConfig {
                timeout_ms: 500,
                connect_timeout_ms: 500,
            },
        );
        let request = OracleRequest {
            provider_repo: "p".to_string(),
            target_repo: "t".to_string(),
            relationship_kind: "consumer".to_string(),
            matched_tags: Vec::new(),
            change_summary: String::new(),
            target_repo_context: String::new(),
        };
        let err = oracle.assess(&request).expect_err("nothing listens on port 9");
        assert!(err.is_transient());
    }
}
