//! Similarity digest webhook.

use super::delivery::{AttemptError, DeliveryResult, RetryConfig, deliver_with_retry};
use super::payload::{PayloadFormat, SimilarityDigest, compute_hmac_signature};
use crate::http::{HttpClientConfig, LazyClient};
use secrecy::{ExposeSecret, SecretString};

/// Posts similarity digests to a chat webhook.
#[derive(Debug)]
pub struct SimilarityNotifier {
    url: String,
    format: PayloadFormat,
    secret: Option<SecretString>,
    retry: RetryConfig,
    client: LazyClient,
}

impl SimilarityNotifier {
    /// Creates a notifier posting default-format JSON to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let retry = RetryConfig::default();
        Self {
            url: url.into(),
            format: PayloadFormat::Default,
            secret: None,
            retry,
            client: LazyClient::new(client_config(&retry)),
        }
    }

    /// Sets the payload format.
    #[must_use]
    pub const fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Signs every payload with `secret`.
    #[must_use]
    pub fn with_secret(mut self, secret: SecretString) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self.client = LazyClient::new(client_config(&retry));
        self
    }

    /// Webhook URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Headers sent with `digest`.
    ///
    /// The signature covers the default-format JSON regardless of the
    /// delivery format.
    #[must_use]
    pub fn headers(&self, digest: &SimilarityDigest) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", "application/json".to_string()),
            ("X-Ripple-Event", digest.event_type.clone()),
            ("X-Ripple-Delivery-Id", digest.event_id.clone()),
        ];
        if let Some(secret) = &self.secret {
            headers.push((
                "X-Ripple-Signature",
                compute_hmac_signature(secret.expose_secret(), &digest.to_json()),
            ));
        }
        headers
    }

    /// Delivers a digest, retrying as configured. Blocking.
    #[must_use]
    pub fn notify(&self, digest: &SimilarityDigest) -> DeliveryResult {
        let body = digest.to_format_json(self.format);
        let headers = self.headers(digest);

        let result = deliver_with_retry(&self.retry, &self.url, || {
            let mut request = self.client.get().post(&self.url);
            for (name, value) in &headers {
                request = request.header(*name, value);
            }
            let response = request
                .body(body.clone())
                .send()
                .map_err(|e| AttemptError::transport(&e))?;
            let status = response.status().as_u16();
            if response.status().is_success() {
                Ok(status)
            } else {
                Err(AttemptError::status(status))
            }
        });

        metrics::counter!("ripple_digest_deliveries_total", "status" => result.status_label())
            .increment(1);
        if result.success {
            tracing::info!(
                repo = %digest.repository,
                similar = digest.similar.len(),
                "Similarity digest delivered"
            );
        } else {
            tracing::warn!(
                repo = %digest.repository,
                attempts = result.attempts,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Similarity digest delivery failed"
            );
        }
        result
    }
}

const fn client_config(retry: &RetryConfig) -> HttpClientConfig {
    HttpClientConfig {
        timeout_ms: retry.timeout_secs.saturating_mul(1000),
        connect_timeout_ms: 3_000,
    }
}
