//! Configuration sections for the outbound adapters.

use crate::http::HttpClientConfig;
use crate::notify::{
    GitHubIssueSink, IssueSink, LogIssueSink, PayloadFormat, RetryConfig, SimilarityNotifier,
};
use crate::oracle::{DisabledOracle, HttpOracle, ImpactOracle};
use crate::services::AssessmentPolicy;
use crate::{Error, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default GitHub REST endpoint.
pub const DEFAULT_ISSUES_API_BASE: &str = "https://api.github.com";

/// Impact oracle configuration.
#[derive(Debug, Clone, Serialize)]
pub struct OracleConfig {
    /// HTTP endpoint; without one every assessment degrades.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Bearer key sent to the endpoint.
    #[serde(
        serialize_with = "redact_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<SecretString>,
    /// Per-call timeout in milliseconds (default: 30000).
    pub timeout_ms: u64,
    /// Retries after a transient failure (default: 2).
    pub max_retries: u32,
    /// Backoff base in milliseconds (default: 500).
    pub base_backoff_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_ms: 30_000,
            max_retries: 2,
            base_backoff_ms: 500,
        }
    }
}

impl OracleConfig {
    /// Retry and timeout policy for the assessor.
    #[must_use]
    pub const fn policy(&self) -> AssessmentPolicy {
        AssessmentPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            base_backoff_ms: self.base_backoff_ms,
        }
    }

    /// Builds the configured oracle.
    #[must_use]
    pub fn build(&self) -> Arc<dyn ImpactOracle> {
        let Some(endpoint) = &self.endpoint else {
            return Arc::new(DisabledOracle);
        };
        let mut oracle = HttpOracle::new(endpoint.clone()).with_http_config(HttpClientConfig {
            timeout_ms: self.timeout_ms,
            connect_timeout_ms: 3_000,
        });
        if let Some(key) = &self.api_key {
            oracle = oracle.with_api_key(key.clone());
        }
        Arc::new(oracle)
    }

    pub(super) fn merge(&mut self, file: ConfigFileOracle, env: &impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = file.endpoint {
            self.endpoint = super::expand_optional(&endpoint, env, "oracle.endpoint");
        }
        if let Some(key) = file.api_key {
            self.api_key = super::expand_secret(&key, env, "oracle.api_key");
        }
        if let Some(v) = file.timeout_ms {
            self.timeout_ms = v;
        }
        if let Some(v) = file.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = file.base_backoff_ms {
            self.base_backoff_ms = v;
        }
    }
}

/// Issue tracker configuration.
#[derive(Debug, Clone, Serialize)]
pub struct IssuesConfig {
    /// REST API base URL.
    pub api_base: String,
    /// API token; without one issues are only logged.
    #[serde(
        serialize_with = "redact_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<SecretString>,
    /// Labels added to every issue.
    pub extra_labels: Vec<String>,
    /// Delivery retry policy.
    pub retry: RetryConfig,
}

impl Default for IssuesConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_ISSUES_API_BASE.to_string(),
            token: None,
            extra_labels: Vec::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl IssuesConfig {
    /// Builds the configured issue sink.
    #[must_use]
    pub fn build(&self) -> Arc<dyn IssueSink> {
        match &self.token {
            Some(token) => Arc::new(
                GitHubIssueSink::new(self.api_base.clone(), token.clone()).with_retry(self.retry),
            ),
            None => Arc::new(LogIssueSink),
        }
    }

    pub(super) fn merge(&mut self, file: ConfigFileIssues, env: &impl Fn(&str) -> Option<String>) {
        if let Some(base) = file.api_base.and_then(|b| super::expand_optional(&b, env, "issues.api_base")) {
            self.api_base = base;
        }
        if let Some(token) = file.token {
            self.token = super::expand_secret(&token, env, "issues.token");
        }
        if let Some(labels) = file.extra_labels {
            self.extra_labels = labels;
        }
        if let Some(retry) = file.retry {
            self.retry = retry;
        }
    }
}

/// Similarity digest webhook configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WebhookConfig {
    /// Webhook URL; without one no digest is sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Payload format.
    pub format: PayloadFormat,
    /// HMAC signing secret.
    #[serde(
        serialize_with = "redact_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub secret: Option<SecretString>,
    /// Delivery retry policy.
    pub retry: RetryConfig,
}

impl WebhookConfig {
    /// Checks the URL scheme.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] unless the URL uses HTTPS (plain HTTP is
    /// accepted for localhost).
    pub fn validate(&self) -> Result<()> {
        let Some(url) = &self.url else {
            return Ok(());
        };
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("webhook.url is not a valid URL ({e}): {url}")))?;
        let local = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1"));
        match parsed.scheme() {
            "https" => Ok(()),
            "http" if local => Ok(()),
            _ => Err(Error::Config(format!(
                "webhook.url must use HTTPS (except localhost): {url}"
            ))),
        }
    }

    /// Builds the configured notifier, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid URL.
    pub fn build(&self) -> Result<Option<SimilarityNotifier>> {
        self.validate()?;
        Ok(self.url.as_ref().map(|url| {
            let notifier = SimilarityNotifier::new(url.clone())
                .with_format(self.format)
                .with_retry(self.retry);
            match &self.secret {
                Some(secret) => notifier.with_secret(secret.clone()),
                None => notifier,
            }
        }))
    }

    pub(super) fn merge(
        &mut self,
        file: ConfigFileWebhook,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(url) = file.url {
            self.url = super::expand_optional(&url, env, "webhook.url");
        }
        if let Some(format) = file.format {
            self.format = format.parse()?;
        }
        if let Some(secret) = file.secret {
            self.secret = super::expand_secret(&secret, env, "webhook.secret");
        }
        if let Some(retry) = file.retry {
            self.retry = retry;
        }
        Ok(())
    }
}

/// Classifier keyword overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Tag name → keyword list. Replaces the built-in list for that tag.
    #[serde(default)]
    pub keywords: BTreeMap<String, Vec<String>>,
}

/// `[logging]` section. Resolved by the observability module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// `EnvFilter` directive, e.g. `ripple=debug`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Log file; stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// `[metrics]` section. Resolved by the observability module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Listener port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// `[oracle]` in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileOracle {
    /// Endpoint URL.
    pub endpoint: Option<String>,
    /// API key, usually `${VAR}`.
    pub api_key: Option<String>,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Retry count.
    pub max_retries: Option<u32>,
    /// Backoff base in milliseconds.
    pub base_backoff_ms: Option<u64>,
}

/// `[issues]` in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileIssues {
    /// API base URL.
    pub api_base: Option<String>,
    /// Token, usually `${GITHUB_TOKEN}`.
    pub token: Option<String>,
    /// Extra labels.
    pub extra_labels: Option<Vec<String>>,
    /// Retry policy.
    pub retry: Option<RetryConfig>,
}

/// `[webhook]` in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileWebhook {
    /// Webhook URL.
    pub url: Option<String>,
    /// `default`, `slack` or `discord`.
    pub format: Option<String>,
    /// HMAC secret.
    pub secret: Option<String>,
    /// Retry policy.
    pub retry: Option<RetryConfig>,
}

/// Serde helper that never writes a secret.
#[allow(clippy::ref_option)]
fn redact_secret<S>(secret: &Option<SecretString>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match secret {
        Some(_) => serializer.serialize_str("***REDACTED***"),
        None => serializer.serialize_none(),
    }
}
