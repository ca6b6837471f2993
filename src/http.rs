//! Shared blocking HTTP client construction.
//!
//! Every outbound adapter (oracle, issue tracker, webhook) uses a blocking
//! `reqwest` client and is only ever called from `spawn_blocking` threads.
//! The client is built on first use so it is never constructed on an async
//! worker thread.

use std::sync::OnceLock;
use std::time::Duration;

/// Timeouts for an outbound HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpClientConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Builds a blocking HTTP client with the configured timeouts.
#[must_use]
pub fn build_http_client(config: HttpClientConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder()
        .user_agent(concat!("ripple/", env!("CARGO_PKG_VERSION")));
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// A blocking client built on first use.
#[derive(Debug, Default)]
pub struct LazyClient {
    config: HttpClientConfig,
    client: OnceLock<reqwest::blocking::Client>,
}

impl LazyClient {
    /// Creates an unbuilt client with the given timeouts.
    #[must_use]
    pub const fn new(config: HttpClientConfig) -> Self {
        Self {
            config,
            client: OnceLock::new(),
        }
    }

    /// Returns the client, building it if needed.
    pub fn get(&self) -> &reqwest::blocking::Client {
        self.client.get_or_init(|| build_http_client(self.config))
    }

    /// Returns the configured timeouts.
    #[must_use]
    pub const fn config(&self) -> HttpClientConfig {
        self.config
    }
}
