//! Prometheus metrics.
//!
//! Counters recorded by the pipeline:
//!
//! | Name | Labels |
//! |------|--------|
//! | `ripple_events_total` | |
//! | `ripple_snapshots_total` | `status` |
//! | `ripple_assessments_total` | `status` |
//! | `ripple_oracle_retries_total` | |
//! | `ripple_oracle_duration_ms` (histogram) | |
//! | `ripple_notifications_total` | `action` (`unclaimed` when the ledger write fails) |
//! | `ripple_issue_deliveries_total` | `status` |
//! | `ripple_digest_deliveries_total` | `status` |

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default listener port.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address to bind the metrics exporter.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_METRICS_PORT),
        }
    }
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        Self::from_settings_with(settings, &|key: &str| std::env::var(key).ok())
    }

    /// Same as [`MetricsConfig::from_settings`] with an explicit environment.
    #[must_use]
    pub fn from_settings_with(
        settings: Option<&MetricsSettings>,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Self {
        let enabled = settings.and_then(|config| config.enabled).unwrap_or(false);
        let port = settings
            .and_then(|config| config.port)
            .unwrap_or(DEFAULT_METRICS_PORT);

        let mut config = Self {
            enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        };

        if let Some(enabled) = parse_bool(env("RIPPLE_METRICS_ENABLED")) {
            config.enabled = enabled;
        }
        if let Some(port) = env("RIPPLE_METRICS_PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
            config.listen_addr.set_port(port);
        }
        config
    }
}

/// Handle to the installed recorder.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders the current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder, and the HTTP listener when `expose`.
///
/// Must be called from within a tokio runtime when `expose` is set.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be started.
pub fn install_prometheus(config: &MetricsConfig, expose: bool) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let prometheus = if expose {
        let (recorder, exporter) = builder
            .with_http_listener(config.listen_addr)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "metrics_exporter_build".to_string(),
                cause: e.to_string(),
            })?;
        let handle = recorder.handle();
        set_global_recorder(recorder)?;
        tokio::spawn(exporter);
        tracing::info!(addr = %config.listen_addr, "Prometheus exporter listening");
        handle
    } else {
        builder
            .install_recorder()
            .map_err(|e| Error::OperationFailed {
                operation: "metrics_recorder_install".to_string(),
                cause: e.to_string(),
            })?
    };

    Ok(Some(MetricsHandle { prometheus }))
}

fn set_global_recorder(recorder: metrics_exporter_prometheus::PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}

fn parse_bool(value: Option<String>) -> Option<bool> {
    value.map(|value| {
        let value = value.trim().to_lowercase();
        value == "true" || value == "1" || value == "yes"
    })
}
