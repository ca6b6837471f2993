//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Default filter directive.
pub const DEFAULT_FILTER: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Optional log file; stderr otherwise.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::from_settings_with(settings, verbose, &|key: &str| std::env::var(key).ok())
    }

    /// Same as [`LoggingConfig::from_settings`] with an explicit environment.
    ///
    /// Precedence for the filter: `RIPPLE_LOG`, then `RUST_LOG`, then
    /// `--verbose` (`ripple=debug`), then the file, then `info`.
    #[must_use]
    pub fn from_settings_with(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Self {
        let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(settings) = settings {
            if let Some(format) = &settings.format {
                config.format = LogFormat::parse(format);
            }
            if let Some(filter) = &settings.filter {
                config.filter.clone_from(filter);
            }
            config.file.clone_from(&settings.file);
        }
        if verbose {
            config.filter = "ripple=debug,info".to_string();
        }
        if let Some(filter) = var("RIPPLE_LOG").or_else(|| var("RUST_LOG")) {
            config.filter = filter;
        }
        if let Some(format) = var("RIPPLE_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Some(file) = var("RIPPLE_LOG_FILE") {
            config.file = Some(PathBuf::from(file));
        }
        config
    }
}
