//! Configuration management.
//!
//! Values are layered: built-in defaults, then the TOML file, then
//! `RIPPLE_*` environment variables. String values in the file may
//! reference the environment as `${VAR}`; secrets whose variable is unset
//! are treated as not configured.
//!
//! ```toml
//! knowledge_base_path = "~/.local/share/ripple/knowledge_base.json"
//! registry_path = "relationships.yaml"
//!
//! [triage]
//! issue_confidence_threshold = 70
//! min_issue_urgency = "medium"
//!
//! [oracle]
//! endpoint = "https://oracle.internal/assess"
//! api_key = "${RIPPLE_ORACLE_KEY}"
//!
//! [issues]
//! token = "${GITHUB_TOKEN}"
//! extra_labels = ["triage"]
//!
//! [webhook]
//! url = "https://discord.com/api/webhooks/..."
//! format = "discord"
//! ```

mod sections;

pub use sections::{
    ClassifierConfig, ConfigFileIssues, ConfigFileOracle, ConfigFileWebhook,
    DEFAULT_ISSUES_API_BASE, IssuesConfig, LoggingSettings, MetricsSettings, OracleConfig,
    WebhookConfig,
};

use crate::models::Urgency;
use crate::services::{MatcherConfig, RouterConfig};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "RIPPLE_CONFIG_PATH";

static ENV_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap_or_else(|_| unreachable!()));

/// Main configuration for ripple.
#[derive(Debug, Clone, Serialize)]
pub struct RippleConfig {
    /// Knowledge base document.
    pub knowledge_base_path: PathBuf,
    /// Relationship registry (YAML or JSON).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<PathBuf>,
    /// File this configuration was read from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
    /// Similarity matcher thresholds.
    pub similarity: MatcherConfig,
    /// Routing thresholds.
    pub triage: RouterConfig,
    /// Impact oracle.
    pub oracle: OracleConfig,
    /// Issue tracker.
    pub issues: IssuesConfig,
    /// Similarity digest webhook.
    pub webhook: WebhookConfig,
    /// Classifier keyword overrides.
    pub classifier: ClassifierConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Knowledge base path.
    pub knowledge_base_path: Option<String>,
    /// Registry path.
    pub registry_path: Option<String>,
    /// Similarity section.
    pub similarity: Option<ConfigFileSimilarity>,
    /// Triage section.
    pub triage: Option<ConfigFileTriage>,
    /// Oracle section.
    pub oracle: Option<ConfigFileOracle>,
    /// Issues section.
    pub issues: Option<ConfigFileIssues>,
    /// Webhook section.
    pub webhook: Option<ConfigFileWebhook>,
    /// Classifier section.
    pub classifier: Option<ClassifierConfig>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// `[similarity]` in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileSimilarity {
    /// Minimum exclusive score.
    pub threshold: Option<usize>,
    /// Result limit (0 = unlimited).
    pub max_results: Option<usize>,
}

/// `[triage]` in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTriage {
    /// Minimum confidence for an issue.
    pub issue_confidence_threshold: Option<u8>,
    /// Minimum urgency for an issue.
    pub min_issue_urgency: Option<String>,
    /// Minimum confidence to log.
    pub log_confidence_floor: Option<u8>,
}

impl Default for RippleConfig {
    fn default() -> Self {
        Self {
            knowledge_base_path: default_data_dir().join("knowledge_base.json"),
            registry_path: None,
            source: None,
            similarity: MatcherConfig::default(),
            triage: RouterConfig::default(),
            oracle: OracleConfig::default(),
            issues: IssuesConfig::default(),
            webhook: WebhookConfig::default(),
            classifier: ClassifierConfig::default(),
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl RippleConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration for the CLI.
    ///
    /// Reads `.env`, then `explicit` if given, else the default locations,
    /// then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or is
    /// invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        let env = |key: &str| std::env::var(key).ok();
        let mut config = match explicit {
            Some(path) => Self::load_from_file_with(path, &env)?,
            None => Self::load_default_with(&env)?,
        };
        config.apply_env_overrides(&env)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::load_from_file_with(path, &|key: &str| std::env::var(key).ok())
    }

    fn load_from_file_with(path: &Path, env: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        let mut config = Self::from_toml_str(&contents, env)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Loads configuration from the default locations.
    ///
    /// Checks, in order:
    /// 1. `$RIPPLE_CONFIG_PATH`
    /// 2. Platform config dir (`~/Library/Application Support/ripple/` on macOS)
    /// 3. `~/.config/ripple/` for Unix compatibility
    ///
    /// Returns defaults if no file exists.
    fn load_default_with(env: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = env(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            return Self::load_from_file_with(Path::new(&path), env);
        }
        for candidate in default_config_paths() {
            if candidate.exists() {
                return Self::load_from_file_with(&candidate, env);
            }
        }
        Ok(Self::default())
    }

    /// Parses a TOML document, expanding `${VAR}` through `env`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed TOML or invalid values.
    pub fn from_toml_str(contents: &str, env: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::Config(format!("config file: {e}")))?;
        Self::from_config_file(file, env)
    }

    /// Converts a `ConfigFile` to `RippleConfig`.
    fn from_config_file(file: ConfigFile, env: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = file.knowledge_base_path {
            config.knowledge_base_path = expand_path(&expand_required(&path, env)?);
        }
        if let Some(path) = file.registry_path {
            config.registry_path = Some(expand_path(&expand_required(&path, env)?));
        }
        if let Some(similarity) = file.similarity {
            if let Some(v) = similarity.threshold {
                config.similarity.threshold = v;
            }
            if let Some(v) = similarity.max_results {
                config.similarity.max_results = v;
            }
        }
        if let Some(triage) = file.triage {
            if let Some(v) = triage.issue_confidence_threshold {
                config.triage.issue_confidence_threshold = v;
            }
            if let Some(urgency) = triage.min_issue_urgency {
                config.triage.min_issue_urgency = Urgency::parse(&urgency).ok_or_else(|| {
                    Error::Config(format!("triage.min_issue_urgency: unknown urgency '{urgency}'"))
                })?;
            }
            if let Some(v) = triage.log_confidence_floor {
                config.triage.log_confidence_floor = v;
            }
        }
        if let Some(oracle) = file.oracle {
            config.oracle.merge(oracle, env);
        }
        if let Some(issues) = file.issues {
            config.issues.merge(issues, env);
        }
        if let Some(webhook) = file.webhook {
            config.webhook.merge(webhook, env)?;
        }
        if let Some(classifier) = file.classifier {
            config.classifier = classifier;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }

        config.validate()?;
        Ok(config)
    }

    /// Applies `RIPPLE_*` environment overrides.
    ///
    /// `GITHUB_TOKEN` is used for issues when no token is configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown `RIPPLE_WEBHOOK_FORMAT`.
    pub fn apply_env_overrides(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("RIPPLE_KNOWLEDGE_BASE") {
            self.knowledge_base_path = expand_path(&v);
        }
        if let Some(v) = var("RIPPLE_REGISTRY") {
            self.registry_path = Some(expand_path(&v));
        }
        if let Some(v) = var("RIPPLE_ORACLE_ENDPOINT") {
            self.oracle.endpoint = Some(v);
        }
        if let Some(v) = var("RIPPLE_ORACLE_API_KEY") {
            self.oracle.api_key = Some(SecretString::from(v));
        }
        if let Some(v) = var("RIPPLE_ISSUES_API_BASE") {
            self.issues.api_base = v;
        }
        if let Some(v) = var("RIPPLE_ISSUES_TOKEN") {
            self.issues.token = Some(SecretString::from(v));
        } else if self.issues.token.is_none() {
            self.issues.token = var("GITHUB_TOKEN").map(SecretString::from);
        }
        if let Some(v) = var("RIPPLE_WEBHOOK_URL") {
            self.webhook.url = Some(v);
        }
        if let Some(v) = var("RIPPLE_WEBHOOK_FORMAT") {
            self.webhook.format = v.parse()?;
        }
        if let Some(v) = var("RIPPLE_WEBHOOK_SECRET") {
            self.webhook.secret = Some(SecretString::from(v));
        }
        Ok(())
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for confidence thresholds above 100 or an
    /// invalid webhook URL.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            (
                "triage.issue_confidence_threshold",
                self.triage.issue_confidence_threshold,
            ),
            ("triage.log_confidence_floor", self.triage.log_confidence_floor),
        ] {
            if value > 100 {
                return Err(Error::Config(format!("{name} must be at most 100, got {value}")));
            }
        }
        self.webhook.validate()
    }

    /// Renders the effective configuration as TOML, secrets redacted.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::OperationFailed {
            operation: "render_config".to_string(),
            cause: e.to_string(),
        })
    }

    /// Sets the knowledge base path.
    #[must_use]
    pub fn with_knowledge_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.knowledge_base_path = path.into();
        self
    }

    /// Sets the registry path.
    #[must_use]
    pub fn with_registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }
}

/// Candidate config file locations, in lookup order.
#[must_use]
pub fn default_config_paths() -> Vec<PathBuf> {
    let Some(base_dirs) = directories::BaseDirs::new() else {
        return Vec::new();
    };
    let platform = base_dirs.config_dir().join("ripple").join("config.toml");
    let xdg = base_dirs
        .home_dir()
        .join(".config")
        .join("ripple")
        .join("config.toml");
    if platform == xdg {
        vec![platform]
    } else {
        vec![platform, xdg]
    }
}

/// Data directory for the default knowledge base.
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "ripple")
        .map_or_else(|| PathBuf::from(".ripple"), |dirs| dirs.data_dir().to_path_buf())
}

/// Expands `${VAR}` references.
///
/// # Errors
///
/// Returns the name of the first unset variable.
pub fn expand_env(
    value: &str,
    env: &impl Fn(&str) -> Option<String>,
) -> std::result::Result<String, String> {
    let mut missing = None;
    let expanded = ENV_REFERENCE.replace_all(value, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        env(name).unwrap_or_else(|| {
            missing.get_or_insert_with(|| name.to_string());
            String::new()
        })
    });
    match missing {
        Some(name) => Err(name),
        None => Ok(expanded.into_owned()),
    }
}

fn expand_required(value: &str, env: &impl Fn(&str) -> Option<String>) -> Result<String> {
    expand_env(value, env)
        .map_err(|name| Error::Config(format!("environment variable '{name}' is not set")))
}

/// Expands an optional value; an unset variable or empty result is `None`.
fn expand_optional(
    value: &str,
    env: &impl Fn(&str) -> Option<String>,
    field: &str,
) -> Option<String> {
    match expand_env(value, env) {
        Ok(expanded) if !expanded.trim().is_empty() => Some(expanded),
        Ok(_) => None,
        Err(name) => {
            tracing::warn!(field, variable = %name, "Environment variable not set, ignoring value");
            None
        },
    }
}

fn expand_secret(
    value: &str,
    env: &impl Fn(&str) -> Option<String>,
    field: &str,
) -> Option<SecretString> {
    expand_optional(value, env, field).map(SecretString::from)
}

/// Expands a leading `~/` to the home directory.
fn expand_path(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(value)
}
