//! Category tags and urgency levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of change categories.
///
/// The classifier maps free-text patterns onto these tags, and the
/// relationship registry refers to them as triggers and concerns. Unknown
/// tag names in configuration are rejected rather than ignored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CategoryTag {
    /// Public API surface: endpoints, request/response shapes, SDK signatures.
    ApiContract,
    /// Login, tokens, sessions, permission checks.
    Authentication,
    /// Persistent data shapes: schemas, migrations, serialized models.
    DataModel,
    /// Deployment and runtime environment: containers, CI, hardware.
    Infrastructure,
    /// Third-party dependency changes.
    Dependencies,
    /// Configuration keys and environment variables.
    Configuration,
    /// Retry, fallback and error propagation behavior.
    ErrorHandling,
    /// Caching, batching, concurrency and latency work.
    Performance,
    /// Security hardening outside authentication.
    Security,
    /// Test suites and fixtures.
    Testing,
    /// Documentation-only changes.
    DocsOnly,
}

impl CategoryTag {
    /// Returns all category tags.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ApiContract,
            Self::Authentication,
            Self::DataModel,
            Self::Infrastructure,
            Self::Dependencies,
            Self::Configuration,
            Self::ErrorHandling,
            Self::Performance,
            Self::Security,
            Self::Testing,
            Self::DocsOnly,
        ]
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ApiContract => "api_contract",
            Self::Authentication => "authentication",
            Self::DataModel => "data_model",
            Self::Infrastructure => "infrastructure",
            Self::Dependencies => "dependencies",
            Self::Configuration => "configuration",
            Self::ErrorHandling => "error_handling",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::Testing => "testing",
            Self::DocsOnly => "docs_only",
        }
    }

    /// Parses a tag from a string.
    ///
    /// Accepts `snake_case`, `kebab-case` and any letter case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|tag| tag.as_str() == normalized)
    }

    /// Whether a consumer assessment for this tag is a likely breaking change.
    #[must_use]
    pub const fn is_breaking_surface(&self) -> bool {
        matches!(self, Self::ApiContract | Self::Authentication)
    }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CategoryTag {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| crate::Error::Config(format!("unknown category tag: '{s}'")))
    }
}

/// Ordinal severity of a triage outcome.
///
/// Variants are declared in ascending rank so the derived `Ord` gives
/// `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Informational.
    Low,
    /// Worth a look.
    #[default]
    Medium,
    /// Likely to need action.
    High,
    /// Breaks the dependent repository.
    Critical,
}

impl Urgency {
    /// Returns all urgency levels in ascending rank.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Low, Self::Medium, Self::High, Self::Critical]
    }

    /// Returns the urgency as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Numeric rank, `critical` highest.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Parses an urgency strictly.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Parses an urgency leniently; anything unrecognized becomes `Medium`.
    #[must_use]
    pub fn normalize(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Medium)
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Config(format!("unknown urgency: '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_category_roundtrip() {
        for tag in CategoryTag::all() {
            assert_eq!(CategoryTag::parse(tag.as_str()), Some(*tag));
        }
    }

    #[test_case("API_CONTRACT", Some(CategoryTag::ApiContract) ; "upper case")]
    #[test_case("docs-only", Some(CategoryTag::DocsOnly) ; "kebab case")]
    #[test_case(" infrastructure ", Some(CategoryTag::Infrastructure) ; "padded")]
    #[test_case("frontend", None ; "unknown")]
    fn test_category_parse(input: &str, expected: Option<CategoryTag>) {
        assert_eq!(CategoryTag::parse(input), expected);
    }

    #[test]
    fn test_category_from_str_unknown_is_config_error() {
        let err = "gpu_stuff".parse::<CategoryTag>().unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_category_serde() {
        let json = serde_json::to_string(&CategoryTag::ApiContract).unwrap();
        assert_eq!(json, "\"api_contract\"");
        let parsed: CategoryTag = serde_json::from_str("\"docs_only\"").unwrap();
        assert_eq!(parsed, CategoryTag::DocsOnly);
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(Urgency::Critical > Urgency::High);
        assert!(Urgency::High > Urgency::Medium);
        assert!(Urgency::Medium > Urgency::Low);
        assert_eq!(Urgency::High.rank(), 2);
    }

    #[test_case("HIGH", Urgency::High)]
    #[test_case("critical", Urgency::Critical)]
    #[test_case("urgent", Urgency::Medium)]
    #[test_case("", Urgency::Medium)]
    fn test_urgency_normalize(input: &str, expected: Urgency) {
        assert_eq!(Urgency::normalize(input), expected);
    }
}
