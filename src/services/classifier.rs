//! Change classification: extracted patterns and metadata → category tags.
//!
//! Each tag owns a keyword list. A keyword matches when it appears in a
//! pattern, keyword, dependency or meaningful file path as a whole word
//! (case-insensitive), so `ci` matches `ci pipeline` and `.github/ci.yml`
//! but not `special`.

use crate::models::{CategoryTag, ChangeNotification};
use crate::{Error, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Default keyword table.
const DEFAULT_KEYWORDS: &[(CategoryTag, &[&str])] = &[
    (
        CategoryTag::ApiContract,
        &[
            "endpoint",
            "api",
            "route",
            "schema change",
            "openapi",
            "grpc",
            "graphql",
            "rest",
            "public interface",
            "breaking change",
            "request",
            "response",
        ],
    ),
    (
        CategoryTag::Authentication,
        &[
            "auth",
            "authentication",
            "authorization",
            "oauth",
            "jwt",
            "token",
            "login",
            "session",
            "sso",
            "credential",
            "credentials",
        ],
    ),
    (
        CategoryTag::DataModel,
        &[
            "schema",
            "migration",
            "database",
            "model",
            "table",
            "column",
            "orm",
        ],
    ),
    (
        CategoryTag::Infrastructure,
        &[
            "docker",
            "dockerfile",
            "docker-compose",
            "kubernetes",
            "k8s",
            "helm",
            "gpu",
            "terraform",
            "ci",
            "deployment",
            "github actions",
            "workflows",
        ],
    ),
    (
        CategoryTag::Dependencies,
        &[
            "dependency",
            "dependencies",
            "upgrade",
            "bump",
            "cargo.toml",
            "package.json",
            "requirements.txt",
            "go.mod",
        ],
    ),
    (
        CategoryTag::Configuration,
        &[
            "config",
            "configuration",
            "environment variable",
            "env",
            "settings",
            "feature flag",
        ],
    ),
    (
        CategoryTag::ErrorHandling,
        &[
            "error handling",
            "retry",
            "backoff",
            "circuit breaker",
            "exception",
            "fallback",
            "timeout",
        ],
    ),
    (
        CategoryTag::Performance,
        &[
            "performance",
            "cache",
            "caching",
            "latency",
            "optimization",
            "throughput",
            "batching",
            "connection pool",
        ],
    ),
    (
        CategoryTag::Security,
        &[
            "security",
            "vulnerability",
            "encryption",
            "tls",
            "csrf",
            "xss",
            "sanitize",
            "secret",
            "cve",
        ],
    ),
    (
        CategoryTag::Testing,
        &[
            "test",
            "tests",
            "testing",
            "fixture",
            "mock",
            "coverage",
            "integration test",
        ],
    ),
];

const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "rst", "adoc"];

/// Returns true for documentation files.
fn is_doc_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let in_docs_dir = lower.starts_with("docs/") || lower.contains("/docs/");
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    let by_extension = file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| DOC_EXTENSIONS.contains(&ext));
    in_docs_dir
        || by_extension
        || file_name == "license"
        || file_name == "changelog"
        || file_name == "authors"
}

fn compile(tag: CategoryTag, keywords: &[String]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .map(|k| regex::escape(&k))
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| Error::Config(format!("classifier keywords for {tag}: {e}")))
}

/// Maps change notifications to category tags.
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    rules: Vec<(CategoryTag, Regex)>,
}

impl ChangeClassifier {
    /// Creates a classifier with the default keyword table.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in table; the signature matches
    /// [`ChangeClassifier::with_keywords`].
    pub fn new() -> Result<Self> {
        Self::with_keywords(&BTreeMap::new())
    }

    /// Creates a classifier whose keyword lists are replaced per tag by
    /// `overrides` (tag name → keywords). Tags not named keep the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unknown tag names or an attempt to
    /// configure `docs_only`, which is derived from the changed files.
    pub fn with_keywords(overrides: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut table: BTreeMap<CategoryTag, Vec<String>> = DEFAULT_KEYWORDS
            .iter()
            .map(|(tag, words)| (*tag, words.iter().map(ToString::to_string).collect()))
            .collect();

        for (name, words) in overrides {
            let tag = CategoryTag::parse(name).ok_or_else(|| {
                Error::Config(format!("classifier.keywords: unknown category tag '{name}'"))
            })?;
            if tag == CategoryTag::DocsOnly {
                return Err(Error::Config(
                    "classifier.keywords: docs_only is derived from changed files".to_string(),
                ));
            }
            table.insert(tag, words.clone());
        }

        let mut rules = Vec::with_capacity(table.len());
        for (tag, words) in &table {
            if let Some(regex) = compile(*tag, words)? {
                rules.push((*tag, regex));
            }
        }
        Ok(Self { rules })
    }

    /// Classifies a change. Total: an unmatched change yields an empty set.
    #[must_use]
    pub fn classify(&self, notification: &ChangeNotification) -> BTreeSet<CategoryTag> {
        let meaningful: Vec<&str> = notification.meaningful_files().collect();
        let texts: Vec<&str> = notification
            .extracted_patterns
            .iter()
            .chain(&notification.keywords)
            .chain(&notification.dependencies)
            .map(String::as_str)
            .chain(meaningful.iter().copied())
            .collect();

        let mut tags: BTreeSet<CategoryTag> = self
            .rules
            .iter()
            .filter(|(_, regex)| texts.iter().any(|t| regex.is_match(t)))
            .map(|(tag, _)| *tag)
            .collect();

        let docs_only = !meaningful.is_empty() && meaningful.iter().all(|f| is_doc_path(f));
        if docs_only {
            // Words inside doc file names say nothing about the code.
            let content_tags: BTreeSet<CategoryTag> = self
                .rules
                .iter()
                .filter(|(_, regex)| {
                    notification
                        .extracted_patterns
                        .iter()
                        .chain(&notification.keywords)
                        .chain(&notification.dependencies)
                        .any(|t| regex.is_match(t))
                })
                .map(|(tag, _)| *tag)
                .collect();
            if content_tags.is_empty() {
                tags.clear();
                tags.insert(CategoryTag::DocsOnly);
            } else {
                tags = content_tags;
            }
        }

        tracing::debug!(
            repo = %notification.repo,
            tags = ?tags,
            "Classified change"
        );
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn notification(patterns: &[&str], files: &[&str]) -> ChangeNotification {
        let mut n = ChangeNotification::new("acme/api", "abc123", patterns.iter().copied());
        n.files_changed = files.iter().map(ToString::to_string).collect();
        n
    }

    #[test_case("new endpoint for invoices", CategoryTag::ApiContract)]
    #[test_case("JWT refresh token rotation", CategoryTag::Authentication)]
    #[test_case("docker-compose GPU runtime", CategoryTag::Infrastructure)]
    #[test_case("retry with exponential backoff", CategoryTag::ErrorHandling)]
    #[test_case("add database migration", CategoryTag::DataModel)]
    #[test_case("redis cache layer", CategoryTag::Performance)]
    fn test_pattern_keywords(pattern: &str, expected: CategoryTag) {
        let classifier = ChangeClassifier::new().expect("classifier");
        let tags = classifier.classify(&notification(&[pattern], &["src/lib.rs"]));
        assert!(tags.contains(&expected), "{pattern} -> {tags:?}");
    }

    #[test]
    fn test_word_boundaries() {
        let classifier = ChangeClassifier::new().expect("classifier");
        let tags = classifier.classify(&notification(&["special capital letters"], &[]));
        assert!(!tags.contains(&CategoryTag::Infrastructure));
        assert!(!tags.contains(&CategoryTag::ApiContract));
    }

    #[test]
    fn test_unmatched_is_empty() {
        let classifier = ChangeClassifier::new().expect("classifier");
        assert!(classifier.classify(&notification(&["rename variable"], &[])).is_empty());
    }

    #[test_case("requirements.txt" ; "top level")]
    #[test_case("services/worker/requirements.txt" ; "nested")]
    fn test_dependency_manifest_is_not_docs(path: &str) {
        let classifier = ChangeClassifier::new().expect("classifier");
        let tags = classifier.classify(&notification(&[], &[path]));
        assert!(tags.contains(&CategoryTag::Dependencies), "{path} -> {tags:?}");
        assert!(!tags.contains(&CategoryTag::DocsOnly));
    }

    #[test]
    fn test_file_paths_classify() {
        let classifier = ChangeClassifier::new().expect("classifier");
        let tags = classifier.classify(&notification(&[], &["deploy/Dockerfile"]));
        assert!(tags.contains(&CategoryTag::Infrastructure));
    }

    #[test]
    fn test_docs_only() {
        let classifier = ChangeClassifier::new().expect("classifier");
        let tags = classifier.classify(&notification(&[], &["README.md", "docs/api.md"]));
        assert_eq!(tags, BTreeSet::from([CategoryTag::DocsOnly]));
    }

    #[test]
    fn test_docs_with_real_pattern_is_not_docs_only() {
        let classifier = ChangeClassifier::new().expect("classifier");
        let tags = classifier.classify(&notification(&["new endpoint"], &["README.md"]));
        assert!(tags.contains(&CategoryTag::ApiContract));
        assert!(!tags.contains(&CategoryTag::DocsOnly));
    }

    #[test]
    fn test_noise_files_ignored() {
        let classifier = ChangeClassifier::new().expect("classifier");
        let tags = classifier.classify(&notification(&[], &["README.md", "Cargo.lock"]));
        assert_eq!(tags, BTreeSet::from([CategoryTag::DocsOnly]));
    }

    #[test]
    fn test_overrides_replace_tag_keywords() {
        let overrides = BTreeMap::from([(
            "infrastructure".to_string(),
            vec!["nomad".to_string()],
        )]);
        let classifier = ChangeClassifier::with_keywords(&overrides).expect("classifier");
        let tags = classifier.classify(&notification(&["nomad job spec"], &[]));
        assert!(tags.contains(&CategoryTag::Infrastructure));
        let tags = classifier.classify(&notification(&["docker image"], &[]));
        assert!(!tags.contains(&CategoryTag::Infrastructure));
    }

    #[test_case("vibes" ; "unknown tag")]
    #[test_case("docs_only" ; "derived tag")]
    fn test_bad_override_rejected(name: &str) {
        let overrides = BTreeMap::from([(name.to_string(), vec!["x".to_string()])]);
        assert!(matches!(
            ChangeClassifier::with_keywords(&overrides),
            Err(Error::Config(_))
        ));
    }

    #[test_case("README.md", true)]
    #[test_case("docs/guide/intro.html", true)]
    #[test_case("LICENSE", true)]
    #[test_case("src/docs.rs", false)]
    #[test_case("requirements.txt", false)]
    #[test_case("CMakeLists.txt", false)]
    fn test_doc_paths(path: &str, expected: bool) {
        assert_eq!(is_doc_path(path), expected);
    }
}
