//! Issue creation on dependent repositories.

use super::delivery::{AttemptError, DeliveryResult, RetryConfig, deliver_with_retry};
use crate::http::{HttpClientConfig, LazyClient};
use crate::models::{CategoryTag, ChangeEvent, TriageAssessment};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Label carried by every issue ripple opens.
pub const RIPPLE_LABEL: &str = "ripple";

/// An issue to open on a target repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    /// `owner/repo` receiving the issue.
    #[serde(skip)]
    pub target_repo: String,
    /// Issue title.
    pub title: String,
    /// Markdown body.
    pub body: String,
    /// Labels to apply.
    pub labels: Vec<String>,
}

impl IssueRequest {
    /// Renders the issue for an assessment.
    #[must_use]
    pub fn from_assessment(
        assessment: &TriageAssessment,
        event: &ChangeEvent,
        extra_labels: &[String],
    ) -> Self {
        let relationship = &assessment.relationship;
        let consumer = relationship.kind.is_consumer();
        let categories: Vec<&str> = assessment
            .matched_tags
            .iter()
            .map(CategoryTag::as_str)
            .collect();

        let title = if consumer {
            format!(
                "[ripple] {} change in {} may affect this repository",
                assessment.urgency, relationship.provider_repo
            )
        } else {
            format!(
                "[ripple] {} improvement in {} may be worth porting",
                assessment.urgency, relationship.provider_repo
            )
        };

        let files = if assessment.recommended_files.is_empty() {
            "_None identified._".to_string()
        } else {
            assessment
                .recommended_files
                .iter()
                .map(|f| format!("- `{f}`"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let degraded = if assessment.degraded {
            "\n> The impact oracle was unavailable; this assessment uses default values.\n"
        } else {
            ""
        };

        let body = format!(
            "## Cross-repository impact\n\
             {degraded}\n\
             | | |\n\
             |---|---|\n\
             | **Provider** | `{provider}` |\n\
             | **Commit** | `{commit}` |\n\
             | **Relationship** | {kind} |\n\
             | **Urgency** | {urgency} |\n\
             | **Confidence** | {confidence}% |\n\
             | **Categories** | {categories} |\n\
             \n\
             ### Rationale\n\
             \n\
             {rationale}\n\
             \n\
             ### Recommended files\n\
             \n\
             {files}\n",
            provider = relationship.provider_repo,
            commit = event.commit_id,
            kind = relationship.kind.label(),
            urgency = assessment.urgency,
            confidence = assessment.confidence,
            categories = categories.join(", "),
            rationale = assessment.rationale.trim(),
        );

        let mut labels = vec![
            RIPPLE_LABEL.to_string(),
            format!("urgency:{}", assessment.urgency),
            if consumer {
                "consumer-impact".to_string()
            } else {
                "template-opportunity".to_string()
            },
        ];
        labels.extend(categories.iter().map(ToString::to_string));
        for label in extra_labels {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }

        Self {
            target_repo: relationship.target_repo.clone(),
            title,
            body,
            labels,
        }
    }
}

/// Opens issues on an issue tracker.
///
/// Implementations are blocking and are called from `spawn_blocking`.
pub trait IssueSink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &'static str;

    /// Opens one issue, retrying as configured.
    ///
    /// # Errors
    ///
    /// Returns an error only when the request cannot be built; delivery
    /// failures are reported through the returned [`DeliveryResult`].
    fn create_issue(&self, request: &IssueRequest) -> Result<DeliveryResult>;
}

/// Sink that only logs the issue it would open.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogIssueSink;

impl IssueSink for LogIssueSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn create_issue(&self, request: &IssueRequest) -> Result<DeliveryResult> {
        tracing::info!(
            target_repo = %request.target_repo,
            title = %request.title,
            labels = ?request.labels,
            "Issue not opened (no issue tracker configured)"
        );
        Ok(DeliveryResult::success(0, 1, 0))
    }
}

/// GitHub REST issue sink.
#[derive(Debug)]
pub struct GitHubIssueSink {
    api_base: String,
    token: SecretString,
    retry: RetryConfig,
    client: LazyClient,
}

impl GitHubIssueSink {
    /// Creates a sink for `api_base` (e.g. `https://api.github.com`).
    #[must_use]
    pub fn new(api_base: impl Into<String>, token: SecretString) -> Self {
        let retry = RetryConfig::default();
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            retry,
            client: LazyClient::new(client_config(&retry)),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self.client = LazyClient::new(client_config(&retry));
        self
    }

    /// URL issues for `target_repo` are posted to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless `target_repo` is `owner/repo`.
    pub fn issues_url(&self, target_repo: &str) -> Result<String> {
        let mut parts = target_repo.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Ok(format!("{}/repos/{owner}/{repo}/issues", self.api_base))
            },
            _ => Err(Error::InvalidInput(format!(
                "issue target must be owner/repo, got '{target_repo}'"
            ))),
        }
    }

    fn attempt(&self, url: &str, request: &IssueRequest) -> std::result::Result<u16, AttemptError> {
        let response = self
            .client
            .get()
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .json(request)
            .send()
            .map_err(|e| AttemptError::transport(&e))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            Ok(status)
        } else {
            Err(AttemptError::status(status))
        }
    }
}

const fn client_config(retry: &RetryConfig) -> HttpClientConfig {
    HttpClientConfig {
        timeout_ms: retry.timeout_secs.saturating_mul(1000),
        connect_timeout_ms: 3_000,
    }
}

impl IssueSink for GitHubIssueSink {
    fn name(&self) -> &'static str {
        "github"
    }

    fn create_issue(&self, request: &IssueRequest) -> Result<DeliveryResult> {
        let url = self.issues_url(&request.target_repo)?;
        let result = deliver_with_retry(&self.retry, &request.target_repo, || {
            self.attempt(&url, request)
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeNotification, Relationship, Urgency};

    fn event() -> ChangeEvent {
        ChangeNotification::new("acme/api", "abc1234def", ["jwt rotation"])
            .into_event([CategoryTag::Authentication].into_iter().collect())
    }

    fn assessment(relationship: Relationship) -> TriageAssessment {
        TriageAssessment {
            relationship,
            matched_tags: [CategoryTag::Authentication].into_iter().collect(),
            confidence: 92,
            urgency: Urgency::High,
            rationale: "Token format changed.".to_string(),
            recommended_files: vec!["src/auth.ts".to_string()],
            degraded: false,
        }
    }

    #[test]
    fn test_consumer_issue_template() {
        let rel = Relationship::consumer("acme/api", "acme/web", [CategoryTag::Authentication]);
        let issue = IssueRequest::from_assessment(&assessment(rel), &event(), &[]);

        assert_eq!(issue.target_repo, "acme/web");
        assert!(issue.title.contains("high change in acme/api"));
        assert!(issue.body.contains("`abc1234def`"));
        assert!(issue.body.contains("92%"));
        assert!(issue.body.contains("Token format changed."));
        assert!(issue.body.contains("- `src/auth.ts`"));
        assert!(issue.body.contains("authentication"));
        assert_eq!(
            issue.labels,
            vec!["ripple", "urgency:high", "consumer-impact", "authentication"]
        );
    }

    #[test]
    fn test_template_issue_labels_and_extras() {
        let rel = Relationship::template(
            "acme/api",
            "acme/fork",
            [CategoryTag::Authentication],
            [CategoryTag::DataModel],
        );
        let extras = vec!["triage".to_string(), "ripple".to_string()];
        let issue = IssueRequest::from_assessment(&assessment(rel), &event(), &extras);
        assert!(issue.title.contains("worth porting"));
        assert!(issue.labels.contains(&"template-opportunity".to_string()));
        assert_eq!(issue.labels.last().map(String::as_str), Some("triage"));
        assert_eq!(issue.labels.iter().filter(|l| *l == "ripple").count(), 1);
    }

    #[test]
    fn test_degraded_note() {
        let rel = Relationship::consumer("acme/api", "acme/web", [CategoryTag::Authentication]);
        let mut a = assessment(rel);
        a.degraded = true;
        a.recommended_files.clear();
        let issue = IssueRequest::from_assessment(&a, &event(), &[]);
        assert!(issue.body.contains("oracle was unavailable"));
        assert!(issue.body.contains("_None identified._"));
    }

    #[test]
    fn test_issue_json_omits_target() {
        let rel = Relationship::consumer("acme/api", "acme/web", [CategoryTag::Authentication]);
        let issue = IssueRequest::from_assessment(&assessment(rel), &event(), &[]);
        let json = serde_json::to_value(&issue).expect("serialize");
        assert!(json.get("target_repo").is_none());
        assert!(json.get("title").is_some());
        assert!(json.get("labels").is_some());
    }

    #[test]
    fn test_issues_url() {
        let sink = GitHubIssueSink::new("https://api.github.com/", SecretString::from("t"));
        assert_eq!(
            sink.issues_url("acme/web").expect("url"),
            "https://api.github.com/repos/acme/web/issues"
        );
        assert!(sink.issues_url("acme").is_err());
        assert!(sink.issues_url("a/b/c").is_err());
    }

    #[test]
    fn test_invalid_target_is_error() {
        let sink = GitHubIssueSink::new("https://api.github.com", SecretString::from("t"));
        let request = IssueRequest {
            target_repo: "not-a-repo".to_string(),
            title: String::new(),
            body: String::new(),
            labels: Vec::new(),
        };
        assert!(matches!(
            sink.create_issue(&request),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_log_sink_succeeds() {
        let request = IssueRequest {
            target_repo: "acme/web".to_string(),
            title: "t".to_string(),
            body: String::new(),
            labels: Vec::new(),
        };
        let result = LogIssueSink.create_issue(&request).expect("log");
        assert!(result.success);
    }
}
