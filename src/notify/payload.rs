//! Similarity digest payloads and HMAC signing.
//!
//! # Payload Format
//!
//! ```json
//! {
//!   "event_id": "550e8400-e29b-41d4-a716-446655440000",
//!   "event_type": "similarity_digest",
//!   "timestamp": "2024-01-15T10:30:00Z",
//!   "repository": "acme/api",
//!   "commit_id": "abc1234",
//!   "top_patterns": ["retry with backoff"],
//!   "similar": [
//!     {"repository": "acme/billing", "keyword_overlap": 1, "pattern_overlap": 2,
//!      "matching_patterns": ["retry with backoff", "circuit breaker"]}
//!   ]
//! }
//! ```
//!
//! # HMAC Signing
//!
//! When a secret is configured, the default-format JSON is signed with
//! HMAC-SHA256 and sent as `X-Ripple-Signature: sha256=<hex>`.

use crate::models::ChangeEvent;
use crate::services::SimilarityMatch;
use crate::{Error, Result};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;

/// Number of similar repositories in a digest.
pub const DIGEST_MATCHES: usize = 3;
/// Number of shared patterns listed per similar repository.
pub const DIGEST_PATTERNS: usize = 5;
/// Number of the snapshot's own patterns in a digest.
pub const DIGEST_TOP_PATTERNS: usize = 3;

/// Payload format for webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Plain JSON digest.
    #[default]
    Default,
    /// Slack-compatible format with text and blocks.
    Slack,
    /// Discord-compatible format with content and embeds.
    Discord,
}

impl FromStr for PayloadFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" | "json" => Ok(Self::Default),
            "slack" => Ok(Self::Slack),
            "discord" => Ok(Self::Discord),
            other => Err(Error::Config(format!(
                "unknown webhook format '{other}' (expected default, slack or discord)"
            ))),
        }
    }
}

/// One similar repository in a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
    /// The similar repository.
    pub repository: String,
    /// Number of shared keywords.
    pub keyword_overlap: usize,
    /// Number of shared patterns.
    pub pattern_overlap: usize,
    /// Up to five shared patterns.
    pub matching_patterns: Vec<String>,
}

/// Digest sent after a new snapshot has similar repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityDigest {
    /// Unique delivery id.
    pub event_id: String,
    /// Always `similarity_digest`.
    pub event_type: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
    /// Repository that was just recorded.
    pub repository: String,
    /// Commit of the snapshot.
    pub commit_id: String,
    /// Patterns the commit introduced.
    pub top_patterns: Vec<String>,
    /// Most similar repositories.
    pub similar: Vec<DigestEntry>,
}

impl SimilarityDigest {
    /// Builds a digest, or `None` when there is nothing similar.
    #[must_use]
    pub fn from_matches(event: &ChangeEvent, matches: &[SimilarityMatch]) -> Option<Self> {
        if matches.is_empty() {
            return None;
        }
        let similar = matches
            .iter()
            .take(DIGEST_MATCHES)
            .map(|m| DigestEntry {
                repository: m.repository.clone(),
                keyword_overlap: m.matched_keywords.len(),
                pattern_overlap: m.matched_patterns.len(),
                matching_patterns: m
                    .matched_patterns
                    .iter()
                    .take(DIGEST_PATTERNS)
                    .cloned()
                    .collect(),
            })
            .collect();

        Some(Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: "similarity_digest".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            repository: event.repo.clone(),
            commit_id: event.commit_id.clone(),
            top_patterns: event
                .extracted_patterns
                .iter()
                .take(DIGEST_TOP_PATTERNS)
                .cloned()
                .collect(),
            similar,
        })
    }

    /// Default-format JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Format-specific JSON.
    #[must_use]
    pub fn to_format_json(&self, format: PayloadFormat) -> String {
        match format {
            PayloadFormat::Default => self.to_json(),
            PayloadFormat::Slack => self.to_slack_json(),
            PayloadFormat::Discord => self.to_discord_json(),
        }
    }

    /// Slack-compatible JSON: a header block and one section per match.
    #[must_use]
    pub fn to_slack_json(&self) -> String {
        let mut blocks = vec![
            serde_json::json!({
                "type": "header",
                "text": {"type": "plain_text", "text": format!("Ripple: {}", self.repository), "emoji": true}
            }),
            serde_json::json!({
                "type": "section",
                "text": {"type": "mrkdwn", "text": self.format_message()}
            }),
        ];
        blocks.extend(self.similar.iter().map(|entry| {
            serde_json::json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Similar to {}*\n{}\n{}",
                        entry.repository,
                        overlap_line(entry),
                        bullet_list(&entry.matching_patterns)
                    )
                }
            })
        }));
        blocks.push(serde_json::json!({
            "type": "context",
            "elements": [{"type": "mrkdwn", "text": format!("Event ID: {} | {}", self.event_id, self.timestamp)}]
        }));

        serde_json::json!({
            "text": self.format_message(),
            "blocks": blocks
        })
        .to_string()
    }

    /// Discord-compatible JSON: one embed per match.
    #[must_use]
    pub fn to_discord_json(&self) -> String {
        let embeds: Vec<serde_json::Value> = self
            .similar
            .iter()
            .map(|entry| {
                let mut fields = Vec::new();
                if !entry.matching_patterns.is_empty() {
                    fields.push(serde_json::json!({
                        "name": "Matching Patterns",
                        "value": bullet_list(&entry.matching_patterns),
                        "inline": false
                    }));
                }
                serde_json::json!({
                    "title": format!("Similar to: {}", entry.repository),
                    "description": overlap_line(entry),
                    "color": 5_814_783,
                    "fields": fields
                })
            })
            .collect();

        serde_json::json!({
            "content": self.format_message(),
            "embeds": embeds
        })
        .to_string()
    }

    fn format_message(&self) -> String {
        let short: String = self.commit_id.chars().take(7).collect();
        let mut message = format!(
            "{} ({short}) resembles {} other repositor{}",
            self.repository,
            self.similar.len(),
            if self.similar.len() == 1 { "y" } else { "ies" }
        );
        if !self.top_patterns.is_empty() {
            message.push_str(&format!("\nPatterns: {}", self.top_patterns.join(", ")));
        }
        message
    }
}

fn overlap_line(entry: &DigestEntry) -> String {
    format!(
        "**Overlap**: {} keywords, {} patterns",
        entry.keyword_overlap, entry.pattern_overlap
    )
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|p| format!("\u{2022} {p}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Computes an HMAC-SHA256 signature as `sha256=<hex>`.
#[must_use]
pub fn compute_hmac_signature(secret: &str, payload: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;

    // HMAC accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryTag, ChangeNotification};
    use std::collections::BTreeSet;

    fn event() -> ChangeEvent {
        ChangeNotification::new(
            "acme/api",
            "abc1234def",
            ["retry", "backoff", "circuit breaker", "jitter"],
        )
        .into_event([CategoryTag::ErrorHandling].into_iter().collect())
    }

    fn matched(repo: &str, patterns: &[&str], keywords: &[&str]) -> SimilarityMatch {
        let matched_patterns: BTreeSet<String> =
            patterns.iter().map(ToString::to_string).collect();
        let matched_keywords: BTreeSet<String> =
            keywords.iter().map(ToString::to_string).collect();
        SimilarityMatch {
            repository: repo.to_string(),
            score: matched_patterns.len() + matched_keywords.len(),
            matched_patterns,
            matched_keywords,
        }
    }

    #[test]
    fn test_no_matches_no_digest() {
        assert!(SimilarityDigest::from_matches(&event(), &[]).is_none());
    }

    #[test]
    fn test_digest_limits() {
        let many = ["a", "b", "c", "d", "e", "f", "g"];
        let matches = vec![
            matched("r1", &many, &["http"]),
            matched("r2", &["a"], &[]),
            matched("r3", &["a"], &[]),
            matched("r4", &["a"], &[]),
        ];
        let digest = SimilarityDigest::from_matches(&event(), &matches).expect("digest");
        assert_eq!(digest.similar.len(), DIGEST_MATCHES);
        assert_eq!(digest.similar[0].matching_patterns.len(), DIGEST_PATTERNS);
        assert_eq!(digest.similar[0].keyword_overlap, 1);
        assert_eq!(digest.similar[0].pattern_overlap, 7);
        assert_eq!(digest.top_patterns.len(), DIGEST_TOP_PATTERNS);
        assert_eq!(digest.event_type, "similarity_digest");
    }

    #[test]
    fn test_discord_format() {
        let digest =
            SimilarityDigest::from_matches(&event(), &[matched("acme/billing", &["retry"], &[])])
                .expect("digest");
        let json: serde_json::Value =
            serde_json::from_str(&digest.to_format_json(PayloadFormat::Discord)).expect("json");
        assert!(json["content"].as_str().is_some_and(|c| c.contains("acme/api")));
        assert_eq!(json["embeds"][0]["title"], "Similar to: acme/billing");
        assert_eq!(json["embeds"][0]["fields"][0]["name"], "Matching Patterns");
    }

    #[test]
    fn test_slack_format() {
        let digest =
            SimilarityDigest::from_matches(&event(), &[matched("acme/billing", &["retry"], &[])])
                .expect("digest");
        let json: serde_json::Value =
            serde_json::from_str(&digest.to_format_json(PayloadFormat::Slack)).expect("json");
        assert!(json["text"].is_string());
        assert_eq!(json["blocks"][0]["type"], "header");
        assert!(json["blocks"][2]["text"]["text"]
            .as_str()
            .is_some_and(|t| t.contains("acme/billing")));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("slack".parse::<PayloadFormat>().ok(), Some(PayloadFormat::Slack));
        assert_eq!("DISCORD".parse::<PayloadFormat>().ok(), Some(PayloadFormat::Discord));
        assert_eq!("default".parse::<PayloadFormat>().ok(), Some(PayloadFormat::Default));
        assert!(matches!("teams".parse::<PayloadFormat>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_hmac_signature() {
        let sig = compute_hmac_signature("secret", "{}");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        assert_eq!(sig, compute_hmac_signature("secret", "{}"));
        assert_ne!(sig, compute_hmac_signature("other", "{}"));
    }
}
