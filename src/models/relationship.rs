//! Directed relationships between repositories.

use super::CategoryTag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What a dependent repository takes from its provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipKind {
    /// The target calls into the provider; changes may break it.
    Consumer {
        /// Categories whose change should trigger an assessment.
        change_triggers: BTreeSet<CategoryTag>,
    },
    /// The target was derived from the provider; changes may be worth porting.
    Template {
        /// Categories both repositories still share.
        shared_concerns: BTreeSet<CategoryTag>,
        /// Categories where the target intentionally diverged.
        divergent_concerns: BTreeSet<CategoryTag>,
    },
}

impl RelationshipKind {
    /// Returns the kind label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Consumer { .. } => "consumer",
            Self::Template { .. } => "template",
        }
    }

    /// Returns true for consumer relationships.
    #[must_use]
    pub const fn is_consumer(&self) -> bool {
        matches!(self, Self::Consumer { .. })
    }
}

/// Stable identifier of a relationship: `provider->target#kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(String);

impl RelationshipId {
    /// Builds the identifier from its parts.
    #[must_use]
    pub fn new(provider: &str, target: &str, kind: &str) -> Self {
        Self(format!("{provider}->{target}#{kind}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directed provider → target edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Repository whose changes are watched.
    pub provider_repo: String,
    /// Dependent repository that may need to act.
    pub target_repo: String,
    /// Free-text description of how the two relate, passed to the oracle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Kind-specific data.
    #[serde(flatten)]
    pub kind: RelationshipKind,
}

impl Relationship {
    /// Creates a consumer relationship.
    #[must_use]
    pub fn consumer(
        provider: impl Into<String>,
        target: impl Into<String>,
        change_triggers: impl IntoIterator<Item = CategoryTag>,
    ) -> Self {
        Self {
            provider_repo: provider.into(),
            target_repo: target.into(),
            context: None,
            kind: RelationshipKind::Consumer {
                change_triggers: change_triggers.into_iter().collect(),
            },
        }
    }

    /// Creates a template relationship.
    #[must_use]
    pub fn template(
        provider: impl Into<String>,
        target: impl Into<String>,
        shared_concerns: impl IntoIterator<Item = CategoryTag>,
        divergent_concerns: impl IntoIterator<Item = CategoryTag>,
    ) -> Self {
        Self {
            provider_repo: provider.into(),
            target_repo: target.into(),
            context: None,
            kind: RelationshipKind::Template {
                shared_concerns: shared_concerns.into_iter().collect(),
                divergent_concerns: divergent_concerns.into_iter().collect(),
            },
        }
    }

    /// Attaches a description.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns the stable identifier of this relationship.
    #[must_use]
    pub fn id(&self) -> RelationshipId {
        RelationshipId::new(&self.provider_repo, &self.target_repo, self.kind.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_id() {
        let rel = Relationship::consumer("acme/api", "acme/web", [CategoryTag::ApiContract]);
        assert_eq!(rel.id().as_str(), "acme/api->acme/web#consumer");

        let rel = Relationship::template("acme/tpl", "acme/svc", [CategoryTag::Testing], []);
        assert_eq!(rel.id().to_string(), "acme/tpl->acme/svc#template");
    }

    #[test]
    fn test_relationship_serde_shape() {
        let rel = Relationship::consumer("p", "c", [CategoryTag::ApiContract]).with_context("sdk");
        let value = serde_json::to_value(&rel).unwrap();
        assert_eq!(value["kind"], "consumer");
        assert_eq!(value["change_triggers"][0], "api_contract");
        assert_eq!(value["context"], "sdk");

        let back: Relationship = serde_json::from_value(value).unwrap();
        assert_eq!(back, rel);
    }
}
