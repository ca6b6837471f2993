//! Relationship registry: the provider → dependent graph.
//!
//! # Document format
//!
//! ```yaml
//! urgency_mapping:
//!   security: critical
//!
//! acme/billing-api:
//!   consumers:
//!     - repo: acme/storefront
//!       change_triggers: [api_contract, authentication]
//!       context: Storefront calls the invoice endpoints
//!   derivatives:
//!     - repo: acme/billing-api-eu
//!       shared_concerns: [error_handling, performance]
//!       divergent_concerns: [data_model]
//! ```
//!
//! JSON documents use the same shape. Every failure is fatal at load and
//! reported as [`Error::Config`].

use crate::models::{CategoryTag, Relationship, RelationshipKind, Urgency};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::instrument;

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    urgency_mapping: BTreeMap<String, String>,
    #[serde(flatten)]
    providers: BTreeMap<String, RawProvider>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProvider {
    #[serde(default)]
    consumers: Vec<RawRelationship>,
    #[serde(default)]
    derivatives: Vec<RawRelationship>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRelationship {
    #[serde(alias = "target", alias = "target_repo")]
    repo: Option<String>,
    kind: Option<String>,
    context: Option<String>,
    #[serde(default)]
    change_triggers: Vec<String>,
    #[serde(default)]
    shared_concerns: Vec<String>,
    #[serde(default)]
    divergent_concerns: Vec<String>,
}

/// Validated relationship graph.
#[derive(Debug, Clone, Default)]
struct RelationshipGraph {
    consumers: HashMap<String, Vec<Relationship>>,
    derivatives: HashMap<String, Vec<Relationship>>,
    urgency_mapping: BTreeMap<CategoryTag, Urgency>,
}

impl RelationshipGraph {
    fn build(
        relationships: impl IntoIterator<Item = Relationship>,
        urgency_mapping: BTreeMap<CategoryTag, Urgency>,
    ) -> Result<Self> {
        let mut graph = Self {
            urgency_mapping,
            ..Self::default()
        };
        let mut seen = HashSet::new();
        for relationship in relationships {
            validate_relationship(&relationship)?;
            let id = relationship.id();
            if !seen.insert(id.clone()) {
                return Err(Error::Config(format!("duplicate relationship {id}")));
            }
            let bucket = if relationship.kind.is_consumer() {
                &mut graph.consumers
            } else {
                &mut graph.derivatives
            };
            bucket
                .entry(relationship.provider_repo.clone())
                .or_default()
                .push(relationship);
        }
        Ok(graph)
    }

    fn from_raw(raw: RawDocument) -> Result<Self> {
        let mut urgency_mapping = BTreeMap::new();
        for (tag, urgency) in raw.urgency_mapping {
            let tag = parse_tag(&tag, "urgency_mapping")?;
            let urgency = Urgency::parse(&urgency).ok_or_else(|| {
                Error::Config(format!("urgency_mapping.{tag}: unknown urgency '{urgency}'"))
            })?;
            urgency_mapping.insert(tag, urgency);
        }

        let mut relationships = Vec::new();
        for (provider, entry) in raw.providers {
            for (index, raw_rel) in entry.consumers.into_iter().enumerate() {
                let location = format!("{provider}.consumers[{index}]");
                relationships.push(convert(&provider, raw_rel, true, &location)?);
            }
            for (index, raw_rel) in entry.derivatives.into_iter().enumerate() {
                let location = format!("{provider}.derivatives[{index}]");
                relationships.push(convert(&provider, raw_rel, false, &location)?);
            }
        }

        Self::build(relationships, urgency_mapping)
    }

    fn relationship_count(&self) -> usize {
        self.consumers.values().map(Vec::len).sum::<usize>()
            + self.derivatives.values().map(Vec::len).sum::<usize>()
    }
}

fn parse_tag(value: &str, location: &str) -> Result<CategoryTag> {
    CategoryTag::parse(value)
        .ok_or_else(|| Error::Config(format!("{location}: unknown category tag '{value}'")))
}

fn parse_tags(values: &[String], location: &str) -> Result<BTreeSet<CategoryTag>> {
    values.iter().map(|v| parse_tag(v, location)).collect()
}

fn convert(
    provider: &str,
    raw: RawRelationship,
    in_consumers: bool,
    location: &str,
) -> Result<Relationship> {
    let expected = if in_consumers { "consumer" } else { "template" };
    if let Some(kind) = raw.kind.as_deref() {
        let kind = kind.trim().to_lowercase();
        if kind != "consumer" && kind != "template" {
            return Err(Error::Config(format!("{location}: unknown kind '{kind}'")));
        }
        if kind != expected {
            return Err(Error::Config(format!(
                "{location}: kind '{kind}' listed where '{expected}' is expected"
            )));
        }
    }

    let target = raw
        .repo
        .map(|r| r.trim().to_string())
        .ok_or_else(|| Error::Config(format!("{location}: missing required field 'repo'")))?;

    let kind = if in_consumers {
        if !raw.shared_concerns.is_empty() || !raw.divergent_concerns.is_empty() {
            return Err(Error::Config(format!(
                "{location}: consumers take change_triggers, not concerns"
            )));
        }
        RelationshipKind::Consumer {
            change_triggers: parse_tags(&raw.change_triggers, location)?,
        }
    } else {
        if !raw.change_triggers.is_empty() {
            return Err(Error::Config(format!(
                "{location}: derivatives take shared/divergent concerns, not change_triggers"
            )));
        }
        RelationshipKind::Template {
            shared_concerns: parse_tags(&raw.shared_concerns, location)?,
            divergent_concerns: parse_tags(&raw.divergent_concerns, location)?,
        }
    };

    Ok(Relationship {
        provider_repo: provider.to_string(),
        target_repo: target,
        context: raw.context.filter(|c| !c.trim().is_empty()),
        kind,
    })
}

fn validate_relationship(relationship: &Relationship) -> Result<()> {
    let id = relationship.id();
    if relationship.provider_repo.trim().is_empty() {
        return Err(Error::Config(format!("{id}: empty provider repository")));
    }
    if relationship.target_repo.trim().is_empty() {
        return Err(Error::Config(format!("{id}: empty target repository")));
    }
    if relationship.provider_repo == relationship.target_repo {
        return Err(Error::Config(format!("{id}: relationship points at itself")));
    }
    match &relationship.kind {
        RelationshipKind::Consumer { change_triggers } if change_triggers.is_empty() => Err(
            Error::Config(format!("{id}: consumer needs at least one change trigger")),
        ),
        RelationshipKind::Template {
            shared_concerns, ..
        } if shared_concerns.is_empty() => Err(Error::Config(format!(
            "{id}: template needs at least one shared concern"
        ))),
        RelationshipKind::Template {
            shared_concerns,
            divergent_concerns,
        } => match shared_concerns.intersection(divergent_concerns).next() {
            Some(tag) => Err(Error::Config(format!(
                "{id}: '{tag}' is both a shared and a divergent concern"
            ))),
            None => Ok(()),
        },
        RelationshipKind::Consumer { .. } => Ok(()),
    }
}

fn parse_document(contents: &str, yaml: bool) -> Result<RelationshipGraph> {
    if contents.trim().is_empty() {
        return Ok(RelationshipGraph::default());
    }
    let raw: RawDocument = if yaml {
        serde_yaml_ng::from_str(contents)
            .map_err(|e| Error::Config(format!("relationship registry: {e}")))?
    } else {
        serde_json::from_str(contents)
            .map_err(|e| Error::Config(format!("relationship registry: {e}")))?
    };
    RelationshipGraph::from_raw(raw)
}

fn is_yaml_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}

fn read_document(path: &Path) -> Result<RelationshipGraph> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read relationship registry {}: {e}", path.display()))
    })?;
    parse_document(&contents, is_yaml_path(path))
}

/// Read-mostly registry of provider → dependent relationships.
///
/// Reads take a shared lock; [`RelationshipRegistry::reload`] takes the
/// exclusive lock, so readers never observe a half-built graph.
#[derive(Debug, Default)]
pub struct RelationshipRegistry {
    source: Option<PathBuf>,
    graph: RwLock<RelationshipGraph>,
}

impl RelationshipRegistry {
    /// Creates a registry with no relationships.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the registry from a JSON or YAML file (by extension).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is unreadable or invalid.
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let graph = read_document(path)?;
        tracing::info!(
            relationships = graph.relationship_count(),
            "Loaded relationship registry"
        );
        Ok(Self {
            source: Some(path.to_path_buf()),
            graph: RwLock::new(graph),
        })
    }

    /// Parses a JSON registry document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is invalid.
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(Self {
            source: None,
            graph: RwLock::new(parse_document(contents, false)?),
        })
    }

    /// Parses a YAML registry document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is invalid.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(Self {
            source: None,
            graph: RwLock::new(parse_document(contents, true)?),
        })
    }

    /// Builds a registry from already constructed relationships.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any relationship is invalid or duplicated.
    pub fn from_relationships(
        relationships: impl IntoIterator<Item = Relationship>,
        urgency_mapping: impl IntoIterator<Item = (CategoryTag, Urgency)>,
    ) -> Result<Self> {
        Ok(Self {
            source: None,
            graph: RwLock::new(RelationshipGraph::build(
                relationships,
                urgency_mapping.into_iter().collect(),
            )?),
        })
    }

    /// Re-reads the source file and swaps the graph in.
    ///
    /// On failure the previous graph stays active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the registry has no source file or the
    /// new document is invalid.
    pub fn reload(&self) -> Result<()> {
        let path = self.source.as_deref().ok_or_else(|| {
            Error::Config("relationship registry was not loaded from a file".to_string())
        })?;
        let mut graph = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        let next = read_document(path).inspect_err(|e| {
            tracing::warn!(error = %e, "Registry reload failed, keeping previous graph");
        })?;
        *graph = next;
        tracing::info!(relationships = graph.relationship_count(), "Reloaded relationship registry");
        Ok(())
    }

    /// Consumer relationships whose provider is `provider`.
    #[must_use]
    pub fn consumers_of(&self, provider: &str) -> Vec<Relationship> {
        self.read()
            .consumers
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    /// Template relationships whose provider is `provider`.
    #[must_use]
    pub fn derivatives_of(&self, provider: &str) -> Vec<Relationship> {
        self.read()
            .derivatives
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    /// Urgency floor configured for `tag`, if any.
    #[must_use]
    pub fn urgency_floor(&self, tag: CategoryTag) -> Option<Urgency> {
        self.read().urgency_mapping.get(&tag).copied()
    }

    /// Highest configured floor across `tags`.
    #[must_use]
    pub fn max_urgency_floor<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a CategoryTag>,
    ) -> Option<Urgency> {
        let graph = self.read();
        tags.into_iter()
            .filter_map(|tag| graph.urgency_mapping.get(tag).copied())
            .max()
    }

    /// Number of distinct providers with at least one relationship.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        let graph = self.read();
        graph
            .consumers
            .keys()
            .chain(graph.derivatives.keys())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Total number of relationships.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.read().relationship_count()
    }

    /// Every relationship, ordered by id.
    #[must_use]
    pub fn relationships(&self) -> Vec<Relationship> {
        let graph = self.read();
        let mut all: Vec<Relationship> = graph
            .consumers
            .values()
            .chain(graph.derivatives.values())
            .flatten()
            .cloned()
            .collect();
        all.sort_by_key(Relationship::id);
        all
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RelationshipGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_YAML: &str = r"
urgency_mapping:
  security: critical
acme/api:
  consumers:
    - repo: acme/web
      change_triggers: [api_contract]
    - repo: acme/mobile
      kind: consumer
      change_triggers: [api_contract, authentication]
  derivatives:
    - repo: acme/api-eu
      shared_concerns: [error_handling]
      divergent_concerns: [data_model]
";

    #[test]
    fn test_load_yaml() {
        let registry = RelationshipRegistry::from_yaml(VALID_YAML).expect("valid");
        assert_eq!(registry.consumers_of("acme/api").len(), 2);
        assert_eq!(registry.derivatives_of("acme/api").len(), 1);
        assert_eq!(registry.provider_count(), 1);
        assert_eq!(registry.relationship_count(), 3);
        assert_eq!(
            registry.urgency_floor(CategoryTag::Security),
            Some(Urgency::Critical)
        );
    }

    #[test]
    fn test_unknown_provider_is_empty() {
        let registry = RelationshipRegistry::from_yaml(VALID_YAML).expect("valid");
        assert!(registry.consumers_of("nobody").is_empty());
        assert!(registry.derivatives_of("nobody").is_empty());
    }

    #[test]
    fn test_load_json() {
        let json = r#"{
            "acme/api": {
                "consumers": [{"repo": "acme/web", "change_triggers": ["api_contract"]}]
            }
        }"#;
        let registry = RelationshipRegistry::from_json(json).expect("valid");
        assert_eq!(registry.consumers_of("acme/api")[0].target_repo, "acme/web");
    }

    #[test]
    fn test_empty_document_is_empty_registry() {
        let registry = RelationshipRegistry::from_json("  ").expect("valid");
        assert_eq!(registry.relationship_count(), 0);
    }

    fn config_error(yaml: &str) -> String {
        match RelationshipRegistry::from_yaml(yaml) {
            Err(Error::Config(msg)) => msg,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_repo_is_config_error() {
        let msg = config_error("p:\n  consumers:\n    - change_triggers: [api_contract]\n");
        assert!(msg.contains("missing required field 'repo'"));
    }

    #[test]
    fn test_unknown_kind_is_config_error() {
        let msg = config_error(
            "p:\n  consumers:\n    - repo: c\n      kind: fork\n      change_triggers: [api_contract]\n",
        );
        assert!(msg.contains("unknown kind"));
    }

    #[test]
    fn test_mismatched_kind_is_config_error() {
        let msg = config_error(
            "p:\n  consumers:\n    - repo: c\n      kind: template\n      change_triggers: [api_contract]\n",
        );
        assert!(msg.contains("expected"));
    }

    #[test]
    fn test_unknown_tag_is_config_error() {
        let msg = config_error("p:\n  consumers:\n    - repo: c\n      change_triggers: [vibes]\n");
        assert!(msg.contains("unknown category tag 'vibes'"));
    }

    #[test]
    fn test_empty_triggers_is_config_error() {
        let msg = config_error("p:\n  consumers:\n    - repo: c\n");
        assert!(msg.contains("at least one change trigger"));
    }

    #[test]
    fn test_overlapping_concerns_is_config_error() {
        let msg = config_error(
            "p:\n  derivatives:\n    - repo: d\n      shared_concerns: [testing]\n      divergent_concerns: [testing]\n",
        );
        assert!(msg.contains("both a shared and a divergent"));
    }

    #[test]
    fn test_self_edge_and_duplicates_rejected() {
        let self_edge = Relationship::consumer("p", "p", [CategoryTag::Testing]);
        assert!(RelationshipRegistry::from_relationships([self_edge], []).is_err());

        let rel = Relationship::consumer("p", "c", [CategoryTag::Testing]);
        let result = RelationshipRegistry::from_relationships([rel.clone(), rel], []);
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        let err = RelationshipRegistry::from_yaml(
            "p:\n  consumers:\n    - repo: c\n      trigers: [api_contract]\n",
        );
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_reload_keeps_previous_graph_on_error() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        file.write_all(VALID_YAML.as_bytes()).expect("write");
        let registry = RelationshipRegistry::load(file.path()).expect("load");

        std::fs::write(file.path(), "p:\n  consumers:\n    - repo: c\n").expect("rewrite");
        assert!(registry.reload().is_err());
        assert_eq!(registry.relationship_count(), 3);

        std::fs::write(
            file.path(),
            "p:\n  consumers:\n    - repo: c\n      change_triggers: [testing]\n",
        )
        .expect("rewrite");
        registry.reload().expect("reload");
        assert_eq!(registry.relationship_count(), 1);
        assert_eq!(registry.consumers_of("p").len(), 1);
    }

    #[test]
    fn test_reload_without_source_fails() {
        let registry = RelationshipRegistry::empty();
        assert!(registry.reload().is_err());
    }

    #[test]
    fn test_relationships_sorted() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(
            br#"{"b": {"consumers": [{"repo": "x", "change_triggers": ["testing"]}]},
                 "a": {"consumers": [{"repo": "y", "change_triggers": ["testing"]}]}}"#,
        )
        .expect("write");
        let registry = RelationshipRegistry::load(file.path()).expect("load");
        let ids: Vec<String> = registry
            .relationships()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a->y#consumer", "b->x#consumer"]);
    }
}
