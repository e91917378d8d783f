//! Resolution outcomes.
//!
//! `ResolutionEntry` is a closed sum type: every consumer matches all three
//! cases. `ResolutionResult` is the single source of truth for whether a
//! workflow needs human attention.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::references::{ModelReference, NodeReference};

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "source", rename_all = "snake_case")]
pub enum ResolutionEntry {
    Resolved(String),
    Unresolved,
    /// Candidates in the order the registry reported them
    Ambiguous(Vec<String>),
}

impl ResolutionEntry {
    /// Classify a candidate list: none, exactly one, or several.
    pub fn from_candidates(candidates: Vec<String>) -> Self {
        let mut candidates = candidates;
        match candidates.len() {
            0 => ResolutionEntry::Unresolved,
            1 => ResolutionEntry::Resolved(candidates.remove(0)),
            _ => ResolutionEntry::Ambiguous(candidates),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionEntry::Resolved(_))
    }
}

/// How a resolved reference was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The node named its own package
    Provenance,
    /// Mapping-table scan by node type
    NodeType,
    ContentHash,
    Filename,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Provenance => "provenance",
            MatchKind::NodeType => "node_type",
            MatchKind::ContentHash => "content_hash",
            MatchKind::Filename => "filename",
        }
    }
}

/// Resolver output for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResolution {
    pub reference: NodeReference,
    pub entry: ResolutionEntry,
    pub matched_by: Option<MatchKind>,
}

/// Resolver output for one model input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResolution {
    pub reference: ModelReference,
    pub entry: ResolutionEntry,
    pub matched_by: Option<MatchKind>,
    /// Lookup failure that degraded this reference, if any
    pub lookup_error: Option<String>,
}

/// A reference with exactly one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolved<R> {
    pub reference: R,
    pub source_id: String,
    pub matched_by: MatchKind,
}

/// A reference with several equally plausible sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambiguous<R> {
    pub reference: R,
    pub candidates: Vec<String>,
}

pub type ResolvedNode = Resolved<NodeReference>;
pub type ResolvedModel = Resolved<ModelReference>;

/// Aggregate outcome of a resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub nodes_resolved: Vec<ResolvedNode>,
    pub nodes_unresolved: Vec<NodeReference>,
    pub nodes_ambiguous: Vec<Ambiguous<NodeReference>>,
    pub models_resolved: Vec<ResolvedModel>,
    pub models_unresolved: Vec<ModelReference>,
    pub models_ambiguous: Vec<Ambiguous<ModelReference>>,
    /// Lookup failures absorbed during the pass (informational)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lookup_failures: Vec<String>,
}

impl ResolutionResult {
    pub fn from_resolutions(nodes: Vec<NodeResolution>, models: Vec<ModelResolution>) -> Self {
        let mut result = Self::default();

        for NodeResolution {
            reference,
            entry,
            matched_by,
        } in nodes
        {
            match entry {
                ResolutionEntry::Resolved(source_id) => result.nodes_resolved.push(Resolved {
                    reference,
                    source_id,
                    matched_by: matched_by.unwrap_or(MatchKind::NodeType),
                }),
                ResolutionEntry::Unresolved => result.nodes_unresolved.push(reference),
                ResolutionEntry::Ambiguous(candidates) => {
                    result.nodes_ambiguous.push(Ambiguous {
                        reference,
                        candidates,
                    })
                }
            }
        }

        for ModelResolution {
            reference,
            entry,
            matched_by,
            lookup_error,
        } in models
        {
            if let Some(err) = lookup_error {
                result.lookup_failures.push(format!("{reference}: {err}"));
            }
            match entry {
                ResolutionEntry::Resolved(source_id) => result.models_resolved.push(Resolved {
                    reference,
                    source_id,
                    matched_by: matched_by.unwrap_or(MatchKind::Filename),
                }),
                ResolutionEntry::Unresolved => result.models_unresolved.push(reference),
                ResolutionEntry::Ambiguous(candidates) => {
                    result.models_ambiguous.push(Ambiguous {
                        reference,
                        candidates,
                    })
                }
            }
        }

        result
    }

    /// References that need a human decision: unresolved or ambiguous, of
    /// either kind.
    pub fn issue_count(&self) -> usize {
        self.nodes_unresolved.len()
            + self.nodes_ambiguous.len()
            + self.models_unresolved.len()
            + self.models_ambiguous.len()
    }

    pub fn has_issues(&self) -> bool {
        self.issue_count() > 0
    }

    /// Resolved nodes that were found by type scan rather than provenance.
    pub fn legacy_node_matches(&self) -> usize {
        self.nodes_resolved
            .iter()
            .filter(|n| n.matched_by == MatchKind::NodeType)
            .count()
    }

    /// Append another pass's outcome, keeping order.
    pub fn merge(&mut self, other: ResolutionResult) {
        self.nodes_resolved.extend(other.nodes_resolved);
        self.nodes_unresolved.extend(other.nodes_unresolved);
        self.nodes_ambiguous.extend(other.nodes_ambiguous);
        self.models_resolved.extend(other.models_resolved);
        self.models_unresolved.extend(other.models_unresolved);
        self.models_ambiguous.extend(other.models_ambiguous);
        self.lookup_failures.extend(other.lookup_failures);
    }
}

impl fmt::Display for ResolutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes: {} resolved, {} unresolved, {} ambiguous; models: {} resolved, {} unresolved, {} ambiguous",
            self.nodes_resolved.len(),
            self.nodes_unresolved.len(),
            self.nodes_ambiguous.len(),
            self.models_resolved.len(),
            self.models_unresolved.len(),
            self.models_ambiguous.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, ty: &str) -> NodeReference {
        NodeReference::new(id, ty)
    }

    #[test]
    fn test_from_candidates() {
        assert_eq!(
            ResolutionEntry::from_candidates(vec![]),
            ResolutionEntry::Unresolved
        );
        assert_eq!(
            ResolutionEntry::from_candidates(vec!["a".into()]),
            ResolutionEntry::Resolved("a".into())
        );
        assert_eq!(
            ResolutionEntry::from_candidates(vec!["a".into(), "b".into()]),
            ResolutionEntry::Ambiguous(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_unresolved_nodes_alone_count_as_issues() {
        let result = ResolutionResult::from_resolutions(
            vec![NodeResolution {
                reference: node("3", "MysteryNode"),
                entry: ResolutionEntry::Unresolved,
                matched_by: None,
            }],
            vec![],
        );

        assert!(result.models_unresolved.is_empty());
        assert!(result.models_ambiguous.is_empty());
        assert_eq!(result.nodes_unresolved.len(), 1);
        assert!(result.has_issues());
    }

    #[test]
    fn test_ambiguous_models_alone_count_as_issues() {
        let result = ResolutionResult::from_resolutions(
            vec![],
            vec![ModelResolution {
                reference: ModelReference::new("model.safetensors", "4", "ckpt_name"),
                entry: ResolutionEntry::Ambiguous(vec!["a".into(), "b".into()]),
                matched_by: None,
                lookup_error: None,
            }],
        );
        assert!(result.has_issues());
        assert_eq!(result.issue_count(), 1);
    }

    #[test]
    fn test_fully_resolved_has_no_issues() {
        let result = ResolutionResult::from_resolutions(
            vec![NodeResolution {
                reference: node("1", "ImpactWildcardProcessor"),
                entry: ResolutionEntry::Resolved("https://github.com/ltdrdata/ComfyUI-Impact-Pack".into()),
                matched_by: Some(MatchKind::Provenance),
            }],
            vec![],
        );
        assert!(!result.has_issues());
        assert_eq!(result.legacy_node_matches(), 0);
    }

    #[test]
    fn test_merge_keeps_issues() {
        let mut total = ResolutionResult::default();
        assert!(!total.has_issues());

        total.merge(ResolutionResult::from_resolutions(
            vec![NodeResolution {
                reference: node("9", "Unknown"),
                entry: ResolutionEntry::Unresolved,
                matched_by: None,
            }],
            vec![],
        ));
        assert!(total.has_issues());
        assert_eq!(
            total.to_string(),
            "nodes: 0 resolved, 1 unresolved, 0 ambiguous; models: 0 resolved, 0 unresolved, 0 ambiguous"
        );
    }

    #[test]
    fn test_entry_serialization_is_tagged() {
        let json = serde_json::to_value(ResolutionEntry::Resolved("x".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "resolved", "source": "x"}));
        let json = serde_json::to_value(ResolutionEntry::Unresolved).unwrap();
        assert_eq!(json, serde_json::json!({"status": "unresolved"}));
    }
}
