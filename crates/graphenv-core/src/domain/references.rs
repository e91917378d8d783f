//! Dependency references extracted from workflow documents.
//!
//! References are produced once per node (or per model-consuming input) by
//! extraction and are never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Package hint carried by a node, naming the package it was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Registry id (e.g. `comfyui-impact-pack`) or repository URL
    pub package_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
}

impl Provenance {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            package_version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.package_version = Some(version.into());
        self
    }
}

/// One node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReference {
    pub id: String,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl NodeReference {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            provenance: None,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

impl fmt::Display for NodeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} ({})", self.id, self.type_name)
    }
}

/// One model-consuming input of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReference {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub node_id: String,
    pub input_slot: String,
}

impl ModelReference {
    pub fn new(
        filename: impl Into<String>,
        node_id: impl Into<String>,
        input_slot: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_hash: None,
            node_id: node_id.into(),
            input_slot: input_slot.into(),
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into().to_ascii_lowercase());
        self
    }

    /// `(node_id, input_slot)` key the resolution is reported under.
    pub fn key(&self) -> (&str, &str) {
        (&self.node_id, &self.input_slot)
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model {} (node {}, {})",
            self.filename, self.node_id, self.input_slot
        )
    }
}

/// Everything a workflow depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Custom nodes, to be resolved against the mapping table
    pub nodes: Vec<NodeReference>,
    pub models: Vec<ModelReference>,
    /// Nodes shipped with the application itself
    pub builtin_nodes: Vec<NodeReference>,
}

impl Dependencies {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.models.is_empty() && self.builtin_nodes.is_empty()
    }
}
