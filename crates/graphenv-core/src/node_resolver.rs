//! Node-type resolution against the global mapping table.
//!
//! A node resolves in two steps:
//! 1. If it carries provenance, the named package is looked up directly (by
//!    registry id, then identity). It wins if it provides the node's type.
//! 2. Otherwise, every package providing the type is a candidate. Candidates
//!    are deduplicated by canonical identity and kept in table order.
//!
//! Resolution is a pure function of the references and the table.

use node_registry::{GlobalMappingTable, PackageEntry};

use crate::domain::{MatchKind, NodeReference, NodeResolution, ResolutionEntry};
use crate::identity::normalize;

/// Resolver bound to one mapping-table snapshot.
///
/// Canonical identities are computed once per snapshot, not per node.
pub struct GlobalNodeResolver<'a> {
    table: &'a GlobalMappingTable,
    canonical: Vec<(String, &'a PackageEntry)>,
}

impl<'a> GlobalNodeResolver<'a> {
    pub fn new(table: &'a GlobalMappingTable) -> Self {
        let canonical = table
            .packages()
            .map(|p| (normalize(Some(&p.identity)), p))
            .collect();
        Self { table, canonical }
    }

    /// Resolve every reference, in input order.
    pub fn resolve(&self, refs: &[NodeReference]) -> Vec<NodeResolution> {
        refs.iter().map(|r| self.resolve_one(r)).collect()
    }

    pub fn resolve_one(&self, reference: &NodeReference) -> NodeResolution {
        if let Some(package) = self.provenance_package(reference) {
            if package.provides(&reference.type_name) {
                return NodeResolution {
                    reference: reference.clone(),
                    entry: ResolutionEntry::Resolved(normalize(Some(&package.identity))),
                    matched_by: Some(MatchKind::Provenance),
                };
            }
        }

        let mut candidates: Vec<String> = Vec::new();
        for (identity, package) in &self.canonical {
            if package.provides(&reference.type_name) && !candidates.contains(identity) {
                candidates.push(identity.clone());
            }
        }

        let entry = ResolutionEntry::from_candidates(candidates);
        let matched_by = entry.is_resolved().then_some(MatchKind::NodeType);
        NodeResolution {
            reference: reference.clone(),
            entry,
            matched_by,
        }
    }

    fn provenance_package(&self, reference: &NodeReference) -> Option<&'a PackageEntry> {
        let package_id = reference.provenance.as_ref()?.package_id.trim();
        if package_id.is_empty() {
            return None;
        }

        let table: &'a GlobalMappingTable = self.table;
        table
            .get_by_registry_id(package_id)
            .or_else(|| table.get(package_id))
            .or_else(|| {
                let wanted = normalize(Some(package_id));
                self.canonical
                    .iter()
                    .find(|(identity, _)| *identity == wanted)
                    .map(|(_, package)| *package)
            })
    }
}

/// Resolve `refs` against `table` in one call.
pub fn resolve_nodes(refs: &[NodeReference], table: &GlobalMappingTable) -> Vec<NodeResolution> {
    GlobalNodeResolver::new(table).resolve(refs)
}
