//! Model resolution through a [`ModelLookup`] collaborator.
//!
//! Each reference tries its content hash first, then its filename. Zero
//! candidates falls through; one resolves; several are ambiguous and the
//! collaborator's order is kept as-is. A failed lookup counts as zero
//! candidates for that reference only.
//!
//! References are independent, so their lookups run concurrently; results
//! come back in input order.

use futures::future::join_all;
use node_registry::{ModelCandidate, ModelLookup};

use crate::domain::{EnvError, MatchKind, ModelReference, ModelResolution, ResolutionEntry};
use crate::obs;

pub struct ModelResolver<'a> {
    lookup: &'a dyn ModelLookup,
}

/// Classify candidates, or `None` when there are none. Duplicate source ids
/// collapse into their first occurrence.
fn classify(candidates: Vec<ModelCandidate>) -> Option<ResolutionEntry> {
    let mut ids: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !ids.contains(&candidate.source_id) {
            ids.push(candidate.source_id);
        }
    }
    match ResolutionEntry::from_candidates(ids) {
        ResolutionEntry::Unresolved => None,
        entry => Some(entry),
    }
}

impl<'a> ModelResolver<'a> {
    pub fn new(lookup: &'a dyn ModelLookup) -> Self {
        Self { lookup }
    }

    /// Resolve every reference, in input order.
    pub async fn resolve(&self, refs: &[ModelReference]) -> Vec<ModelResolution> {
        join_all(refs.iter().map(|r| self.resolve_one(r))).await
    }

    pub async fn resolve_one(&self, reference: &ModelReference) -> ModelResolution {
        let mut lookup_error = None;

        if let Some(hash) = reference.content_hash.as_deref().filter(|h| !h.is_empty()) {
            match self.lookup.by_hash(hash).await {
                Ok(candidates) => {
                    if let Some(entry) = classify(candidates) {
                        return ModelResolution {
                            reference: reference.clone(),
                            entry,
                            matched_by: Some(MatchKind::ContentHash),
                            lookup_error,
                        };
                    }
                }
                Err(source) => lookup_error = Some(degrade(reference, source)),
            }
        }

        let (entry, matched_by) = match self.lookup.by_filename(&reference.filename).await {
            Ok(candidates) => match classify(candidates) {
                Some(entry) => (entry, Some(MatchKind::Filename)),
                None => (ResolutionEntry::Unresolved, None),
            },
            Err(source) => {
                lookup_error = Some(degrade(reference, source));
                (ResolutionEntry::Unresolved, None)
            }
        };

        ModelResolution {
            reference: reference.clone(),
            entry,
            matched_by,
            lookup_error,
        }
    }
}

fn degrade(reference: &ModelReference, source: node_registry::RegistryError) -> String {
    let err = EnvError::ResolutionLookup {
        reference: reference.to_string(),
        source,
    };
    obs::emit_lookup_degraded(&err);
    err.to_string()
}

/// Resolve `refs` through `lookup` in one call.
pub async fn resolve_models(
    refs: &[ModelReference],
    lookup: &dyn ModelLookup,
) -> Vec<ModelResolution> {
    ModelResolver::new(lookup).resolve(refs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use node_registry::{ModelIndex, RegistryError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn index() -> ModelIndex {
        ModelIndex::new(vec![
            ModelCandidate::new("hf:sd15", "v1-5-pruned.safetensors").with_hash("aaaa"),
            ModelCandidate::new("civitai:1", "model.safetensors").with_hash("bbbb"),
            ModelCandidate::new("civitai:2", "model.safetensors").with_hash("cccc"),
            ModelCandidate::new("local:upscaler", "4x.pth"),
        ])
    }

    #[tokio::test]
    async fn test_hash_match_wins() {
        let reference = ModelReference::new("renamed.safetensors", "4", "ckpt_name").with_hash("AAAA");
        let resolution = resolve_models(&[reference], &index()).await.remove(0);
        assert_eq!(resolution.entry, ResolutionEntry::Resolved("hf:sd15".into()));
        assert_eq!(resolution.matched_by, Some(MatchKind::ContentHash));
    }

    #[tokio::test]
    async fn test_unknown_hash_falls_through_to_filename() {
        let reference = ModelReference::new("4x.pth", "7", "model_name").with_hash("ffff");
        let resolution = resolve_models(&[reference], &index()).await.remove(0);
        assert_eq!(
            resolution.entry,
            ResolutionEntry::Resolved("local:upscaler".into())
        );
        assert_eq!(resolution.matched_by, Some(MatchKind::Filename));
    }

    #[tokio::test]
    async fn test_filename_ambiguity_keeps_lookup_order() {
        let reference = ModelReference::new("model.safetensors", "4", "ckpt_name");
        let resolution = resolve_models(&[reference], &index()).await.remove(0);
        assert_eq!(
            resolution.entry,
            ResolutionEntry::Ambiguous(vec!["civitai:1".into(), "civitai:2".into()])
        );
    }

    #[tokio::test]
    async fn test_nothing_found_is_unresolved() {
        let reference = ModelReference::new("missing.ckpt", "4", "ckpt_name");
        let resolution = resolve_models(&[reference], &index()).await.remove(0);
        assert_eq!(resolution.entry, ResolutionEntry::Unresolved);
        assert!(resolution.lookup_error.is_none());
    }

    /// Fails every lookup for one filename, answers the rest from an index.
    struct FlakyLookup {
        inner: ModelIndex,
        poisoned: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelLookup for FlakyLookup {
        async fn by_hash(&self, hash: &str) -> node_registry::Result<Vec<ModelCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.by_hash(hash).await
        }

        async fn by_filename(&self, filename: &str) -> node_registry::Result<Vec<ModelCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if filename == self.poisoned {
                return Err(RegistryError::Http("connection reset".into()));
            }
            self.inner.by_filename(filename).await
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_degrades_single_reference() {
        let lookup = FlakyLookup {
            inner: index(),
            poisoned: "v1-5-pruned.safetensors",
            calls: AtomicUsize::new(0),
        };
        let refs = vec![
            ModelReference::new("v1-5-pruned.safetensors", "1", "ckpt_name"),
            ModelReference::new("4x.pth", "2", "model_name"),
        ];

        let resolutions = resolve_models(&refs, &lookup).await;
        assert_eq!(resolutions[0].entry, ResolutionEntry::Unresolved);
        assert!(resolutions[0]
            .lookup_error
            .as_deref()
            .unwrap()
            .contains("connection reset"));
        assert_eq!(
            resolutions[1].entry,
            ResolutionEntry::Resolved("local:upscaler".into())
        );
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    /// Answers slower for earlier filenames so completion order is reversed.
    struct SlowFirstLookup;

    #[async_trait]
    impl ModelLookup for SlowFirstLookup {
        async fn by_hash(&self, _hash: &str) -> node_registry::Result<Vec<ModelCandidate>> {
            Ok(vec![])
        }

        async fn by_filename(&self, filename: &str) -> node_registry::Result<Vec<ModelCandidate>> {
            let delay = if filename.starts_with('a') { 30 } else { 1 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(vec![ModelCandidate::new(format!("src:{filename}"), filename)])
        }
    }

    #[tokio::test]
    async fn test_output_order_is_input_order() {
        let refs = vec![
            ModelReference::new("a.safetensors", "1", "ckpt_name"),
            ModelReference::new("b.safetensors", "2", "ckpt_name"),
            ModelReference::new("c.safetensors", "3", "ckpt_name"),
        ];
        let sources: Vec<ResolutionEntry> = resolve_models(&refs, &SlowFirstLookup)
            .await
            .into_iter()
            .map(|r| r.entry)
            .collect();
        assert_eq!(
            sources,
            vec![
                ResolutionEntry::Resolved("src:a.safetensors".into()),
                ResolutionEntry::Resolved("src:b.safetensors".into()),
                ResolutionEntry::Resolved("src:c.safetensors".into()),
            ]
        );
    }
}
