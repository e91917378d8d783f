//! Model lookup capability
//!
//! `ModelLookup` answers "which known model sources match this content hash /
//! filename". Implementations may be a local index or a remote registry; the
//! resolver consuming them never re-ranks the candidates they return.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::hashing::{hash_model_file, is_model_file};
use crate::http::RegistryHttp;
use crate::Result;

/// One known source for a model artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Stable identifier of the source (registry key, URL or index path)
    pub source_id: String,
    pub filename: String,
    /// Lowercase SHA-256 hex of the file content, when known
    #[serde(default)]
    pub content_hash: Option<String>,
    /// Download location
    #[serde(default)]
    pub url: Option<String>,
    /// Location relative to the models directory (e.g. `checkpoints/x.safetensors`)
    #[serde(default)]
    pub relative_path: Option<String>,
}

impl ModelCandidate {
    pub fn new(source_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            filename: filename.into(),
            content_hash: None,
            url: None,
            relative_path: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into().to_ascii_lowercase());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Lookup capability over known model sources.
#[async_trait]
pub trait ModelLookup: Send + Sync {
    /// Candidates whose content hash equals `hash`.
    async fn by_hash(&self, hash: &str) -> Result<Vec<ModelCandidate>>;

    /// Candidates whose file name equals the file name component of `filename`.
    async fn by_filename(&self, filename: &str) -> Result<Vec<ModelCandidate>>;
}

/// Final path component, accepting both `/` and `\` separators.
fn file_name_of(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// In-memory model index, usually loaded from a JSON document or built by
/// scanning a local models directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelIndex {
    models: Vec<ModelCandidate>,
}

impl ModelIndex {
    pub fn new(models: Vec<ModelCandidate>) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &[ModelCandidate] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Parse a JSON list of candidates (or `{ "models": [...] }`).
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let models = match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)?,
            serde_json::Value::Object(mut obj) => match obj.remove("models") {
                Some(models) => serde_json::from_value(models)?,
                None => {
                    return Err(RegistryError::InvalidModelIndex(
                        "expected a list or an object with a `models` list".to_string(),
                    ))
                }
            },
            _ => {
                return Err(RegistryError::InvalidModelIndex(
                    "expected a list or an object with a `models` list".to_string(),
                ))
            }
        };
        Ok(Self { models })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let index = Self::from_slice(&bytes)?;
        info!(path = %path.display(), models = index.len(), "loaded model index");
        Ok(index)
    }

    /// Index every model file under `models_dir`, hashing each one.
    ///
    /// `source_id` and `relative_path` are the path relative to `models_dir`
    /// with `/` separators. Files are visited in sorted order.
    pub fn scan(models_dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        collect_model_files(models_dir, &mut files)?;
        files.sort();

        let mut models = Vec::with_capacity(files.len());
        for path in files {
            let relative = path
                .strip_prefix(models_dir)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| relative.clone());
            let hash = hash_model_file(&path)?;
            debug!(model = %relative, hash = %&hash[..12], "indexed model");

            models.push(ModelCandidate {
                source_id: relative.clone(),
                filename,
                content_hash: Some(hash),
                url: None,
                relative_path: Some(relative),
            });
        }
        Ok(Self { models })
    }
}

fn collect_model_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_model_files(&path, files)?;
        } else if is_model_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

#[async_trait]
impl ModelLookup for ModelIndex {
    async fn by_hash(&self, hash: &str) -> Result<Vec<ModelCandidate>> {
        Ok(self
            .models
            .iter()
            .filter(|m| {
                m.content_hash
                    .as_deref()
                    .map(|h| h.eq_ignore_ascii_case(hash))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn by_filename(&self, filename: &str) -> Result<Vec<ModelCandidate>> {
        let wanted = file_name_of(filename);
        Ok(self
            .models
            .iter()
            .filter(|m| file_name_of(&m.filename) == wanted)
            .cloned()
            .collect())
    }
}

/// Remote model registry client.
///
/// Endpoints (relative to `base_url`):
/// - `GET /models/by-hash/{sha256}` → `[ModelCandidate]`
/// - `GET /models/by-filename/{name}` → `[ModelCandidate]`
///
/// A `404` means "no candidates".
#[derive(Debug, Clone)]
pub struct HttpModelRegistry {
    http: RegistryHttp,
    base_url: String,
}

impl HttpModelRegistry {
    pub fn new(config: &RegistryConfig, base_url: &str) -> Result<Self> {
        Ok(Self {
            http: RegistryHttp::new(config)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn query(&self, path: &str) -> Result<Vec<ModelCandidate>> {
        let url = format!("{}{}", self.base_url, path);
        Ok(self.http.get_json(&url).await?.unwrap_or_default())
    }
}

#[async_trait]
impl ModelLookup for HttpModelRegistry {
    async fn by_hash(&self, hash: &str) -> Result<Vec<ModelCandidate>> {
        self.query(&format!("/models/by-hash/{}", hash.to_ascii_lowercase()))
            .await
    }

    async fn by_filename(&self, filename: &str) -> Result<Vec<ModelCandidate>> {
        let name = file_name_of(filename);
        if name.is_empty() || name.contains(['?', '#', '%']) {
            warn!(filename = %filename, "filename not queryable against remote registry");
            return Ok(Vec::new());
        }
        self.query(&format!("/models/by-filename/{name}")).await
    }
}

/// Pick the configured model lookup: local index first, then remote registry.
pub async fn model_lookup(config: &RegistryConfig) -> Result<Box<dyn ModelLookup>> {
    if let Some(path) = &config.model_index {
        return Ok(Box::new(ModelIndex::load(path).await?));
    }
    if let Some(url) = &config.model_registry_url {
        return Ok(Box::new(HttpModelRegistry::new(config, url)?));
    }
    Err(RegistryError::NotConfigured(
        "set GRAPHENV_MODEL_INDEX or GRAPHENV_MODEL_REGISTRY_URL".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn index() -> ModelIndex {
        ModelIndex::new(vec![
            ModelCandidate::new("hf:sd15", "v1-5-pruned.safetensors").with_hash("AAAA"),
            ModelCandidate::new("civitai:1", "model.safetensors").with_hash("bbbb"),
            ModelCandidate::new("civitai:2", "model.safetensors").with_hash("cccc"),
        ])
    }

    #[tokio::test]
    async fn test_by_hash_is_case_insensitive() {
        let found = index().by_hash("aaaa").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_id, "hf:sd15");
    }

    #[tokio::test]
    async fn test_by_filename_matches_file_name_component() {
        let found = index()
            .by_filename("checkpoints\\sub/model.safetensors")
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, vec!["civitai:1", "civitai:2"]);
    }

    #[tokio::test]
    async fn test_unknown_lookups_return_empty() {
        assert!(index().by_hash("ffff").await.unwrap().is_empty());
        assert!(index().by_filename("missing.ckpt").await.unwrap().is_empty());
    }

    #[test]
    fn test_from_slice_accepts_both_shapes() {
        let list = r#"[{"source_id": "a", "filename": "a.safetensors"}]"#;
        let wrapped = r#"{"models": [{"source_id": "a", "filename": "a.safetensors"}]}"#;
        assert_eq!(ModelIndex::from_slice(list.as_bytes()).unwrap().len(), 1);
        assert_eq!(ModelIndex::from_slice(wrapped.as_bytes()).unwrap().len(), 1);
        assert!(ModelIndex::from_slice(b"42").is_err());
    }

    #[tokio::test]
    async fn test_scan_indexes_model_files_only() {
        let dir = tempdir().unwrap();
        let checkpoints = dir.path().join("checkpoints");
        std::fs::create_dir_all(&checkpoints).unwrap();
        std::fs::write(checkpoints.join("a.safetensors"), b"weights-a").unwrap();
        std::fs::write(checkpoints.join("readme.txt"), b"not a model").unwrap();
        std::fs::write(dir.path().join("b.ckpt"), b"weights-b").unwrap();

        let index = ModelIndex::scan(dir.path()).unwrap();
        let ids: Vec<&str> = index.models().iter().map(|m| m.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b.ckpt", "checkpoints/a.safetensors"]);

        let hash = hash_model_file(&checkpoints.join("a.safetensors")).unwrap();
        let found = index.by_hash(&hash).await.unwrap();
        assert_eq!(found[0].filename, "a.safetensors");
    }

    #[tokio::test]
    async fn test_model_lookup_requires_configuration() {
        assert!(model_lookup(&RegistryConfig::empty()).await.is_err());
    }
}
