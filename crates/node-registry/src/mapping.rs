//! Global node mapping table
//!
//! Maps custom-node package identities to the node types they provide. The
//! table remembers insertion order: resolvers report ambiguous candidates in
//! that order so resolution output is identical across runs and platforms.
//!
//! Two document shapes are accepted:
//!
//! ```json
//! { "https://github.com/owner/repo": [["NodeA", "NodeB"], {"title_aux": "Repo", "cnr_id": "repo"}] }
//! ```
//!
//! ```json
//! { "packages": [{ "identity": "https://github.com/owner/repo", "node_types": ["NodeA"] }] }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::http::RegistryHttp;
use crate::Result;

/// One custom-node package known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    /// Repository URL as published by the registry
    pub identity: String,
    /// Short registry id (e.g. `comfyui-impact-pack`)
    #[serde(default)]
    pub registry_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Node types the package registers
    #[serde(default)]
    pub node_types: BTreeSet<String>,
}

impl PackageEntry {
    pub fn new<I, S>(identity: impl Into<String>, node_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity: identity.into(),
            registry_id: None,
            title: None,
            node_types: node_types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_registry_id(mut self, registry_id: impl Into<String>) -> Self {
        self.registry_id = Some(registry_id.into());
        self
    }

    /// Whether this package registers `type_name`.
    pub fn provides(&self, type_name: &str) -> bool {
        self.node_types.contains(type_name)
    }
}

/// Insertion-ordered package → node-type table.
#[derive(Debug, Clone, Default)]
pub struct GlobalMappingTable {
    packages: Vec<PackageEntry>,
    by_identity: HashMap<String, usize>,
    by_registry_id: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct ExplicitTable {
    packages: Vec<PackageEntry>,
}

impl GlobalMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from entries, keeping their order.
    pub fn from_entries(entries: impl IntoIterator<Item = PackageEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.insert(entry);
        }
        table
    }

    /// Add a package. A repeated identity merges node types into the first
    /// occurrence and keeps its position.
    pub fn insert(&mut self, entry: PackageEntry) {
        if let Some(&idx) = self.by_identity.get(&entry.identity) {
            let existing = &mut self.packages[idx];
            existing.node_types.extend(entry.node_types);
            if existing.registry_id.is_none() {
                if let Some(registry_id) = entry.registry_id {
                    self.by_registry_id.entry(registry_id.clone()).or_insert(idx);
                    existing.registry_id = Some(registry_id);
                }
            }
            if existing.title.is_none() {
                existing.title = entry.title;
            }
            return;
        }

        let idx = self.packages.len();
        self.by_identity.insert(entry.identity.clone(), idx);
        if let Some(registry_id) = &entry.registry_id {
            self.by_registry_id.entry(registry_id.clone()).or_insert(idx);
        }
        self.packages.push(entry);
    }

    /// Packages in insertion order.
    pub fn packages(&self) -> impl Iterator<Item = &PackageEntry> {
        self.packages.iter()
    }

    /// Exact identity lookup.
    pub fn get(&self, identity: &str) -> Option<&PackageEntry> {
        self.by_identity.get(identity).map(|&idx| &self.packages[idx])
    }

    /// Lookup by short registry id.
    pub fn get_by_registry_id(&self, registry_id: &str) -> Option<&PackageEntry> {
        self.by_registry_id
            .get(registry_id)
            .map(|&idx| &self.packages[idx])
    }

    /// Packages providing `type_name`, in insertion order.
    pub fn providers_of<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a PackageEntry> {
        self.packages.iter().filter(move |p| p.provides(type_name))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Parse either accepted document shape.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if value.get("packages").map(Value::is_array).unwrap_or(false) {
            let explicit: ExplicitTable = serde_json::from_value(value)?;
            return Ok(Self::from_entries(explicit.packages));
        }

        let Value::Object(map) = value else {
            return Err(RegistryError::InvalidMappingTable(
                "expected a JSON object at the top level".to_string(),
            ));
        };

        let mut table = Self::new();
        for (identity, entry) in map {
            table.insert(parse_manager_entry(identity, &entry)?);
        }
        debug!(packages = table.len(), "parsed mapping table");
        Ok(table)
    }
}

/// Parse one `identity: [[types...], {meta}]` entry.
fn parse_manager_entry(identity: String, entry: &Value) -> Result<PackageEntry> {
    let invalid = |reason: &str| {
        RegistryError::InvalidMappingTable(format!("entry {identity}: {reason}"))
    };

    let parts = entry.as_array().ok_or_else(|| invalid("expected an array"))?;
    let types = parts
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing node type list"))?;

    let mut node_types = BTreeSet::new();
    for node_type in types {
        let name = node_type
            .as_str()
            .ok_or_else(|| invalid("node type names must be strings"))?;
        node_types.insert(name.to_string());
    }

    let meta = parts.get(1).and_then(Value::as_object);
    let text = |key: &str| {
        meta.and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(PackageEntry {
        registry_id: text("cnr_id"),
        title: text("title_aux"),
        identity,
        node_types,
    })
}

/// Point-in-time provider of the global mapping table.
#[async_trait]
pub trait MappingTableSource: Send + Sync {
    async fn fetch(&self) -> Result<GlobalMappingTable>;
}

/// Mapping table read from a local document.
#[derive(Debug, Clone)]
pub struct FileMappingSource {
    path: PathBuf,
}

impl FileMappingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MappingTableSource for FileMappingSource {
    async fn fetch(&self) -> Result<GlobalMappingTable> {
        let bytes = tokio::fs::read(&self.path).await?;
        let table = GlobalMappingTable::from_slice(&bytes)?;
        info!(path = %self.path.display(), packages = table.len(), "loaded mapping table");
        Ok(table)
    }
}

/// Mapping table fetched over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMappingSource {
    http: RegistryHttp,
    url: String,
}

impl HttpMappingSource {
    pub fn new(config: &RegistryConfig, url: &str) -> Result<Self> {
        Ok(Self {
            http: RegistryHttp::new(config)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl MappingTableSource for HttpMappingSource {
    async fn fetch(&self) -> Result<GlobalMappingTable> {
        let value: Value = self
            .http
            .get_json(&self.url)
            .await?
            .ok_or_else(|| RegistryError::Status {
                url: self.url.clone(),
                status: 404,
            })?;
        let table = GlobalMappingTable::from_value(value)?;
        info!(url = %self.url, packages = table.len(), "fetched mapping table");
        Ok(table)
    }
}

/// Pick the configured mapping source: local file first, then URL.
pub fn mapping_source(config: &RegistryConfig) -> Result<Box<dyn MappingTableSource>> {
    if let Some(path) = &config.mapping_file {
        return Ok(Box::new(FileMappingSource::new(path)));
    }
    if let Some(url) = &config.mapping_url {
        return Ok(Box::new(HttpMappingSource::new(config, url)?));
    }
    Err(RegistryError::NotConfigured(
        "set GRAPHENV_MAPPING_FILE or GRAPHENV_MAPPING_URL".to_string(),
    ))
}
