//! MCP server registry store (`mcp.json`).
//!
//! All configured servers live in one JSON array. Decoding is per entry:
//! one misconfigured server must not hide the rest of the registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, absent_as_none};
use crate::fs::{FileAdapter, write_json_file};
use crate::paths;

/// Transport-specific connection settings, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        env: IndexMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        headers: IndexMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        headers: IndexMap<String, String>,
    },
}

/// One configured MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerEntry {
    pub name: String,
    #[serde(flatten)]
    pub config: McpServerConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub context_saving: bool,
}

fn default_enabled() -> bool {
    true
}

fn decode_registry(text: &str, path: &Path) -> Vec<McpServerEntry> {
    let raw: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("{}: unreadable server registry: {}", path.display(), e);
            return Vec::new();
        }
    };
    let Some(items) = raw.as_array() else {
        warn!("{}: server registry is not a list", path.display());
        return Vec::new();
    };
    let mut entries = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<McpServerEntry>(item.clone()) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("{}: skipping server entry {index}: {e}", path.display()),
        }
    }
    entries
}

/// Store for the MCP server registry file.
#[derive(Clone)]
pub struct McpRegistryStore {
    files: Arc<dyn FileAdapter>,
    path: PathBuf,
}

impl McpRegistryStore {
    pub fn new(files: Arc<dyn FileAdapter>) -> Self {
        Self {
            files,
            path: PathBuf::from(paths::MCP_REGISTRY_FILE),
        }
    }

    /// Registered servers in file order. Absent file -> empty list.
    pub async fn load(&self) -> Result<Vec<McpServerEntry>> {
        match absent_as_none(self.files.read_text(&self.path).await, &self.path)? {
            Some(text) => Ok(decode_registry(&text, &self.path)),
            None => Ok(Vec::new()),
        }
    }

    /// Atomic rewrite of the whole registry.
    pub async fn save_all(&self, entries: &[McpServerEntry]) -> Result<()> {
        write_json_file(self.files.as_ref(), &self.path, entries).await
    }

    /// Replace the entry with the same name, or append a new one.
    /// Returns the registry as written.
    pub async fn upsert(&self, entry: McpServerEntry) -> Result<Vec<McpServerEntry>> {
        let mut entries = self.load().await?;
        match entries.iter_mut().find(|e| e.name == entry.name) {
            Some(slot) => *slot = entry,
            None => entries.push(entry),
        }
        self.save_all(&entries).await?;
        Ok(entries)
    }

    /// Drop the named entry. An unknown name leaves the file untouched.
    pub async fn remove(&self, name: &str) -> Result<Vec<McpServerEntry>> {
        let mut entries = self.load().await?;
        let before = entries.len();
        entries.retain(|e| e.name != name);
        if entries.len() != before {
            self.save_all(&entries).await?;
        }
        Ok(entries)
    }
}
