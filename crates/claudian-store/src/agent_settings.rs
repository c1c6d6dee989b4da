//! CLI-compatible agent settings (`settings.json`).
//!
//! This file is shared with the external agent CLI: the plugin only owns
//! the permission rule lists. Every other top-level key the CLI (or the
//! user) may have written rides through load/save untouched via the
//! flattened passthrough map. The one-time destructive rewrite during the
//! settings split lives in [`crate::migration`], not here.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError, absent_as_none};
use crate::fs::{FileAdapter, write_json_file};
use crate::paths;

/// Schema reference written into fresh agent settings files.
pub const SETTINGS_SCHEMA_URL: &str =
    "https://json.schemastore.org/claude-code-settings.json";

/// Permission rule lists understood by the agent CLI.
///
/// A rule string is `ToolName` or `ToolName(pattern)` (see [`rule_string`]).
/// Subkeys the plugin does not model ride through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ask: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_directories: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The typed view of `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub permissions: PermissionSettings,
    /// CLI-owned keys (hooks, env, model overrides, ...) pass through as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            schema: Some(SETTINGS_SCHEMA_URL.to_string()),
            permissions: PermissionSettings::default(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Build a CLI rule string from a tool name and pattern.
///
/// An empty or `*` pattern means "the whole tool": the rule is the bare
/// tool name. Anything else becomes `ToolName(pattern)`.
pub fn rule_string(tool_name: &str, pattern: &str) -> String {
    let pattern = pattern.trim();
    if pattern.is_empty() || pattern == "*" {
        tool_name.to_string()
    } else {
        format!("{tool_name}({pattern})")
    }
}

/// Store for the CLI-compatible settings file.
#[derive(Clone)]
pub struct AgentSettingsStore {
    files: Arc<dyn FileAdapter>,
    path: PathBuf,
}

impl AgentSettingsStore {
    pub fn new(files: Arc<dyn FileAdapter>) -> Self {
        Self {
            files,
            path: PathBuf::from(paths::AGENT_SETTINGS_FILE),
        }
    }

    /// Load the settings. Absent file -> defaults; malformed file -> error.
    pub async fn load(&self) -> Result<AgentSettings> {
        match absent_as_none(self.files.read_text(&self.path).await, &self.path)? {
            Some(text) => {
                serde_json::from_str(&text).map_err(|e| StoreError::parse(&self.path, e))
            }
            None => Ok(AgentSettings::default()),
        }
    }

    /// Write the full record, passthrough keys included.
    pub async fn save(&self, settings: &AgentSettings) -> Result<()> {
        write_json_file(self.files.as_ref(), &self.path, settings).await
    }

    /// Replace only the permission block, keeping everything else as-is.
    pub async fn update_permissions(
        &self,
        permissions: PermissionSettings,
    ) -> Result<AgentSettings> {
        let mut settings = self.load().await?;
        settings.permissions = permissions;
        self.save(&settings).await?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalAdapter;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AgentSettingsStore, Arc<LocalAdapter>) {
        let dir = TempDir::new().unwrap();
        let files = Arc::new(LocalAdapter::new(dir.path()));
        let store = AgentSettingsStore::new(files.clone());
        (dir, store, files)
    }

    // === rule_string ===

    #[test]
    fn test_rule_string_with_pattern() {
        assert_eq!(rule_string("Bash", "git status"), "Bash(git status)");
    }

    #[test]
    fn test_rule_string_bare_for_empty_pattern() {
        assert_eq!(rule_string("Bash", ""), "Bash");
        assert_eq!(rule_string("Bash", "   "), "Bash");
    }

    #[test]
    fn test_rule_string_bare_for_wildcard() {
        assert_eq!(rule_string("WebFetch", "*"), "WebFetch");
    }

    // === store ===

    #[tokio::test]
    async fn test_load_absent_yields_defaults() {
        let (_dir, store, _files) = setup();
        let settings = store.load().await.unwrap();
        assert_eq!(settings.schema.as_deref(), Some(SETTINGS_SCHEMA_URL));
        assert!(settings.permissions.allow.is_empty());
        assert!(settings.extra.is_empty());
    }

    #[tokio::test]
    async fn test_load_malformed_is_parse_error() {
        let (_dir, store, files) = setup();
        files
            .write_text(Path::new("settings.json"), "{not json")
            .await
            .unwrap();
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_save_load_preserves_cli_owned_keys() {
        let (_dir, store, files) = setup();
        files
            .write_text(
                Path::new("settings.json"),
                r#"{
                  "permissions": { "allow": ["Bash(git *)"], "defaultMode": "acceptEdits" },
                  "hooks": { "PostToolUse": [] },
                  "env": { "FOO": "1" }
                }"#,
            )
            .await
            .unwrap();

        let settings = store.load().await.unwrap();
        assert_eq!(settings.permissions.allow, vec!["Bash(git *)"]);
        assert_eq!(settings.permissions.default_mode.as_deref(), Some("acceptEdits"));
        assert!(settings.extra.contains_key("hooks"));

        store.save(&settings).await.unwrap();
        let reread: serde_json::Value =
            serde_json::from_str(&files.read_text(Path::new("settings.json")).await.unwrap())
                .unwrap();
        assert!(reread.get("hooks").is_some());
        assert_eq!(reread["env"]["FOO"], "1");
    }

    #[tokio::test]
    async fn test_update_permissions_touches_nothing_else() {
        let (_dir, store, files) = setup();
        files
            .write_text(
                Path::new("settings.json"),
                r#"{ "permissions": { "allow": ["Read"] }, "model": "opus" }"#,
            )
            .await
            .unwrap();

        let updated = store
            .update_permissions(PermissionSettings {
                allow: vec!["Read".into(), "Bash(git status)".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.permissions.allow.len(), 2);
        let reread: serde_json::Value =
            serde_json::from_str(&files.read_text(Path::new("settings.json")).await.unwrap())
                .unwrap();
        assert_eq!(reread["model"], "opus");
        assert_eq!(reread["permissions"]["allow"][1], "Bash(git status)");
    }
}
