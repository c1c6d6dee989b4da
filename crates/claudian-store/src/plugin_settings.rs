//! Plugin-private settings (`claudian-settings.json`).
//!
//! The full plugin configuration record. Loading always yields a complete
//! record: absent files become [`PluginSettings::default()`], partial files
//! are merged onto the defaults (file wins, defaults fill gaps), and the
//! two fields whose on-disk shape drifted across generations are
//! normalized through explicit shape discriminators.
//!
//! The retired `activeSessionId` marker (single active conversation, now
//! tracked by host tab state) is deliberately not modeled: loads ignore it
//! and the next save drops it from disk. It still counts as tool-private
//! for the settings split (see `TOOL_PRIVATE_KEYS`).

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError, absent_as_none};
use crate::fs::{FileAdapter, write_json_file};
use crate::paths;

// ============================================================================
// Defaults
// ============================================================================

pub struct SettingsDefaults;

impl SettingsDefaults {
    // Boolean defaults
    pub const ENABLE_BLOCKLIST: bool = true;
    pub const LOAD_USER_CLAUDE_SETTINGS: bool = true;
    pub const ENABLE_AUTO_TITLE_GENERATION: bool = true;
    pub const ENTER_TO_SEND: bool = true;

    // String defaults
    pub const USER_NAME: &'static str = "user";
    pub const MODEL: &'static str = "sonnet";
    pub const THINKING_BUDGET: &'static str = "auto";
    pub const PERMISSION_MODE: &'static str = "default";
    pub const TITLE_GENERATION_MODEL: &'static str = "haiku";

    // Blocked-command defaults per platform
    pub const BLOCKED_UNIX: &'static [&'static str] = &[
        "rm -rf /",
        "rm -rf ~",
        "mkfs",
        "dd if=",
        ":(){:|:&};:",
    ];
    pub const BLOCKED_WINDOWS: &'static [&'static str] = &[
        "rd /s /q",
        "del /f /s /q",
        "format c:",
    ];
}

// Thin wrappers for serde's #[serde(default = "...")] requirement
fn default_user_name() -> String {
    SettingsDefaults::USER_NAME.to_string()
}
fn default_enable_blocklist() -> bool {
    SettingsDefaults::ENABLE_BLOCKLIST
}
fn default_model() -> String {
    SettingsDefaults::MODEL.to_string()
}
fn default_thinking_budget() -> String {
    SettingsDefaults::THINKING_BUDGET.to_string()
}
fn default_permission_mode() -> String {
    SettingsDefaults::PERMISSION_MODE.to_string()
}
fn default_load_user_claude_settings() -> bool {
    SettingsDefaults::LOAD_USER_CLAUDE_SETTINGS
}
fn default_enable_auto_title_generation() -> bool {
    SettingsDefaults::ENABLE_AUTO_TITLE_GENERATION
}
fn default_title_generation_model() -> String {
    SettingsDefaults::TITLE_GENERATION_MODEL.to_string()
}
fn default_enter_to_send() -> bool {
    SettingsDefaults::ENTER_TO_SEND
}
fn default_blocked_unix() -> Vec<String> {
    SettingsDefaults::BLOCKED_UNIX.iter().map(|s| s.to_string()).collect()
}
fn default_blocked_windows() -> Vec<String> {
    SettingsDefaults::BLOCKED_WINDOWS.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Variable-shape fields
// ============================================================================

/// Per-platform blocked-command lists.
///
/// Early releases persisted a flat string array; current releases persist
/// per-platform buckets. [`BlockedCommands::from_legacy_value`] accepts
/// both (and garbage), so `Deserialize` routes through it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedCommands {
    pub unix: Vec<String>,
    pub windows: Vec<String>,
}

impl Default for BlockedCommands {
    fn default() -> Self {
        Self {
            unix: default_blocked_unix(),
            windows: default_blocked_windows(),
        }
    }
}

/// The historical on-disk shapes of the blocked-commands field.
enum BlockedCommandsShape<'a> {
    Flat(&'a [Value]),
    ByPlatform(&'a serde_json::Map<String, Value>),
    Other,
}

fn classify_blocked_commands(value: &Value) -> BlockedCommandsShape<'_> {
    match value {
        Value::Array(items) => BlockedCommandsShape::Flat(items),
        Value::Object(map) => BlockedCommandsShape::ByPlatform(map),
        _ => BlockedCommandsShape::Other,
    }
}

/// Keep string entries whose trimmed form is non-empty.
fn sanitize_command_list(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .collect()
}

impl BlockedCommands {
    /// Normalize any historical shape to per-platform lists.
    ///
    /// Flat array -> sanitized `unix` bucket, default `windows` bucket.
    /// Per-platform object -> each bucket independently sanitized when it
    /// is a string array, defaulted otherwise. Anything else -> defaults.
    pub fn from_legacy_value(value: &Value) -> Self {
        match classify_blocked_commands(value) {
            BlockedCommandsShape::Flat(items) => Self {
                unix: sanitize_command_list(items),
                windows: default_blocked_windows(),
            },
            BlockedCommandsShape::ByPlatform(map) => {
                let bucket = |key: &str, default: fn() -> Vec<String>| {
                    map.get(key)
                        .and_then(Value::as_array)
                        .map(|items| sanitize_command_list(items))
                        .unwrap_or_else(default)
                };
                Self {
                    unix: bucket("unix", default_blocked_unix),
                    windows: bucket("windows", default_blocked_windows),
                }
            }
            BlockedCommandsShape::Other => Self::default(),
        }
    }
}

impl<'de> Deserialize<'de> for BlockedCommands {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_legacy_value(&value))
    }
}

/// Keep only entries whose value is a non-blank string; any non-object
/// shape becomes the empty map.
fn de_cli_path_map<'de, D>(deserializer: D) -> std::result::Result<IndexMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let mut map = IndexMap::new();
    if let Value::Object(entries) = value {
        for (host, path) in entries {
            match path.as_str() {
                Some(p) if !p.trim().is_empty() => {
                    map.insert(host, p.to_string());
                }
                _ => warn!("claudeCliPathsByHost: dropping unusable entry for {host:?}"),
            }
        }
    }
    Ok(map)
}

// ============================================================================
// The settings record
// ============================================================================

/// The complete plugin configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    /// Display name for the human side of transcripts.
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default = "default_enable_blocklist")]
    pub enable_blocklist: bool,
    #[serde(default)]
    pub blocked_commands: BlockedCommands,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: String,
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,
    /// Notes carrying any of these tags never enter the agent's context.
    #[serde(default)]
    pub excluded_tags: Vec<String>,
    /// Vault folder for generated media; empty means the host default.
    #[serde(default)]
    pub media_folder: String,
    /// Free-text KEY=VALUE block handed to the CLI process environment.
    #[serde(default)]
    pub environment_variables: String,
    /// Saved KEY=VALUE blocks the user can swap in from the UI.
    #[serde(default)]
    pub env_snippets: Vec<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub allowed_export_paths: Vec<String>,
    #[serde(default)]
    pub persistent_external_context_paths: Vec<String>,
    /// Single CLI path from before per-host maps existed. Still honored as
    /// a fallback by [`PluginSettings::cli_path_for_host`].
    #[serde(default)]
    pub claude_cli_path: String,
    #[serde(default, deserialize_with = "de_cli_path_map")]
    pub claude_cli_paths_by_host: IndexMap<String, String>,
    #[serde(default = "default_load_user_claude_settings")]
    pub load_user_claude_settings: bool,
    #[serde(default = "default_enable_auto_title_generation")]
    pub enable_auto_title_generation: bool,
    #[serde(default = "default_title_generation_model")]
    pub title_generation_model: String,
    /// Enter sends the message; off means Enter inserts a newline.
    #[serde(default = "default_enter_to_send")]
    pub enter_to_send: bool,
    // Last-used bookkeeping. Unset until first recorded, and omitted from
    // disk while unset; the blob migration only fills unset fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_claude_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_custom_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_env_hash: Option<String>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            enable_blocklist: default_enable_blocklist(),
            blocked_commands: BlockedCommands::default(),
            model: default_model(),
            thinking_budget: default_thinking_budget(),
            permission_mode: default_permission_mode(),
            excluded_tags: Vec::new(),
            media_folder: String::new(),
            environment_variables: String::new(),
            env_snippets: Vec::new(),
            system_prompt: String::new(),
            allowed_export_paths: Vec::new(),
            persistent_external_context_paths: Vec::new(),
            claude_cli_path: String::new(),
            claude_cli_paths_by_host: IndexMap::new(),
            load_user_claude_settings: default_load_user_claude_settings(),
            enable_auto_title_generation: default_enable_auto_title_generation(),
            title_generation_model: default_title_generation_model(),
            enter_to_send: default_enter_to_send(),
            last_claude_model: None,
            last_custom_model: None,
            last_env_hash: None,
        }
    }
}

impl PluginSettings {
    /// Resolve the CLI path for a host: the per-host map first, then the
    /// legacy single-path field when non-empty.
    pub fn cli_path_for_host(&self, host: &str) -> Option<&str> {
        if let Some(path) = self.claude_cli_paths_by_host.get(host) {
            return Some(path.as_str());
        }
        let legacy = self.claude_cli_path.trim();
        (!legacy.is_empty()).then_some(legacy)
    }
}

/// Serialized field names of [`PluginSettings`], plus the retired
/// `activeSessionId` marker. Presence of any of these in `settings.json`
/// means the file still needs the settings split.
pub(crate) const TOOL_PRIVATE_KEYS: &[&str] = &[
    "userName",
    "enableBlocklist",
    "blockedCommands",
    "model",
    "thinkingBudget",
    "permissionMode",
    "excludedTags",
    "mediaFolder",
    "environmentVariables",
    "envSnippets",
    "systemPrompt",
    "allowedExportPaths",
    "persistentExternalContextPaths",
    "claudeCliPath",
    "claudeCliPathsByHost",
    "loadUserClaudeSettings",
    "enableAutoTitleGeneration",
    "titleGenerationModel",
    "enterToSend",
    "lastClaudeModel",
    "lastCustomModel",
    "lastEnvHash",
    "activeSessionId",
];

// ============================================================================
// Partial updates
// ============================================================================

/// Apply `Option`-field overrides from a patch to a settings record.
///
/// For each field name, if `$src.field` is `Some(v)`, sets `$dst.field = v`
/// (cloning as needed).
macro_rules! apply_option_overrides {
    ($src:expr, $dst:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(ref v) = $src.$field {
                $dst.$field = v.clone();
            }
        )+
    };
}

/// Partial update for [`PluginSettings`]: every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_blocklist: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_commands: Option<BlockedCommands>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_snippets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_export_paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_external_context_paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_cli_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_cli_paths_by_host: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_user_claude_settings: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_auto_title_generation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_generation_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enter_to_send: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_claude_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_custom_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_env_hash: Option<String>,
}

impl PluginSettingsPatch {
    /// Overlay this patch onto `settings`, field by field.
    pub fn apply_to(&self, settings: &mut PluginSettings) {
        apply_option_overrides!(
            self,
            settings,
            user_name,
            enable_blocklist,
            blocked_commands,
            model,
            thinking_budget,
            permission_mode,
            excluded_tags,
            media_folder,
            environment_variables,
            env_snippets,
            system_prompt,
            allowed_export_paths,
            persistent_external_context_paths,
            claude_cli_path,
            claude_cli_paths_by_host,
            load_user_claude_settings,
            enable_auto_title_generation,
            title_generation_model,
            enter_to_send,
        );
        // Bookkeeping fields are Option on both sides: Some in the patch
        // means "record this value", never "clear".
        if let Some(v) = &self.last_claude_model {
            settings.last_claude_model = Some(v.clone());
        }
        if let Some(v) = &self.last_custom_model {
            settings.last_custom_model = Some(v.clone());
        }
        if let Some(v) = &self.last_env_hash {
            settings.last_env_hash = Some(v.clone());
        }
    }
}

// ============================================================================
// Environment text helpers
// ============================================================================

fn is_valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `KEY=VALUE` from one line; `None` for blanks, `#` comments, and lines
/// without a valid key.
fn split_env_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if !is_valid_env_key(key) {
        return None;
    }
    Some((key, value.trim()))
}

/// Parse a free-text env block into ordered pairs. Later duplicates win.
pub fn parse_env_text(text: &str) -> IndexMap<String, String> {
    let mut vars = IndexMap::new();
    for line in text.lines() {
        if let Some((key, value)) = split_env_line(line) {
            vars.insert(key.to_string(), value.to_string());
        }
    }
    vars
}

/// Merge a structured env map into a free-text block.
///
/// Lines whose key collides with the map are rewritten to the map's value;
/// unrecognized lines (comments included) are kept verbatim; map keys not
/// in the text are appended as new lines.
pub fn merge_env_text(text: &str, structured: &IndexMap<String, String>) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut used: std::collections::HashSet<&str> = std::collections::HashSet::new();

    for line in text.lines() {
        if let Some((key, _)) = split_env_line(line) {
            if let Some(value) = structured.get(key) {
                lines.push(format!("{key}={value}"));
                used.insert(key);
                continue;
            }
        }
        lines.push(line.to_string());
    }

    for (key, value) in structured {
        if !used.contains(key.as_str()) {
            lines.push(format!("{key}={value}"));
        }
    }

    lines.join("\n")
}

/// Hash of the effective environment block, as recorded in `lastEnvHash`.
///
/// Computed over the parsed pairs, so comment or whitespace edits that do
/// not change the effective environment keep the hash stable.
pub fn env_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for (key, value) in &parse_env_text(text) {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Store
// ============================================================================

/// Store for the plugin settings file.
#[derive(Clone)]
pub struct PluginSettingsStore {
    files: Arc<dyn FileAdapter>,
    path: PathBuf,
}

impl PluginSettingsStore {
    pub fn new(files: Arc<dyn FileAdapter>) -> Self {
        Self {
            files,
            path: PathBuf::from(paths::PLUGIN_SETTINGS_FILE),
        }
    }

    /// Load the settings. Absent file -> full defaults; partial file ->
    /// defaults fill the gaps; malformed file -> error.
    pub async fn load(&self) -> Result<PluginSettings> {
        match absent_as_none(self.files.read_text(&self.path).await, &self.path)? {
            Some(text) => {
                serde_json::from_str(&text).map_err(|e| StoreError::parse(&self.path, e))
            }
            None => Ok(PluginSettings::default()),
        }
    }

    /// Write the full record.
    pub async fn save(&self, settings: &PluginSettings) -> Result<()> {
        write_json_file(self.files.as_ref(), &self.path, settings).await
    }

    /// Load, overlay `patch`, save, and return the merged record.
    pub async fn update(&self, patch: &PluginSettingsPatch) -> Result<PluginSettings> {
        let mut settings = self.load().await?;
        patch.apply_to(&mut settings);
        self.save(&settings).await?;
        Ok(settings)
    }

    /// The raw file as a JSON object, absent -> `None`. Used by migration
    /// presence checks that must not see defaults filled in.
    pub async fn load_raw(&self) -> Result<Option<serde_json::Map<String, Value>>> {
        let text = match absent_as_none(self.files.read_text(&self.path).await, &self.path)? {
            Some(text) => text,
            None => return Ok(None),
        };
        let value: Value =
            serde_json::from_str(&text).map_err(|e| StoreError::parse(&self.path, e))?;
        match value {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(StoreError::parse(
                &self.path,
                "expected a JSON object at the top level",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalAdapter;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PluginSettingsStore, Arc<LocalAdapter>) {
        let dir = TempDir::new().unwrap();
        let files = Arc::new(LocalAdapter::new(dir.path()));
        let store = PluginSettingsStore::new(files.clone());
        (dir, store, files)
    }

    fn from_json(json: &str) -> PluginSettings {
        serde_json::from_str(json).unwrap()
    }

    // === Defaults ===

    #[test]
    fn test_empty_object_equals_default() {
        assert_eq!(from_json("{}"), PluginSettings::default());
    }

    #[test]
    fn test_default_record_is_complete() {
        let settings = PluginSettings::default();
        assert_eq!(settings.user_name, "user");
        assert!(settings.enable_blocklist);
        assert!(!settings.blocked_commands.windows.is_empty());
        assert_eq!(settings.model, "sonnet");
        assert!(settings.last_env_hash.is_none());
    }

    #[test]
    fn test_partial_file_merges_onto_defaults() {
        let settings = from_json(r#"{ "userName": "Ann" }"#);
        assert_eq!(settings.user_name, "Ann");
        assert_eq!(settings.model, "sonnet");
        assert!(settings.enter_to_send);
    }

    #[test]
    fn test_unset_bookkeeping_is_not_serialized() {
        let json = serde_json::to_string(&PluginSettings::default()).unwrap();
        assert!(!json.contains("lastEnvHash"));
        assert!(!json.contains("lastClaudeModel"));
    }

    // === Blocked-command normalization ===

    #[test]
    fn test_flat_list_moves_to_unix_bucket() {
        let settings = from_json(r#"{ "blockedCommands": ["rm -rf", "  "] }"#);
        assert_eq!(settings.blocked_commands.unix, vec!["rm -rf"]);
        assert_eq!(
            settings.blocked_commands.windows,
            default_blocked_windows()
        );
    }

    #[test]
    fn test_platform_object_buckets_are_independent() {
        let settings =
            from_json(r#"{ "blockedCommands": { "windows": ["format c:"] } }"#);
        assert_eq!(settings.blocked_commands.unix, default_blocked_unix());
        assert_eq!(settings.blocked_commands.windows, vec!["format c:"]);
    }

    #[test]
    fn test_bucket_with_wrong_type_is_defaulted() {
        let settings = from_json(
            r#"{ "blockedCommands": { "unix": "rm -rf", "windows": [42, "del"] } }"#,
        );
        assert_eq!(settings.blocked_commands.unix, default_blocked_unix());
        assert_eq!(settings.blocked_commands.windows, vec!["del"]);
    }

    #[test]
    fn test_garbage_blocklist_is_defaulted() {
        let settings = from_json(r#"{ "blockedCommands": 7 }"#);
        assert_eq!(settings.blocked_commands, BlockedCommands::default());
    }

    // === CLI path map normalization ===

    #[test]
    fn test_cli_path_map_drops_unusable_entries() {
        let settings = from_json(
            r#"{ "claudeCliPathsByHost": {
                "mba": "/usr/local/bin/claude",
                "desk": "  ",
                "old": 3
            } }"#,
        );
        assert_eq!(settings.claude_cli_paths_by_host.len(), 1);
        assert_eq!(
            settings.claude_cli_paths_by_host.get("mba").map(String::as_str),
            Some("/usr/local/bin/claude")
        );
    }

    #[test]
    fn test_cli_path_map_non_object_becomes_empty() {
        let settings = from_json(r#"{ "claudeCliPathsByHost": ["a"] }"#);
        assert!(settings.claude_cli_paths_by_host.is_empty());
    }

    #[test]
    fn test_cli_path_for_host_prefers_map_then_legacy() {
        let mut settings = PluginSettings::default();
        settings.claude_cli_path = "/opt/claude".to_string();
        settings
            .claude_cli_paths_by_host
            .insert("mba".to_string(), "/usr/local/bin/claude".to_string());

        assert_eq!(settings.cli_path_for_host("mba"), Some("/usr/local/bin/claude"));
        assert_eq!(settings.cli_path_for_host("desk"), Some("/opt/claude"));

        settings.claude_cli_path.clear();
        assert_eq!(settings.cli_path_for_host("desk"), None);
    }

    // === Obsolete marker ===

    #[tokio::test]
    async fn test_active_session_marker_is_dropped_on_save() {
        let (_dir, store, files) = setup();
        files
            .write_text(
                Path::new("claudian-settings.json"),
                r#"{ "userName": "Ann", "activeSessionId": "s-12" }"#,
            )
            .await
            .unwrap();

        let settings = store.load().await.unwrap();
        store.save(&settings).await.unwrap();

        let text = files
            .read_text(Path::new("claudian-settings.json"))
            .await
            .unwrap();
        assert!(!text.contains("activeSessionId"));
        assert!(text.contains("\"userName\": \"Ann\""));
    }

    // === Store ===

    #[tokio::test]
    async fn test_load_absent_yields_defaults() {
        let (_dir, store, _files) = setup();
        assert_eq!(store.load().await.unwrap(), PluginSettings::default());
    }

    #[tokio::test]
    async fn test_load_malformed_is_parse_error() {
        let (_dir, store, files) = setup();
        files
            .write_text(Path::new("claudian-settings.json"), "][")
            .await
            .unwrap();
        assert!(matches!(
            store.load().await.unwrap_err(),
            StoreError::Parse { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_applies_patch_fields_only() {
        let (_dir, store, _files) = setup();
        let patch = PluginSettingsPatch {
            user_name: Some("Ann".to_string()),
            last_env_hash: Some("abc123".to_string()),
            ..Default::default()
        };

        let merged = store.update(&patch).await.unwrap();
        assert_eq!(merged.user_name, "Ann");
        assert_eq!(merged.last_env_hash.as_deref(), Some("abc123"));
        assert_eq!(merged.model, "sonnet");

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded, merged);
    }

    #[tokio::test]
    async fn test_load_raw_absent_is_none() {
        let (_dir, store, _files) = setup();
        assert!(store.load_raw().await.unwrap().is_none());
    }

    // === Env helpers ===

    #[test]
    fn test_parse_env_text_skips_comments_and_invalid_keys() {
        let vars = parse_env_text("# comment\nFOO=1\n2BAD=x\nBAR = two words \n");
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["FOO"], "1");
        assert_eq!(vars["BAR"], "two words");
    }

    #[test]
    fn test_parse_env_text_later_duplicate_wins() {
        let vars = parse_env_text("FOO=1\nFOO=2\n");
        assert_eq!(vars["FOO"], "2");
    }

    #[test]
    fn test_merge_env_text_structured_wins_and_appends() {
        let mut structured = IndexMap::new();
        structured.insert("FOO".to_string(), "9".to_string());
        structured.insert("NEW".to_string(), "y".to_string());

        let merged = merge_env_text("# keep me\nFOO=1\nBAR=2", &structured);
        assert_eq!(merged, "# keep me\nFOO=9\nBAR=2\nNEW=y");
    }

    #[test]
    fn test_merge_env_text_rewrites_every_colliding_line() {
        let mut structured = IndexMap::new();
        structured.insert("FOO".to_string(), "9".to_string());

        let merged = merge_env_text("FOO=1\nFOO=2", &structured);
        let vars = parse_env_text(&merged);
        assert_eq!(vars["FOO"], "9");
    }

    #[test]
    fn test_env_hash_ignores_comments_and_spacing() {
        let a = env_hash("FOO=1\nBAR=2");
        let b = env_hash("# note\n FOO = 1 \n\nBAR=2\n");
        let c = env_hash("FOO=1\nBAR=3");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
