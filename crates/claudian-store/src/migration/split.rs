//! One-time split of the combined settings file.
//!
//! Early releases kept every setting in `settings.json`, the plugin's own
//! fields mixed in with the agent CLI's. The split moves the plugin fields
//! into `claudian-settings.json`, converts the historical permission list
//! to CLI rule strings, and rewrites `settings.json` down to the keys the
//! CLI owns.
//!
//! Ordering is deliberate: the plugin file is written and read back first,
//! and only after that verification does the combined file get its
//! destructive rewrite. Failing anywhere before that point leaves
//! `settings.json` byte-identical.

use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use log::warn;
use serde_json::{Map, Value, json};

use crate::agent_settings::{SETTINGS_SCHEMA_URL, rule_string};
use crate::error::{Result, StoreError, absent_as_none};
use crate::fs::{FileAdapter, write_json_file};
use crate::paths;
use crate::plugin_settings::{
    PluginSettings, PluginSettingsStore, TOOL_PRIVATE_KEYS, merge_env_text,
};

/// True when the combined file still carries plugin-owned keys.
pub(super) fn needs_split(combined: &Map<String, Value>) -> bool {
    TOOL_PRIVATE_KEYS.iter().any(|key| combined.contains_key(*key))
}

/// Move plugin fields out of `settings.json` into the plugin file.
///
/// Returns `false` when the combined file turned out to be clean already.
pub(super) async fn migrate_split(
    files: &dyn FileAdapter,
    plugin: &PluginSettingsStore,
) -> Result<bool> {
    let agent_path = Path::new(paths::AGENT_SETTINGS_FILE);
    let Some(text) = absent_as_none(files.read_text(agent_path).await, agent_path)? else {
        return Ok(false);
    };
    let combined = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(StoreError::parse(
                agent_path,
                "settings are not a JSON object",
            ));
        }
        Err(e) => return Err(StoreError::parse(agent_path, e)),
    };
    if !needs_split(&combined) {
        return Ok(false);
    }

    let settings = plugin_record_from(&combined, agent_path)?;
    plugin.save(&settings).await?;
    if !verify_plugin_file(plugin).await? {
        return Err(StoreError::verification(paths::PLUGIN_SETTINGS_FILE));
    }

    let clean = clean_agent_file(&combined);
    write_json_file(files, agent_path, &Value::Object(clean)).await?;
    Ok(true)
}

/// Read the plugin file back and confirm the write actually landed.
///
/// `enableBlocklist` is always serialized, so a correctly written file
/// must contain it. An unparseable or missing read-back counts as failed.
async fn verify_plugin_file(plugin: &PluginSettingsStore) -> Result<bool> {
    let raw = match plugin.load_raw().await {
        Ok(raw) => raw,
        Err(StoreError::Parse { .. }) => None,
        Err(e) => return Err(e),
    };
    Ok(raw.is_some_and(|map| map.contains_key("enableBlocklist")))
}

/// Build the full plugin record from the combined file's private subset.
fn plugin_record_from(combined: &Map<String, Value>, path: &Path) -> Result<PluginSettings> {
    let mut subset = Map::new();
    for key in TOOL_PRIVATE_KEYS {
        if let Some(value) = combined.get(*key) {
            subset.insert((*key).to_string(), value.clone());
        }
    }
    let mut settings: PluginSettings =
        serde_json::from_value(Value::Object(subset)).map_err(|e| StoreError::parse(path, e))?;
    settings.environment_variables = merged_environment(combined);
    Ok(settings)
}

/// Merge the plugin's free-text environment block with the CLI's
/// structured `env` map. The structured value wins on key collisions.
fn merged_environment(combined: &Map<String, Value>) -> String {
    let free_text = combined
        .get("environmentVariables")
        .and_then(Value::as_str)
        .unwrap_or("");
    let mut structured = IndexMap::new();
    if let Some(env) = combined.get("env").and_then(Value::as_object) {
        for (key, value) in env {
            match value.as_str() {
                Some(text) => {
                    structured.insert(key.clone(), text.to_string());
                }
                None => warn!("settings.json env.{key} is not a string; leaving it out"),
            }
        }
    }
    merge_env_text(free_text, &structured)
}

/// What `settings.json` becomes after the split: schema and permissions,
/// nothing else.
fn clean_agent_file(combined: &Map<String, Value>) -> Map<String, Value> {
    let schema = combined
        .get("$schema")
        .and_then(Value::as_str)
        .unwrap_or(SETTINGS_SCHEMA_URL);
    let mut clean = Map::new();
    clean.insert("$schema".to_string(), json!(schema));
    clean.insert("permissions".to_string(), permissions_value(combined));
    clean
}

/// The two historical permission shapes, told apart explicitly.
enum LegacyPermissions<'a> {
    /// Pre-split array of per-tool approval records.
    Flat(&'a [Value]),
    /// Already CLI-shaped object; preserved as-is.
    Structured(&'a Value),
    Absent,
}

fn classify_permissions(combined: &Map<String, Value>) -> LegacyPermissions<'_> {
    match combined.get("permissions") {
        Some(Value::Array(items)) => LegacyPermissions::Flat(items),
        Some(value @ Value::Object(_)) => LegacyPermissions::Structured(value),
        Some(_) => {
            warn!("settings.json permissions has an unexpected shape; using defaults");
            LegacyPermissions::Absent
        }
        None => LegacyPermissions::Absent,
    }
}

fn permissions_value(combined: &Map<String, Value>) -> Value {
    match classify_permissions(combined) {
        LegacyPermissions::Flat(items) => convert_flat_permissions(items),
        // Clone the raw value: defaultMode, additionalDirectories and any
        // subkeys we do not model survive unchanged.
        LegacyPermissions::Structured(value) => value.clone(),
        LegacyPermissions::Absent => json!({}),
    }
}

/// Convert the historical approval array to CLI rule lists.
///
/// Only `scope: "always"` records carry over; one-shot approvals were
/// session-local by definition. Duplicates collapse to the first
/// occurrence.
fn convert_flat_permissions(items: &[Value]) -> Value {
    let mut allow: IndexSet<String> = IndexSet::new();
    for item in items {
        let Some(record) = item.as_object() else {
            continue;
        };
        if record.get("scope").and_then(Value::as_str) != Some("always") {
            continue;
        }
        let Some(tool) = record.get("toolName").and_then(Value::as_str) else {
            continue;
        };
        let pattern = record.get("pattern").and_then(Value::as_str).unwrap_or("");
        allow.insert(rule_string(tool, pattern));
    }
    if allow.is_empty() {
        json!({})
    } else {
        json!({ "allow": allow.into_iter().collect::<Vec<_>>() })
    }
}
