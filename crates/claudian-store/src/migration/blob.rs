//! Drains leftover plugin data out of the host's state object.
//!
//! Before dedicated files existed, everything lived inline in the host's
//! one JSON blob: last-used bookkeeping fields plus whole `commands` and
//! `conversations` arrays. Phase 1 copies that data into its real home
//! (bookkeeping into the plugin settings, arrays into per-entity files)
//! and phase 2 removes the consumed keys from the blob. The phases are
//! separate on purpose: the keys are cleared only when phase 1 finished
//! without a single content error, so a partial run can always be retried.
//!
//! Keys the plugin never owned (tab layout, view state, whatever else the
//! host keeps in there) are written back untouched.

use std::io;
use std::path::Path;

use log::warn;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::commands::{CommandDefinition, CommandStore};
use crate::error::{Result, StoreError};
use crate::host_state::HostStateStore;
use crate::paths;
use crate::plugin_settings::{PluginSettings, PluginSettingsStore};
use crate::sessions::{Session, SessionHeader, SessionStore, StoredMessage};

const LEGACY_COMMANDS_KEY: &str = "commands";
const LEGACY_CONVERSATIONS_KEY: &str = "conversations";

/// What phase 1 did, and which blob keys phase 2 may clear.
#[derive(Debug, Default)]
pub(super) struct BlobOutcome {
    /// Bookkeeping keys were consumed from the blob.
    pub(super) state_ran: bool,
    /// At least one bookkeeping value was copied into the settings.
    pub(super) state_merged: bool,
    /// At least one content array was present in the blob.
    pub(super) content_ran: bool,
    pub(super) commands_migrated: usize,
    pub(super) commands_skipped: usize,
    pub(super) sessions_migrated: usize,
    pub(super) sessions_skipped: usize,
    pub(super) errors: usize,
    /// Blob keys consumed by this run, in encounter order.
    pub(super) consumed: Vec<String>,
}

impl BlobOutcome {
    /// Phase 2 gate: something was there to migrate, and no item failed.
    pub(super) fn should_clear(&self) -> bool {
        (self.state_ran || self.content_ran) && self.errors == 0
    }
}

/// Parse the raw blob text. Anything but a JSON object is treated as
/// absent; the engine never rewrites a blob it cannot read.
pub(super) fn parse_blob(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            warn!("host state is not a JSON object; leaving it alone");
            None
        }
        Err(e) => {
            warn!("host state is unparseable; leaving it alone: {e}");
            None
        }
    }
}

/// Phase 1: copy blob data into its current-generation home.
pub(super) async fn migrate_blob_contents(
    plugin: &PluginSettingsStore,
    commands: &CommandStore,
    sessions: &SessionStore,
    blob: &Map<String, Value>,
) -> Result<BlobOutcome> {
    let mut outcome = BlobOutcome::default();
    merge_state_bookkeeping(plugin, blob, &mut outcome).await?;

    if let Some(value) = blob.get(LEGACY_COMMANDS_KEY) {
        outcome.content_ran = true;
        outcome.consumed.push(LEGACY_COMMANDS_KEY.to_string());
        match value.as_array() {
            Some(items) => migrate_commands(commands, items, &mut outcome).await,
            None => {
                warn!("host state {LEGACY_COMMANDS_KEY} is not a list; leaving it in place");
                outcome.errors += 1;
            }
        }
    }
    if let Some(value) = blob.get(LEGACY_CONVERSATIONS_KEY) {
        outcome.content_ran = true;
        outcome.consumed.push(LEGACY_CONVERSATIONS_KEY.to_string());
        match value.as_array() {
            Some(items) => migrate_conversations(sessions, items, &mut outcome).await,
            None => {
                warn!("host state {LEGACY_CONVERSATIONS_KEY} is not a list; leaving it in place");
                outcome.errors += 1;
            }
        }
    }
    Ok(outcome)
}

/// Phase 2: write the blob back without the consumed keys.
pub(super) async fn clear_consumed_keys(
    host_state: &dyn HostStateStore,
    mut blob: Map<String, Value>,
    consumed: &[String],
) -> Result<()> {
    for key in consumed {
        blob.remove(key);
    }
    let path = Path::new(paths::HOST_STATE_FILE);
    let text = serde_json::to_string_pretty(&Value::Object(blob))
        .map_err(|e| StoreError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
    host_state
        .save_raw(&(text + "\n"))
        .await
        .map_err(|e| StoreError::io(path, e))
}

// ============================================================================
// State bookkeeping
// ============================================================================

type BookkeepingField = fn(&mut PluginSettings) -> &mut Option<String>;

/// Blob key -> settings field for the last-used bookkeeping values.
const BOOKKEEPING: [(&str, BookkeepingField); 3] = [
    ("lastEnvHash", |s| &mut s.last_env_hash),
    ("lastClaudeModel", |s| &mut s.last_claude_model),
    ("lastCustomModel", |s| &mut s.last_custom_model),
];

/// Copy bookkeeping values into settings fields that are still unset.
/// Settings values always win; the blob never overwrites migrated data.
/// A value that is not a string is never consumed: it stays in the blob
/// and only a warning marks it.
async fn merge_state_bookkeeping(
    plugin: &PluginSettingsStore,
    blob: &Map<String, Value>,
    outcome: &mut BlobOutcome,
) -> Result<()> {
    let mut usable: Vec<(&str, BookkeepingField, &str)> = Vec::new();
    for (key, field) in &BOOKKEEPING {
        match blob.get(*key) {
            Some(Value::String(text)) => usable.push((*key, *field, text.as_str())),
            Some(_) => warn!("host state {key} is not a string; leaving it in place"),
            None => {}
        }
    }
    if usable.is_empty() {
        return Ok(());
    }
    outcome.state_ran = true;

    let mut settings = plugin.load().await?;
    let mut merged = false;
    for (key, field, text) in usable {
        outcome.consumed.push(key.to_string());
        let slot = field(&mut settings);
        if slot.is_none() {
            *slot = Some(text.to_string());
            merged = true;
        }
    }
    if merged {
        plugin.save(&settings).await?;
        outcome.state_merged = true;
    }
    Ok(())
}

// ============================================================================
// Content arrays
// ============================================================================

/// Command record as stored inline in the legacy blob.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCommand {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    argument_hint: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    allowed_tools: Option<Vec<String>>,
    #[serde(default)]
    content: String,
}

impl LegacyCommand {
    fn into_command(self) -> CommandDefinition {
        CommandDefinition {
            id: if self.id.trim().is_empty() {
                Uuid::new_v4().to_string()
            } else {
                self.id
            },
            name: self.name,
            description: self.description,
            argument_hint: self.argument_hint,
            model: self.model,
            allowed_tools: self.allowed_tools,
            content: self.content,
        }
    }
}

/// Conversation as stored inline in the legacy blob.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConversation {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    messages: Vec<StoredMessage>,
}

impl LegacyConversation {
    fn into_session(self) -> Session {
        Session {
            header: SessionHeader {
                id: self.id,
                title: self.title,
                created_at: self.created_at,
                updated_at: self.updated_at,
                session_id: self.session_id,
            },
            messages: self.messages,
        }
    }
}

async fn migrate_commands(
    commands: &CommandStore,
    items: &[Value],
    outcome: &mut BlobOutcome,
) {
    for (index, item) in items.iter().enumerate() {
        match migrate_command(commands, item).await {
            Ok(true) => outcome.commands_migrated += 1,
            Ok(false) => outcome.commands_skipped += 1,
            Err(reason) => {
                warn!("legacy command {index} not migrated: {reason}");
                outcome.errors += 1;
            }
        }
    }
}

/// `Ok(true)` migrated, `Ok(false)` the target file already exists.
async fn migrate_command(
    commands: &CommandStore,
    item: &Value,
) -> std::result::Result<bool, String> {
    let legacy: LegacyCommand =
        serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
    let command = legacy.into_command();
    if commands.exists(&command.name).await.map_err(|e| e.to_string())? {
        return Ok(false);
    }
    commands.save(&command).await.map_err(|e| e.to_string())?;
    Ok(true)
}

async fn migrate_conversations(
    sessions: &SessionStore,
    items: &[Value],
    outcome: &mut BlobOutcome,
) {
    for (index, item) in items.iter().enumerate() {
        match migrate_conversation(sessions, item).await {
            Ok(true) => outcome.sessions_migrated += 1,
            Ok(false) => outcome.sessions_skipped += 1,
            Err(reason) => {
                warn!("legacy conversation {index} not migrated: {reason}");
                outcome.errors += 1;
            }
        }
    }
}

async fn migrate_conversation(
    sessions: &SessionStore,
    item: &Value,
) -> std::result::Result<bool, String> {
    let legacy: LegacyConversation =
        serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
    let session = legacy.into_session();
    if sessions
        .exists(&session.header.id)
        .await
        .map_err(|e| e.to_string())?
    {
        return Ok(false);
    }
    sessions.save(&session).await.map_err(|e| e.to_string())?;
    Ok(true)
}
