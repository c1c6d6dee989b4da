//! Startup sequencing and legacy-data migrations.
//!
//! [`MigrationCoordinator::initialize`] is the storage entry point: it
//! makes sure the directory layout exists, brings forward any data still
//! sitting in legacy locations, and hands back the two settings records.
//! Two migrations exist:
//!
//! - the settings split: the old combined `settings.json` becomes a
//!   plugin file plus a CLI-only `settings.json`;
//! - the blob drain: bookkeeping fields and inline command/conversation
//!   arrays move out of the host's opaque state object into real files,
//!   and the consumed keys are cleared only after everything migrated
//!   cleanly.
//!
//! Both are re-entrant. A second `initialize` on already-migrated data
//! performs existence checks and writes nothing.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::agent_settings::{AgentSettings, AgentSettingsStore};
use crate::commands::CommandStore;
use crate::error::{Result, StoreError};
use crate::fs::{FileAdapter, LocalAdapter};
use crate::host_state::{FileHostState, HostStateStore};
use crate::mcp::McpRegistryStore;
use crate::paths;
use crate::plugin_settings::{PluginSettings, PluginSettingsStore};
use crate::sessions::SessionStore;

mod blob;
mod split;


/// What a migration run did. Everything zero/false means the data was
/// already current.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub split_ran: bool,
    pub state_merged: bool,
    pub commands_migrated: usize,
    pub commands_skipped: usize,
    pub sessions_migrated: usize,
    pub sessions_skipped: usize,
    pub content_errors: usize,
    pub blob_cleared: bool,
}

impl MigrationReport {
    /// Whether this run changed anything on disk (or tried and failed to).
    pub fn did_anything(&self) -> bool {
        self.split_ran
            || self.state_merged
            || self.blob_cleared
            || self.commands_migrated > 0
            || self.sessions_migrated > 0
            || self.content_errors > 0
    }
}

/// The two settings records `initialize` hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSettings {
    pub agent: AgentSettings,
    pub plugin: PluginSettings,
}

/// Owns the stores and runs the startup sequence over one data root.
pub struct MigrationCoordinator {
    files: Arc<dyn FileAdapter>,
    host_state: Arc<dyn HostStateStore>,
    agent: AgentSettingsStore,
    plugin: PluginSettingsStore,
    commands: CommandStore,
    sessions: SessionStore,
    mcp: McpRegistryStore,
    hostname: String,
}

impl MigrationCoordinator {
    /// Wire a coordinator over an adapter and a host-state seam.
    ///
    /// The machine hostname is resolved once here; per-host lookups later
    /// never touch the environment again.
    pub fn new(files: Arc<dyn FileAdapter>, host_state: Arc<dyn HostStateStore>) -> Self {
        Self {
            agent: AgentSettingsStore::new(files.clone()),
            plugin: PluginSettingsStore::new(files.clone()),
            commands: CommandStore::new(files.clone()),
            sessions: SessionStore::new(files.clone()),
            mcp: McpRegistryStore::new(files.clone()),
            files,
            host_state,
            hostname: detect_hostname(),
        }
    }

    /// Coordinator over a plain directory: local files, host state in
    /// `data.json`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let files = Arc::new(LocalAdapter::new(root));
        let host_state = Arc::new(FileHostState::new(files.clone()));
        Self::new(files, host_state)
    }

    /// Coordinator over the default data directory.
    ///
    /// Precedence: `CLAUDIAN_HOME` environment variable, then
    /// `~/.claudian`.
    pub fn open_default() -> Result<Self> {
        let root = if let Ok(home) = std::env::var("CLAUDIAN_HOME") {
            PathBuf::from(home)
        } else {
            let home = dirs_next::home_dir().ok_or_else(|| {
                StoreError::io(
                    Path::new("~"),
                    io::Error::new(io::ErrorKind::NotFound, "home directory not found"),
                )
            })?;
            home.join(".claudian")
        };
        Ok(Self::open(root))
    }

    /// Run the startup sequence: ensure directories, migrate, load.
    pub async fn initialize(&self) -> Result<LoadedSettings> {
        for dir in [
            Path::new(""),
            Path::new(paths::COMMANDS_DIR),
            Path::new(paths::SESSIONS_DIR),
        ] {
            self.files
                .create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }

        let report = self.run_migrations().await?;
        if report.did_anything() {
            info!(
                "migrated legacy data: split={}, commands {} new / {} kept, \
                 conversations {} new / {} kept, errors={}, state cleared={}",
                report.split_ran,
                report.commands_migrated,
                report.commands_skipped,
                report.sessions_migrated,
                report.sessions_skipped,
                report.content_errors,
                report.blob_cleared,
            );
        }

        let agent = self.agent.load().await?;
        let plugin = self.plugin.load().await?;
        Ok(LoadedSettings { agent, plugin })
    }

    /// Detect and run every applicable migration, oldest first.
    pub async fn run_migrations(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        // Settings split: only while the plugin file does not exist yet.
        let agent_path = Path::new(paths::AGENT_SETTINGS_FILE);
        let plugin_path = Path::new(paths::PLUGIN_SETTINGS_FILE);
        let have_agent = self
            .files
            .exists(agent_path)
            .await
            .map_err(|e| StoreError::io(agent_path, e))?;
        let have_plugin = self
            .files
            .exists(plugin_path)
            .await
            .map_err(|e| StoreError::io(plugin_path, e))?;
        if have_agent && !have_plugin {
            report.split_ran = split::migrate_split(self.files.as_ref(), &self.plugin).await?;
        }

        // Blob drain, phase 1 then (when clean) phase 2.
        let blob_path = Path::new(paths::HOST_STATE_FILE);
        let raw = self
            .host_state
            .load_raw()
            .await
            .map_err(|e| StoreError::io(blob_path, e))?;
        let Some(blob) = raw.as_deref().and_then(blob::parse_blob) else {
            return Ok(report);
        };

        let outcome =
            blob::migrate_blob_contents(&self.plugin, &self.commands, &self.sessions, &blob)
                .await?;
        report.state_merged = outcome.state_merged;
        report.commands_migrated = outcome.commands_migrated;
        report.commands_skipped = outcome.commands_skipped;
        report.sessions_migrated = outcome.sessions_migrated;
        report.sessions_skipped = outcome.sessions_skipped;
        report.content_errors = outcome.errors;

        if outcome.should_clear() {
            blob::clear_consumed_keys(self.host_state.as_ref(), blob, &outcome.consumed).await?;
            report.blob_cleared = true;
        }
        Ok(report)
    }

    // === Store accessors ===

    pub fn agent_settings(&self) -> &AgentSettingsStore {
        &self.agent
    }

    pub fn plugin_settings(&self) -> &PluginSettingsStore {
        &self.plugin
    }

    pub fn commands(&self) -> &CommandStore {
        &self.commands
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn mcp(&self) -> &McpRegistryStore {
        &self.mcp
    }

    /// Hostname cached at construction.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// CLI binary path for this machine, per the settings' per-host map
    /// with the legacy single path as fallback.
    pub fn resolved_cli_path<'a>(&self, settings: &'a PluginSettings) -> Option<&'a str> {
        settings.cli_path_for_host(&self.hostname)
    }
}

/// Machine hostname: `HOSTNAME` env var first (doubles as an override),
/// then the `hostname` command, then `"unknown"`.
fn detect_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME")
        && !name.is_empty()
    {
        return name;
    }
    std::process::Command::new("hostname")
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
