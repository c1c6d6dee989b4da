//! claudian-store: storage and migration engine for the Claudian plugin.
//!
//! Claudian embeds an AI agent CLI inside a note-taking host. Everything
//! it persists lives in one data directory: two settings files (one the
//! CLI reads, one plugin-private), per-entity files for slash commands
//! and conversation transcripts, the MCP server registry, and the host's
//! opaque state object. This crate owns that directory: the typed stores,
//! the atomic write discipline, and the startup migrations that move data
//! out of legacy locations.
//!
//! # Quick Start
//!
//! ```no_run
//! use claudian_store::MigrationCoordinator;
//!
//! #[tokio::main]
//! async fn main() -> claudian_store::Result<()> {
//!     let coordinator = MigrationCoordinator::open_default()?;
//!     let settings = coordinator.initialize().await?;
//!     println!("model: {}", settings.plugin.model);
//!
//!     for session in coordinator.sessions().load_all().await? {
//!         println!("{}: {}", session.header.id, session.header.title);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! For lower-level access, use the individual stores directly.

pub mod agent_settings;
pub mod commands;
pub mod error;
pub mod fs;
pub mod host_state;
mod jsonl;
pub mod mcp;
pub mod migration;
pub mod paths;
pub mod plugin_settings;
mod safe_io;
pub mod sessions;

// Re-export the coordinator facade
pub use migration::{LoadedSettings, MigrationCoordinator, MigrationReport};

// Re-export commonly used types
pub use agent_settings::{AgentSettings, AgentSettingsStore, PermissionSettings, rule_string};
pub use commands::{CommandDefinition, CommandStore};
pub use error::{Result, StoreError};
pub use fs::{FileAdapter, LocalAdapter};
pub use host_state::{FileHostState, HostStateStore};
pub use mcp::{McpRegistryStore, McpServerConfig, McpServerEntry};
pub use plugin_settings::{PluginSettings, PluginSettingsPatch, PluginSettingsStore};
pub use sessions::{Session, SessionHeader, SessionStore, StoredMessage};
