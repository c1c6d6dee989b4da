//! Data-directory layout: pure path computation, no file I/O.
//!
//! All paths are relative to the host-provided data root and are joined
//! onto it by the file adapter. Keeping the layout in one place means a
//! rename touches exactly one module.

use std::path::PathBuf;

/// Agent CLI settings, shared with the external tool.
pub const AGENT_SETTINGS_FILE: &str = "settings.json";

/// Plugin-private settings.
pub const PLUGIN_SETTINGS_FILE: &str = "claudian-settings.json";

/// One markdown file per slash command.
pub const COMMANDS_DIR: &str = "commands";

/// One JSONL transcript per conversation.
pub const SESSIONS_DIR: &str = "sessions";

/// MCP server registry.
pub const MCP_REGISTRY_FILE: &str = "mcp.json";

/// The host's opaque persisted state object.
pub const HOST_STATE_FILE: &str = "data.json";

/// Path of a command file for an already-derived slug.
pub fn command_file(slug: &str) -> PathBuf {
    PathBuf::from(COMMANDS_DIR).join(format!("{slug}.md"))
}

/// Path of a session transcript for a validated id.
pub fn session_file(id: &str) -> PathBuf {
    PathBuf::from(SESSIONS_DIR).join(format!("{id}.jsonl"))
}

/// Derive the file slug for a command name.
///
/// Lowercased ASCII alphanumerics; every other run of characters collapses
/// to a single `-`; no leading or trailing `-`. An all-symbol name yields
/// an empty slug, which the store rejects.
pub fn command_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut gap = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('-');
            }
            gap = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }
    slug
}

/// Whether a session id is safe to use as a file name.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Path construction ===

    #[test]
    fn test_command_file_path() {
        assert_eq!(
            command_file("fix-grammar"),
            PathBuf::from("commands/fix-grammar.md")
        );
    }

    #[test]
    fn test_session_file_path() {
        assert_eq!(
            session_file("3f0a2b"),
            PathBuf::from("sessions/3f0a2b.jsonl")
        );
    }

    // === Slug derivation ===

    #[test]
    fn test_slug_lowercases_and_joins_words() {
        assert_eq!(command_slug("Fix Grammar"), "fix-grammar");
    }

    #[test]
    fn test_slug_collapses_symbol_runs() {
        assert_eq!(command_slug("Summarize -- Notes!"), "summarize-notes");
    }

    #[test]
    fn test_slug_trims_edges() {
        assert_eq!(command_slug("  ...daily review...  "), "daily-review");
    }

    #[test]
    fn test_slug_of_symbols_is_empty() {
        assert_eq!(command_slug("!!!"), "");
    }

    // === Id validation ===

    #[test]
    fn test_valid_session_ids() {
        assert!(is_valid_session_id("530a0a1e-9f0b-4c6d"));
        assert!(is_valid_session_id("chat_12"));
    }

    #[test]
    fn test_invalid_session_ids() {
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("../escape"));
        assert!(!is_valid_session_id("a b"));
    }
}
