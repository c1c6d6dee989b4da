//! Slash-command store (`commands/<slug>.md`).
//!
//! One markdown file per command: a YAML frontmatter block with the
//! metadata, then the prompt body. The format matches what the agent CLI
//! reads from its own commands directory, so files can be copied between
//! the two without translation.

use std::path::PathBuf;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError, absent_as_none, is_not_found};
use crate::fs::FileAdapter;
use crate::paths::{self, command_slug};

/// A user-defined slash command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDefinition {
    pub id: String,
    /// Display name; the file slug derives from it.
    pub name: String,
    pub description: Option<String>,
    pub argument_hint: Option<String>,
    pub model: Option<String>,
    pub allowed_tools: Option<Vec<String>>,
    /// The prompt body below the frontmatter.
    pub content: String,
}

impl CommandDefinition {
    /// New command with a freshly minted id and no optional metadata.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            argument_hint: None,
            model: None,
            allowed_tools: None,
            content: content.into(),
        }
    }

    /// The file slug for this command's name.
    pub fn slug(&self) -> String {
        command_slug(&self.name)
    }
}

/// The frontmatter block as persisted. Kebab-case keys match the CLI's
/// command-file dialect.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CommandFrontmatter {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    argument_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allowed_tools: Option<Vec<String>>,
}

/// Split `---` fenced frontmatter from the body.
///
/// The opening fence must be the first line; the closing fence must sit on
/// its own line (or end the file). Returns `(yaml, body)`.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("---\n")?;
    let end = rest.find("\n---")?;
    let after = &rest[end + 4..];
    if !(after.is_empty() || after.starts_with('\n')) {
        return None;
    }
    let yaml = &rest[..end + 1];
    let body = after.strip_prefix('\n').unwrap_or(after);
    Some((yaml, body))
}

fn decode_command(text: &str) -> std::result::Result<CommandDefinition, String> {
    let (yaml, body) =
        split_frontmatter(text).ok_or_else(|| "missing frontmatter block".to_string())?;
    let fm: CommandFrontmatter = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
    if fm.id.trim().is_empty() || fm.name.trim().is_empty() {
        return Err("empty id or name".to_string());
    }
    Ok(CommandDefinition {
        id: fm.id,
        name: fm.name,
        description: fm.description,
        argument_hint: fm.argument_hint,
        model: fm.model,
        allowed_tools: fm.allowed_tools,
        content: body.to_string(),
    })
}

fn encode_command(command: &CommandDefinition) -> std::result::Result<String, serde_yaml::Error> {
    let fm = CommandFrontmatter {
        id: command.id.clone(),
        name: command.name.clone(),
        description: command.description.clone(),
        argument_hint: command.argument_hint.clone(),
        model: command.model.clone(),
        allowed_tools: command.allowed_tools.clone(),
    };
    let yaml = serde_yaml::to_string(&fm)?;
    // Body goes in verbatim so save-then-load returns exactly what was saved
    Ok(format!("---\n{yaml}---\n{}", command.content))
}

/// Store for the per-command markdown files.
#[derive(Clone)]
pub struct CommandStore {
    files: Arc<dyn FileAdapter>,
    dir: PathBuf,
}

impl CommandStore {
    pub fn new(files: Arc<dyn FileAdapter>) -> Self {
        Self {
            files,
            dir: PathBuf::from(paths::COMMANDS_DIR),
        }
    }

    fn file_for(&self, name: &str) -> Result<PathBuf> {
        let slug = command_slug(name);
        if slug.is_empty() {
            return Err(StoreError::invalid_name(name));
        }
        Ok(paths::command_file(&slug))
    }

    /// All commands, sorted by name. Files that fail to parse or fail the
    /// shape check are skipped with a warning; one bad file never hides
    /// the rest.
    pub async fn load_all(&self) -> Result<Vec<CommandDefinition>> {
        let names = self
            .files
            .list(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let mut commands = Vec::new();
        for file_name in names {
            if !file_name.ends_with(".md") {
                continue;
            }
            let path = self.dir.join(&file_name);
            let text = match self.files.read_text(&path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("{}: skipping unreadable command: {}", path.display(), e);
                    continue;
                }
            };
            match decode_command(&text) {
                Ok(command) => commands.push(command),
                Err(reason) => {
                    warn!("{}: skipping command: {}", path.display(), reason);
                }
            }
        }
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(commands)
    }

    /// Load one command by name. Absent -> `None`.
    pub async fn load(&self, name: &str) -> Result<Option<CommandDefinition>> {
        let path = self.file_for(name)?;
        match absent_as_none(self.files.read_text(&path).await, &path)? {
            Some(text) => decode_command(&text)
                .map(Some)
                .map_err(|reason| StoreError::parse(&path, reason)),
            None => Ok(None),
        }
    }

    /// Whether the file for `name` already exists (used by the content
    /// migration's skip check).
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.file_for(name)?;
        self.files
            .exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Write the command to its file, overwriting any previous version.
    pub async fn save(&self, command: &CommandDefinition) -> Result<()> {
        let path = self.file_for(&command.name)?;
        let text = encode_command(command).map_err(|e| {
            StoreError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        self.files
            .write_text(&path, &text)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Delete the command's file. Nonexistent -> no-op.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.file_for(name)?;
        match self.files.remove(&path).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}
