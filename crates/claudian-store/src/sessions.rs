//! Conversation transcript store (`sessions/<id>.jsonl`).
//!
//! One JSONL file per conversation: line 1 is the [`SessionHeader`], every
//! further line one [`StoredMessage`]. The line format makes the streaming
//! path cheap: finishing a message appends one line instead of rewriting
//! the transcript.
//!
//! Headers are only rewritten by [`SessionStore::save`], so after a run of
//! appends the header's `updatedAt` can lag the newest message. Readers
//! use [`Session::updated_at`], which takes the newer of the two.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError, absent_as_none, is_not_found};
use crate::fs::FileAdapter;
use crate::jsonl::{decode_jsonl_lines, encode_jsonl_line};
use crate::paths::{self, is_valid_session_id};

/// Current time in epoch milliseconds, the unit used across the data files.
fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// First line of a transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHeader {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    /// The CLI's conversation id, once the first exchange reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// One chat message line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl StoredMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

/// A full conversation: header plus messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub header: SessionHeader,
    pub messages: Vec<StoredMessage>,
}

impl Session {
    /// New empty conversation with a freshly minted id.
    pub fn new(title: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            header: SessionHeader {
                id: Uuid::new_v4().to_string(),
                title: title.into(),
                created_at: now,
                updated_at: now,
                session_id: None,
            },
            messages: Vec::new(),
        }
    }

    /// Effective update time: the last message's timestamp when it is
    /// newer than the header value (headers lag behind appends).
    pub fn updated_at(&self) -> i64 {
        self.messages
            .last()
            .map(|m| m.timestamp)
            .filter(|t| *t > self.header.updated_at)
            .unwrap_or(self.header.updated_at)
    }
}

fn decode_session(text: &str, path: &Path) -> std::result::Result<Session, String> {
    let mut lines = text.lines();
    let header_line = lines.next().ok_or_else(|| "empty file".to_string())?;
    let header: SessionHeader =
        serde_json::from_str(header_line).map_err(|e| format!("bad header: {e}"))?;
    if header.id.trim().is_empty() {
        return Err("empty session id".to_string());
    }
    let messages = decode_jsonl_lines(lines, path, 2);
    Ok(Session { header, messages })
}

fn encode_session(session: &Session) -> serde_json::Result<String> {
    let mut text = encode_jsonl_line(&session.header)?;
    for message in &session.messages {
        text.push_str(&encode_jsonl_line(message)?);
    }
    Ok(text)
}

/// Store for the per-conversation transcript files.
#[derive(Clone)]
pub struct SessionStore {
    files: Arc<dyn FileAdapter>,
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(files: Arc<dyn FileAdapter>) -> Self {
        Self {
            files,
            dir: PathBuf::from(paths::SESSIONS_DIR),
        }
    }

    fn file_for(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_session_id(id) {
            return Err(StoreError::invalid_name(id));
        }
        Ok(paths::session_file(id))
    }

    /// All transcripts, newest first. A file with a bad header is skipped
    /// with a warning; one corrupt conversation never hides the rest.
    pub async fn load_all(&self) -> Result<Vec<Session>> {
        let names = self
            .files
            .list(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let mut sessions = Vec::new();
        for file_name in names {
            if !file_name.ends_with(".jsonl") {
                continue;
            }
            let path = self.dir.join(&file_name);
            let text = match self.files.read_text(&path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("{}: skipping unreadable transcript: {}", path.display(), e);
                    continue;
                }
            };
            match decode_session(&text, &path) {
                Ok(session) => sessions.push(session),
                Err(reason) => {
                    warn!("{}: skipping transcript: {}", path.display(), reason);
                }
            }
        }
        sessions.sort_by(|a, b| {
            b.updated_at()
                .cmp(&a.updated_at())
                .then_with(|| a.header.id.cmp(&b.header.id))
        });
        Ok(sessions)
    }

    /// Load one transcript by id. Absent -> `None`.
    pub async fn load(&self, id: &str) -> Result<Option<Session>> {
        let path = self.file_for(id)?;
        match absent_as_none(self.files.read_text(&path).await, &path)? {
            Some(text) => decode_session(&text, &path)
                .map(Some)
                .map_err(|reason| StoreError::parse(&path, reason)),
            None => Ok(None),
        }
    }

    /// Whether the file for `id` already exists (used by the content
    /// migration's skip check).
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let path = self.file_for(id)?;
        self.files
            .exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Rewrite the whole transcript (header changes, titles, edits).
    pub async fn save(&self, session: &Session) -> Result<()> {
        let path = self.file_for(&session.header.id)?;
        let text = encode_session(session).map_err(|e| {
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

    /// Append one message line to an existing transcript.
    ///
    /// The transcript must already have been created by [`save`]; a
    /// headerless file would be unreadable.
    ///
    /// [`save`]: SessionStore::save
    pub async fn append_message(&self, id: &str, message: &StoredMessage) -> Result<()> {
        let path = self.file_for(id)?;
        let present = self
            .files
            .exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        if !present {
            return Err(StoreError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "transcript does not exist"),
            ));
        }
        let line = encode_jsonl_line(message).map_err(|e| {
            StoreError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        self.files
            .append_text(&path, &line)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Delete the transcript file. Nonexistent -> no-op.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let path = self.file_for(id)?;
        match self.files.remove(&path).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}
