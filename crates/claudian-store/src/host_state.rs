//! Seam for the host's opaque persisted state (`data.json`).
//!
//! The host application owns one JSON object that predates the dedicated
//! data files. The migration engine reads it to find leftover plugin data
//! and clears only the keys it has consumed; every other key in the object
//! belongs to the host and is written back untouched.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::is_not_found;
use crate::fs::{BoxFuture, FileAdapter};
use crate::paths;

/// Raw access to the host's state object.
///
/// A trait rather than a concrete file: in the deployed plugin the object
/// lives behind the host's own persistence hooks, and migration tests
/// substitute failing implementations.
pub trait HostStateStore: Send + Sync {
    /// The raw JSON text, or `None` when no state has been written yet.
    fn load_raw<'a>(&'a self) -> BoxFuture<'a, io::Result<Option<String>>>;

    /// Overwrite the state object with `text`.
    fn save_raw<'a>(&'a self, text: &'a str) -> BoxFuture<'a, io::Result<()>>;
}

/// File-backed [`HostStateStore`] at `data.json` under the data root.
pub struct FileHostState {
    files: Arc<dyn FileAdapter>,
    path: PathBuf,
}

impl FileHostState {
    pub fn new(files: Arc<dyn FileAdapter>) -> Self {
        Self {
            files,
            path: PathBuf::from(paths::HOST_STATE_FILE),
        }
    }
}

impl HostStateStore for FileHostState {
    fn load_raw<'a>(&'a self) -> BoxFuture<'a, io::Result<Option<String>>> {
        Box::pin(async move {
            match self.files.read_text(&self.path).await {
                Ok(text) => Ok(Some(text)),
                Err(e) if is_not_found(&e) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    fn save_raw<'a>(&'a self, text: &'a str) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move { self.files.write_text(&self.path, text).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalAdapter;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileHostState, Arc<LocalAdapter>) {
        let dir = TempDir::new().unwrap();
        let files = Arc::new(LocalAdapter::new(dir.path()));
        let state = FileHostState::new(files.clone());
        (dir, state, files)
    }

    #[tokio::test]
    async fn test_load_raw_absent_is_none() {
        let (_dir, state, _files) = setup();
        assert!(state.load_raw().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let (_dir, state, _files) = setup();
        state.save_raw("{\"workspace\": {}}").await.unwrap();
        let text = state.load_raw().await.unwrap().unwrap();
        assert_eq!(text, "{\"workspace\": {}}");
    }

    #[tokio::test]
    async fn test_writes_land_at_data_json() {
        let (_dir, state, files) = setup();
        state.save_raw("{}").await.unwrap();
        assert!(files.exists(Path::new("data.json")).await.unwrap());
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let (_dir, state, _files) = setup();
        let boxed: Arc<dyn HostStateStore> = Arc::new(state);
        boxed.save_raw("{\"a\":1}").await.unwrap();
        assert_eq!(boxed.load_raw().await.unwrap().as_deref(), Some("{\"a\":1}"));
    }
}
