//! Filesystem seam for the stores.
//!
//! [`FileAdapter`] is the only place the engine touches a filesystem. The
//! trait is dyn-compatible (methods return boxed futures) so tests can wrap
//! the real adapter to inject faults, and so an embedding host can route
//! storage through its own I/O layer.
//!
//! All paths are relative to the plugin data root; [`LocalAdapter`] joins
//! them onto its root directory. Adapter methods carry no domain knowledge:
//! defaults for absent files, skip-on-parse-failure and the other recovery
//! rules live in the stores.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::Serialize;
use tokio::fs;

use crate::error::{Result, StoreError};
use crate::safe_io;

/// Boxed, Send future used as the return type for all adapter methods.
///
/// `impl Future` would break dyn-compatibility; input references share one
/// lifetime so the future can borrow both `&self` and the path arguments.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage access for every store in the crate.
pub trait FileAdapter: Send + Sync {
    /// Check whether a path exists.
    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<bool>>;

    /// Read a file as UTF-8 text. `NotFound` propagates.
    fn read_text<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<String>>;

    /// Create or overwrite a file atomically, creating parent directories.
    fn write_text<'a>(
        &'a self,
        path: &'a Path,
        contents: &'a str,
    ) -> BoxFuture<'a, io::Result<()>>;

    /// Append to a file, creating it (and parents) if missing.
    fn append_text<'a>(
        &'a self,
        path: &'a Path,
        contents: &'a str,
    ) -> BoxFuture<'a, io::Result<()>>;

    /// Delete a file. `NotFound` propagates; each store decides whether
    /// that counts as an error.
    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>>;

    /// File names (not paths) in a directory. Absent directory -> empty.
    fn list<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, io::Result<Vec<String>>>;

    /// Create a directory and its parents.
    fn create_dir_all<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, io::Result<()>>;
}

/// Serialize `value` as pretty JSON with a trailing newline and write it
/// through the adapter. Every JSON file in the data directory shares this
/// format, so rewriting an unchanged record reproduces identical bytes.
pub(crate) async fn write_json_file<T: Serialize + ?Sized>(
    files: &dyn FileAdapter,
    path: &Path,
    value: &T,
) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
    text.push('\n');
    files
        .write_text(path, &text)
        .await
        .map_err(|e| StoreError::io(path, e))
}

/// Filesystem-backed adapter rooted at the plugin data directory.
pub struct LocalAdapter {
    root: PathBuf,
}

impl LocalAdapter {
    /// Create an adapter resolving all paths under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data root this adapter resolves against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn os_path(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl FileAdapter for LocalAdapter {
    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<bool>> {
        Box::pin(async move { Ok(fs::metadata(self.os_path(path)).await.is_ok()) })
    }

    fn read_text<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<String>> {
        Box::pin(async move { fs::read_to_string(self.os_path(path)).await })
    }

    fn write_text<'a>(
        &'a self,
        path: &'a Path,
        contents: &'a str,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let os_path = self.os_path(path);
            // Clone for the blocking closure (needs 'static)
            let bytes = contents.as_bytes().to_vec();
            tokio::task::spawn_blocking(move || safe_io::atomic_write(&os_path, &bytes))
                .await
                .map_err(|e| io::Error::other(format!("join error: {}", e)))?
        })
    }

    fn append_text<'a>(
        &'a self,
        path: &'a Path,
        contents: &'a str,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            use tokio::io::AsyncWriteExt;
            let os_path = self.os_path(path);
            if let Some(parent) = os_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(os_path)
                .await?;
            file.write_all(contents.as_bytes()).await?;
            file.flush().await?;
            // Transcript lines must survive a crash once appended
            file.sync_all().await
        })
    }

    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move { fs::remove_file(self.os_path(path)).await })
    }

    fn list<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, io::Result<Vec<String>>> {
        Box::pin(async move {
            let os_dir = self.os_path(dir);
            if fs::metadata(&os_dir).await.is_err() {
                return Ok(Vec::new());
            }
            let mut names = Vec::new();
            let mut read_dir = fs::read_dir(os_dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            Ok(names)
        })
    }

    fn create_dir_all<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move { fs::create_dir_all(self.os_path(dir)).await })
    }
}
