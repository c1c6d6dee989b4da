//! Atomic file write primitives.
//!
//! Every persisted file in the data directory goes through these helpers:
//! write to a `.tmp` sibling, fsync, then rename over the target. A crash
//! mid-write leaves either the old file or the new file, never a torn one.
//!
//! These are synchronous; async callers run them through
//! `tokio::task::spawn_blocking` (see [`crate::fs::LocalAdapter`]).

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Temp sibling for an in-flight write: `settings.json` -> `settings.json.tmp`.
///
/// The full file name is suffixed (rather than swapping the extension) so
/// two files sharing a stem never race on the same temp path.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace `path` with `contents`.
///
/// Creates parent directories as needed. The temp file is synced to disk
/// before the rename, so the rename only ever publishes complete bytes.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(path);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;

    {
        let mut writer = BufWriter::new(&mut file);
        writer.write_all(contents)?;
        writer.flush()?;
    }
    file.sync_all()?;

    fs::rename(&tmp, path)
}
