//! Locked read-modify-write of a target account file.
//!
//! Every on-disk mutation goes through [`mutate`]:
//! - acquires an exclusive advisory lock on `<lock dir>/<basename>.lock`,
//!   polling until the configured timeout
//! - reads the whole target and remembers its permission bits
//! - hands the lines to the caller's closure
//! - writes the result back in place and restores the permission bits
//! - releases the lock and removes the lock file
//!
//! If the closure fails, nothing is written. Locking is per target file;
//! there is no lock spanning several files.

use crate::core::codec::{AccountLine, line_key, parse_lines};
use crate::core::config::LockConfig;
use crate::core::error::EntitiesError;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// Held advisory lock. Unlocks and removes the lock file on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Unlink while still holding the lock so no waiter keeps a stale inode.
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
        debug!(path = %self.path.display(), "lock released");
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
        || err.kind() == std::io::ErrorKind::WouldBlock
}

fn open_lock_file(path: &Path) -> Result<File, EntitiesError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| EntitiesError::LockFailed(format!("{}: {}", path.display(), e)))
}

/// True when `path` still names the inode `file` was opened from. A holder
/// removes the lock file on release, so a waiter may lock an unlinked inode.
fn still_linked(file: &File, path: &Path) -> bool {
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

/// Acquire the lock guarding `target`, retrying every poll interval until
/// the timeout elapses.
pub fn acquire_lock(target: &Path, config: &LockConfig) -> Result<LockGuard, EntitiesError> {
    fs::create_dir_all(&config.dir).map_err(|e| {
        EntitiesError::LockFailed(format!(
            "cannot create lock directory {}: {}",
            config.dir.display(),
            e
        ))
    })?;

    let path = config.lock_path(target);
    let deadline = Instant::now() + config.timeout();
    let mut attempt = 0u32;
    loop {
        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) if still_linked(&file, &path) => {
                debug!(path = %path.display(), attempt, "lock acquired");
                return Ok(LockGuard { file, path });
            }
            Ok(()) => {
                debug!(path = %path.display(), attempt, "lock file replaced, reopening");
            }
            Err(e) if is_contended(&e) => {
                debug!(path = %path.display(), attempt, "lock busy, retrying");
            }
            Err(e) => {
                return Err(EntitiesError::LockFailed(format!(
                    "{}: {}",
                    path.display(),
                    e
                )));
            }
        }
        if Instant::now() >= deadline {
            return Err(EntitiesError::LockFailed(format!(
                "timed out after {}ms waiting for {}",
                config.timeout_ms,
                path.display()
            )));
        }
        attempt += 1;
        thread::sleep(config.poll_interval());
    }
}

/// In-memory lines of a target file, owned for one locked section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLines {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl TargetLines {
    pub fn from_content(content: &str) -> Self {
        if content.is_empty() {
            // New records appended to an empty file end with a newline.
            return Self {
                lines: Vec::new(),
                trailing_newline: true,
            };
        }
        let trailing_newline = content.ends_with('\n');
        let body = content.strip_suffix('\n').unwrap_or(content);
        Self {
            lines: body.split('\n').map(str::to_string).collect(),
            trailing_newline,
        }
    }

    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut out = self.lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Index of the first line whose leading field is `key`.
    pub fn position(&self, key: &str) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        self.lines.iter().position(|line| line_key(line) == key)
    }

    pub fn parse<T: AccountLine>(&self) -> Result<BTreeMap<String, T>, EntitiesError> {
        parse_lines(self.lines.iter().map(String::as_str))
    }

    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    pub fn replace(&mut self, idx: usize, line: String) {
        self.lines[idx] = line;
    }

    pub fn remove(&mut self, idx: usize) -> String {
        self.lines.remove(idx)
    }
}

/// Run `mutation` over the lines of `target` under its lock and write the
/// result back, preserving the file's permission bits.
pub fn mutate<F, R>(target: &Path, config: &LockConfig, mutation: F) -> Result<R, EntitiesError>
where
    F: FnOnce(&mut TargetLines) -> Result<R, EntitiesError>,
{
    let _guard = acquire_lock(target, config)?;

    let content = fs::read_to_string(target).map_err(EntitiesError::IoError)?;
    let permissions = fs::metadata(target)
        .map_err(EntitiesError::IoError)?
        .permissions();

    let mut lines = TargetLines::from_content(&content);
    let result = mutation(&mut lines)?;

    fs::write(target, lines.render()).map_err(EntitiesError::IoError)?;
    fs::set_permissions(target, permissions).map_err(EntitiesError::IoError)?;
    debug!(path = %target.display(), lines = lines.lines().len(), "target rewritten");

    Ok(result)
}
