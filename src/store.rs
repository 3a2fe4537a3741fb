//! Backing Store: maps segment names to a directory entry pair (a data file
//! and a `.log` file) and provides the filesystem primitives the rest of the
//! crate is built on. No segment bookkeeping lives here — that's
//! [`crate::segment_table`].

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Result, RvmError};

const LOG_SUFFIX: &str = ".log";

/// Validates a segment name against the on-disk layout's constraints: it
/// must be non-empty and can't be a path (no separators) or collide with
/// the `.log` suffix convention.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RvmError::EmptyName);
    }
    if name.contains('/') || name.contains('\\') || name.ends_with(LOG_SUFFIX) {
        return Err(RvmError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub struct BackingStore {
    directory: PathBuf,
}

impl BackingStore {
    /// Creates the backing directory if it doesn't already exist. Fails
    /// only if creation fails for a reason other than "already exists".
    pub fn init(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        match fs::create_dir(&directory) {
            Ok(()) => info!(dir = %directory.display(), "created backing store directory"),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(dir = %directory.display(), "backing store directory already present")
            }
            Err(e) => return Err(RvmError::Io(e)),
        }
        Ok(Self { directory })
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    pub fn log_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}{LOG_SUFFIX}"))
    }

    /// Opens a segment's data file for read/write, creating it (empty) if
    /// it doesn't exist yet. See `SPEC_FULL.md` §4.5.5 for why this differs
    /// from the source, which required the file to pre-exist.
    pub fn open_data_file(&self, name: &str) -> Result<File> {
        let path = self.data_path(name);
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(RvmError::Io)
    }

    /// Opens a segment's log file for read/write if it exists; returns
    /// `None` if there is no log file (nothing committed since the last
    /// checkpoint, or the segment has never been checkpointed at all).
    pub fn open_log_file_if_exists(&self, name: &str) -> Result<Option<File>> {
        let path = self.log_path(name);
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(f) => Ok(Some(f)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RvmError::Io(e)),
        }
    }

    /// Opens (creating if absent) a segment's log file, truncated to zero
    /// length, ready to receive freshly written commit records.
    pub fn create_truncated_log_file(&self, name: &str) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.log_path(name))
            .map_err(RvmError::Io)
    }

    /// Extends `file` to `length` bytes by writing a single zero byte at
    /// `length - 1`, leaving the kernel to zero-fill the gap. A no-op if
    /// the file is already at least that long.
    pub fn extend_to(&self, file: &mut File, length: u64) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        file.seek(SeekFrom::Start(length - 1))?;
        file.write_all(&[0u8])?;
        file.flush()?;
        Ok(())
    }

    /// Reads `file`'s full contents into a fresh buffer, from the start.
    pub fn read_full(&self, file: &mut File) -> Result<Vec<u8>> {
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::new();
        std::io::Read::read_to_end(file, &mut buffer)?;
        Ok(buffer)
    }

    /// Overwrites `file`'s entire contents with `buffer`, truncating any
    /// excess length.
    pub fn rewrite_full(&self, file: &mut File, buffer: &[u8]) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(buffer)?;
        file.set_len(buffer.len() as u64)?;
        file.flush()?;
        Ok(())
    }

    /// Unlinks just the log file for `name`, if present. Used by
    /// `truncate_log` once a segment's log has been folded into its data
    /// file.
    pub fn unlink_log(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.log_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RvmError::Io(e)),
        }
    }

    /// Unlinks both the data file and (if present) the log file for `name`.
    /// Missing files are not an error — `destroy` is meant to be safely
    /// callable on a segment whose log was already checkpointed away.
    pub fn unlink(&self, name: &str) -> Result<()> {
        for path in [self.data_path(name), self.log_path(name)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(RvmError::Io(e)),
            }
        }
        Ok(())
    }

    /// Lists the segment names that currently have a `.log` file in the
    /// backing store, used by `truncate_log` to find checkpoint candidates
    /// — including segments that aren't currently mapped.
    pub fn segments_with_log_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = file_name.strip_suffix(LOG_SUFFIX) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}
