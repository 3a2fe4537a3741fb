use std::path::PathBuf;

/// Library-wide configuration for an [`Rvm`](crate::Rvm) instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backing-store directory. Created on `init` if it doesn't exist.
    pub directory: PathBuf,
    /// Whether `commit_trans` calls `fsync` on each segment's log file
    /// before returning. The original implementation never does this;
    /// durability beyond the filesystem's own cache policy requires it.
    pub sync_on_commit: bool,
}

impl Config {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            sync_on_commit: true,
        }
    }
}
