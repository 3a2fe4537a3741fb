//! RVM — a recoverable virtual memory library.
//!
//! Named byte segments live both in process memory and on a persistent
//! backing directory. Transactions mutate a set of mapped segments;
//! `commit_trans` makes the result durable, `abort_trans` restores the
//! segments to their pre-transaction contents, and `map` recovers the last
//! committed state after a crash by replaying a segment's write-ahead log.
//!
//! ```no_run
//! use rvm::Rvm;
//!
//! let rvm = Rvm::init("./data").unwrap();
//! let seg = rvm.map("accounts", 4096).unwrap();
//! let mut txn = rvm.begin_trans(&[seg.clone()]).unwrap();
//! txn.about_to_modify(&seg, 0, 5).unwrap();
//! seg.buffer().write()[0..5].copy_from_slice(b"HELLO");
//! rvm.commit_trans(txn).unwrap();
//! ```

pub mod config;
pub mod error;
mod log_format;
mod recovery;
pub mod segment_table;
pub mod store;
pub mod transaction;

pub use config::Config;
pub use error::{Result, RvmError};
pub use segment_table::SegmentHandle;
pub use transaction::Transaction;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use segment_table::SegmentTable;
use store::BackingStore;

struct State {
    table: SegmentTable,
}

/// A library instance bound to one backing-store directory. Created by
/// [`Rvm::init`], process-lifetime, never explicitly torn down.
///
/// `Rvm`'s own state (the Segment Table and being-modified set) is guarded
/// by a `parking_lot::Mutex` so that sharing one instance across threads is
/// well-defined — the library still only allows one open transaction per
/// segment at a time, which is the single-writer rule `spec.md` §5
/// describes, not a promise of any finer-grained concurrency.
pub struct Rvm {
    store: BackingStore,
    state: Mutex<State>,
    config: Config,
}

impl Rvm {
    /// Initializes a library instance backed by `directory`, creating it if
    /// it doesn't already exist. Fails only if directory creation fails for
    /// a reason other than "already exists".
    pub fn init(directory: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(Config::new(directory))
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let store = BackingStore::init(&config.directory)?;
        Ok(Self {
            store,
            state: Mutex::new(State {
                table: SegmentTable::new(),
            }),
            config,
        })
    }

    /// Maps a segment into memory, creating its data file if this is the
    /// first time `name` has been mapped. If the file already exists and is
    /// shorter than `creation_size`, it's extended; otherwise the file's
    /// existing length is the effective size. A segment's write-ahead log,
    /// if any, is replayed into the returned buffer and the data file
    /// rewritten before `map` returns — this is the crash recovery path.
    ///
    /// Fails if `name` is invalid (§`store::validate_name`) or already
    /// mapped.
    pub fn map(&self, name: &str, creation_size: usize) -> Result<SegmentHandle> {
        store::validate_name(name)?;
        let mut state = self.state.lock();
        if state.table.is_mapped(name) {
            warn!(segment = name, "rejecting duplicate map");
            return Err(RvmError::AlreadyMapped(name.to_string()));
        }

        let mut data_file = self.store.open_data_file(name)?;
        let current_len = data_file.metadata()?.len();
        let creation_size = creation_size as u64;
        if creation_size > current_len {
            self.store.extend_to(&mut data_file, creation_size)?;
        }

        let mut buffer = self.store.read_full(&mut data_file)?;
        if recovery::replay_log(&self.store, name, &mut buffer)? {
            self.store.rewrite_full(&mut data_file, &buffer)?;
        }

        let size = buffer.len();
        let handle = state.table.insert(name, buffer);
        info!(segment = name, size, "segment mapped");
        Ok(handle)
    }

    /// Releases `segment`'s in-memory buffer and removes its Segment Table
    /// entry. Does not flush — durable state is only ever reached through
    /// `commit_trans`. Unmapping a segment owned by an open transaction is
    /// undefined; the caller must avoid it.
    pub fn unmap(&self, segment: &SegmentHandle) {
        let mut state = self.state.lock();
        state.table.remove(segment.name());
    }

    /// Unlinks `name`'s data and log files. A no-op if the segment is
    /// currently mapped, rather than an error — see `SPEC_FULL.md` §4.5.5.
    pub fn destroy(&self, name: &str) -> Result<()> {
        let state = self.state.lock();
        if state.table.is_mapped(name) {
            warn!(segment = name, "ignoring destroy of a currently mapped segment");
            return Ok(());
        }
        drop(state);
        self.store.unlink(name)
    }

    /// Begins a transaction over `segments`. All-or-nothing: if any segment
    /// isn't mapped, is already owned by another open transaction, or
    /// appears more than once in `segments` (which would otherwise let two
    /// `about_to_modify` sequences on the same segment coexist in one
    /// transaction), no segment is registered and an error is returned.
    pub fn begin_trans(&self, segments: &[SegmentHandle]) -> Result<Transaction> {
        if segments.is_empty() {
            return Err(RvmError::EmptyTransaction);
        }
        let mut state = self.state.lock();
        let mut seen = HashSet::new();
        for segment in segments {
            if !state.table.is_mapped(segment.name()) {
                return Err(RvmError::NotMapped(segment.name().to_string()));
            }
            if state.table.is_being_modified(segment.name()) || !seen.insert(segment.name()) {
                return Err(RvmError::SegmentBusy(segment.name().to_string()));
            }
        }
        for segment in segments {
            state.table.mark_being_modified(Arc::from(segment.name()));
        }
        Ok(Transaction::new(segments.to_vec()))
    }

    /// Commits `txn`: writes each participating segment's captured changes
    /// to its log file as post-image records, then releases the segments
    /// back to the being-modified-free pool.
    pub fn commit_trans(&self, txn: Transaction) -> Result<()> {
        let mut state = self.state.lock();
        txn.commit(&self.store, &mut state.table, self.config.sync_on_commit)
    }

    /// Aborts `txn`: restores every participating segment's pre-transaction
    /// contents and releases the segments back to the being-modified-free
    /// pool. No log-file I/O occurs.
    pub fn abort_trans(&self, txn: Transaction) {
        let mut state = self.state.lock();
        txn.abort(&mut state.table);
    }

    /// Checkpoints every segment with a `.log` file in the backing
    /// directory — mapped or not — folding its log into its data file.
    /// Idempotent on a quiescent library.
    pub fn truncate_log(&self) -> Result<()> {
        let mut state = self.state.lock();
        recovery::checkpoint_all(&self.store, &mut state.table)
    }

    /// Looks up a mapped segment by name. `None` if `name` isn't currently
    /// mapped.
    pub fn segment_by_name(&self, name: &str) -> Option<SegmentHandle> {
        self.state.lock().table.get(name).cloned()
    }

    /// The name a mapped segment handle was created with. `None` if the
    /// segment has since been unmapped.
    pub fn name_of(&self, segment: &SegmentHandle) -> Option<String> {
        let state = self.state.lock();
        state
            .table
            .get(segment.name())
            .filter(|mapped| mapped.same_segment_as(segment))
            .map(|mapped| mapped.name().to_string())
    }

    /// The current size of a mapped segment. `None` if `name` isn't
    /// currently mapped.
    pub fn size_of(&self, name: &str) -> Option<usize> {
        self.state.lock().table.get(name).map(|h| h.size())
    }
}
