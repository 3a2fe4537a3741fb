//! Transaction Engine and in-memory Change Log.
//!
//! Grounded directly on `rvm_begin_trans`/`rvm_about_to_modify`/
//! `rvm_commit_trans`/`rvm_abort_trans` in `examples/original_source/
//! rvm.cpp`: `begin_trans` is all-or-nothing registration against the
//! being-modified set, `about_to_modify` captures a pre-image before the
//! caller mutates the live buffer, `commit_trans` writes post-images to
//! each segment's log file, and `abort_trans` restores pre-images in
//! reverse capture order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Result, RvmError};
use crate::log_format::write_record;
use crate::segment_table::{SegmentHandle, SegmentTable};
use crate::store::BackingStore;

/// A captured pre-image of a byte range, saved the instant
/// `about_to_modify` is called — before the caller has had a chance to
/// mutate the live buffer.
struct ChangeLogEntry {
    offset: usize,
    pre_image: Vec<u8>,
}

/// A transaction's handle: the set of segments it owns plus, per segment,
/// the ordered change log `about_to_modify` has built up so far.
///
/// State machine: `OPEN → {COMMITTED, ABORTED}`. There is no way to reopen
/// or nest a `Transaction` — `commit` and `abort` both consume `self`.
pub struct Transaction {
    segments: Vec<SegmentHandle>,
    logs: HashMap<Arc<str>, Vec<ChangeLogEntry>>,
}

impl Transaction {
    /// Begins a transaction over `segments`. All-or-nothing: the caller
    /// (`Rvm::begin_trans`) must have already verified every segment is
    /// mapped and not currently being modified, and registered them in the
    /// being-modified set, before constructing this.
    pub(crate) fn new(segments: Vec<SegmentHandle>) -> Self {
        let logs = segments
            .iter()
            .map(|s| (Arc::from(s.name()), Vec::new()))
            .collect();
        Self { segments, logs }
    }

    pub fn segments(&self) -> &[SegmentHandle] {
        &self.segments
    }

    fn find_segment(&self, segbase: &SegmentHandle) -> Option<&SegmentHandle> {
        self.segments.iter().find(|s| s.same_segment_as(segbase))
    }

    /// Captures `segbase[offset..offset+size]` as a pre-image. Legal to
    /// call more than once on overlapping or identical ranges — each call
    /// appends an independent entry; `abort` restores them in reverse, so
    /// the earliest pre-image wins for overlapping ranges (see `spec.md`
    /// §8's round-trip law).
    pub fn about_to_modify(&mut self, segbase: &SegmentHandle, offset: usize, size: usize) -> Result<()> {
        let Some(segment) = self.find_segment(segbase) else {
            warn!(segment = segbase.name(), "about_to_modify on a segment outside this transaction");
            return Err(RvmError::NotMapped(segbase.name().to_string()));
        };
        let segment_size = segment.size();
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= segment_size)
            .ok_or(RvmError::OutOfBounds { offset, size, segment_size })?;

        let pre_image = segment.buffer().read()[offset..end].to_vec();
        self.logs
            .get_mut(segment.name())
            .expect("every segment has a log entry from Transaction::new")
            .push(ChangeLogEntry { offset, pre_image });
        Ok(())
    }

    /// Writes each segment's post-image records to its log file, in
    /// `about_to_modify` order, then (optionally) flushes. Removes the
    /// segments from `table`'s being-modified set on the way out, whether
    /// or not this is the last step before `self` is dropped.
    pub(crate) fn commit(
        self,
        store: &BackingStore,
        table: &mut SegmentTable,
        sync_on_commit: bool,
    ) -> Result<()> {
        for segment in &self.segments {
            let entries = &self.logs[segment.name()];
            let mut log_file = store.create_truncated_log_file(segment.name())?;
            {
                let buffer = segment.buffer().read();
                for entry in entries {
                    let end = entry.offset + entry.pre_image.len();
                    write_record(&mut log_file, entry.offset as u64, &buffer[entry.offset..end])?;
                }
            }
            if sync_on_commit {
                log_file.sync_all()?;
            }
            table.clear_being_modified(segment.name());
        }
        info!(segments = self.segments.len(), "transaction committed");
        Ok(())
    }

    /// Restores every participating segment's pre-images, walking each
    /// segment's change log in reverse so that, for overlapping ranges,
    /// the *earliest* captured pre-image is the one left standing.
    pub(crate) fn abort(self, table: &mut SegmentTable) {
        for segment in &self.segments {
            let entries = &self.logs[segment.name()];
            let mut buffer = segment.buffer().write();
            for entry in entries.iter().rev() {
                let end = entry.offset + entry.pre_image.len();
                buffer[entry.offset..end].copy_from_slice(&entry.pre_image);
            }
            drop(buffer);
            table.clear_being_modified(segment.name());
        }
        info!(segments = self.segments.len(), "transaction aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(size: usize) -> SegmentHandle {
        let mut table = SegmentTable::new();
        table.insert("s", vec![0u8; size])
    }

    #[test]
    fn about_to_modify_rejects_out_of_bounds_range() {
        let h = handle(4);
        let mut txn = Transaction::new(vec![h.clone()]);
        assert!(txn.about_to_modify(&h, 2, 4).is_err());
        assert!(txn.about_to_modify(&h, 0, 4).is_ok());
    }

    #[test]
    fn about_to_modify_rejects_segment_outside_transaction() {
        let h_in = handle(4);
        let h_out = handle(4);
        let mut txn = Transaction::new(vec![h_in]);
        assert!(txn.about_to_modify(&h_out, 0, 1).is_err());
    }

    #[test]
    fn abort_restores_earliest_pre_image_on_overlap() {
        let h = handle(8);
        let mut txn = Transaction::new(vec![h.clone()]);
        txn.about_to_modify(&h, 0, 4).unwrap(); // pre-image: [0,0,0,0]
        h.buffer().write()[0..4].copy_from_slice(&[1, 1, 1, 1]);
        txn.about_to_modify(&h, 2, 4).unwrap(); // pre-image: [1,1,0,0]
        h.buffer().write()[2..6].copy_from_slice(&[9, 9, 9, 9]);

        let mut table = SegmentTable::new();
        txn.abort(&mut table);

        // Reverse order restores the [2,4) entry first, then the [0,4)
        // entry overwrites it, so the earliest (all-zero) image wins.
        assert_eq!(&*h.buffer().read(), &[0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
