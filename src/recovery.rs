//! Recovery & Truncation: folding a segment's log back into its data file,
//! both as part of `map` (recovering whatever a crash left behind) and as
//! part of an explicit `truncate_log` checkpoint sweep over the whole
//! backing directory.
//!
//! Grounded on the replay loop inside `rvm_map` and the directory walk in
//! `rvm_truncate_log`, `examples/original_source/rvm.cpp`.

use tracing::{debug, info};

use crate::error::Result;
use crate::log_format::read_records;
use crate::segment_table::SegmentTable;
use crate::store::BackingStore;

/// Replays `name`'s log file (if any) into `buffer`, then empties the log.
/// Returns whether anything was replayed — the caller only needs to
/// rewrite the segment's data file when this is `true`. The log file is
/// truncated to zero regardless, per `spec.md` §4.3 step 3: once its
/// contents (if any) have been folded into `buffer`, there's nothing left
/// on disk worth keeping.
pub(crate) fn replay_log(store: &BackingStore, name: &str, buffer: &mut [u8]) -> Result<bool> {
    let Some(mut log_file) = store.open_log_file_if_exists(name)? else {
        return Ok(false);
    };
    let bytes = store.read_full(&mut log_file)?;
    drop(log_file);
    let mut cursor = &bytes[..];
    let records = read_records(&mut cursor)?;
    let changed = !records.is_empty();
    for record in &records {
        let offset = record.offset as usize;
        let end = (offset + record.bytes.len()).min(buffer.len());
        if offset >= end {
            continue;
        }
        buffer[offset..end].copy_from_slice(&record.bytes[..end - offset]);
    }
    // Reopening with `create_truncated_log_file` truncates to zero whether
    // or not any records applied — matches the unconditional `unlink_log`
    // `checkpoint_all` already performs after its own call to this function.
    store.create_truncated_log_file(name)?;
    if changed {
        info!(segment = name, records = records.len(), "replayed log into buffer");
    }
    Ok(changed)
}

/// Checkpoints every segment in the backing store that has a `.log` file,
/// whether or not it's currently mapped, per `spec.md` §4.6. Idempotent: a
/// second call on a quiescent library finds no log files left to fold.
pub(crate) fn checkpoint_all(store: &BackingStore, table: &mut SegmentTable) -> Result<()> {
    let names = store.segments_with_log_files()?;
    debug!(segments = names.len(), "truncate_log: checkpointing segments");
    for name in &names {
        if let Some(handle) = table.get(name).cloned() {
            let mut buffer = handle.buffer().write();
            if replay_log(store, name, &mut buffer)? {
                let mut data_file = store.open_data_file(name)?;
                store.rewrite_full(&mut data_file, &buffer)?;
            }
        } else {
            checkpoint_unmapped_segment(store, name)?;
        }
        store.unlink_log(name)?;
    }
    info!(segments = names.len(), "truncate_log complete");
    Ok(())
}

/// The "transient map-then-unmap" path `spec.md` §4.6 describes for a
/// segment with a log file but no current mapping: load it exactly as
/// `map` would (attach, don't extend), replay its log, rewrite the data
/// file if anything changed, and drop the buffer without registering it.
fn checkpoint_unmapped_segment(store: &BackingStore, name: &str) -> Result<()> {
    let mut data_file = store.open_data_file(name)?;
    let mut buffer = store.read_full(&mut data_file)?;
    if replay_log(store, name, &mut buffer)? {
        store.rewrite_full(&mut data_file, &buffer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_format::write_record;

    #[test]
    fn replay_log_applies_records_and_reports_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::init(dir.path().join("store")).unwrap();
        let mut log = store.create_truncated_log_file("s").unwrap();
        write_record(&mut log, 0, b"HELLO").unwrap();
        drop(log);

        let mut buffer = vec![0u8; 10];
        let changed = replay_log(&store, "s", &mut buffer).unwrap();
        assert!(changed);
        assert_eq!(&buffer[0..5], b"HELLO");
    }

    #[test]
    fn replay_log_truncates_the_log_file_after_replaying_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::init(dir.path().join("store")).unwrap();
        let mut log = store.create_truncated_log_file("s").unwrap();
        write_record(&mut log, 0, b"HELLO").unwrap();
        drop(log);

        let mut buffer = vec![0u8; 10];
        replay_log(&store, "s", &mut buffer).unwrap();

        let mut log = store.open_log_file_if_exists("s").unwrap().unwrap();
        assert_eq!(store.read_full(&mut log).unwrap().len(), 0);
    }

    #[test]
    fn replay_log_on_absent_log_file_reports_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::init(dir.path().join("store")).unwrap();
        let mut buffer = vec![0u8; 4];
        assert!(!replay_log(&store, "never-committed", &mut buffer).unwrap());
    }

    #[test]
    fn checkpoint_unmapped_segment_folds_log_into_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::init(dir.path().join("store")).unwrap();
        let mut data = store.open_data_file("s").unwrap();
        store.extend_to(&mut data, 10).unwrap();
        let mut log = store.create_truncated_log_file("s").unwrap();
        write_record(&mut log, 2, b"hi").unwrap();
        drop(log);
        drop(data);

        checkpoint_unmapped_segment(&store, "s").unwrap();

        let mut data = store.open_data_file("s").unwrap();
        let contents = store.read_full(&mut data).unwrap();
        assert_eq!(&contents[2..4], b"hi");
    }
}
