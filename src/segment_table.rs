//! Segment Table: the in-memory registry of currently mapped segments.
//!
//! The source kept three parallel maps (name→size, name→base, base→name)
//! plus a being-modified set. `spec.md` §9 points out that the reverse
//! lookup collapses away if the name travels with the handle, so that's
//! what [`SegmentHandle`] does here — it *is* the redesigned "base
//! pointer", and it carries its own name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

/// A live, mapped segment. Cheap to clone: clones share the same
/// underlying buffer. This is the handle the public API hands out in place
/// of a raw base pointer — see `SPEC_FULL.md` §4.2.5.
#[derive(Clone)]
pub struct SegmentHandle {
    name: Arc<str>,
    buffer: Arc<RwLock<Vec<u8>>>,
}

impl SegmentHandle {
    fn new(name: &str, buffer: Vec<u8>) -> Self {
        Self {
            name: Arc::from(name),
            buffer: Arc::new(RwLock::new(buffer)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn buffer(&self) -> &Arc<RwLock<Vec<u8>>> {
        &self.buffer
    }

    /// Identity comparison: two handles refer to the same mapped segment
    /// iff they share the same underlying buffer allocation.
    pub fn same_segment_as(&self, other: &SegmentHandle) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

#[derive(Default)]
pub struct SegmentTable {
    by_name: HashMap<Arc<str>, SegmentHandle>,
    being_modified: HashSet<Arc<str>>,
}

impl SegmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mapped(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SegmentHandle> {
        self.by_name.get(name)
    }

    /// Registers a freshly mapped segment. Returns the handle the caller
    /// should hand back to the client. Panics if `name` is already mapped
    /// — callers are expected to have checked `is_mapped` first, since the
    /// spec treats a duplicate map as a conflict to reject earlier, not an
    /// internal invariant violation.
    pub fn insert(&mut self, name: &str, buffer: Vec<u8>) -> SegmentHandle {
        debug_assert!(!self.is_mapped(name), "duplicate segment table insert");
        let handle = SegmentHandle::new(name, buffer);
        self.by_name.insert(handle.name.clone(), handle.clone());
        handle
    }

    /// Removes a mapped segment's bookkeeping. Does not touch the
    /// being-modified set — callers must not unmap a segment that's
    /// currently owned by an open transaction.
    pub fn remove(&mut self, name: &str) -> Option<SegmentHandle> {
        self.by_name.remove(name)
    }

    pub fn is_being_modified(&self, name: &str) -> bool {
        self.being_modified.contains(name)
    }

    pub fn mark_being_modified(&mut self, name: Arc<str>) {
        self.being_modified.insert(name);
    }

    pub fn clear_being_modified(&mut self, name: &str) {
        self.being_modified.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut table = SegmentTable::new();
        assert!(!table.is_mapped("s"));
        let handle = table.insert("s", vec![0u8; 4]);
        assert!(table.is_mapped("s"));
        assert_eq!(table.get("s").unwrap().name(), "s");
        assert_eq!(handle.size(), 4);
    }

    #[test]
    fn being_modified_set_tracks_names_independently_of_mapping() {
        let mut table = SegmentTable::new();
        let handle = table.insert("s", vec![0u8; 1]);
        assert!(!table.is_being_modified("s"));
        table.mark_being_modified(Arc::from(handle.name()));
        assert!(table.is_being_modified("s"));
        table.clear_being_modified("s");
        assert!(!table.is_being_modified("s"));
    }

    #[test]
    fn remove_erases_mapping() {
        let mut table = SegmentTable::new();
        table.insert("s", vec![0u8; 1]);
        assert!(table.remove("s").is_some());
        assert!(!table.is_mapped("s"));
    }
}
