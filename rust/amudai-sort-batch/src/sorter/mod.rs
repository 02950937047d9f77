//! Primary-key grouping and final ordering of staged records.
//!
//! A group sorter receives `(record, position)` pairs in arrival order while the
//! batch accumulates, and produces the final sequence of positions exactly once,
//! on [`GroupSorter::sort`]. Each [`TableKind`] has its own deduplication rules:
//!
//! - [`PlainGroupSorter`]: an insert re-anchors its key and discards queued
//!   updates; deletes and partial updates are chained after the anchor.
//! - [`KvGroupSorter`]: a delete clears the key's queued inserts and is emitted
//!   ahead of all groups; groups are ordered by the sort key of their latest insert.
//! - [`KkvGroupSorter`]: like key-value for whole-bucket deletes; groups keep their
//!   creation order and are internally ordered by descending secondary key.

use std::cmp::Ordering;

use amudai_arena::BatchArena;
use amudai_collections::identity_hash::IdentityHashMap;

use crate::{config::TableKind, record::SortRecord};

mod kkv;
mod kv;
mod plain;

pub use kkv::KkvGroupSorter;
pub use kv::KvGroupSorter;
pub use plain::PlainGroupSorter;

pub trait GroupSorter: Send {
    /// Registers the record staged at `position`.
    ///
    /// # Panics
    ///
    /// Panics if called after [`sort`](Self::sort), or if the record carries no
    /// primary key.
    fn push(&mut self, record: &SortRecord, position: u32);

    /// Produces the final order of positions.
    ///
    /// `records` is the batch record sequence indexed by position, and `arena`
    /// the arena holding their sort keys.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    fn sort(&mut self, records: &[SortRecord], arena: &BatchArena) -> Vec<u32>;

    /// Approximate heap memory held by the sorter.
    fn memory_used(&self) -> usize;
}

/// Creates an empty sorter for `kind`.
pub fn create_group_sorter(kind: TableKind) -> Box<dyn GroupSorter> {
    match kind {
        TableKind::Plain => Box::new(PlainGroupSorter::new()),
        TableKind::KeyValue => Box::new(KvGroupSorter::new()),
        TableKind::KeyMultiValue => Box::new(KkvGroupSorter::new()),
    }
}

/// Compares the records at positions `a` and `b` by sort key, then by position.
///
/// Missing sort keys compare as empty. Keys produced by one converter have equal
/// widths, so the byte comparison is a plain `memcmp`.
pub(crate) fn compare_positions(
    records: &[SortRecord],
    arena: &BatchArena,
    a: u32,
    b: u32,
) -> Ordering {
    let key = |pos: u32| {
        records[pos as usize]
            .sort_key
            .map_or(&[][..], |slice| arena.get(slice))
    };
    let (key_a, key_b) = (key(a), key(b));
    debug_assert!(key_a.is_empty() || key_b.is_empty() || key_a.len() == key_b.len());
    key_a.cmp(key_b).then(a.cmp(&b))
}

pub(crate) fn primary_key_of(record: &SortRecord) -> u64 {
    match record.primary_key {
        Some(key) => key,
        None => panic!("record without primary key pushed to a group sorter"),
    }
}

/// Map from primary-key hash to group slot. Primary-key hashes are already
/// uniformly distributed, so they are used as their own hash.
pub(crate) type GroupIndex = IdentityHashMap<u64, u32>;

/// Tracks the single `sort()` transition of a sorter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SortState {
    sorted: bool,
}

impl SortState {
    pub fn check_push(&self) {
        assert!(!self.sorted, "group sorter: push after sort");
    }

    pub fn enter_sort(&mut self) {
        assert!(!self.sorted, "group sorter: sort called twice");
        self.sorted = true;
    }
}
