use amudai_arena::BatchArena;

use super::{GroupIndex, GroupSorter, SortState, primary_key_of};
use crate::record::{OperationKind, SortRecord};

/// Group sorter for key-multivalue tables.
///
/// A whole-bucket delete (a delete without a secondary key) clears the bucket's
/// queued entries and goes to the unsorted list, which is emitted first. Every
/// other record is appended to its bucket as `(secondary_key_hash, position)`.
///
/// Buckets are emitted in creation order. Entries within a bucket are ordered by
/// descending secondary key hash, ties by ascending position, which is the layout
/// the storage format expects for bounded top-N scans.
#[derive(Default)]
pub struct KkvGroupSorter {
    index: GroupIndex,
    groups: Vec<Vec<(u64, u32)>>,
    unsorted: Vec<u32>,
    state: SortState,
}

impl KkvGroupSorter {
    pub fn new() -> KkvGroupSorter {
        Default::default()
    }
}

impl GroupSorter for KkvGroupSorter {
    fn push(&mut self, record: &SortRecord, position: u32) {
        self.state.check_push();
        let key = primary_key_of(record);
        let secondary_key = match (record.operation, record.secondary_key_hash) {
            (OperationKind::Delete, None) => {
                if let Some(&slot) = self.index.get(&key) {
                    self.groups[slot as usize].clear();
                }
                self.unsorted.push(position);
                return;
            }
            (_, Some(secondary_key)) => secondary_key,
            (operation, None) => {
                panic!("kkv {operation:?} record without secondary key at position {position}")
            }
        };

        let next_slot = self.groups.len() as u32;
        let slot = *self.index.entry(key).or_insert(next_slot);
        if slot == next_slot {
            self.groups.push(Vec::new());
        }
        self.groups[slot as usize].push((secondary_key, position));
    }

    fn sort(&mut self, _records: &[SortRecord], _arena: &BatchArena) -> Vec<u32> {
        self.state.enter_sort();
        let mut groups = std::mem::take(&mut self.groups);
        let mut order = std::mem::take(&mut self.unsorted);
        order.reserve(groups.iter().map(Vec::len).sum());
        for group in groups.iter_mut() {
            group.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            order.extend(group.iter().map(|&(_, position)| position));
        }
        self.index = GroupIndex::default();
        order
    }

    fn memory_used(&self) -> usize {
        self.index.capacity() * (size_of::<u64>() + size_of::<u32>())
            + self.unsorted.capacity() * size_of::<u32>()
            + self.groups.capacity() * size_of::<Vec<(u64, u32)>>()
            + self
                .groups
                .iter()
                .map(|g| g.capacity() * size_of::<(u64, u32)>())
                .sum::<usize>()
    }
}
