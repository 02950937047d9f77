use amudai_arena::BatchArena;

use super::{GroupIndex, GroupSorter, SortState, compare_positions, primary_key_of};
use crate::record::{OperationKind, SortRecord};

/// Group sorter for key-value tables.
///
/// A delete clears the positions queued for its key (the slot is kept and reused)
/// and is recorded in an unsorted list that is emitted first, in arrival order.
/// Non-empty groups follow, ordered by the sort key of their most recently
/// appended record; positions inside a group keep their arrival order so that a
/// downstream merge still sees every surviving version.
#[derive(Default)]
pub struct KvGroupSorter {
    index: GroupIndex,
    groups: Vec<Vec<u32>>,
    unsorted: Vec<u32>,
    state: SortState,
}

impl KvGroupSorter {
    pub fn new() -> KvGroupSorter {
        Default::default()
    }
}

impl GroupSorter for KvGroupSorter {
    fn push(&mut self, record: &SortRecord, position: u32) {
        self.state.check_push();
        let key = primary_key_of(record);
        if record.operation == OperationKind::Delete {
            if let Some(&slot) = self.index.get(&key) {
                self.groups[slot as usize].clear();
            }
            self.unsorted.push(position);
            return;
        }

        let next_slot = self.groups.len() as u32;
        let slot = *self.index.entry(key).or_insert(next_slot);
        if slot == next_slot {
            self.groups.push(Vec::new());
        }
        self.groups[slot as usize].push(position);
    }

    fn sort(&mut self, records: &[SortRecord], arena: &BatchArena) -> Vec<u32> {
        self.state.enter_sort();
        let mut groups = std::mem::take(&mut self.groups);
        groups.retain(|g| !g.is_empty());
        groups.sort_by(|a, b| {
            let latest = |g: &Vec<u32>| g[g.len() - 1];
            compare_positions(records, arena, latest(a), latest(b))
        });

        let mut order = std::mem::take(&mut self.unsorted);
        order.reserve(groups.iter().map(Vec::len).sum());
        for group in groups {
            order.extend_from_slice(&group);
        }
        self.index = GroupIndex::default();
        order
    }

    fn memory_used(&self) -> usize {
        self.index.capacity() * (size_of::<u64>() + size_of::<u32>())
            + self.unsorted.capacity() * size_of::<u32>()
            + self.groups.capacity() * size_of::<Vec<u32>>()
            + self
                .groups
                .iter()
                .map(|g| g.capacity() * size_of::<u32>())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorter::test_util::{push_all, records};

    use OperationKind::{Delete, Insert};

    #[test]
    fn test_delete_then_reinsert() {
        let mut arena = BatchArena::new();
        // Insert(k1, A), Insert(k2, B), Delete(k1), Insert(k1, C) with sort keys A=1, B=2, C=3.
        let records = records(
            &mut arena,
            &[
                (1, None, Insert, Some(&[1u8][..])),
                (2, None, Insert, Some(&[2u8][..])),
                (1, None, Delete, None),
                (1, None, Insert, Some(&[3u8][..])),
            ],
        );
        let mut sorter = KvGroupSorter::new();
        push_all(&mut sorter, &records);
        assert_eq!(sorter.sort(&records, &arena), vec![2, 1, 3]);
    }

    #[test]
    fn test_groups_ordered_by_latest_key() {
        let mut arena = BatchArena::new();
        let records = records(
            &mut arena,
            &[
                (1, None, Insert, Some(&[1u8][..])),
                (2, None, Insert, Some(&[5u8][..])),
                (1, None, Insert, Some(&[9u8][..])),
                (3, None, Insert, Some(&[5u8][..])),
            ],
        );
        let mut sorter = KvGroupSorter::new();
        push_all(&mut sorter, &records);
        // k2 (5 @1) < k3 (5 @3) < k1 (latest 9)
        assert_eq!(sorter.sort(&records, &arena), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_deletes_emitted_first_in_arrival_order() {
        let mut arena = BatchArena::new();
        let records = records(
            &mut arena,
            &[
                (4, None, Insert, None),
                (5, None, Delete, None),
                (4, None, Insert, None),
                (6, None, Delete, None),
                (5, None, Delete, None),
            ],
        );
        let mut sorter = KvGroupSorter::new();
        push_all(&mut sorter, &records);
        assert_eq!(sorter.sort(&records, &arena), vec![1, 3, 4, 0, 2]);
    }

    #[test]
    fn test_random_stream_properties() {
        fastrand::seed(1209384);
        let mut arena = BatchArena::new();
        let ops = (0..3000)
            .map(|_| {
                let delete = fastrand::u8(0..5) == 0;
                let op = if delete { Delete } else { Insert };
                (fastrand::u64(0..100), op)
            })
            .collect::<Vec<_>>();
        let sort_keys = (0..ops.len())
            .map(|_| [fastrand::u8(..), fastrand::u8(..)])
            .collect::<Vec<_>>();
        let specs = ops
            .iter()
            .zip(&sort_keys)
            .map(|(&(k, op), key)| (k, None, op, (op == Insert).then_some(&key[..])))
            .collect::<Vec<_>>();
        let records = records(&mut arena, &specs);
        let mut sorter = KvGroupSorter::new();
        push_all(&mut sorter, &records);
        let order = sorter.sort(&records, &arena);

        let deletes = order
            .iter()
            .take_while(|&&p| records[p as usize].operation == Delete)
            .count();
        let expected_deletes = specs.iter().filter(|s| s.2 == Delete).count();
        assert_eq!(deletes, expected_deletes);
        assert!(order[..deletes].windows(2).all(|w| w[0] < w[1]));

        // Exactly the inserts not followed by a delete of the same key survive.
        let surviving = (0..specs.len())
            .filter(|&i| {
                specs[i].2 == Insert
                    && !specs[i + 1..]
                        .iter()
                        .any(|s| s.0 == specs[i].0 && s.2 == Delete)
            })
            .count();
        assert_eq!(order.len() - deletes, surviving);

        // Groups are contiguous, internally in arrival order, and ordered by latest key.
        let mut previous_latest: Option<u32> = None;
        let mut i = deletes;
        while i < order.len() {
            let key = records[order[i] as usize].primary_key;
            let mut j = i;
            while j < order.len() && records[order[j] as usize].primary_key == key {
                j += 1;
            }
            let group = &order[i..j];
            assert!(group.windows(2).all(|w| w[0] < w[1]));
            let latest = group[group.len() - 1];
            if let Some(prev) = previous_latest {
                assert_eq!(
                    compare_positions(&records, &arena, prev, latest),
                    std::cmp::Ordering::Less
                );
            }
            previous_latest = Some(latest);
            i = j;
        }
    }
}
