use amudai_arena::BatchArena;

use super::{GroupIndex, GroupSorter, SortState, compare_positions, primary_key_of};
use crate::record::{OperationKind, SortRecord};

#[derive(Debug, Clone, Copy)]
struct PlainGroup {
    /// Position of the latest insert (or of the first record seen for the key).
    anchor: u32,
    /// Index into `chains` of the updates and deletes queued after the anchor.
    chain: Option<u32>,
}

/// Group sorter for keyed plain tables.
///
/// Groups are ordered by the sort key of their anchor record, ties broken by the
/// anchor position. Each group is emitted as its anchor followed by its chain in
/// arrival order.
///
/// Deletes are chained like partial updates; they do not clear the group.
#[derive(Default)]
pub struct PlainGroupSorter {
    index: GroupIndex,
    groups: Vec<PlainGroup>,
    chains: Vec<Vec<u32>>,
    state: SortState,
}

impl PlainGroupSorter {
    pub fn new() -> PlainGroupSorter {
        Default::default()
    }
}

impl GroupSorter for PlainGroupSorter {
    fn push(&mut self, record: &SortRecord, position: u32) {
        self.state.check_push();
        let key = primary_key_of(record);
        let Some(&slot) = self.index.get(&key) else {
            self.index.insert(key, self.groups.len() as u32);
            self.groups.push(PlainGroup {
                anchor: position,
                chain: None,
            });
            return;
        };

        let group = &mut self.groups[slot as usize];
        if record.operation == OperationKind::Insert {
            group.anchor = position;
            // The chain slot is kept for reuse by later updates of this key.
            if let Some(chain) = group.chain {
                self.chains[chain as usize].clear();
            }
        } else {
            let chain = *group.chain.get_or_insert_with(|| {
                self.chains.push(Vec::new());
                (self.chains.len() - 1) as u32
            });
            self.chains[chain as usize].push(position);
        }
    }

    fn sort(&mut self, records: &[SortRecord], arena: &BatchArena) -> Vec<u32> {
        self.state.enter_sort();
        let mut groups = std::mem::take(&mut self.groups);
        groups.sort_by(|a, b| compare_positions(records, arena, a.anchor, b.anchor));

        let total = groups.len() + self.chains.iter().map(Vec::len).sum::<usize>();
        let mut order = Vec::with_capacity(total);
        for group in groups {
            order.push(group.anchor);
            if let Some(chain) = group.chain {
                order.extend_from_slice(&self.chains[chain as usize]);
            }
        }
        self.index = GroupIndex::default();
        self.chains = Vec::new();
        order
    }

    fn memory_used(&self) -> usize {
        self.index.capacity() * (size_of::<u64>() + size_of::<u32>())
            + self.groups.capacity() * size_of::<PlainGroup>()
            + self.chains.capacity() * size_of::<Vec<u32>>()
            + self
                .chains
                .iter()
                .map(|c| c.capacity() * size_of::<u32>())
                .sum::<usize>()
    }
}
