//! Staged representation of one document inside a batch.

use amudai_arena::ArenaSlice;

/// Effective operation of a staged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Delete,
    /// Plain tables only.
    PartialUpdate,
}

/// A document staged in a [`SortBatch`](crate::SortBatch).
///
/// Variable-length buffers live in the batch arena and are referenced through
/// [`ArenaSlice`] handles, so a record is only meaningful while the arena
/// generation that produced it is alive. Resolving a handle after the batch was
/// cleared panics rather than reading reused memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortRecord {
    /// Primary key hash; present for keyed tables.
    pub primary_key: Option<u64>,
    /// Present for key-multivalue inserts and secondary-key deletes.
    pub secondary_key_hash: Option<u64>,
    /// Byte-comparable sort key; present when the table has one.
    pub sort_key: Option<ArenaSlice>,
    pub operation: OperationKind,
    /// Serialized source document.
    pub payload: ArenaSlice,
}

impl SortRecord {
    /// Bytes attributed to the record for memory accounting.
    pub fn size(&self) -> usize {
        let key_bytes = |present: bool| if present { size_of::<u64>() } else { 0 };
        key_bytes(self.primary_key.is_some())
            + key_bytes(self.secondary_key_hash.is_some())
            + self.sort_key.map_or(0, |k| k.len())
            + self.payload.len()
    }
}
