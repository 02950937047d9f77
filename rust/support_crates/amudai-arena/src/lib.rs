//! Bulk-allocated, bulk-freed byte storage for a single build batch.
//!
//! A [`BatchArena`] hands out [`ArenaSlice`] handles instead of references. A handle
//! records the arena generation it was allocated in, and every read checks it: once
//! the arena is [reset](BatchArena::reset), all previously issued handles become stale
//! and resolving one is reported rather than silently aliasing newer data.
//!
//! Generations are drawn from a process-wide counter, so a handle is also rejected
//! by any *other* arena, including one it was swapped with.

use std::sync::atomic::{AtomicU64, Ordering};

/// Default size of a single arena chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// A handle to a byte range allocated from a [`BatchArena`].
///
/// The handle is `Copy` and carries no borrow; it is only meaningful together with
/// the arena (and the arena generation) that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaSlice {
    generation: u64,
    chunk: u32,
    offset: u32,
    len: u32,
}

impl ArenaSlice {
    /// Length of the referenced byte range.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Generation of the arena this slice was allocated from.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Error returned when resolving an [`ArenaSlice`] that does not belong to the
/// current generation of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleSliceError {
    pub slice_generation: u64,
    pub arena_generation: u64,
}

impl std::fmt::Display for StaleSliceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arena slice from generation {} used with arena generation {}",
            self.slice_generation, self.arena_generation
        )
    }
}

impl std::error::Error for StaleSliceError {}

/// Chunked bump allocator for byte buffers.
///
/// Allocations are appended to the current chunk; when a chunk cannot fit the
/// requested size, a new chunk of `max(chunk_size, len)` bytes is started. Chunks
/// are never reallocated, so offsets inside a chunk stay valid for the lifetime of
/// the generation. Individual allocations are never freed.
pub struct BatchArena {
    generation: u64,
    chunk_size: usize,
    chunks: Vec<Vec<u8>>,
    allocated: usize,
}

impl BatchArena {
    /// Creates an empty arena with the [`DEFAULT_CHUNK_SIZE`].
    pub fn new() -> BatchArena {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Creates an empty arena whose chunks hold at least `chunk_size` bytes.
    pub fn with_chunk_size(chunk_size: usize) -> BatchArena {
        BatchArena {
            generation: next_generation(),
            chunk_size: chunk_size.max(1),
            chunks: Vec::new(),
            allocated: 0,
        }
    }

    /// Current generation. Changes on every [`reset`](Self::reset).
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total number of bytes handed out in the current generation.
    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Total capacity held by the arena chunks.
    pub fn memory_used(&self) -> usize {
        self.chunks.iter().map(|c| c.capacity()).sum()
    }

    /// Copies `bytes` into the arena and returns a handle to the copy.
    pub fn alloc_copy(&mut self, bytes: &[u8]) -> ArenaSlice {
        self.alloc_concat([bytes])
    }

    /// Copies the concatenation of `fragments` into the arena as a single allocation.
    pub fn alloc_concat<'a>(
        &mut self,
        fragments: impl IntoIterator<Item = &'a [u8]> + Clone,
    ) -> ArenaSlice {
        let len: usize = fragments.clone().into_iter().map(|f| f.len()).sum();
        assert!(len <= u32::MAX as usize, "arena allocation too large: {len}");
        let chunk_index = self.chunk_for(len);
        let chunk = &mut self.chunks[chunk_index];
        let offset = chunk.len();
        for fragment in fragments {
            chunk.extend_from_slice(fragment);
        }
        self.allocated += len;
        ArenaSlice {
            generation: self.generation,
            chunk: chunk_index as u32,
            offset: offset as u32,
            len: len as u32,
        }
    }

    /// Resolves a handle, failing if it belongs to another generation or arena.
    pub fn try_get(&self, slice: ArenaSlice) -> Result<&[u8], StaleSliceError> {
        if slice.generation != self.generation {
            return Err(StaleSliceError {
                slice_generation: slice.generation,
                arena_generation: self.generation,
            });
        }
        let start = slice.offset as usize;
        Ok(&self.chunks[slice.chunk as usize][start..start + slice.len as usize])
    }

    /// Resolves a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale (allocated before the last reset, or by a
    /// different arena).
    #[inline]
    pub fn get(&self, slice: ArenaSlice) -> &[u8] {
        match self.try_get(slice) {
            Ok(bytes) => bytes,
            Err(e) => panic!("{e}"),
        }
    }

    /// Releases all allocations at once and starts a new generation.
    ///
    /// The first chunk is kept (emptied) for reuse; the rest are freed.
    pub fn reset(&mut self) {
        self.chunks.truncate(1);
        if let Some(first) = self.chunks.first_mut() {
            first.clear();
        }
        self.allocated = 0;
        self.generation = next_generation();
    }

    fn chunk_for(&mut self, len: usize) -> usize {
        if let Some(last) = self.chunks.last() {
            if last.capacity() - last.len() >= len {
                return self.chunks.len() - 1;
            }
        }
        // A retained chunk may be too small for an oversized first allocation.
        if self.chunks.len() == 1 && self.chunks[0].is_empty() {
            self.chunks[0].reserve_exact(len);
            return 0;
        }
        let capacity = self.chunk_size.max(len);
        self.chunks.push(Vec::with_capacity(capacity));
        self.chunks.len() - 1
    }
}

impl Default for BatchArena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchArena")
            .field("generation", &self.generation)
            .field("chunks", &self.chunks.len())
            .field("allocated", &self.allocated)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut arena = BatchArena::with_chunk_size(16);
        let a = arena.alloc_copy(b"hello");
        let b = arena.alloc_concat([b"wor".as_slice(), b"ld".as_slice()]);
        let empty = arena.alloc_copy(&[]);
        assert_eq!(arena.get(a), b"hello");
        assert_eq!(arena.get(b), b"world");
        assert!(empty.is_empty());
        assert_eq!(arena.get(empty), b"");
        assert_eq!(arena.allocated_bytes(), 10);
    }

    #[test]
    fn test_chunk_overflow_keeps_earlier_slices_valid() {
        let mut arena = BatchArena::with_chunk_size(8);
        let slices = (0..100u32)
            .map(|i| {
                let bytes = i.to_le_bytes();
                (i, arena.alloc_copy(&bytes))
            })
            .collect::<Vec<_>>();
        let large = arena.alloc_copy(&[7u8; 100]);
        for (i, slice) in slices {
            assert_eq!(arena.get(slice), i.to_le_bytes());
        }
        assert_eq!(arena.get(large), [7u8; 100]);
        assert!(arena.memory_used() >= arena.allocated_bytes());
    }

    #[test]
    fn test_reset_invalidates_slices() {
        let mut arena = BatchArena::with_chunk_size(32);
        let s = arena.alloc_copy(b"abc");
        let old_generation = arena.generation();
        arena.reset();
        assert_ne!(arena.generation(), old_generation);
        assert_eq!(arena.allocated_bytes(), 0);
        let err = arena.try_get(s).unwrap_err();
        assert_eq!(err.slice_generation, old_generation);

        // The retained chunk is reused.
        let t = arena.alloc_copy(b"xyz");
        assert_eq!(arena.get(t), b"xyz");
    }

    #[test]
    fn test_oversized_alloc_after_reset() {
        let mut arena = BatchArena::with_chunk_size(4);
        arena.alloc_copy(b"ab");
        arena.reset();
        let big = arena.alloc_copy(&[1u8; 64]);
        assert_eq!(arena.get(big).len(), 64);
    }

    #[test]
    fn test_slices_rejected_by_other_arena() {
        let mut a = BatchArena::new();
        let mut b = BatchArena::new();
        let sa = a.alloc_copy(b"a");
        let _ = b.alloc_copy(b"b");
        assert!(b.try_get(sa).is_err());
        std::mem::swap(&mut a, &mut b);
        assert_eq!(b.get(sa), b"a");
        assert!(a.try_get(sa).is_err());
    }

    #[test]
    #[should_panic(expected = "arena slice from generation")]
    fn test_get_stale_panics() {
        let mut arena = BatchArena::new();
        let s = arena.alloc_copy(b"abc");
        arena.reset();
        arena.get(s);
    }

    #[test]
    fn test_random_allocations() {
        fastrand::seed(4385729);
        let mut arena = BatchArena::with_chunk_size(256);
        let mut expected = Vec::new();
        for _ in 0..2000 {
            let len = fastrand::usize(0..300);
            let bytes = (0..len).map(|_| fastrand::u8(..)).collect::<Vec<_>>();
            let slice = arena.alloc_copy(&bytes);
            expected.push((slice, bytes));
        }
        for (slice, bytes) in &expected {
            assert_eq!(arena.get(*slice), bytes.as_slice());
        }
    }
}
