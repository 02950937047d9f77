//! Conversion between source documents and staged [`SortRecord`]s.
//!
//! A converter turns each pushed [`Document`] into a record whose buffers live in
//! the batch arena, and turns a record back into a document when the batch is
//! drained. One converter variant exists per [`TableKind`].

use amudai_arena::{ArenaSlice, BatchArena};
use amudai_common::Result;

use crate::{
    config::{SortBatchConfig, TableKind},
    document::Document,
    record::SortRecord,
};

mod kkv;
mod kv;
mod plain;

pub use kkv::KkvDocumentConverter;
pub use kv::{KvDocumentConverter, kv_value_region, pack_kv_value};
pub use plain::PlainDocumentConverter;

/// Per-batch conversion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub converted: usize,
    pub dropped: usize,
}

pub trait DocumentConverter: Send {
    /// Stages `document` into `arena`.
    ///
    /// Returns `None`, dropping the document, when its shape does not match the
    /// table kind (wrong document variant, wrong record count, missing keys, or an
    /// undecodable attribute region).
    fn convert(&mut self, document: &Document, arena: &mut BatchArena) -> Option<SortRecord>;

    /// Restores the source document of `record`.
    ///
    /// # Panics
    ///
    /// Panics if `record` was produced by a different arena generation.
    fn materialize(&self, record: &SortRecord, arena: &BatchArena) -> Result<Document>;

    /// Releases converter-private scratch memory.
    fn reset(&mut self);

    /// Forgets per-batch state. Called when the owning batch clears its arena.
    fn clear(&mut self);

    fn stats(&self) -> ConversionStats;
}

/// Builds the converter for `config.table_kind`.
///
/// # Errors
///
/// Fails on sort-key configuration errors: unknown or non-sortable sort fields,
/// or sort fields the table's value layout cannot provide.
pub fn create_converter(config: &SortBatchConfig) -> Result<Box<dyn DocumentConverter>> {
    config.validate()?;
    let converter: Box<dyn DocumentConverter> = match config.table_kind {
        TableKind::Plain => Box::new(PlainDocumentConverter::new(config)?),
        TableKind::KeyValue => Box::new(KvDocumentConverter::new(config)?),
        TableKind::KeyMultiValue => Box::new(KkvDocumentConverter::new(config)?),
    };
    Ok(converter)
}

/// Scratch buffers shared by the converter variants.
#[derive(Debug, Default)]
pub(crate) struct ConversionScratch {
    pub payload: Vec<u8>,
    pub sort_key: Vec<u8>,
    pub stats: ConversionStats,
}

impl ConversionScratch {
    /// Serializes `document` and copies payload and key into the arena.
    ///
    /// Returns the `(sort_key, payload)` handles. `sort_key` must have been filled
    /// by the caller when `with_sort_key` is set.
    pub fn stage(
        &mut self,
        document: &Document,
        arena: &mut BatchArena,
        with_sort_key: bool,
    ) -> Option<(Option<ArenaSlice>, ArenaSlice)> {
        self.payload.clear();
        if let Err(e) = document.encode_payload(&mut self.payload) {
            let reason = format!("payload encoding failed: {e}");
            return self.drop_document(&reason);
        }
        let sort_key = with_sort_key.then(|| arena.alloc_copy(&self.sort_key));
        let payload = arena.alloc_copy(&self.payload);
        self.stats.converted += 1;
        Some((sort_key, payload))
    }

    pub fn drop_document<T>(&mut self, reason: &str) -> Option<T> {
        log::debug!("dropping document: {reason}");
        self.stats.dropped += 1;
        None
    }

    pub fn release(&mut self) {
        self.payload = Vec::new();
        self.sort_key = Vec::new();
    }
}

pub(crate) fn materialize_payload(record: &SortRecord, arena: &BatchArena) -> Result<Document> {
    Document::decode_payload(arena.get(record.payload))
}
