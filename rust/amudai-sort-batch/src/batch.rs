//! Accumulate, finalize and drain cycle of one build batch.

use amudai_arena::BatchArena;
use amudai_common::Result;

use crate::{
    config::{SortBatchConfig, TableKind},
    converter::{ConversionStats, DocumentConverter, create_converter},
    document::Document,
    locator::Locator,
    record::SortRecord,
    sorter::{GroupSorter, compare_positions, create_group_sorter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    Accumulating,
    Finalized,
}

/// Stages documents of one build batch, resolves repeated primary keys, and
/// emits them in the order the segment writer needs.
///
/// # Lifecycle
///
/// ```text
/// push()* -> finalize() -> get(i) / advance_cursor()* -> clear() -> push()* ...
/// ```
///
/// Documents are drained in the finalized order. Every drained document except
/// the last one is stamped with the locator the batch *started* at; the last one
/// carries the locator of the latest pushed document. A consumer that checkpoints
/// on each drained document therefore cannot advance past this batch before the
/// batch is fully written.
///
/// A batch is not synchronized. The intended hand-off between a producer and a
/// consumer thread is [`swap`](Self::swap), which exchanges two batches without
/// copying their buffers.
pub struct SortBatch {
    table_kind: TableKind,
    has_primary_key: bool,
    max_memory_bytes: Option<usize>,
    arena: BatchArena,
    records: Vec<SortRecord>,
    order: Vec<u32>,
    converter: Box<dyn DocumentConverter>,
    sorter: Option<Box<dyn GroupSorter>>,
    first_locator: Locator,
    last_locator: Locator,
    cursor: usize,
    data_bytes: usize,
    state: BatchState,
}

impl SortBatch {
    /// Creates an empty batch.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is inconsistent or names unknown or
    /// non-sortable sort fields.
    pub fn new(config: &SortBatchConfig) -> Result<SortBatch> {
        let converter = create_converter(config)?;
        let has_primary_key = config.has_primary_key();
        Ok(SortBatch {
            table_kind: config.table_kind,
            has_primary_key,
            max_memory_bytes: config.max_memory_bytes,
            arena: BatchArena::with_chunk_size(config.arena_chunk_size),
            records: Vec::new(),
            order: Vec::new(),
            converter,
            sorter: has_primary_key.then(|| create_group_sorter(config.table_kind)),
            first_locator: Locator::default(),
            last_locator: Locator::default(),
            cursor: 0,
            data_bytes: 0,
            state: BatchState::Accumulating,
        })
    }

    /// Starts the progress window at `locator`, e.g. when resuming from a checkpoint.
    pub fn with_start_locator(mut self, locator: Locator) -> Self {
        self.first_locator = locator;
        self.last_locator = locator;
        self
    }

    pub fn table_kind(&self) -> TableKind {
        self.table_kind
    }

    /// Stages a document.
    ///
    /// The embedded locator is removed and becomes the batch's last locator; a
    /// malformed locator is logged and ignored. A document whose shape does not
    /// match the table kind is dropped silently.
    ///
    /// # Panics
    ///
    /// Panics if the batch was finalized and not cleared since.
    pub fn push(&mut self, mut document: Document) {
        assert_eq!(
            self.state,
            BatchState::Accumulating,
            "push into a finalized sort batch"
        );
        if let Some(bytes) = document.take_locator() {
            match Locator::deserialize(&bytes) {
                Ok(locator) => self.last_locator = locator,
                Err(e) => log::warn!("ignoring malformed document locator: {e}"),
            }
        }

        let Some(record) = self.converter.convert(&document, &mut self.arena) else {
            return;
        };
        let Ok(position) = u32::try_from(self.records.len()) else {
            panic!("sort batch holds more than u32::MAX records");
        };
        if let Some(sorter) = self.sorter.as_mut() {
            sorter.push(&record, position);
        }
        self.data_bytes += record.size();
        self.records.push(record);
    }

    /// Computes the output order. A no-op on an empty batch.
    ///
    /// # Panics
    ///
    /// Panics if the batch is already finalized.
    pub fn finalize(&mut self) {
        assert_eq!(
            self.state,
            BatchState::Accumulating,
            "sort batch finalized twice"
        );
        if self.records.is_empty() {
            return;
        }

        self.order = match self.sorter.as_mut() {
            Some(sorter) => {
                let order = sorter.sort(&self.records, &self.arena);
                self.sorter = Some(create_group_sorter(self.table_kind));
                order
            }
            None => {
                let (records, arena) = (&self.records, &self.arena);
                let mut order = (0..records.len() as u32).collect::<Vec<_>>();
                order.sort_unstable_by(|&a, &b| compare_positions(records, arena, a, b));
                order
            }
        };
        self.state = BatchState::Finalized;
        log::debug!(
            "finalized {:?} sort batch: {} records, {} emitted, {} bytes in use",
            self.table_kind,
            self.records.len(),
            self.order.len(),
            self.memory_used_bytes()
        );
    }

    pub fn is_finalized(&self) -> bool {
        self.state == BatchState::Finalized
    }

    /// Number of staged records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of positions in the finalized order.
    pub fn finalized_len(&self) -> usize {
        self.order.len()
    }

    /// Sum of [`SortRecord::size`] over the staged records.
    pub fn data_bytes(&self) -> usize {
        self.data_bytes
    }

    /// Memory held by the batch: arena, record and order buffers, and the sorter.
    pub fn memory_used_bytes(&self) -> usize {
        self.arena.memory_used()
            + self.records.capacity() * size_of::<SortRecord>()
            + self.order.capacity() * size_of::<u32>()
            + self.sorter.as_ref().map_or(0, |s| s.memory_used())
    }

    /// Whether the configured memory limit has been reached. Always `false`
    /// without a limit.
    pub fn is_full(&self) -> bool {
        self.max_memory_bytes
            .is_some_and(|limit| self.memory_used_bytes() >= limit)
    }

    pub fn conversion_stats(&self) -> ConversionStats {
        self.converter.stats()
    }

    pub fn first_locator(&self) -> Locator {
        self.first_locator
    }

    pub fn last_locator(&self) -> Locator {
        self.last_locator
    }

    /// Materializes the `index`-th document of the finalized order.
    ///
    /// Returns the document, stamped with its locator, and whether it is the last
    /// one of the batch.
    ///
    /// # Panics
    ///
    /// Panics if `index >= finalized_len()`.
    pub fn get(&self, index: usize) -> Result<(Document, bool)> {
        assert!(
            index < self.order.len(),
            "sort batch index {index} out of range ({})",
            self.order.len()
        );
        let record = &self.records[self.order[index] as usize];
        let mut document = self.converter.materialize(record, &self.arena)?;
        let is_last = index + 1 == self.order.len();
        let locator = if is_last {
            &self.last_locator
        } else {
            &self.first_locator
        };
        document.set_locator(locator);
        Ok((document, is_last))
    }

    /// Current read position over the finalized order.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// # Panics
    ///
    /// Panics if every finalized document was already consumed.
    pub fn advance_cursor(&mut self) {
        assert!(
            self.cursor < self.order.len(),
            "sort batch cursor advanced past the end"
        );
        self.cursor += 1;
    }

    /// Number of finalized documents not yet consumed.
    pub fn remaining(&self) -> usize {
        self.order.len() - self.cursor
    }

    /// Drops every staged record and starts the next batch where this one ended.
    pub fn clear(&mut self) {
        self.arena.reset();
        self.records.clear();
        self.order.clear();
        self.cursor = 0;
        self.data_bytes = 0;
        self.converter.clear();
        self.reset_sorter();
        self.first_locator = self.last_locator;
        self.state = BatchState::Accumulating;
    }

    /// Releases converter scratch memory retained between batches.
    pub fn shrink(&mut self) {
        self.converter.reset();
    }

    /// Exchanges the entire state of two batches.
    ///
    /// Both sides end up with a fresh sorter. A side that is still accumulating
    /// has its staged records replayed into the new sorter, so swapping before
    /// `finalize` loses no groups.
    ///
    /// # Performance
    ///
    /// O(1) for finalized or empty sides. An accumulating side costs O(n) in its
    /// staged record count, since every record is pushed through the new sorter
    /// again. Producer/consumer loops that swap once per finalized batch never
    /// pay the replay.
    pub fn swap(&mut self, other: &mut SortBatch) {
        std::mem::swap(self, other);
        self.reset_sorter();
        other.reset_sorter();
    }

    fn reset_sorter(&mut self) {
        if !self.has_primary_key {
            return;
        }
        let mut sorter = create_group_sorter(self.table_kind);
        if self.state == BatchState::Accumulating {
            for (position, record) in self.records.iter().enumerate() {
                sorter.push(record, position as u32);
            }
        }
        self.sorter = Some(sorter);
    }
}

impl std::fmt::Debug for SortBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortBatch")
            .field("table_kind", &self.table_kind)
            .field("records", &self.records.len())
            .field("finalized", &self.order.len())
            .field("cursor", &self.cursor)
            .field("first_locator", &self.first_locator)
            .field("last_locator", &self.last_locator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attribute::{AttributeConfig, AttributeValue, FieldType, PackAttributeFormatter},
        config::SortDescription,
        document::{DocOperation, KvDocument, KvRecord, NormalDocument},
    };

    fn plain_config() -> SortBatchConfig {
        SortBatchConfig::new(TableKind::Plain)
            .with_attributes(vec![AttributeConfig::new("rank", FieldType::UInt32)])
            .with_sort_descriptions(vec![SortDescription::ascending("rank")])
    }

    fn plain_doc(rank: u32, locator: Locator) -> Document {
        let region = PackAttributeFormatter::new(&plain_config().attributes)
            .unwrap()
            .pack(&[AttributeValue::UInt32(rank)])
            .unwrap();
        NormalDocument::new(DocOperation::Add)
            .with_attributes(region)
            .with_field("rank", rank.to_string())
            .with_locator(&locator)
            .into()
    }

    fn rank_of(doc: &Document) -> String {
        match doc {
            Document::Normal(doc) => doc.fields[0].1.clone(),
            Document::KeyValue(_) => panic!("unexpected document kind"),
        }
    }

    #[test]
    fn test_plain_sorted_by_key_then_position() {
        let mut batch = SortBatch::new(&plain_config()).unwrap();
        for (i, rank) in [3u32, 1, 2, 1].into_iter().enumerate() {
            batch.push(plain_doc(rank, Locator::new(1, i as i64)));
        }
        assert_eq!(batch.len(), 4);
        batch.finalize();
        assert_eq!(batch.finalized_len(), 4);

        let ranks = (0..4)
            .map(|i| rank_of(&batch.get(i).unwrap().0))
            .collect::<Vec<_>>();
        assert_eq!(ranks, ["1", "1", "2", "3"]);
    }

    #[test]
    fn test_locator_stamping() {
        let mut batch = SortBatch::new(&plain_config())
            .unwrap()
            .with_start_locator(Locator::new(7, 100));
        batch.push(plain_doc(2, Locator::new(7, 101)));
        batch.push(plain_doc(1, Locator::new(7, 102)));
        batch.finalize();

        let (first, is_last) = batch.get(0).unwrap();
        assert!(!is_last);
        assert_eq!(first.locator().unwrap(), Some(Locator::new(7, 100)));
        let (last, is_last) = batch.get(1).unwrap();
        assert!(is_last);
        assert_eq!(last.locator().unwrap(), Some(Locator::new(7, 102)));

        batch.clear();
        assert_eq!(batch.first_locator(), Locator::new(7, 102));
        assert_eq!(batch.last_locator(), Locator::new(7, 102));
    }

    #[test]
    fn test_malformed_locator_ignored() {
        let mut batch = SortBatch::new(&plain_config())
            .unwrap()
            .with_start_locator(Locator::new(1, 5));
        batch.push(plain_doc(1, Locator::new(1, 6)));
        assert_eq!(batch.last_locator(), Locator::new(1, 6));

        let mut corrupted = plain_doc(2, Locator::default());
        corrupted.set_raw_locator(vec![1, 2, 3]);
        batch.push(corrupted);
        assert_eq!(batch.last_locator(), Locator::new(1, 6));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_empty_finalize_is_noop() {
        let mut batch = SortBatch::new(&plain_config()).unwrap();
        batch.finalize();
        assert!(!batch.is_finalized());
        assert_eq!(batch.finalized_len(), 0);
        assert_eq!(batch.remaining(), 0);
        batch.push(plain_doc(1, Locator::new(1, 1)));
        batch.finalize();
        assert!(batch.is_finalized());
    }

    #[test]
    fn test_cursor() {
        let mut batch = SortBatch::new(&plain_config()).unwrap();
        for rank in 0..3 {
            batch.push(plain_doc(rank, Locator::new(1, rank as i64)));
        }
        batch.finalize();
        assert_eq!(batch.remaining(), 3);
        batch.advance_cursor();
        batch.advance_cursor();
        assert_eq!(batch.cursor(), 2);
        assert_eq!(batch.remaining(), 1);
        batch.advance_cursor();
        assert_eq!(batch.remaining(), 0);
    }

    #[test]
    #[should_panic(expected = "cursor advanced past the end")]
    fn test_cursor_past_end_panics() {
        let mut batch = SortBatch::new(&plain_config()).unwrap();
        batch.push(plain_doc(1, Locator::new(1, 1)));
        batch.finalize();
        batch.advance_cursor();
        batch.advance_cursor();
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_out_of_range_panics() {
        let mut batch = SortBatch::new(&plain_config()).unwrap();
        batch.push(plain_doc(1, Locator::new(1, 1)));
        batch.finalize();
        let _ = batch.get(1);
    }

    #[test]
    #[should_panic(expected = "finalized twice")]
    fn test_double_finalize_panics() {
        let mut batch = SortBatch::new(&plain_config()).unwrap();
        batch.push(plain_doc(1, Locator::new(1, 1)));
        batch.finalize();
        batch.finalize();
    }

    #[test]
    #[should_panic(expected = "push into a finalized")]
    fn test_push_after_finalize_panics() {
        let mut batch = SortBatch::new(&plain_config()).unwrap();
        batch.push(plain_doc(1, Locator::new(1, 1)));
        batch.finalize();
        batch.push(plain_doc(2, Locator::new(1, 2)));
    }

    #[test]
    fn test_clear_and_reuse() {
        let mut batch = SortBatch::new(&SortBatchConfig::new(TableKind::KeyValue)).unwrap();
        batch.push(KvDocument::single(KvRecord::add(1, b"a".to_vec())).into());
        batch.push(KvDocument::single(KvRecord::add(1, b"b".to_vec())).into());
        batch.finalize();
        assert_eq!(batch.finalized_len(), 2);
        let data_bytes = batch.data_bytes();
        assert!(data_bytes > 0);

        batch.clear();
        assert!(batch.is_empty());
        assert!(!batch.is_finalized());
        assert_eq!(batch.data_bytes(), 0);
        assert_eq!(batch.conversion_stats().converted, 0);

        batch.push(KvDocument::single(KvRecord::add(2, b"c".to_vec())).into());
        batch.finalize();
        let (doc, is_last) = batch.get(0).unwrap();
        assert!(is_last);
        match doc {
            Document::KeyValue(kv) => assert_eq!(kv.records[0].value, b"c"),
            Document::Normal(_) => panic!("unexpected document kind"),
        }
    }

    #[test]
    fn test_swap() {
        let config = SortBatchConfig::new(TableKind::KeyValue);
        let mut producer = SortBatch::new(&config).unwrap();
        let mut consumer = SortBatch::new(&config).unwrap();
        producer.push(KvDocument::single(KvRecord::add(1, b"a".to_vec())).into());
        producer.push(KvDocument::single(KvRecord::add(2, b"b".to_vec())).into());

        producer.swap(&mut consumer);
        assert!(producer.is_empty());
        assert_eq!(consumer.len(), 2);

        consumer.push(KvDocument::single(KvRecord::delete(1)).into());
        consumer.finalize();
        // The delete clears key 1; key 2 survives the swap.
        assert_eq!(consumer.finalized_len(), 2);
        producer.push(KvDocument::single(KvRecord::add(4, b"d".to_vec())).into());
        producer.finalize();
        assert_eq!(producer.finalized_len(), 1);

        // A finalized batch swaps back unchanged.
        producer.swap(&mut consumer);
        assert_eq!(producer.finalized_len(), 2);
        assert!(producer.is_finalized());
    }

    #[test]
    fn test_swap_rebuilds_accumulating_groups_only() {
        let sorter_bytes = |b: &SortBatch| b.sorter.as_ref().map_or(0, |s| s.memory_used());
        let config = SortBatchConfig::new(TableKind::KeyValue);
        let mut accumulating = SortBatch::new(&config).unwrap();
        let mut finalized = SortBatch::new(&config).unwrap();
        for key in 0..16 {
            accumulating.push(KvDocument::single(KvRecord::delete(key)).into());
        }
        finalized.push(KvDocument::single(KvRecord::delete(99)).into());
        finalized.finalize();

        accumulating.swap(&mut finalized);
        // The finalized side keeps an empty sorter; the other side regrouped its records.
        assert!(accumulating.is_finalized());
        assert_eq!(sorter_bytes(&accumulating), 0);
        assert!(sorter_bytes(&finalized) > 0);

        finalized.push(KvDocument::single(KvRecord::delete(16)).into());
        finalized.finalize();
        assert_eq!(finalized.finalized_len(), 17);
    }

    #[test]
    fn test_memory_limit() {
        let config = SortBatchConfig::new(TableKind::KeyValue).with_max_memory_bytes(1);
        let mut batch = SortBatch::new(&config).unwrap();
        assert!(!batch.is_full());
        batch.push(KvDocument::single(KvRecord::add(1, vec![0; 64])).into());
        assert!(batch.memory_used_bytes() >= batch.data_bytes());
        assert!(batch.is_full());

        let unlimited = SortBatch::new(&SortBatchConfig::new(TableKind::KeyValue)).unwrap();
        assert!(!unlimited.is_full());
    }

    #[test]
    fn test_invalid_config() {
        let config = SortBatchConfig::new(TableKind::Plain)
            .with_sort_descriptions(vec![SortDescription::ascending("missing")]);
        assert!(SortBatch::new(&config).is_err());
    }
}
