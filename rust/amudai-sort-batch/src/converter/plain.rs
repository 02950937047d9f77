use amudai_arena::BatchArena;
use amudai_common::Result;

use super::{ConversionScratch, ConversionStats, DocumentConverter, materialize_payload};
use crate::{
    attribute::PackAttributeFormatter,
    config::SortBatchConfig,
    document::{DocOperation, Document},
    record::{OperationKind, SortRecord},
    sort_key::SortKeyEncoder,
};

/// Converter for plain document tables.
///
/// The sort key is read from the document's packed attribute region. Documents
/// that carry no attributes and are not inserts (deletes, empty partial updates)
/// get an all-zero key of the configured width.
pub struct PlainDocumentConverter {
    has_primary_key: bool,
    encoder: Option<SortKeyEncoder>,
    scratch: ConversionScratch,
}

impl PlainDocumentConverter {
    pub fn new(config: &SortBatchConfig) -> Result<PlainDocumentConverter> {
        let encoder = if config.sort_descriptions.is_empty() {
            None
        } else {
            let formatter = PackAttributeFormatter::new(&config.attributes)?;
            Some(SortKeyEncoder::new(&formatter, &config.sort_descriptions)?)
        };
        Ok(PlainDocumentConverter {
            has_primary_key: config.has_primary_key(),
            encoder,
            scratch: ConversionScratch::default(),
        })
    }

    pub fn sort_key_width(&self) -> Option<usize> {
        self.encoder.as_ref().map(|e| e.width())
    }
}

impl DocumentConverter for PlainDocumentConverter {
    fn convert(&mut self, document: &Document, arena: &mut BatchArena) -> Option<SortRecord> {
        let Document::Normal(doc) = document else {
            return self.scratch.drop_document("not a normal document");
        };
        let operation = match doc.operation {
            DocOperation::Add => OperationKind::Insert,
            DocOperation::Delete => OperationKind::Delete,
            DocOperation::Update => OperationKind::PartialUpdate,
            DocOperation::Skip => return self.scratch.drop_document("skip document"),
        };
        let primary_key = if self.has_primary_key {
            match doc.primary_key_hash {
                Some(hash) => Some(hash),
                None => return self.scratch.drop_document("missing primary key"),
            }
        } else {
            None
        };

        if let Some(encoder) = &self.encoder {
            let out = &mut self.scratch.sort_key;
            out.clear();
            if doc.attributes.is_empty() && operation != OperationKind::Insert {
                encoder.encode_empty(out);
            } else if let Err(e) = encoder.encode_into(&doc.attributes, out) {
                let reason = format!("attribute region unreadable: {e}");
                return self.scratch.drop_document(&reason);
            }
        }

        let with_sort_key = self.encoder.is_some();
        let (sort_key, payload) = self.scratch.stage(document, arena, with_sort_key)?;
        Some(SortRecord {
            primary_key,
            secondary_key_hash: None,
            sort_key,
            operation,
            payload,
        })
    }

    fn materialize(&self, record: &SortRecord, arena: &BatchArena) -> Result<Document> {
        materialize_payload(record, arena)
    }

    fn reset(&mut self) {
        self.scratch.release();
    }

    fn clear(&mut self) {
        self.scratch.stats = ConversionStats::default();
    }

    fn stats(&self) -> ConversionStats {
        self.scratch.stats
    }
}
