use amudai_arena::BatchArena;
use amudai_common::{Result, error::Error};

use super::{ConversionScratch, ConversionStats, DocumentConverter, materialize_payload};
use crate::{
    config::SortBatchConfig,
    document::{DocOperation, Document},
    record::{OperationKind, SortRecord},
};

/// Converter for key-multivalue tables.
///
/// Pass-through: no sort key is computed, only the primary and secondary key
/// hashes are extracted. Inserts must carry a secondary key; a delete without one
/// is a whole-bucket tombstone.
pub struct KkvDocumentConverter {
    scratch: ConversionScratch,
}

impl KkvDocumentConverter {
    pub fn new(config: &SortBatchConfig) -> Result<KkvDocumentConverter> {
        if !config.sort_descriptions.is_empty() {
            return Err(Error::sort_region_mismatch(
                "key-multivalue tables do not support sort fields",
            ));
        }
        Ok(KkvDocumentConverter {
            scratch: ConversionScratch::default(),
        })
    }
}

impl DocumentConverter for KkvDocumentConverter {
    fn convert(&mut self, document: &Document, arena: &mut BatchArena) -> Option<SortRecord> {
        let Document::KeyValue(doc) = document else {
            return self.scratch.drop_document("not a key-value document");
        };
        let Some(record) = doc.single_record() else {
            let reason = format!("expected one kkv record, got {}", doc.records.len());
            return self.scratch.drop_document(&reason);
        };
        let operation = match (record.operation, record.skey_hash) {
            (DocOperation::Add, Some(_)) => OperationKind::Insert,
            (DocOperation::Add, None) => {
                return self.scratch.drop_document("kkv insert without skey");
            }
            (DocOperation::Delete, _) => OperationKind::Delete,
            (other, _) => {
                let reason = format!("unsupported kkv operation {other:?}");
                return self.scratch.drop_document(&reason);
            }
        };

        let primary_key = Some(record.pkey_hash);
        let secondary_key_hash = record.skey_hash;
        let (sort_key, payload) = self.scratch.stage(document, arena, false)?;
        Some(SortRecord {
            primary_key,
            secondary_key_hash,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{SortDescription, TableKind},
        document::{KvDocument, KvRecord},
    };

    #[test]
    fn test_convert() {
        let mut converter =
            KkvDocumentConverter::new(&SortBatchConfig::new(TableKind::KeyMultiValue)).unwrap();
        let mut arena = BatchArena::new();

        let insert: Document =
            KvDocument::single(KvRecord::add(1, b"v".to_vec()).with_skey_hash(9)).into();
        let record = converter.convert(&insert, &mut arena).unwrap();
        assert_eq!(record.operation, OperationKind::Insert);
        assert_eq!(record.primary_key, Some(1));
        assert_eq!(record.secondary_key_hash, Some(9));
        assert!(record.sort_key.is_none());
        assert_eq!(converter.materialize(&record, &arena).unwrap(), insert);

        let bucket_delete: Document = KvDocument::single(KvRecord::delete(1)).into();
        let record = converter.convert(&bucket_delete, &mut arena).unwrap();
        assert_eq!(record.operation, OperationKind::Delete);
        assert_eq!(record.secondary_key_hash, None);

        let skey_delete: Document =
            KvDocument::single(KvRecord::delete(1).with_skey_hash(4)).into();
        let record = converter.convert(&skey_delete, &mut arena).unwrap();
        assert_eq!(record.secondary_key_hash, Some(4));
    }

    #[test]
    fn test_shape_mismatch() {
        let mut converter =
            KkvDocumentConverter::new(&SortBatchConfig::new(TableKind::KeyMultiValue)).unwrap();
        let mut arena = BatchArena::new();
        let no_skey: Document = KvDocument::single(KvRecord::add(1, vec![])).into();
        assert!(converter.convert(&no_skey, &mut arena).is_none());
        let two: Document = KvDocument::new(vec![
            KvRecord::add(1, vec![]).with_skey_hash(1),
            KvRecord::add(1, vec![]).with_skey_hash(2),
        ])
        .into();
        assert!(converter.convert(&two, &mut arena).is_none());
        assert_eq!(converter.stats().dropped, 2);
    }

    #[test]
    fn test_sort_fields_rejected() {
        let config = SortBatchConfig::new(TableKind::KeyMultiValue)
            .with_sort_descriptions(vec![SortDescription::ascending("a")]);
        assert!(KkvDocumentConverter::new(&config).is_err());
    }
}
