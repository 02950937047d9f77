use amudai_arena::BatchArena;
use amudai_common::Result;

use super::{ConversionScratch, ConversionStats, DocumentConverter, materialize_payload};
use crate::{
    attribute::PackAttributeFormatter,
    config::{SortBatchConfig, ValueFormat},
    cursor::{ByteCursor, write_varint},
    document::{DocOperation, Document},
    fingerprint::encode_fingerprint,
    record::{OperationKind, SortRecord},
    sort_key::SortKeyEncoder,
};

/// Wraps a packed attribute region as a key-value payload: `varint(len) ++ region`.
pub fn pack_kv_value(region: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(region.len() + 5);
    write_varint(region.len() as u64, &mut value);
    value.extend_from_slice(region);
    value
}

/// Returns the packed attribute region of a key-value payload, skipping the
/// length header.
pub fn kv_value_region(value: &[u8]) -> Result<&[u8]> {
    let mut cursor = ByteCursor::new(value, "kv value");
    let len = cursor.read_varint()?;
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    cursor.read_bytes(len)
}

fn encode_value_fields(encoder: &SortKeyEncoder, value: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let region = kv_value_region(value)?;
    encoder.encode_into(region, out)
}

enum KvSortKey {
    /// Business order read from the packed value.
    Fields(SortKeyEncoder),
    /// Similarity hash of the raw value bytes.
    Fingerprint { window: usize },
    None,
}

/// Converter for key-value tables.
///
/// Only inserts get a sort key; deletes are never ordered by key.
pub struct KvDocumentConverter {
    sort_key: KvSortKey,
    scratch: ConversionScratch,
}

impl KvDocumentConverter {
    pub fn new(config: &SortBatchConfig) -> Result<KvDocumentConverter> {
        config.validate()?;
        let sort_key = if !config.sort_descriptions.is_empty() {
            debug_assert_eq!(config.value_format, ValueFormat::Packed);
            let formatter = PackAttributeFormatter::new(&config.attributes)?;
            KvSortKey::Fields(SortKeyEncoder::new(&formatter, &config.sort_descriptions)?)
        } else if config.fingerprint.enabled {
            KvSortKey::Fingerprint {
                window: config.fingerprint.window,
            }
        } else {
            KvSortKey::None
        };
        Ok(KvDocumentConverter {
            sort_key,
            scratch: ConversionScratch::default(),
        })
    }

    fn has_sort_key(&self) -> bool {
        !matches!(self.sort_key, KvSortKey::None)
    }
}

impl DocumentConverter for KvDocumentConverter {
    fn convert(&mut self, document: &Document, arena: &mut BatchArena) -> Option<SortRecord> {
        let Document::KeyValue(doc) = document else {
            return self.scratch.drop_document("not a key-value document");
        };
        let Some(record) = doc.single_record() else {
            let reason = format!("expected one kv record, got {}", doc.records.len());
            return self.scratch.drop_document(&reason);
        };
        if record.skey_hash.is_some() {
            return self.scratch.drop_document("kv record with skey");
        }
        let operation = match record.operation {
            DocOperation::Add => OperationKind::Insert,
            DocOperation::Delete => OperationKind::Delete,
            other => {
                let reason = format!("unsupported kv operation {other:?}");
                return self.scratch.drop_document(&reason);
            }
        };

        let with_sort_key = operation == OperationKind::Insert && self.has_sort_key();
        if with_sort_key {
            self.scratch.sort_key.clear();
            match &self.sort_key {
                KvSortKey::Fields(encoder) => {
                    let out = &mut self.scratch.sort_key;
                    if let Err(e) = encode_value_fields(encoder, &record.value, out) {
                        let reason = format!("kv value region unreadable: {e}");
                        return self.scratch.drop_document(&reason);
                    }
                }
                KvSortKey::Fingerprint { window } => {
                    encode_fingerprint(&record.value, *window, &mut self.scratch.sort_key);
                }
                KvSortKey::None => unreachable!(),
            }
        }

        let primary_key = Some(record.pkey_hash);
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
