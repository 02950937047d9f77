//! Source documents consumed and reproduced by a sort batch.
//!
//! Documents are self-describing: [`Document::encode_payload`] produces the opaque
//! payload stored with each staged record, and [`Document::decode_payload`]
//! restores an identical document on drain. Each document may embed a serialized
//! [`Locator`], which the batch removes on push and re-stamps on drain.

use amudai_common::{Result, result::invalid_format};
use bincode::{Decode, Encode};
use xxhash_rust::xxh3::xxh3_64;

use crate::locator::Locator;

/// Operation requested by a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum DocOperation {
    Add,
    Delete,
    /// Partial update of an existing document (plain tables only).
    Update,
    /// Carries only progress; never staged.
    Skip,
}

/// A document of a plain (non key-value) table.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct NormalDocument {
    pub operation: DocOperation,
    pub primary_key: Option<String>,
    pub primary_key_hash: Option<u64>,
    /// Packed attribute region, see [`crate::attribute`].
    pub attributes: Vec<u8>,
    /// Stored fields, carried verbatim.
    pub fields: Vec<(String, String)>,
    locator: Option<Vec<u8>>,
}

impl NormalDocument {
    pub fn new(operation: DocOperation) -> NormalDocument {
        NormalDocument {
            operation,
            primary_key: None,
            primary_key_hash: None,
            attributes: Vec::new(),
            fields: Vec::new(),
            locator: None,
        }
    }

    /// Sets the primary key and its hash.
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        self.primary_key_hash = Some(hash_primary_key(&primary_key));
        self.primary_key = Some(primary_key);
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<u8>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn with_locator(mut self, locator: &Locator) -> Self {
        self.locator = Some(locator.serialize());
        self
    }
}

/// One key-value operation.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct KvRecord {
    pub operation: DocOperation,
    pub pkey_hash: u64,
    /// Secondary key hash; only key-multivalue records carry one.
    pub skey_hash: Option<u64>,
    pub value: Vec<u8>,
}

impl KvRecord {
    pub fn add(pkey_hash: u64, value: Vec<u8>) -> KvRecord {
        KvRecord {
            operation: DocOperation::Add,
            pkey_hash,
            skey_hash: None,
            value,
        }
    }

    pub fn delete(pkey_hash: u64) -> KvRecord {
        KvRecord {
            operation: DocOperation::Delete,
            pkey_hash,
            skey_hash: None,
            value: Vec::new(),
        }
    }

    pub fn with_skey_hash(mut self, skey_hash: u64) -> Self {
        self.skey_hash = Some(skey_hash);
        self
    }
}

/// A document of a key-value or key-multivalue table.
///
/// The sort batch accepts only documents carrying exactly one record.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct KvDocument {
    pub records: Vec<KvRecord>,
    locator: Option<Vec<u8>>,
}

impl KvDocument {
    pub fn new(records: Vec<KvRecord>) -> KvDocument {
        KvDocument {
            records,
            locator: None,
        }
    }

    pub fn single(record: KvRecord) -> KvDocument {
        Self::new(vec![record])
    }

    pub fn with_locator(mut self, locator: &Locator) -> Self {
        self.locator = Some(locator.serialize());
        self
    }

    /// The record of a single-operation document.
    pub fn single_record(&self) -> Option<&KvRecord> {
        match self.records.as_slice() {
            [record] => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum Document {
    Normal(NormalDocument),
    KeyValue(KvDocument),
}

impl Document {
    /// Removes and returns the embedded serialized locator.
    pub fn take_locator(&mut self) -> Option<Vec<u8>> {
        self.locator_slot().take()
    }

    /// Embeds `locator`, replacing any existing one.
    pub fn set_locator(&mut self, locator: &Locator) {
        *self.locator_slot() = Some(locator.serialize());
    }

    /// Embeds an already serialized locator as is. The bytes are validated only
    /// when the document reaches a sort batch.
    pub fn set_raw_locator(&mut self, bytes: Vec<u8>) {
        *self.locator_slot() = Some(bytes);
    }

    /// Decodes the embedded locator, if any.
    pub fn locator(&self) -> Result<Option<Locator>> {
        let bytes = match self {
            Document::Normal(doc) => doc.locator.as_deref(),
            Document::KeyValue(doc) => doc.locator.as_deref(),
        };
        bytes.map(Locator::deserialize).transpose()
    }

    /// Appends the self-describing serialized form of the document to `out`.
    pub fn encode_payload(&self, out: &mut Vec<u8>) -> Result<()> {
        bincode::encode_into_std_write(self, out, Self::binc_config())?;
        Ok(())
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Document> {
        let (document, read) = bincode::decode_from_slice(bytes, Self::binc_config())?;
        if read != bytes.len() {
            return invalid_format("document payload", "trailing bytes");
        }
        Ok(document)
    }

    fn locator_slot(&mut self) -> &mut Option<Vec<u8>> {
        match self {
            Document::Normal(doc) => &mut doc.locator,
            Document::KeyValue(doc) => &mut doc.locator,
        }
    }

    fn binc_config() -> impl bincode::config::Config {
        bincode::config::standard()
    }
}

impl From<NormalDocument> for Document {
    fn from(doc: NormalDocument) -> Self {
        Document::Normal(doc)
    }
}

impl From<KvDocument> for Document {
    fn from(doc: KvDocument) -> Self {
        Document::KeyValue(doc)
    }
}

/// Hash used as the fixed-width representation of a primary key.
pub fn hash_primary_key(primary_key: &str) -> u64 {
    xxh3_64(primary_key.as_bytes())
}
