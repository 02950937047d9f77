//! Construction-time configuration of a sort batch.

use amudai_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

use crate::attribute::AttributeConfig;

/// Storage table kind a batch is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Document table, optionally keyed by a primary key.
    Plain,
    /// Primary key to a single value.
    KeyValue,
    /// Primary key to many secondary keys.
    KeyMultiValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// One component of a business sort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescription {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortDescription {
    pub fn ascending(field: impl Into<String>) -> SortDescription {
        SortDescription {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> SortDescription {
        SortDescription {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Layout of key-value payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    /// `varint(len)` followed by a packed attribute region.
    #[default]
    Packed,
    /// Opaque bytes; sort fields cannot be read from them.
    Raw,
}

/// Locality fingerprint settings for key-value tables without sort fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    #[serde(default = "FingerprintConfig::default_enabled")]
    pub enabled: bool,
    /// Shingle size in bytes.
    #[serde(default = "FingerprintConfig::default_window")]
    pub window: usize,
}

impl FingerprintConfig {
    const DEFAULT_WINDOW: usize = 8;

    fn default_enabled() -> bool {
        true
    }

    fn default_window() -> usize {
        Self::DEFAULT_WINDOW
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        FingerprintConfig {
            enabled: true,
            window: Self::DEFAULT_WINDOW,
        }
    }
}

/// Everything needed to construct a [`SortBatch`](crate::SortBatch).
///
/// Decoded from JSON with [`SortBatchConfig::from_json`]:
///
/// ```json
/// {
///   "table_kind": "key_value",
///   "attributes": [{ "name": "price", "field_type": "double" }],
///   "sort_descriptions": [{ "field": "price", "order": "descending" }],
///   "max_memory_bytes": 67108864
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortBatchConfig {
    pub table_kind: TableKind,

    /// Whether documents of a `Plain` table are keyed. Key-value kinds are always keyed.
    #[serde(default)]
    pub has_primary_key: bool,

    /// Packed attribute schema, in slot order.
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,

    /// Business sort order. Empty means "no sort key".
    #[serde(default)]
    pub sort_descriptions: Vec<SortDescription>,

    #[serde(default)]
    pub value_format: ValueFormat,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    /// Soft limit consulted by [`SortBatch::is_full`](crate::SortBatch::is_full).
    #[serde(default)]
    pub max_memory_bytes: Option<usize>,

    #[serde(default = "SortBatchConfig::default_arena_chunk_size")]
    pub arena_chunk_size: usize,
}

impl SortBatchConfig {
    pub fn new(table_kind: TableKind) -> SortBatchConfig {
        SortBatchConfig {
            table_kind,
            has_primary_key: table_kind != TableKind::Plain,
            attributes: Vec::new(),
            sort_descriptions: Vec::new(),
            value_format: ValueFormat::default(),
            fingerprint: FingerprintConfig::default(),
            max_memory_bytes: None,
            arena_chunk_size: Self::default_arena_chunk_size(),
        }
    }

    pub fn from_json(json: &str) -> Result<SortBatchConfig> {
        let config: SortBatchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_primary_key(mut self, has_primary_key: bool) -> Self {
        self.has_primary_key = has_primary_key;
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<AttributeConfig>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_sort_descriptions(mut self, sort_descriptions: Vec<SortDescription>) -> Self {
        self.sort_descriptions = sort_descriptions;
        self
    }

    pub fn with_value_format(mut self, value_format: ValueFormat) -> Self {
        self.value_format = value_format;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: FingerprintConfig) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn with_max_memory_bytes(mut self, max_memory_bytes: usize) -> Self {
        self.max_memory_bytes = Some(max_memory_bytes);
        self
    }

    /// Whether records of this table carry a primary key and go through a group sorter.
    pub fn has_primary_key(&self) -> bool {
        match self.table_kind {
            TableKind::Plain => self.has_primary_key,
            TableKind::KeyValue | TableKind::KeyMultiValue => true,
        }
    }

    /// Checks table-kind independent consistency. Field resolution is checked
    /// later, when the converter is built.
    pub fn validate(&self) -> Result<()> {
        if self.table_kind == TableKind::KeyMultiValue && !self.sort_descriptions.is_empty() {
            return Err(Error::sort_region_mismatch(
                "key-multivalue tables do not support sort fields",
            ));
        }
        if self.table_kind == TableKind::KeyValue
            && self.value_format == ValueFormat::Raw
            && !self.sort_descriptions.is_empty()
        {
            return Err(Error::sort_region_mismatch(
                "sort fields require a packed key-value value format",
            ));
        }
        if self.fingerprint.enabled && self.fingerprint.window == 0 {
            return Err(Error::invalid_arg("fingerprint.window", "must be positive"));
        }
        if self.arena_chunk_size == 0 {
            return Err(Error::invalid_arg("arena_chunk_size", "must be positive"));
        }
        Ok(())
    }

    fn default_arena_chunk_size() -> usize {
        amudai_arena::DEFAULT_CHUNK_SIZE
    }
}
