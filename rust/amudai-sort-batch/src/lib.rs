//! Build-time document accumulation, deduplication and ordering.
//!
//! Documents arrive in arbitrary order and may repeat a primary key many times
//! within one batch. Before an immutable, sorted segment can be written, a
//! [`SortBatch`] resolves repeated keys to the effective set of operations and
//! produces a deterministic output order: a business sort order for plain tables,
//! or a primary-key grouped order for key-value and key-multivalue tables.
//!
//! The batch is built from two per-table-kind components:
//!
//! - a [`DocumentConverter`], which stages a [`Document`] as a [`SortRecord`]
//!   backed by the batch arena, and restores it on drain;
//! - a [`GroupSorter`], which tracks positions per primary key and emits the
//!   final order.

pub mod attribute;
pub mod batch;
pub mod config;
pub mod converter;
pub mod cursor;
pub mod document;
pub mod fingerprint;
pub mod locator;
pub mod record;
pub mod sort_key;
pub mod sorter;

pub use batch::SortBatch;
pub use config::{SortBatchConfig, SortDescription, SortOrder, TableKind};
pub use converter::DocumentConverter;
pub use document::{DocOperation, Document, KvDocument, KvRecord, NormalDocument};
pub use locator::Locator;
pub use record::{OperationKind, SortRecord};
pub use sorter::GroupSorter;
