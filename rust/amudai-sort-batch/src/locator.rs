//! Progress token carried by source documents.

use std::fmt;

use amudai_common::{Result, result::invalid_format};

use crate::cursor::ByteCursor;

/// A checkpoint marker identifying a position in a document source.
///
/// The sort batch only stores, copies and forwards locators; it never compares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    /// Identifier of the source (e.g. a partition or stream id).
    pub src: u64,
    /// Offset within the source. `-1` means "no progress yet".
    pub offset: i64,
}

impl Locator {
    const FORMAT_VERSION: u8 = 1;
    const SERIALIZED_LEN: usize = 17;

    pub const fn new(src: u64, offset: i64) -> Locator {
        Locator { src, offset }
    }

    /// Whether the locator points at an actual source position.
    pub fn is_valid(&self) -> bool {
        self.offset >= 0
    }

    /// Serializes as `version: u8, src: u64 LE, offset: i64 LE`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SERIALIZED_LEN);
        out.push(Self::FORMAT_VERSION);
        out.extend_from_slice(&self.src.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Locator> {
        let mut cursor = ByteCursor::new(bytes, "locator");
        let version = cursor.read_u8()?;
        if version != Self::FORMAT_VERSION {
            return invalid_format("locator", &format!("unsupported version {version}"));
        }
        let src = cursor.read_u64_le()?;
        let offset = cursor.read_i64_le()?;
        if !cursor.is_empty() {
            return invalid_format("locator", "trailing bytes");
        }
        Ok(Locator { src, offset })
    }
}

impl Default for Locator {
    fn default() -> Self {
        Locator { src: 0, offset: -1 }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.src, self.offset)
    }
}
