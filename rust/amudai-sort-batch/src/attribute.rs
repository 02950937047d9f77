//! Packed attribute regions.
//!
//! Attribute values of a document are stored as a single packed byte region laid
//! out by a [`PackAttributeFormatter`]:
//!
//! ```text
//! [ fixed slot 0 | fixed slot 1 | ... | fixed slot N-1 ][ variable area ]
//! ```
//!
//! Numeric fields occupy a little-endian slot of their natural width. A string
//! field occupies an 8-byte slot holding `(offset: u32, len: u32)` of its bytes,
//! relative to the start of the region. Slot offsets are fixed by the schema, so a
//! single field can be read through its [`AttributeReference`] without decoding
//! the rest of the region.

use std::fmt;

use amudai_common::{Result, error::Error, result::invalid_format, verify_arg};
use serde::{Deserialize, Serialize};

use crate::cursor::ByteCursor;

/// Type of an attribute field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
}

impl FieldType {
    /// Width of the field's slot in the fixed area of a packed region.
    pub fn slot_width(&self) -> usize {
        match self {
            FieldType::Int8 | FieldType::UInt8 => 1,
            FieldType::Int16 | FieldType::UInt16 => 2,
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float => 4,
            FieldType::Int64 | FieldType::UInt64 | FieldType::Double => 8,
            FieldType::String => 8,
        }
    }

    /// Whether the field has a fixed-width order-preserving encoding.
    pub fn is_sortable(&self) -> bool {
        !matches!(self, FieldType::String)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Schema entry of a single attribute field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    pub field_type: FieldType,
}

impl AttributeConfig {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> AttributeConfig {
        AttributeConfig {
            name: name.into(),
            field_type,
        }
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
}

impl AttributeValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            AttributeValue::Int8(_) => FieldType::Int8,
            AttributeValue::Int16(_) => FieldType::Int16,
            AttributeValue::Int32(_) => FieldType::Int32,
            AttributeValue::Int64(_) => FieldType::Int64,
            AttributeValue::UInt8(_) => FieldType::UInt8,
            AttributeValue::UInt16(_) => FieldType::UInt16,
            AttributeValue::UInt32(_) => FieldType::UInt32,
            AttributeValue::UInt64(_) => FieldType::UInt64,
            AttributeValue::Float(_) => FieldType::Float,
            AttributeValue::Double(_) => FieldType::Double,
            AttributeValue::String(_) => FieldType::String,
        }
    }

    fn write_fixed(&self, out: &mut [u8]) {
        match self {
            AttributeValue::Int8(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::Int16(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::Int32(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::Int64(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::UInt8(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::UInt16(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::UInt32(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::UInt64(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::Float(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::Double(v) => out.copy_from_slice(&v.to_le_bytes()),
            AttributeValue::String(_) => unreachable!("string values have no fixed slot"),
        }
    }
}

/// Location of one field inside a packed attribute region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeReference {
    name: String,
    field_type: FieldType,
    offset: usize,
}

impl AttributeReference {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Offset of the field's slot from the start of the region.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the raw little-endian slot bytes of the field.
    pub fn slot_bytes<'a>(&self, region: &'a [u8]) -> Result<&'a [u8]> {
        let mut cursor = ByteCursor::new(region, "attribute region");
        cursor.skip(self.offset)?;
        cursor.read_bytes(self.field_type.slot_width())
    }

    /// Reads and decodes the field value.
    pub fn read(&self, region: &[u8]) -> Result<AttributeValue> {
        let mut slot = ByteCursor::new(self.slot_bytes(region)?, "attribute slot");
        let value = match self.field_type {
            FieldType::Int8 => AttributeValue::Int8(i8::from_le_bytes(slot.read_array()?)),
            FieldType::Int16 => AttributeValue::Int16(i16::from_le_bytes(slot.read_array()?)),
            FieldType::Int32 => AttributeValue::Int32(i32::from_le_bytes(slot.read_array()?)),
            FieldType::Int64 => AttributeValue::Int64(i64::from_le_bytes(slot.read_array()?)),
            FieldType::UInt8 => AttributeValue::UInt8(slot.read_u8()?),
            FieldType::UInt16 => AttributeValue::UInt16(u16::from_le_bytes(slot.read_array()?)),
            FieldType::UInt32 => AttributeValue::UInt32(slot.read_u32_le()?),
            FieldType::UInt64 => AttributeValue::UInt64(slot.read_u64_le()?),
            FieldType::Float => AttributeValue::Float(f32::from_le_bytes(slot.read_array()?)),
            FieldType::Double => AttributeValue::Double(f64::from_le_bytes(slot.read_array()?)),
            FieldType::String => {
                let offset = slot.read_u32_le()? as usize;
                let len = slot.read_u32_le()? as usize;
                let mut cursor = ByteCursor::new(region, "attribute region");
                cursor.skip(offset)?;
                let bytes = cursor.read_bytes(len)?;
                match std::str::from_utf8(bytes) {
                    Ok(s) => AttributeValue::String(s.to_string()),
                    Err(_) => return invalid_format(&self.name, "string is not valid UTF-8"),
                }
            }
        };
        Ok(value)
    }
}

/// Lays out and reads packed attribute regions for a fixed attribute schema.
#[derive(Debug, Clone)]
pub struct PackAttributeFormatter {
    references: Vec<AttributeReference>,
    fixed_len: usize,
}

impl PackAttributeFormatter {
    /// Builds the formatter, assigning slots in schema order.
    ///
    /// # Errors
    ///
    /// Fails on duplicate or empty field names.
    pub fn new(attributes: &[AttributeConfig]) -> Result<PackAttributeFormatter> {
        let mut references = Vec::with_capacity(attributes.len());
        let mut offset = 0;
        for attribute in attributes {
            verify_arg!(attribute_name, !attribute.name.is_empty());
            if references
                .iter()
                .any(|r: &AttributeReference| r.name == attribute.name)
            {
                return Err(Error::invalid_arg(
                    "attributes",
                    format!("duplicate attribute '{}'", attribute.name),
                ));
            }
            references.push(AttributeReference {
                name: attribute.name.clone(),
                field_type: attribute.field_type,
                offset,
            });
            offset += attribute.field_type.slot_width();
        }
        Ok(PackAttributeFormatter {
            references,
            fixed_len: offset,
        })
    }

    pub fn references(&self) -> &[AttributeReference] {
        &self.references
    }

    pub fn reference(&self, name: &str) -> Option<&AttributeReference> {
        self.references.iter().find(|r| r.name == name)
    }

    /// Size of the fixed-slot area at the start of every region.
    pub fn fixed_len(&self) -> usize {
        self.fixed_len
    }

    /// Packs `values`, given in schema order, into a new region.
    pub fn pack(&self, values: &[AttributeValue]) -> Result<Vec<u8>> {
        if values.len() != self.references.len() {
            return Err(Error::invalid_arg(
                "values",
                format!(
                    "expected {} attribute values, got {}",
                    self.references.len(),
                    values.len()
                ),
            ));
        }
        let mut region = vec![0u8; self.fixed_len];
        for (reference, value) in self.references.iter().zip(values) {
            if value.field_type() != reference.field_type {
                return Err(Error::invalid_arg(
                    reference.name.clone(),
                    format!(
                        "expected {} value, got {}",
                        reference.field_type,
                        value.field_type()
                    ),
                ));
            }
            let slot = reference.offset..reference.offset + reference.field_type.slot_width();
            match value {
                AttributeValue::String(s) => {
                    let offset = u32::try_from(region.len())
                        .map_err(|_| Error::invalid_arg("values", "packed region too large"))?;
                    let len = u32::try_from(s.len())
                        .map_err(|_| Error::invalid_arg("values", "string value too large"))?;
                    region[slot.start..slot.start + 4].copy_from_slice(&offset.to_le_bytes());
                    region[slot.start + 4..slot.end].copy_from_slice(&len.to_le_bytes());
                    region.extend_from_slice(s.as_bytes());
                }
                _ => value.write_fixed(&mut region[slot]),
            }
        }
        Ok(region)
    }

    /// Decodes every field of `region`, in schema order.
    pub fn unpack(&self, region: &[u8]) -> Result<Vec<AttributeValue>> {
        self.references.iter().map(|r| r.read(region)).collect()
    }
}
