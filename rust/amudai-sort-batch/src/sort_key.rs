//! Fixed-width, byte-comparable sort keys.
//!
//! Each sort field is read from its packed slot and re-encoded so that a plain
//! lexicographic comparison of the encoded bytes matches the numeric order of the
//! values:
//!
//! - unsigned integers: big-endian;
//! - signed integers: big-endian with the sign bit flipped;
//! - floating point: big-endian, with negatives fully inverted and positives
//!   having the sign bit flipped.
//!
//! Descending fields are additionally bit-inverted. The encoded fields are
//! concatenated in sort-description order, so all keys produced by one encoder
//! have the same width.

use amudai_common::{Result, error::Error, verify_arg};

use crate::{
    attribute::{AttributeReference, FieldType, PackAttributeFormatter},
    config::{SortDescription, SortOrder},
};

#[derive(Debug, Clone)]
struct SortField {
    reference: AttributeReference,
    order: SortOrder,
}

/// Produces sort keys from packed attribute regions.
#[derive(Debug, Clone)]
pub struct SortKeyEncoder {
    fields: Vec<SortField>,
    width: usize,
}

impl SortKeyEncoder {
    /// Resolves the sort descriptions against the attribute schema.
    ///
    /// # Errors
    ///
    /// - `UnknownSortField` when a description names a field missing from the schema.
    /// - `NonSortableField` when the field has no fixed-width encoding.
    pub fn new(
        formatter: &PackAttributeFormatter,
        descriptions: &[SortDescription],
    ) -> Result<SortKeyEncoder> {
        verify_arg!(descriptions, !descriptions.is_empty());
        let mut fields = Vec::with_capacity(descriptions.len());
        let mut width = 0;
        for description in descriptions {
            let reference = formatter
                .reference(&description.field)
                .ok_or_else(|| Error::unknown_sort_field(&description.field))?;
            let field_type = reference.field_type();
            if !field_type.is_sortable() {
                return Err(Error::non_sortable_field(
                    &description.field,
                    field_type.to_string(),
                ));
            }
            width += field_type.slot_width();
            fields.push(SortField {
                reference: reference.clone(),
                order: description.order,
            });
        }
        Ok(SortKeyEncoder { fields, width })
    }

    /// Total width of every key produced by this encoder.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Appends the sort key of `region` to `out`.
    ///
    /// On error `out` may contain a partial key; callers discard it.
    pub fn encode_into(&self, region: &[u8], out: &mut Vec<u8>) -> Result<()> {
        for field in &self.fields {
            let slot = field.reference.slot_bytes(region)?;
            let start = out.len();
            encode_ordered(field.reference.field_type(), slot, out);
            if field.order == SortOrder::Descending {
                for byte in &mut out[start..] {
                    *byte = !*byte;
                }
            }
        }
        Ok(())
    }

    /// Appends the key of a document that carries no attribute values (for
    /// example, a delete): every field encodes as zero bytes.
    pub fn encode_empty(&self, out: &mut Vec<u8>) {
        out.resize(out.len() + self.width, 0);
    }
}

/// Appends the order-preserving big-endian encoding of a little-endian slot.
fn encode_ordered(field_type: FieldType, slot: &[u8], out: &mut Vec<u8>) {
    match field_type {
        FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64 => {
            out.extend(slot.iter().rev());
        }
        FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64 => {
            let start = out.len();
            out.extend(slot.iter().rev());
            out[start] ^= 0x80;
        }
        FieldType::Float => {
            let bits = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
            let bits = if bits & 0x8000_0000 != 0 {
                !bits
            } else {
                bits ^ 0x8000_0000
            };
            out.extend_from_slice(&bits.to_be_bytes());
        }
        FieldType::Double => {
            let mut le = [0u8; 8];
            le.copy_from_slice(slot);
            let bits = u64::from_le_bytes(le);
            let bits = if bits & 0x8000_0000_0000_0000 != 0 {
                !bits
            } else {
                bits ^ 0x8000_0000_0000_0000
            };
            out.extend_from_slice(&bits.to_be_bytes());
        }
        FieldType::String => unreachable!("string fields are rejected by SortKeyEncoder::new"),
    }
}
