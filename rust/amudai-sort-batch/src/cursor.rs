//! Bounds-checked reading of packed byte buffers.

use amudai_common::{Result, result::invalid_format};

/// A forward-only reader over a byte slice.
///
/// Every read checks the remaining length and fails with `InvalidFormat` on
/// overrun instead of reading past the end of the buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    element: &'static str,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor over `buf`. `element` names the buffer in error messages.
    pub fn new(buf: &'a [u8], element: &'static str) -> ByteCursor<'a> {
        ByteCursor {
            buf,
            pos: 0,
            element,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return invalid_format(
                self.element,
                &format!(
                    "read of {len} bytes at offset {} overruns buffer of {} bytes",
                    self.pos,
                    self.buf.len()
                ),
            );
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Reads an unsigned LEB128 varint of at most 10 bytes.
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..10 {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        invalid_format(self.element, "varint longer than 10 bytes")
    }
}

/// Appends `value` to `out` as an unsigned LEB128 varint.
pub fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_and_overrun() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u32.to_le_bytes());
        buf.extend_from_slice(&(-3i64).to_le_bytes());
        buf.push(0xAB);

        let mut cursor = ByteCursor::new(&buf, "test");
        assert_eq!(cursor.read_u32_le().unwrap(), 7);
        assert_eq!(cursor.read_i64_le().unwrap(), -3);
        assert_eq!(cursor.remaining(), 1);
        assert!(cursor.read_u64_le().is_err());
        // A failed read does not consume anything.
        assert_eq!(cursor.position(), 12);
        assert_eq!(cursor.read_u8().unwrap(), 0xAB);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_varint() {
        for value in [0u64, 1, 127, 128, 300, 16384, u32::MAX as u64, u64::MAX] {
            let mut out = Vec::new();
            write_varint(value, &mut out);
            let mut cursor = ByteCursor::new(&out, "varint");
            assert_eq!(cursor.read_varint().unwrap(), value);
            assert!(cursor.is_empty());
        }
        let truncated = [0x80u8, 0x80];
        assert!(ByteCursor::new(&truncated, "varint").read_varint().is_err());
    }
}
