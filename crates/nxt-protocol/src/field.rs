//! Little-endian field access shared by the command and reply codecs.

use crate::constants::MAX_PAYLOAD_SIZE;
use crate::error::EncodeError;
use crate::types::OpCode;
use bytes::BufMut;

/// Encode `value` into a fixed-width, null-filled ASCII slot.
///
/// A value that exactly fills the slot is stored without a terminator. A
/// value one byte too long is treated as "text plus terminator" and cut to
/// `width - 1` characters followed by a null. Anything longer is rejected.
pub fn encode_ascii(
    opcode: OpCode,
    field: &'static str,
    value: &str,
    width: usize,
) -> Result<Vec<u8>, EncodeError> {
    if !value.is_ascii() {
        return Err(EncodeError::NotAscii { opcode, field });
    }
    let bytes = value.as_bytes();
    let mut slot = vec![0u8; width];
    match bytes.len() {
        n if n <= width => slot[..n].copy_from_slice(bytes),
        n if n == width + 1 => slot[..width - 1].copy_from_slice(&bytes[..width - 1]),
        n => {
            return Err(EncodeError::FieldTooLong {
                opcode,
                field,
                max: width,
                actual: n,
            })
        }
    }
    Ok(slot)
}

/// Decode a fixed-width ASCII slot.
///
/// Stops at the first null and trims the trailing spaces and `?` the
/// firmware pads some fields with.
pub fn decode_ascii(slot: &[u8]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    let text = String::from_utf8_lossy(&slot[..end]);
    text.trim_end_matches(['\0', ' ', '?']).to_string()
}

/// Sequential payload builder.
pub(crate) struct FieldWriter {
    opcode: OpCode,
    buf: Vec<u8>,
}

impl FieldWriter {
    /// Start a payload with its kind byte and opcode.
    pub fn new(opcode: OpCode, kind_byte: u8) -> Self {
        let mut buf = Vec::with_capacity(MAX_PAYLOAD_SIZE);
        buf.put_u8(kind_byte);
        buf.put_u8(opcode.code());
        FieldWriter { opcode, buf }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.buf.put_i16_le(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    /// Fixed-width ASCII slot.
    pub fn ascii(
        &mut self,
        field: &'static str,
        value: &str,
        width: usize,
    ) -> Result<&mut Self, EncodeError> {
        let slot = encode_ascii(self.opcode, field, value, width)?;
        self.buf.put_slice(&slot);
        Ok(self)
    }

    /// Raw bytes with an upper bound.
    pub fn bytes(
        &mut self,
        field: &'static str,
        data: &[u8],
        max: usize,
    ) -> Result<&mut Self, EncodeError> {
        if data.len() > max {
            return Err(EncodeError::FieldTooLong {
                opcode: self.opcode,
                field,
                max,
                actual: data.len(),
            });
        }
        self.buf.put_slice(data);
        Ok(self)
    }

    /// Raw bytes padded with zeros to `width`.
    pub fn padded(
        &mut self,
        field: &'static str,
        data: &[u8],
        width: usize,
    ) -> Result<&mut Self, EncodeError> {
        self.bytes(field, data, width)?;
        self.buf.put_bytes(0, width - data.len());
        Ok(self)
    }

    /// Reject values outside `min..=max` before they are narrowed.
    pub fn check_range(
        &self,
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    ) -> Result<(), EncodeError> {
        if value < min || value > max {
            return Err(EncodeError::OutOfRange {
                opcode: self.opcode,
                field,
                value,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Finish the payload, enforcing the transport limit.
    pub fn finish(&mut self) -> Result<Vec<u8>, EncodeError> {
        if self.buf.len() > MAX_PAYLOAD_SIZE {
            return Err(EncodeError::PayloadTooLong {
                opcode: self.opcode,
                max: MAX_PAYLOAD_SIZE,
                actual: self.buf.len(),
            });
        }
        Ok(std::mem::take(&mut self.buf))
    }
}

/// Offset-based payload reader that reports absent fields as `None`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FieldReader { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Exactly `len` bytes at `offset`, if the buffer reaches that far.
    pub fn slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        self.buf.get(offset..offset.checked_add(len)?)
    }

    /// Whatever is present from `offset`, capped at `max` bytes.
    pub fn tail(&self, offset: usize, max: usize) -> &'a [u8] {
        match self.buf.get(offset..) {
            Some(rest) => &rest[..rest.len().min(max)],
            None => &[],
        }
    }

    pub fn u8(&self, offset: usize) -> Option<u8> {
        self.buf.get(offset).copied()
    }

    pub fn i8(&self, offset: usize) -> Option<i8> {
        self.u8(offset).map(|b| b as i8)
    }

    pub fn u16(&self, offset: usize) -> Option<u16> {
        self.array::<2>(offset).map(u16::from_le_bytes)
    }

    pub fn i16(&self, offset: usize) -> Option<i16> {
        self.array::<2>(offset).map(i16::from_le_bytes)
    }

    pub fn u32(&self, offset: usize) -> Option<u32> {
        self.array::<4>(offset).map(u32::from_le_bytes)
    }

    pub fn i32(&self, offset: usize) -> Option<i32> {
        self.array::<4>(offset).map(i32::from_le_bytes)
    }

    /// Fixed-width ASCII slot; absent unless the whole slot is present.
    pub fn ascii(&self, offset: usize, width: usize) -> Option<String> {
        self.slice(offset, width).map(decode_ascii)
    }

    pub fn array<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.slice(offset, N).and_then(|s| s.try_into().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OP: OpCode = OpCode::SetBrickName;

    #[test]
    fn test_ascii_pads_with_nulls() {
        let slot = encode_ascii(OP, "name", "NXT", 6).unwrap();
        assert_eq!(slot, b"NXT\0\0\0");
    }

    #[test]
    fn test_ascii_exact_width_has_no_terminator() {
        let slot = encode_ascii(OP, "name", "ABCDEF", 6).unwrap();
        assert_eq!(slot, b"ABCDEF");
        assert_eq!(decode_ascii(&slot), "ABCDEF");
    }

    #[test]
    fn test_ascii_one_over_is_truncated_with_terminator() {
        let slot = encode_ascii(OP, "name", "ABCDEFG", 6).unwrap();
        assert_eq!(slot, b"ABCDE\0");
        assert_eq!(decode_ascii(&slot), "ABCDE");
    }

    #[test]
    fn test_ascii_far_over_is_rejected() {
        let err = encode_ascii(OP, "name", "ABCDEFGH", 6).unwrap_err();
        assert_eq!(
            err,
            EncodeError::FieldTooLong {
                opcode: OP,
                field: "name",
                max: 6,
                actual: 8
            }
        );
    }

    #[test]
    fn test_ascii_rejects_non_ascii() {
        assert!(matches!(
            encode_ascii(OP, "name", "bl\u{e5}", 6),
            Err(EncodeError::NotAscii { .. })
        ));
    }

    #[test]
    fn test_decode_trims_padding() {
        assert_eq!(decode_ascii(b"LEGO????"), "LEGO");
        assert_eq!(decode_ascii(b"Sonar   "), "Sonar");
        assert_eq!(decode_ascii(b"ab\0cd"), "ab");
    }

    #[test]
    fn test_reader_reports_absent_fields() {
        let reader = FieldReader::new(&[0x02, 0x0B, 0x00, 0xE8]);
        assert_eq!(reader.u8(3), Some(0xE8));
        assert_eq!(reader.u16(3), None);
        assert_eq!(reader.u32(100), None);
        assert_eq!(reader.tail(2, 16), &[0x00, 0xE8]);
        assert!(reader.tail(10, 16).is_empty());
    }

    #[test]
    fn test_writer_enforces_payload_limit() {
        let mut writer = FieldWriter::new(OpCode::Write, 0x01);
        writer.bytes("data", &[0u8; 70], 100).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(EncodeError::PayloadTooLong { actual: 72, .. })
        ));
    }
}
