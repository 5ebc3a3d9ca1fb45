//! Byte cursor over little-endian block streams
//!
//! Every walker in this crate (string blocks, image blocks, glyph blocks,
//! IFR opcodes, device path nodes) advances through an arena of bytes with
//! a [`Cursor`]. Reads are bounds checked and return
//! [`HiiError::InvalidFormat`] instead of panicking on truncated input.

use alloc::string::String;
use alloc::vec::Vec;
use uguid::Guid;

use crate::error::{HiiError, Result};

/// Read cursor over a borrowed byte arena
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Start at offset 0
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Start at `pos`
    pub fn at(data: &'a [u8], pos: usize) -> Result<Self> {
        if pos > data.len() {
            return Err(HiiError::InvalidFormat);
        }
        Ok(Self { data, pos })
    }

    /// Current offset into the arena
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the end of the arena
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whole arena
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Advance by `count` bytes
    pub fn skip(&mut self, count: usize) -> Result<()> {
        let end = self.pos.checked_add(count).ok_or(HiiError::InvalidFormat)?;
        if end > self.data.len() {
            return Err(HiiError::InvalidFormat);
        }
        self.pos = end;
        debug_assert!(self.pos <= self.data.len());
        Ok(())
    }

    /// Borrow the next `count` bytes and advance past them
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let start = self.pos;
        self.skip(count)?;
        Ok(&self.data[start..self.pos])
    }

    /// Look at the next byte without consuming it
    pub fn peek_u8(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or(HiiError::InvalidFormat)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.peek_u8()?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_guid(&mut self) -> Result<Guid> {
        let bytes = self.read_bytes(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(bytes);
        Ok(Guid::from_bytes(raw))
    }

    /// Read a NUL-terminated narrow string; the terminator is consumed but
    /// not returned
    pub fn read_ascii_z(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let len = rest.iter().position(|&b| b == 0).ok_or(HiiError::InvalidFormat)?;
        let text = &rest[..len];
        self.pos += len + 1;
        Ok(text)
    }

    /// Read a NUL-terminated UCS-2 string as raw little-endian bytes; the
    /// two-byte terminator is consumed but not returned
    pub fn read_ucs2_z(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let mut len = 0;
        loop {
            if len + 1 >= rest.len() {
                return Err(HiiError::InvalidFormat);
            }
            if rest[len] == 0 && rest[len + 1] == 0 {
                break;
            }
            len += 2;
        }
        let text = &rest[..len];
        self.pos += len + 2;
        Ok(text)
    }
}

/// Little-endian `u16` at `offset`
pub fn u16_at(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = data.get(offset..offset + 2).ok_or(HiiError::InvalidFormat)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Little-endian `u32` at `offset`
pub fn u32_at(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = data.get(offset..offset + 4).ok_or(HiiError::InvalidFormat)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// GUID stored at `offset`
pub fn guid_at(data: &[u8], offset: usize) -> Result<Guid> {
    let bytes = data.get(offset..offset + 16).ok_or(HiiError::InvalidFormat)?;
    let mut raw = [0u8; 16];
    raw.copy_from_slice(bytes);
    Ok(Guid::from_bytes(raw))
}

/// Overwrite a little-endian `u16` at `offset`
pub fn set_u16_at(data: &mut [u8], offset: usize, value: u16) -> Result<()> {
    let slot = data.get_mut(offset..offset + 2).ok_or(HiiError::InvalidFormat)?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Overwrite a little-endian `u32` at `offset`
pub fn set_u32_at(data: &mut [u8], offset: usize, value: u32) -> Result<()> {
    let slot = data.get_mut(offset..offset + 4).ok_or(HiiError::InvalidFormat)?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

pub fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append `text` as NUL-terminated UCS-2
pub fn put_ucs2_z(buf: &mut Vec<u8>, text: &str) {
    for unit in text.encode_utf16() {
        put_u16(buf, unit);
    }
    put_u16(buf, 0);
}

/// Decode raw little-endian UCS-2 bytes (no terminator) into a `String`
pub fn ucs2_to_string(raw: &[u8]) -> String {
    let units = raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Widen narrow bytes one-to-one, the way SCSU text is surfaced
pub fn narrow_to_string(raw: &[u8]) -> String {
    raw.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_cursor_reads_little_endian() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(cursor.read_u8(), Err(HiiError::InvalidFormat));
    }

    #[test]
    fn test_cursor_rejects_overrun() {
        let data = [1u8, 2, 3];
        let mut cursor = Cursor::new(&data);
        assert!(cursor.skip(4).is_err());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_ucs2_round_trip() {
        let mut buf = vec![];
        put_ucs2_z(&mut buf, "Hi");
        assert_eq!(buf, [b'H', 0, b'i', 0, 0, 0]);
        let mut cursor = Cursor::new(&buf);
        let raw = cursor.read_ucs2_z().unwrap();
        assert_eq!(ucs2_to_string(raw), "Hi");
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn test_unterminated_ascii_is_invalid() {
        let data = *b"abc";
        assert!(Cursor::new(&data).read_ascii_z().is_err());
    }
}
