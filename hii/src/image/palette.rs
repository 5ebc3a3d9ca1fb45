//! Palette information block

use alloc::vec::Vec;

use super::BltPixel;
use crate::error::{HiiError, Result};
use crate::stream::Cursor;

/// Raw palette block: `{count u16, count x {size u16, size bytes of b,g,r}}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteBlock {
    raw: Vec<u8>,
    /// Byte offset of each palette entry (its size field) inside `raw`
    entries: Vec<usize>,
}

impl PaletteBlock {
    /// Parse a palette block from the front of `data`; trailing bytes are ignored
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let count = cursor.read_u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(cursor.position());
            let size = cursor.read_u16()? as usize;
            cursor.skip(size)?;
        }
        Ok(Self {
            raw: data[..cursor.position()].to_vec(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Colors of the palette with 1-based `index`
    pub fn colors(&self, index: u8) -> Result<Vec<BltPixel>> {
        if index == 0 {
            return Err(HiiError::NotFound);
        }
        let start = *self
            .entries
            .get(index as usize - 1)
            .ok_or(HiiError::NotFound)?;
        let mut cursor = Cursor::at(&self.raw, start)?;
        let size = cursor.read_u16()? as usize;
        let bytes = cursor.read_bytes(size)?;
        Ok(bytes
            .chunks_exact(3)
            .map(|rgb| BltPixel::new(rgb[0], rgb[1], rgb[2]))
            .collect())
    }
}
