//! String block stream codec
//!
//! A string package body is a sequence of self-describing blocks. Each block
//! starts with a one-byte tag; its length is computed from the tag and the
//! bytes that follow. String ids are not stored: they are assigned by
//! counting text entries, duplicates and skips from id 1.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{HiiError, Result};
use crate::stream::{narrow_to_string, ucs2_to_string, Cursor};
use crate::types::ID_SPACE_END;

pub const SIBT_END: u8 = 0x00;
pub const SIBT_STRING_SCSU: u8 = 0x10;
pub const SIBT_STRING_SCSU_FONT: u8 = 0x11;
pub const SIBT_STRINGS_SCSU: u8 = 0x12;
pub const SIBT_STRINGS_SCSU_FONT: u8 = 0x13;
pub const SIBT_STRING_UCS2: u8 = 0x14;
pub const SIBT_STRING_UCS2_FONT: u8 = 0x15;
pub const SIBT_STRINGS_UCS2: u8 = 0x16;
pub const SIBT_STRINGS_UCS2_FONT: u8 = 0x17;
pub const SIBT_DUPLICATE: u8 = 0x20;
pub const SIBT_SKIP2: u8 = 0x21;
pub const SIBT_SKIP1: u8 = 0x22;
pub const SIBT_EXT1: u8 = 0x30;
pub const SIBT_EXT2: u8 = 0x31;
pub const SIBT_EXT4: u8 = 0x32;

/// EXT2 sub-type declaring a font used by `_FONT` blocks
pub const SIBT_FONT: u8 = 0x40;

/// Raw text of one string entry, terminator excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawText<'a> {
    /// SCSU text, surfaced one byte per character
    Narrow(&'a [u8]),
    /// Little-endian UCS-2 code units
    Wide(&'a [u8]),
}

impl<'a> RawText<'a> {
    pub fn to_text(&self) -> String {
        match self {
            RawText::Narrow(raw) => narrow_to_string(raw),
            RawText::Wide(raw) => ucs2_to_string(raw),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawText::Narrow(raw) | RawText::Wide(raw) => raw.is_empty(),
        }
    }

    /// Compare against `text` without allocating
    pub fn matches(&self, text: &str) -> bool {
        match self {
            RawText::Narrow(raw) => {
                let mut chars = text.chars();
                for &b in raw.iter() {
                    if chars.next() != Some(b as char) {
                        return false;
                    }
                }
                chars.next().is_none()
            }
            RawText::Wide(raw) => {
                let mut units = text.encode_utf16();
                for pair in raw.chunks_exact(2) {
                    if units.next() != Some(u16::from_le_bytes([pair[0], pair[1]])) {
                        return false;
                    }
                }
                units.next().is_none()
            }
        }
    }
}

/// Font declared by an EXT2/FONT block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringFont {
    pub font_id: u8,
    pub size: u16,
    pub style: u32,
    pub name: String,
}

impl StringFont {
    /// Encode as a complete EXT2/FONT block
    ///
    /// The block length field is 16 bits wide, so very long font names are
    /// rejected with `OutOfResources`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        body.push(self.font_id);
        crate::stream::put_u16(&mut body, self.size);
        crate::stream::put_u32(&mut body, self.style);
        crate::stream::put_ucs2_z(&mut body, &self.name);

        let total = 4 + body.len();
        let length = u16::try_from(total).map_err(|_| HiiError::OutOfResources)?;
        let mut block = Vec::with_capacity(total);
        block.push(SIBT_EXT2);
        block.push(SIBT_FONT);
        crate::stream::put_u16(&mut block, length);
        block.extend_from_slice(&body);
        Ok(block)
    }
}

/// Decoded payload of one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockBody<'a> {
    /// One or more strings; each consumes one id
    Text {
        font_id: Option<u8>,
        strings: Vec<RawText<'a>>,
    },
    /// Alias of an earlier id; consumes one id
    Duplicate(u16),
    /// Reserves `n` ids with no text
    Skip(u16),
    /// EXT2/FONT declaration; consumes no id
    Font(StringFont),
    /// Any other extension block; consumes no id
    Ext,
    End,
}

/// One block located in the stream
#[derive(Debug, Clone)]
pub struct StringBlock<'a> {
    pub tag: u8,
    pub offset: usize,
    pub len: usize,
    /// First id assigned to this block
    pub first_id: u16,
    pub body: BlockBody<'a>,
}

impl<'a> StringBlock<'a> {
    /// Number of ids this block consumes
    pub fn id_count(&self) -> u16 {
        match &self.body {
            BlockBody::Text { strings, .. } => strings.len() as u16,
            BlockBody::Duplicate(_) => 1,
            BlockBody::Skip(n) => *n,
            BlockBody::Font(_) | BlockBody::Ext | BlockBody::End => 0,
        }
    }
}

/// Decode the block starting at `offset`
pub fn parse_block(data: &[u8], offset: usize, first_id: u16) -> Result<StringBlock<'_>> {
    let mut cursor = Cursor::at(data, offset)?;
    let tag = cursor.read_u8()?;

    let body = match tag {
        SIBT_END => BlockBody::End,
        SIBT_STRING_SCSU => BlockBody::Text {
            font_id: None,
            strings: alloc::vec![RawText::Narrow(cursor.read_ascii_z()?)],
        },
        SIBT_STRING_SCSU_FONT => {
            let font_id = cursor.read_u8()?;
            BlockBody::Text {
                font_id: Some(font_id),
                strings: alloc::vec![RawText::Narrow(cursor.read_ascii_z()?)],
            }
        }
        SIBT_STRINGS_SCSU | SIBT_STRINGS_SCSU_FONT => {
            let font_id = if tag == SIBT_STRINGS_SCSU_FONT {
                Some(cursor.read_u8()?)
            } else {
                None
            };
            let count = cursor.read_u16()?;
            let mut strings = Vec::with_capacity(count as usize);
            for _ in 0..count {
                strings.push(RawText::Narrow(cursor.read_ascii_z()?));
            }
            BlockBody::Text { font_id, strings }
        }
        SIBT_STRING_UCS2 => BlockBody::Text {
            font_id: None,
            strings: alloc::vec![RawText::Wide(cursor.read_ucs2_z()?)],
        },
        SIBT_STRING_UCS2_FONT => {
            let font_id = cursor.read_u8()?;
            BlockBody::Text {
                font_id: Some(font_id),
                strings: alloc::vec![RawText::Wide(cursor.read_ucs2_z()?)],
            }
        }
        SIBT_STRINGS_UCS2 | SIBT_STRINGS_UCS2_FONT => {
            let font_id = if tag == SIBT_STRINGS_UCS2_FONT {
                Some(cursor.read_u8()?)
            } else {
                None
            };
            let count = cursor.read_u16()?;
            let mut strings = Vec::with_capacity(count as usize);
            for _ in 0..count {
                strings.push(RawText::Wide(cursor.read_ucs2_z()?));
            }
            BlockBody::Text { font_id, strings }
        }
        SIBT_DUPLICATE => BlockBody::Duplicate(cursor.read_u16()?),
        SIBT_SKIP1 => BlockBody::Skip(cursor.read_u8()? as u16),
        SIBT_SKIP2 => BlockBody::Skip(cursor.read_u16()?),
        SIBT_EXT1 => {
            cursor.read_u8()?;
            let len = cursor.read_u8()? as usize;
            skip_ext(&mut cursor, offset, len)?;
            BlockBody::Ext
        }
        SIBT_EXT2 => {
            let sub_type = cursor.read_u8()?;
            let len = cursor.read_u16()? as usize;
            if sub_type == SIBT_FONT {
                let font_id = cursor.read_u8()?;
                let size = cursor.read_u16()?;
                let style = cursor.read_u32()?;
                let name = ucs2_to_string(cursor.read_ucs2_z()?);
                cursor = Cursor::at(data, offset)?;
                skip_ext(&mut cursor, offset, len)?;
                BlockBody::Font(StringFont {
                    font_id,
                    size,
                    style,
                    name,
                })
            } else {
                skip_ext(&mut cursor, offset, len)?;
                BlockBody::Ext
            }
        }
        SIBT_EXT4 => {
            cursor.read_u8()?;
            let len = cursor.read_u32()? as usize;
            skip_ext(&mut cursor, offset, len)?;
            BlockBody::Ext
        }
        _ => {
            log::warn!("hii: unknown string block tag {:#04x} at {}", tag, offset);
            return Err(HiiError::InvalidFormat);
        }
    };

    Ok(StringBlock {
        tag,
        offset,
        len: cursor.position() - offset,
        first_id,
        body,
    })
}

/// Extension lengths cover the whole block, tag included
fn skip_ext(cursor: &mut Cursor<'_>, offset: usize, len: usize) -> Result<()> {
    let consumed = cursor.position() - offset;
    if len < consumed {
        return Err(HiiError::InvalidFormat);
    }
    cursor.skip(len - consumed)
}

/// Iterator over the blocks of a string stream, END excluded
pub struct StringBlocks<'a> {
    data: &'a [u8],
    offset: usize,
    /// One past the last id handed out; reaches `ID_SPACE_END` at most
    next_id: u32,
    done: bool,
}

impl<'a> StringBlocks<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            next_id: 1,
            done: false,
        }
    }

    /// Offset of the END block once iteration finished
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Id the next text entry would receive
    pub fn next_id(&self) -> u32 {
        self.next_id
    }
}

impl<'a> Iterator for StringBlocks<'a> {
    type Item = Result<StringBlock<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        // Past the id space only blocks without ids are accepted below
        match parse_block(self.data, self.offset, self.next_id as u16) {
            Ok(block) => {
                if block.body == BlockBody::End {
                    self.done = true;
                    return None;
                }
                #[cfg(feature = "trace")]
                log::trace!(
                    "hii: string block {:#04x} at {} len {} id {}",
                    block.tag,
                    block.offset,
                    block.len,
                    block.first_id
                );
                let next_id = self.next_id + u32::from(block.id_count());
                if next_id > ID_SPACE_END {
                    log::warn!("hii: string block at {} runs past id 0xFFFF", block.offset);
                    self.done = true;
                    return Some(Err(HiiError::InvalidFormat));
                }
                self.offset += block.len;
                self.next_id = next_id;
                Some(Ok(block))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Encode a single UCS-2 block (optionally with a font reference)
pub fn encode_ucs2(text: &str, font_id: Option<u8>) -> Vec<u8> {
    let mut block = Vec::new();
    match font_id {
        Some(id) => {
            block.push(SIBT_STRING_UCS2_FONT);
            block.push(id);
        }
        None => block.push(SIBT_STRING_UCS2),
    }
    crate::stream::put_ucs2_z(&mut block, text);
    block
}

/// Encode a SKIP1 or SKIP2 block for `count` ids
pub fn encode_skip(count: u16) -> Vec<u8> {
    if count <= u8::MAX as u16 {
        alloc::vec![SIBT_SKIP1, count as u8]
    } else {
        let [lo, hi] = count.to_le_bytes();
        alloc::vec![SIBT_SKIP2, lo, hi]
    }
}
