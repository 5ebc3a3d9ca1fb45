//! Image block stream codec

use alloc::vec::Vec;

use crate::error::{HiiError, Result};
use crate::stream::{put_u16, put_u32, Cursor};
use crate::types::ID_SPACE_END;

pub const IIBT_END: u8 = 0x00;
pub const IIBT_IMAGE_1BIT: u8 = 0x10;
pub const IIBT_IMAGE_1BIT_TRANS: u8 = 0x11;
pub const IIBT_IMAGE_4BIT: u8 = 0x12;
pub const IIBT_IMAGE_4BIT_TRANS: u8 = 0x13;
pub const IIBT_IMAGE_8BIT: u8 = 0x14;
pub const IIBT_IMAGE_8BIT_TRANS: u8 = 0x15;
pub const IIBT_IMAGE_24BIT: u8 = 0x16;
pub const IIBT_IMAGE_24BIT_TRANS: u8 = 0x17;
pub const IIBT_IMAGE_JPEG: u8 = 0x18;
pub const IIBT_IMAGE_PNG: u8 = 0x19;
pub const IIBT_DUPLICATE: u8 = 0x20;
pub const IIBT_SKIP2: u8 = 0x21;
pub const IIBT_SKIP1: u8 = 0x22;
pub const IIBT_EXT1: u8 = 0x30;
pub const IIBT_EXT2: u8 = 0x31;
pub const IIBT_EXT4: u8 = 0x32;

/// Bytes of 1-bit pixel data for `height` rows
pub const fn bitmap_len_1bit(width: u16, height: u16) -> usize {
    (width as usize).div_ceil(8) * height as usize
}

/// Bytes of 4-bit pixel data for `height` rows
pub const fn bitmap_len_4bit(width: u16, height: u16) -> usize {
    (width as usize).div_ceil(2) * height as usize
}

pub const fn bitmap_len_8bit(width: u16, height: u16) -> usize {
    width as usize * height as usize
}

pub const fn bitmap_len_24bit(width: u16, height: u16) -> usize {
    width as usize * height as usize * 3
}

/// Compressed payload formats handed to an external decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedFormat {
    Jpeg,
    Png,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageBody<'a> {
    /// Palette-indexed bitmap at 1, 4 or 8 bits per pixel
    Indexed {
        bits: u8,
        palette_index: u8,
        width: u16,
        height: u16,
        data: &'a [u8],
    },
    /// Direct b,g,r triples
    Rgb {
        width: u16,
        height: u16,
        data: &'a [u8],
    },
    Encoded {
        format: EncodedFormat,
        data: &'a [u8],
    },
    Duplicate(u16),
    Skip(u16),
    Ext,
    End,
}

#[derive(Debug, Clone)]
pub struct ImageBlock<'a> {
    pub tag: u8,
    pub offset: usize,
    pub len: usize,
    pub first_id: u16,
    pub body: ImageBody<'a>,
}

impl<'a> ImageBlock<'a> {
    pub fn id_count(&self) -> u16 {
        match self.body {
            ImageBody::Indexed { .. }
            | ImageBody::Rgb { .. }
            | ImageBody::Encoded { .. }
            | ImageBody::Duplicate(_) => 1,
            ImageBody::Skip(n) => n,
            ImageBody::Ext | ImageBody::End => 0,
        }
    }

    /// Transparency is carried by the block tag, never by pixel data
    pub fn is_transparent(&self) -> bool {
        matches!(
            self.tag,
            IIBT_IMAGE_1BIT_TRANS | IIBT_IMAGE_4BIT_TRANS | IIBT_IMAGE_8BIT_TRANS | IIBT_IMAGE_24BIT_TRANS
        )
    }
}

/// Decode the block starting at `offset`
///
/// An unknown tag is reported as [`ImageBody::End`] with zero length so the
/// walk stops there.
pub fn parse_block(data: &[u8], offset: usize, first_id: u16) -> Result<ImageBlock<'_>> {
    let mut cursor = Cursor::at(data, offset)?;
    let tag = cursor.read_u8()?;

    let body = match tag {
        IIBT_END => ImageBody::End,
        IIBT_IMAGE_1BIT | IIBT_IMAGE_1BIT_TRANS | IIBT_IMAGE_4BIT | IIBT_IMAGE_4BIT_TRANS
        | IIBT_IMAGE_8BIT | IIBT_IMAGE_8BIT_TRANS => {
            let palette_index = cursor.read_u8()?;
            let width = cursor.read_u16()?;
            let height = cursor.read_u16()?;
            let (bits, len) = match tag {
                IIBT_IMAGE_1BIT | IIBT_IMAGE_1BIT_TRANS => (1, bitmap_len_1bit(width, height)),
                IIBT_IMAGE_4BIT | IIBT_IMAGE_4BIT_TRANS => (4, bitmap_len_4bit(width, height)),
                _ => (8, bitmap_len_8bit(width, height)),
            };
            ImageBody::Indexed {
                bits,
                palette_index,
                width,
                height,
                data: cursor.read_bytes(len)?,
            }
        }
        IIBT_IMAGE_24BIT | IIBT_IMAGE_24BIT_TRANS => {
            let width = cursor.read_u16()?;
            let height = cursor.read_u16()?;
            ImageBody::Rgb {
                width,
                height,
                data: cursor.read_bytes(bitmap_len_24bit(width, height))?,
            }
        }
        IIBT_IMAGE_JPEG | IIBT_IMAGE_PNG => {
            let size = cursor.read_u32()? as usize;
            let format = if tag == IIBT_IMAGE_JPEG {
                EncodedFormat::Jpeg
            } else {
                EncodedFormat::Png
            };
            ImageBody::Encoded {
                format,
                data: cursor.read_bytes(size)?,
            }
        }
        IIBT_DUPLICATE => ImageBody::Duplicate(cursor.read_u16()?),
        IIBT_SKIP1 => ImageBody::Skip(cursor.read_u8()? as u16),
        IIBT_SKIP2 => ImageBody::Skip(cursor.read_u16()?),
        IIBT_EXT1 | IIBT_EXT2 | IIBT_EXT4 => {
            cursor.read_u8()?;
            let len = match tag {
                IIBT_EXT1 => cursor.read_u8()? as usize,
                IIBT_EXT2 => cursor.read_u16()? as usize,
                _ => cursor.read_u32()? as usize,
            };
            let consumed = cursor.position() - offset;
            if len < consumed {
                return Err(HiiError::InvalidFormat);
            }
            cursor.skip(len - consumed)?;
            ImageBody::Ext
        }
        _ => {
            log::warn!("hii: unknown image block tag {:#04x} at {}", tag, offset);
            return Ok(ImageBlock {
                tag,
                offset,
                len: 0,
                first_id,
                body: ImageBody::End,
            });
        }
    };

    Ok(ImageBlock {
        tag,
        offset,
        len: cursor.position() - offset,
        first_id,
        body,
    })
}

/// Iterator over the blocks of an image stream, END excluded
pub struct ImageBlocks<'a> {
    data: &'a [u8],
    offset: usize,
    /// One past the last id handed out; reaches `ID_SPACE_END` at most
    next_id: u32,
    done: bool,
}

impl<'a> ImageBlocks<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            next_id: 1,
            done: false,
        }
    }

    /// Offset where the walk stopped
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }
}

impl<'a> Iterator for ImageBlocks<'a> {
    type Item = Result<ImageBlock<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.data.len() {
            return None;
        }
        // Past the id space only blocks without ids are accepted below
        match parse_block(self.data, self.offset, self.next_id as u16) {
            Ok(block) if block.body == ImageBody::End => {
                self.done = true;
                None
            }
            Ok(block) => {
                #[cfg(feature = "trace")]
                log::trace!(
                    "hii: image block {:#04x} at {} len {} id {}",
                    block.tag,
                    block.offset,
                    block.len,
                    block.first_id
                );
                let next_id = self.next_id + u32::from(block.id_count());
                if next_id > ID_SPACE_END {
                    log::warn!("hii: image block at {} runs past id 0xFFFF", block.offset);
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

/// Encode a 24-bit block from `{blue, green, red}` pixels
pub fn encode_rgb(width: u16, height: u16, transparent: bool, pixels: &[super::BltPixel]) -> Vec<u8> {
    let mut block = Vec::with_capacity(5 + bitmap_len_24bit(width, height));
    block.push(if transparent {
        IIBT_IMAGE_24BIT_TRANS
    } else {
        IIBT_IMAGE_24BIT
    });
    put_u16(&mut block, width);
    put_u16(&mut block, height);
    for pixel in pixels {
        block.extend_from_slice(&[pixel.blue, pixel.green, pixel.red]);
    }
    block
}

/// Encode a JPEG or PNG block around `payload`
pub fn encode_compressed(format: EncodedFormat, payload: &[u8]) -> Vec<u8> {
    let mut block = Vec::with_capacity(5 + payload.len());
    block.push(match format {
        EncodedFormat::Jpeg => IIBT_IMAGE_JPEG,
        EncodedFormat::Png => IIBT_IMAGE_PNG,
    });
    put_u32(&mut block, payload.len() as u32);
    block.extend_from_slice(payload);
    block
}
