//! Image package storage

use alloc::vec::Vec;

use super::block::{self, ImageBlocks, ImageBody, IIBT_END};
use super::decode::{expand_1bit, expand_24bit, expand_4bit, expand_8bit};
use super::palette::PaletteBlock;
use super::{DecoderRegistry, Image, IMAGE_TRANSPARENT};
use crate::error::{HiiError, Result};
use crate::index::IdIndex;
use crate::stream::{put_u32, Cursor};
use crate::types::{PackageHeader, PackageType, MAX_UINT24, PACKAGE_HEADER_SIZE};

/// Image package header: package header plus two info offsets
pub const IMAGE_HEADER_SIZE: usize = 12;

/// The single image package of a list
#[derive(Debug, Clone)]
pub struct ImagePackage {
    /// Block stream, END included; empty when the package holds no images
    blocks: Vec<u8>,
    palette: Option<PaletteBlock>,
}

impl ImagePackage {
    /// Parse a complete image package (header included)
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = PackageHeader::parse(bytes)?;
        if header.package_type != PackageType::Images.as_u8() || header.length as usize != bytes.len() {
            return Err(HiiError::InvalidInput);
        }
        let mut cursor = Cursor::at(bytes, PACKAGE_HEADER_SIZE)?;
        let image_info_offset = cursor.read_u32()? as usize;
        let palette_info_offset = cursor.read_u32()? as usize;

        let palette = if palette_info_offset != 0 {
            let data = bytes.get(palette_info_offset..).ok_or(HiiError::InvalidInput)?;
            Some(PaletteBlock::parse(data)?)
        } else {
            None
        };
        let palette_size = palette.as_ref().map_or(0, |p| p.len());

        let blocks = if image_info_offset != 0 {
            let image_size = bytes
                .len()
                .checked_sub(IMAGE_HEADER_SIZE + palette_size)
                .ok_or(HiiError::InvalidInput)?;
            bytes
                .get(image_info_offset..image_info_offset + image_size)
                .ok_or(HiiError::InvalidInput)?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(Self { blocks, palette })
    }

    /// Package holding a single block followed by END
    pub fn with_block(first: &[u8]) -> Result<Self> {
        let mut blocks = Vec::with_capacity(first.len() + 1);
        blocks.extend_from_slice(first);
        blocks.push(IIBT_END);
        let package = Self {
            blocks,
            palette: None,
        };
        if package.len() > MAX_UINT24 {
            return Err(HiiError::OutOfResources);
        }
        Ok(package)
    }

    pub fn len(&self) -> usize {
        IMAGE_HEADER_SIZE + self.blocks.len() + self.palette.as_ref().map_or(0, |p| p.len())
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn palette(&self) -> Option<&PaletteBlock> {
        self.palette.as_ref()
    }

    pub fn blocks(&self) -> ImageBlocks<'_> {
        ImageBlocks::new(&self.blocks)
    }

    /// Write the package with recomputed info offsets
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let header = PackageHeader::new(self.len(), PackageType::Images)?;
        put_u32(out, header.to_u32());
        let image_info_offset = if self.blocks.is_empty() {
            0
        } else {
            IMAGE_HEADER_SIZE as u32
        };
        let palette_info_offset = match self.palette {
            Some(_) => (IMAGE_HEADER_SIZE + self.blocks.len()) as u32,
            None => 0,
        };
        put_u32(out, image_info_offset);
        put_u32(out, palette_info_offset);
        out.extend_from_slice(&self.blocks);
        if let Some(palette) = &self.palette {
            out.extend_from_slice(palette.as_bytes());
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Id table over the current stream
    pub fn index(&self) -> Result<IdIndex> {
        let mut index = IdIndex::new();
        for block in self.blocks() {
            let block = block?;
            match block.body {
                ImageBody::Indexed { .. } | ImageBody::Rgb { .. } | ImageBody::Encoded { .. } => {
                    index.insert_stored(block.first_id, block.offset, 0)
                }
                ImageBody::Duplicate(target) => index.insert_alias(block.first_id, target),
                ImageBody::Skip(_) | ImageBody::Ext | ImageBody::End => {}
            }
        }
        Ok(index)
    }

    /// Number of ids assigned so far
    pub fn max_image_id(&self) -> Result<u16> {
        let mut walker = self.blocks();
        for block in walker.by_ref() {
            block?;
        }
        u16::try_from(walker.next_id() - 1).map_err(|_| HiiError::InvalidFormat)
    }

    /// Append `block` before END; returns the id it received
    pub fn append_block(&mut self, block: &[u8]) -> Result<u16> {
        if self.len() + block.len() > MAX_UINT24 {
            return Err(HiiError::OutOfResources);
        }
        if self.blocks.is_empty() {
            self.blocks.push(IIBT_END);
        }
        let id = self.max_image_id()?.checked_add(1).ok_or(HiiError::OutOfResources)?;
        let mut walker = self.blocks();
        for b in walker.by_ref() {
            b?;
        }
        let end = walker.offset();
        self.blocks.splice(end..end, block.iter().copied());
        Ok(id)
    }

    /// Replace the block stored for `image_id`
    ///
    /// Only ids stored by an image block are settable; duplicates and ids
    /// inside skip runs are not.
    pub fn replace_block(&mut self, image_id: u16, replacement: &[u8]) -> Result<()> {
        let target = self
            .blocks()
            .map_while(|b| b.ok())
            .find(|b| b.first_id == image_id && b.id_count() > 0)
            .ok_or(HiiError::NotFound)?;
        if !matches!(
            target.body,
            ImageBody::Indexed { .. } | ImageBody::Rgb { .. } | ImageBody::Encoded { .. }
        ) {
            return Err(HiiError::NotFound);
        }
        let (offset, len) = (target.offset, target.len);
        if self.len() - len + replacement.len() > MAX_UINT24 {
            return Err(HiiError::OutOfResources);
        }
        self.blocks.splice(offset..offset + len, replacement.iter().copied());
        Ok(())
    }

    /// Decode `image_id`, following duplicates
    pub fn get_image(&self, image_id: u16, decoders: &dyn DecoderRegistry) -> Result<Image> {
        if image_id == 0 {
            return Err(HiiError::InvalidInput);
        }
        let (offset, _) = self.index()?.resolve(image_id)?;
        let block = block::parse_block(&self.blocks, offset, image_id)?;
        let transparent = block.is_transparent();

        let mut image = match block.body {
            ImageBody::Indexed {
                bits,
                palette_index,
                width,
                height,
                data,
            } => {
                let palette = self.palette.as_ref().ok_or(HiiError::NotFound)?;
                let colors = palette.colors(palette_index)?;
                let bitmap = match bits {
                    1 => expand_1bit(width, height, data, &colors)?,
                    4 => expand_4bit(width, height, data, &colors)?,
                    _ => expand_8bit(width, height, data, &colors)?,
                };
                Image::new(width, height, bitmap)?
            }
            ImageBody::Rgb { width, height, data } => {
                Image::new(width, height, expand_24bit(width, height, data)?)?
            }
            ImageBody::Encoded { data, .. } => match decoders.find_decoder(block.tag) {
                Some(decoder) => decoder.decode(data)?,
                None => {
                    log::warn!("hii: no decoder for image block {:#04x}", block.tag);
                    return Err(HiiError::Unsupported);
                }
            },
            _ => return Err(HiiError::NotFound),
        };

        if transparent {
            image.flags |= IMAGE_TRANSPARENT;
        }
        Ok(image)
    }
}
