//! Font packages and the per-glyph cell cache
//!
//! On insert every glyph block is walked once to collect the default cells
//! (package header cell plus `DEFAULTS` blocks), the baseline and the overall
//! height. Glyph lookup follows `DUPLICATE` blocks back to their source.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{HiiError, Result};
use crate::image::block::bitmap_len_1bit;
use crate::stream::{ucs2_to_string, Cursor};
use crate::types::{PackageHeader, PackageType, PACKAGE_HEADER_SIZE};

pub const GIBT_END: u8 = 0x00;
pub const GIBT_GLYPH: u8 = 0x10;
pub const GIBT_GLYPHS: u8 = 0x11;
pub const GIBT_GLYPH_DEFAULT: u8 = 0x12;
pub const GIBT_GLYPHS_DEFAULT: u8 = 0x13;
pub const GIBT_DUPLICATE: u8 = 0x20;
pub const GIBT_SKIP2: u8 = 0x21;
pub const GIBT_SKIP1: u8 = 0x22;
pub const GIBT_DEFAULTS: u8 = 0x23;
pub const GIBT_EXT1: u8 = 0x30;
pub const GIBT_EXT2: u8 = 0x31;
pub const GIBT_EXT4: u8 = 0x32;

/// Offset of the cell inside the font package header
const HEADER_CELL_OFFSET: usize = 12;

/// Glyph metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphCell {
    pub width: u16,
    pub height: u16,
    pub offset_x: i16,
    pub offset_y: i16,
    pub advance_x: i16,
}

impl GlyphCell {
    pub const SIZE: usize = 10;

    fn read(cursor: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            width: cursor.read_u16()?,
            height: cursor.read_u16()?,
            offset_x: cursor.read_i16()?,
            offset_y: cursor.read_i16()?,
            advance_x: cursor.read_i16()?,
        })
    }

    fn bitmap_len(&self) -> usize {
        bitmap_len_1bit(self.width, self.height)
    }
}

/// Identity of a font across the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontInfo {
    pub name: String,
    pub size: u16,
    pub style: u32,
}

/// Located glyph: metrics plus its 1-bit bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph<'a> {
    pub cell: GlyphCell,
    pub bitmap: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct FontPackage {
    raw: Vec<u8>,
    glyph_offset: usize,
    info: FontInfo,
    /// Default cells keyed by the first character they apply to
    default_cells: BTreeMap<u16, GlyphCell>,
    baseline: u16,
    height: u16,
}

impl FontPackage {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = PackageHeader::parse(bytes)?;
        if header.package_type != PackageType::Fonts.as_u8() || header.length as usize != bytes.len() {
            return Err(HiiError::InvalidInput);
        }
        let mut cursor = Cursor::at(bytes, PACKAGE_HEADER_SIZE)?;
        let _hdr_size = cursor.read_u32()?;
        let glyph_offset = cursor.read_u32()? as usize;
        let cell = GlyphCell::read(&mut cursor)?;
        let style = cursor.read_u32()?;
        let name = ucs2_to_string(cursor.read_ucs2_z()?);
        if glyph_offset > bytes.len() {
            return Err(HiiError::InvalidInput);
        }

        let mut package = Self {
            raw: bytes.to_vec(),
            glyph_offset,
            info: FontInfo {
                name,
                size: cell.height,
                style,
            },
            default_cells: BTreeMap::new(),
            baseline: 0,
            height: 0,
        };
        package.collect_cells()?;
        Ok(package)
    }

    pub fn info(&self) -> &FontInfo {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn baseline(&self) -> u16 {
        self.baseline
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    fn glyph_blocks(&self) -> &[u8] {
        &self.raw[self.glyph_offset..]
    }

    /// Default cell in effect for `ch`
    pub fn default_cell(&self, ch: u16) -> Result<GlyphCell> {
        cell_for(&self.default_cells, ch)
    }

    fn collect_cells(&mut self) -> Result<()> {
        let mut cells = BTreeMap::new();
        let mut cursor = Cursor::at(&self.raw, HEADER_CELL_OFFSET)?;
        cells.insert(0, GlyphCell::read(&mut cursor)?);

        let mut baseline: i32 = 0;
        let mut min_offset_y: i32 = 0;
        let mut track = |cell: &GlyphCell| {
            baseline = baseline.max(cell.height as i32 + cell.offset_y as i32);
            min_offset_y = min_offset_y.min(cell.offset_y as i32);
        };

        let mut cursor = Cursor::new(&self.raw[self.glyph_offset..]);
        let mut current: u16 = 1;
        loop {
            let tag = cursor.read_u8()?;
            match tag {
                GIBT_END => break,
                GIBT_DEFAULTS => {
                    let cell = GlyphCell::read(&mut cursor)?;
                    cells.insert(current, cell);
                    track(&cell);
                }
                GIBT_DUPLICATE => {
                    cursor.read_u16()?;
                    current = current.wrapping_add(1);
                }
                GIBT_GLYPH => {
                    let cell = GlyphCell::read(&mut cursor)?;
                    track(&cell);
                    cursor.skip(cell.bitmap_len())?;
                    current = current.wrapping_add(1);
                }
                GIBT_GLYPHS => {
                    let cell = GlyphCell::read(&mut cursor)?;
                    let count = cursor.read_u16()?;
                    track(&cell);
                    cursor.skip(cell.bitmap_len() * count as usize)?;
                    current = current.wrapping_add(count);
                }
                GIBT_GLYPH_DEFAULT => {
                    let cell = cell_for(&cells, current)?;
                    track(&cell);
                    cursor.skip(cell.bitmap_len())?;
                    current = current.wrapping_add(1);
                }
                GIBT_GLYPHS_DEFAULT => {
                    let count = cursor.read_u16()?;
                    let cell = cell_for(&cells, current)?;
                    track(&cell);
                    cursor.skip(cell.bitmap_len() * count as usize)?;
                    current = current.wrapping_add(count);
                }
                GIBT_SKIP1 => current = current.wrapping_add(cursor.read_u8()? as u16),
                GIBT_SKIP2 => current = current.wrapping_add(cursor.read_u16()?),
                GIBT_EXT1 | GIBT_EXT2 | GIBT_EXT4 => skip_ext(&mut cursor, tag)?,
                _ => {
                    log::warn!("hii: unsupported glyph block {:#04x}", tag);
                    return Err(HiiError::InvalidFormat);
                }
            }
        }

        self.default_cells = cells;
        self.baseline = baseline.max(0) as u16;
        self.height = (baseline - min_offset_y).max(0) as u16;
        Ok(())
    }

    /// Locate the glyph for `ch`
    pub fn find_glyph(&self, ch: u16) -> Result<Glyph<'_>> {
        let blocks = self.glyph_blocks();
        let mut target = ch;
        let mut restarts = 0;

        'restart: loop {
            let mut cursor = Cursor::new(blocks);
            let mut current: u16 = 1;
            loop {
                let tag = cursor.read_u8()?;
                match tag {
                    GIBT_END => return Err(HiiError::NotFound),
                    GIBT_DEFAULTS => cursor.skip(GlyphCell::SIZE)?,
                    GIBT_DUPLICATE => {
                        let source = cursor.read_u16()?;
                        if current == target {
                            // A duplicate chain longer than the glyph count is a cycle
                            restarts += 1;
                            if restarts > blocks.len() {
                                return Err(HiiError::InvalidFormat);
                            }
                            target = source;
                            continue 'restart;
                        }
                        current = current.wrapping_add(1);
                    }
                    GIBT_GLYPH => {
                        let cell = GlyphCell::read(&mut cursor)?;
                        let bitmap = cursor.read_bytes(cell.bitmap_len())?;
                        if current == target {
                            return Ok(Glyph { cell, bitmap });
                        }
                        current = current.wrapping_add(1);
                    }
                    GIBT_GLYPHS | GIBT_GLYPHS_DEFAULT => {
                        let (cell, count) = if tag == GIBT_GLYPHS {
                            let cell = GlyphCell::read(&mut cursor)?;
                            (cell, cursor.read_u16()?)
                        } else {
                            let count = cursor.read_u16()?;
                            (self.default_cell(current)?, count)
                        };
                        for index in 0..count {
                            let bitmap = cursor.read_bytes(cell.bitmap_len())?;
                            if current.wrapping_add(index) == target {
                                return Ok(Glyph { cell, bitmap });
                            }
                        }
                        current = current.wrapping_add(count);
                    }
                    GIBT_GLYPH_DEFAULT => {
                        let cell = self.default_cell(current)?;
                        let bitmap = cursor.read_bytes(cell.bitmap_len())?;
                        if current == target {
                            return Ok(Glyph { cell, bitmap });
                        }
                        current = current.wrapping_add(1);
                    }
                    GIBT_SKIP1 => current = current.wrapping_add(cursor.read_u8()? as u16),
                    GIBT_SKIP2 => current = current.wrapping_add(cursor.read_u16()?),
                    GIBT_EXT1 | GIBT_EXT2 | GIBT_EXT4 => skip_ext(&mut cursor, tag)?,
                    _ => return Err(HiiError::InvalidFormat),
                }
                if target < current {
                    return Err(HiiError::NotFound);
                }
            }
        }
    }
}

/// Closest default cell declared at or before `ch`
fn cell_for(cells: &BTreeMap<u16, GlyphCell>, ch: u16) -> Result<GlyphCell> {
    cells
        .range(..=ch)
        .next_back()
        .map(|(_, cell)| *cell)
        .ok_or(HiiError::NotFound)
}

/// Extension lengths count from the tag byte
fn skip_ext(cursor: &mut Cursor<'_>, tag: u8) -> Result<()> {
    let start = cursor.position() - 1;
    cursor.read_u8()?;
    let len = match tag {
        GIBT_EXT1 => cursor.read_u8()? as usize,
        GIBT_EXT2 => cursor.read_u16()? as usize,
        _ => cursor.read_u32()? as usize,
    };
    let consumed = cursor.position() - start;
    if len < consumed {
        return Err(HiiError::InvalidFormat);
    }
    cursor.skip(len - consumed)
}
