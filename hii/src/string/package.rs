//! String package storage and mutation

use alloc::string::String;
use alloc::vec::Vec;

use super::block::{
    encode_skip, encode_ucs2, BlockBody, RawText, StringBlocks, StringFont,
    SIBT_END, SIBT_SKIP2, SIBT_STRINGS_SCSU_FONT, SIBT_STRINGS_UCS2, SIBT_STRINGS_UCS2_FONT,
};
use crate::error::{HiiError, Result};
use crate::index::IdIndex;
use crate::stream::{put_u16, put_u32, set_u32_at, Cursor};
use crate::types::{PackageHeader, PackageType, MAX_UINT24, PACKAGE_HEADER_SIZE};

/// Fixed part of the string package header, language excluded
pub const STRING_HEADER_FIXED_SIZE: usize = 46;

/// Default language window written into packages created at runtime
const LANGUAGE_WINDOW: [u16; 16] = [
    0x0000, 0x0080, 0x0100, 0x0300, 0x2000, 0x2080, 0x2100, 0x3000, 0x0080, 0x00C0, 0x0400,
    0x0600, 0x0900, 0x3040, 0x30A0, 0xFF00,
];

/// One string package: header bytes, language, block stream
#[derive(Debug, Clone)]
pub struct StringPackage {
    /// `HdrSize` bytes exactly as received, package header included
    header: Vec<u8>,
    language: String,
    /// Block stream, END included
    blocks: Vec<u8>,
    max_string_id: u16,
    fonts: Vec<StringFont>,
}

impl StringPackage {
    /// Parse a complete string package (header included)
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = PackageHeader::parse(bytes)?;
        if header.package_type != PackageType::Strings.as_u8() || header.length as usize != bytes.len() {
            return Err(HiiError::InvalidInput);
        }
        let mut cursor = Cursor::at(bytes, PACKAGE_HEADER_SIZE)?;
        let hdr_size = cursor.read_u32()? as usize;
        if hdr_size <= STRING_HEADER_FIXED_SIZE || hdr_size > bytes.len() {
            return Err(HiiError::InvalidInput);
        }

        let mut lang = Cursor::at(&bytes[..hdr_size], STRING_HEADER_FIXED_SIZE)?;
        let language = core::str::from_utf8(lang.read_ascii_z()?)
            .map_err(|_| HiiError::InvalidInput)?
            .into();

        let mut package = Self {
            header: bytes[..hdr_size].to_vec(),
            language,
            blocks: bytes[hdr_size..].to_vec(),
            max_string_id: 0,
            fonts: Vec::new(),
        };
        package.refresh()?;
        Ok(package)
    }

    /// Build a package for `language` whose id 1 is `language_name` and
    /// whose ids `2..first_free_id` are blank entries
    pub fn create(language: &str, language_name: &str, first_free_id: u16) -> Result<Self> {
        let hdr_size = STRING_HEADER_FIXED_SIZE + language.len() + 1;
        let mut header = Vec::with_capacity(hdr_size);
        put_u32(&mut header, 0);
        put_u32(&mut header, hdr_size as u32);
        put_u32(&mut header, hdr_size as u32);
        for unit in LANGUAGE_WINDOW {
            put_u16(&mut header, unit);
        }
        put_u16(&mut header, 1);
        header.extend_from_slice(language.as_bytes());
        header.push(0);

        let mut blocks = encode_ucs2(language_name, None);
        for _ in 2..first_free_id {
            blocks.extend_from_slice(&encode_ucs2("", None));
        }
        blocks.push(SIBT_END);

        let mut package = Self {
            header,
            language: language.into(),
            blocks,
            max_string_id: 0,
            fonts: Vec::new(),
        };
        package.refresh()?;
        package.check_length()?;
        Ok(package)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn max_string_id(&self) -> u16 {
        self.max_string_id
    }

    /// Fonts declared by EXT2/FONT blocks in this package
    pub fn fonts(&self) -> &[StringFont] {
        &self.fonts
    }

    /// Total package length on the wire
    pub fn len(&self) -> usize {
        self.header.len() + self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn blocks(&self) -> StringBlocks<'_> {
        StringBlocks::new(&self.blocks)
    }

    /// Write header and blocks with the current length
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        out.extend_from_slice(&self.header);
        let header = PackageHeader::new(self.len(), PackageType::Strings)?;
        set_u32_at(out, start, header.to_u32())?;
        out.extend_from_slice(&self.blocks);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Re-walk the stream for the max id and font table
    fn refresh(&mut self) -> Result<()> {
        let mut fonts = Vec::new();
        let mut walker = StringBlocks::new(&self.blocks);
        for block in walker.by_ref() {
            if let BlockBody::Font(font) = block?.body {
                fonts.push(font);
            }
        }
        if self.blocks.get(walker.offset()) != Some(&SIBT_END) {
            return Err(HiiError::InvalidFormat);
        }
        self.max_string_id =
            u16::try_from(walker.next_id() - 1).map_err(|_| HiiError::InvalidFormat)?;
        self.fonts = fonts;
        Ok(())
    }

    fn check_length(&self) -> Result<()> {
        if self.len() > MAX_UINT24 {
            return Err(HiiError::OutOfResources);
        }
        Ok(())
    }

    fn end_offset(&self) -> usize {
        self.blocks.len() - 1
    }

    /// Insert `block` in front of the END block
    pub fn append_block(&mut self, block: &[u8]) -> Result<()> {
        if self.len() + block.len() > MAX_UINT24 {
            return Err(HiiError::OutOfResources);
        }
        let end = self.end_offset();
        self.blocks.splice(end..end, block.iter().copied());
        if let Err(err) = self.refresh() {
            self.blocks.drain(end..end + block.len());
            return Err(err);
        }
        Ok(())
    }

    /// Append a SKIP2 block so this package reports `max_id`
    pub fn pad_to(&mut self, max_id: u16) -> Result<()> {
        if self.max_string_id >= max_id {
            return Ok(());
        }
        let [lo, hi] = (max_id - self.max_string_id).to_le_bytes();
        self.append_block(&[SIBT_SKIP2, lo, hi])
    }

    /// Append `text`, reusing or declaring `font` as needed; returns the new id
    pub fn append_string(&mut self, text: &str, font: Option<&StringFont>) -> Result<u16> {
        let mut block = Vec::new();
        let font_id = match font {
            Some(font) => Some(match self.find_font(font) {
                Some(id) => id,
                None => {
                    let id = self.next_font_id()?;
                    let declared = StringFont {
                        font_id: id,
                        ..font.clone()
                    };
                    block.extend_from_slice(&declared.encode()?);
                    id
                }
            }),
            None => None,
        };
        block.extend_from_slice(&encode_ucs2(text, font_id));
        self.append_block(&block)?;
        Ok(self.max_string_id)
    }

    /// Font id of a declared font with the same size, style and name
    pub fn find_font(&self, font: &StringFont) -> Option<u8> {
        self.fonts
            .iter()
            .find(|f| f.size == font.size && f.style == font.style && f.name == font.name)
            .map(|f| f.font_id)
    }

    fn next_font_id(&self) -> Result<u8> {
        match self.fonts.iter().map(|f| f.font_id).max() {
            None => Ok(0),
            Some(last) => last.checked_add(1).ok_or(HiiError::OutOfResources),
        }
    }

    /// First id whose text equals `text`
    ///
    /// Narrow text is widened before comparison. Duplicate blocks consume an
    /// id, skip blocks advance by their count, extension blocks consume none.
    pub fn find_id_by_text(&self, text: &str) -> Result<u16> {
        for block in self.blocks() {
            let block = block?;
            if let BlockBody::Text { strings, .. } = &block.body {
                for (index, entry) in strings.iter().enumerate() {
                    if entry.matches(text) {
                        return Ok(block.first_id + index as u16);
                    }
                }
            }
        }
        Err(HiiError::NotFound)
    }

    /// Enumeration step used to walk every keyword of a package
    ///
    /// The walk marks `string_id` as found when it reaches the text entry
    /// carrying that id, then returns the id and text of the next text entry.
    /// A single UCS-2 entry whose text is empty reserves an id for another
    /// language and is passed over. Enumeration starts at id 1, so the
    /// package's language-name string is never returned. `None` marks the
    /// end of the stream.
    pub fn next_string(&self, string_id: u16) -> Option<(u16, String)> {
        let mut found = false;
        for block in self.blocks() {
            let block = block.ok()?;
            let BlockBody::Text { strings, .. } = &block.body else {
                continue;
            };
            let single_ucs2 = block.tag == super::block::SIBT_STRING_UCS2;
            for (index, entry) in strings.iter().enumerate() {
                let current = block.first_id + index as u16;
                if found && !(single_ucs2 && entry.is_empty()) {
                    return Some((current, entry.to_text()));
                } else if current == string_id {
                    found = true;
                }
            }
        }
        None
    }

    /// Id table over the current stream
    pub fn index(&self) -> Result<IdIndex> {
        let mut index = IdIndex::new();
        for block in self.blocks() {
            let block = block?;
            match &block.body {
                BlockBody::Text { strings, .. } => {
                    for entry in 0..strings.len() {
                        index.insert_stored(block.first_id + entry as u16, block.offset, entry);
                    }
                }
                BlockBody::Duplicate(target) => index.insert_alias(block.first_id, *target),
                BlockBody::Skip(_) | BlockBody::Font(_) | BlockBody::Ext | BlockBody::End => {}
            }
        }
        Ok(index)
    }

    /// Locate the text entry for `string_id`, following duplicate aliases
    pub fn get_string(&self, string_id: u16) -> Result<(String, Option<StringFont>)> {
        let (offset, entry) = self.index()?.resolve(string_id)?;
        let block = super::block::parse_block(&self.blocks, offset, string_id)?;
        let BlockBody::Text { font_id, strings } = &block.body else {
            return Err(HiiError::NotFound);
        };
        let font = font_id.and_then(|id| self.fonts.iter().find(|f| f.font_id == id).cloned());
        Ok((strings[entry].to_text(), font))
    }

    /// Replace the text of `string_id`
    ///
    /// An id inside a multi-string or skip block splits that block so the
    /// entry becomes a standalone UCS-2 block.
    pub fn set_string(&mut self, string_id: u16, text: &str, font: Option<&StringFont>) -> Result<()> {
        if string_id == 0 || string_id > self.max_string_id {
            return Err(HiiError::NotFound);
        }

        let mut prefix_font = Vec::new();
        let font_id = match font {
            Some(font) => Some(match self.find_font(font) {
                Some(id) => id,
                None => {
                    let id = self.next_font_id()?;
                    prefix_font = StringFont {
                        font_id: id,
                        ..font.clone()
                    }
                    .encode()?;
                    id
                }
            }),
            None => None,
        };

        let target = self
            .blocks()
            .filter_map(|b| b.ok())
            .find(|b| {
                let first = u32::from(b.first_id);
                let id = u32::from(string_id);
                b.id_count() > 0 && id >= first && id < first + u32::from(b.id_count())
            })
            .ok_or(HiiError::NotFound)?;

        let mut replacement = prefix_font;
        let position = (string_id - target.first_id) as usize;
        match &target.body {
            BlockBody::Text { font_id: old_font, strings } => {
                let keep_font = font_id.or(*old_font);
                if strings.len() == 1 {
                    replacement.extend_from_slice(&encode_ucs2(text, keep_font));
                } else {
                    if position > 0 {
                        replacement.extend(encode_run(target.tag, *old_font, &strings[..position]));
                    }
                    replacement.extend_from_slice(&encode_ucs2(text, keep_font));
                    if position + 1 < strings.len() {
                        replacement.extend(encode_run(target.tag, *old_font, &strings[position + 1..]));
                    }
                }
            }
            BlockBody::Duplicate(_) => {
                replacement.extend_from_slice(&encode_ucs2(text, font_id));
            }
            BlockBody::Skip(count) => {
                if position > 0 {
                    replacement.extend_from_slice(&encode_skip(position as u16));
                }
                replacement.extend_from_slice(&encode_ucs2(text, font_id));
                let after = *count as usize - position - 1;
                if after > 0 {
                    replacement.extend_from_slice(&encode_skip(after as u16));
                }
            }
            BlockBody::Font(_) | BlockBody::Ext | BlockBody::End => return Err(HiiError::NotFound),
        }

        let new_len = self.len() - target.len + replacement.len();
        if new_len > MAX_UINT24 {
            return Err(HiiError::OutOfResources);
        }
        let range = target.offset..target.offset + target.len;
        self.blocks.splice(range, replacement);
        self.refresh()
    }
}

/// Re-encode a run of strings with the tag family of a multi-string block
fn encode_run(tag: u8, font_id: Option<u8>, strings: &[RawText<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(tag);
    if matches!(tag, SIBT_STRINGS_SCSU_FONT | SIBT_STRINGS_UCS2_FONT) {
        out.push(font_id.unwrap_or(0));
    }
    put_u16(&mut out, strings.len() as u16);
    for entry in strings {
        match entry {
            RawText::Narrow(raw) => {
                out.extend_from_slice(raw);
                out.push(0);
            }
            RawText::Wide(raw) => {
                out.extend_from_slice(raw);
                out.extend_from_slice(&[0, 0]);
            }
        }
    }
    debug_assert!(matches!(
        tag,
        super::block::SIBT_STRINGS_SCSU | SIBT_STRINGS_SCSU_FONT | SIBT_STRINGS_UCS2 | SIBT_STRINGS_UCS2_FONT
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::block::{SIBT_DUPLICATE, SIBT_EXT1, SIBT_STRINGS_SCSU, SIBT_STRING_SCSU};
    use alloc::vec;

    fn package_bytes(language: &str, blocks: &[u8]) -> Vec<u8> {
        let mut package = StringPackage::create(language, "Lang", 2).unwrap();
        package.blocks = blocks.to_vec();
        package.refresh().unwrap();
        package.to_bytes().unwrap()
    }

    #[test]
    fn test_create_reserves_language_name() {
        let package = StringPackage::create("en-US", "English", 3).unwrap();
        assert_eq!(package.max_string_id(), 2);
        assert_eq!(package.get_string(1).unwrap().0, "English");
        assert_eq!(package.get_string(2).unwrap().0, "");

        let reparsed = StringPackage::parse(&package.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed.language(), "en-US");
        assert_eq!(reparsed.len(), package.len());
    }

    #[test]
    fn test_find_by_text_counts_duplicates_and_skips() {
        let mut blocks = encode_ucs2("English", None);
        blocks.extend_from_slice(&[SIBT_DUPLICATE, 1, 0]);
        blocks.extend_from_slice(&encode_skip(4));
        blocks.extend_from_slice(&[SIBT_STRING_SCSU]);
        blocks.extend_from_slice(b"Target\0");
        blocks.push(SIBT_END);
        let package = StringPackage::parse(&package_bytes("en-US", &blocks)).unwrap();

        assert_eq!(package.find_id_by_text("Target").unwrap(), 7);
        assert_eq!(package.find_id_by_text("Missing"), Err(HiiError::NotFound));
        assert_eq!(package.max_string_id(), 7);
    }

    #[test]
    fn test_duplicate_resolves_to_alias() {
        let mut blocks = encode_ucs2("English", None);
        blocks.extend_from_slice(&encode_ucs2("Hello", None));
        blocks.extend_from_slice(&[SIBT_DUPLICATE, 2, 0]);
        blocks.push(SIBT_END);
        let package = StringPackage::parse(&package_bytes("en-US", &blocks)).unwrap();
        assert_eq!(package.get_string(3).unwrap().0, "Hello");
    }

    #[test]
    fn test_set_string_splits_multi_block() {
        let mut blocks = encode_ucs2("English", None);
        blocks.extend_from_slice(&[SIBT_STRINGS_SCSU, 3, 0]);
        blocks.extend_from_slice(b"a\0b\0c\0");
        blocks.push(SIBT_END);
        let mut package = StringPackage::parse(&package_bytes("en-US", &blocks)).unwrap();

        package.set_string(3, "middle", None).unwrap();
        let texts: Vec<_> = (1..=4).map(|id| package.get_string(id).unwrap().0).collect();
        assert_eq!(texts, vec!["English", "a", "middle", "c"]);
        assert_eq!(package.max_string_id(), 4);
    }

    #[test]
    fn test_set_string_materialises_skip() {
        let mut blocks = encode_ucs2("English", None);
        blocks.extend_from_slice(&encode_skip(3));
        blocks.push(SIBT_END);
        let mut package = StringPackage::parse(&package_bytes("en-US", &blocks)).unwrap();

        assert_eq!(package.get_string(3), Err(HiiError::NotFound));
        package.set_string(3, "filled", None).unwrap();
        assert_eq!(package.get_string(3).unwrap().0, "filled");
        assert_eq!(package.get_string(2), Err(HiiError::NotFound));
        assert_eq!(package.max_string_id(), 4);
    }

    #[test]
    fn test_append_with_font_declares_once() {
        let mut package = StringPackage::create("en-US", "English", 2).unwrap();
        let font = StringFont {
            font_id: 0,
            size: 19,
            style: 0,
            name: "sys".into(),
        };
        let first = package.append_string("x", Some(&font)).unwrap();
        let second = package.append_string("y", Some(&font)).unwrap();
        assert_eq!((first, second), (2, 3));
        assert_eq!(package.fonts().len(), 1);
        assert_eq!(package.get_string(3).unwrap().1.unwrap().name, "sys");
    }

    #[test]
    fn test_full_id_space_parses() {
        let mut package = StringPackage::create("en-US", "English", 2).unwrap();
        package.append_block(&encode_skip(0xFFFE)).unwrap();
        let package = StringPackage::parse(&package.to_bytes().unwrap()).unwrap();
        assert_eq!(package.max_string_id(), 0xFFFF);
        assert_eq!(package.get_string(0xFFFF), Err(HiiError::NotFound));

        let mut full = package.clone();
        assert_eq!(full.append_string("x", None), Err(HiiError::InvalidFormat));
        assert_eq!(full.len(), package.len());
        full.set_string(0xFFFF, "last", None).unwrap();
        assert_eq!(full.get_string(0xFFFF).unwrap().0, "last");
        assert_eq!(full.max_string_id(), 0xFFFF);
    }

    #[test]
    fn test_font_ids_exhausted() {
        let mut blocks = encode_ucs2("English", None);
        let font = StringFont {
            font_id: u8::MAX,
            size: 19,
            style: 0,
            name: "sys".into(),
        };
        blocks.extend_from_slice(&font.encode().unwrap());
        blocks.push(SIBT_END);
        let mut package = StringPackage::parse(&package_bytes("en-US", &blocks)).unwrap();
        let other = StringFont {
            name: "mono".into(),
            ..font.clone()
        };
        assert_eq!(package.append_string("x", Some(&other)), Err(HiiError::OutOfResources));
        assert_eq!(package.append_string("y", Some(&font)).unwrap(), 2);
    }

    #[test]
    fn test_next_string_passes_over_blank_entries() {
        let mut blocks = encode_ucs2("English", None);
        blocks.extend_from_slice(&encode_ucs2("A", None));
        blocks.extend_from_slice(&encode_ucs2("", None));
        blocks.extend_from_slice(&encode_ucs2("B", None));
        blocks.push(SIBT_END);
        let package = StringPackage::parse(&package_bytes("en-US", &blocks)).unwrap();
        assert_eq!(package.next_string(1), Some((2, "A".into())));
        assert_eq!(package.next_string(2), Some((4, "B".into())));
        assert_eq!(package.next_string(4), None);
    }

    #[test]
    fn test_next_string_returns_blank_inside_multi_block() {
        let mut blocks = encode_ucs2("English", None);
        blocks.extend_from_slice(&[SIBT_STRINGS_UCS2, 2, 0, 0, 0, b'C', 0, 0, 0]);
        blocks.push(SIBT_END);
        let package = StringPackage::parse(&package_bytes("en-US", &blocks)).unwrap();
        assert_eq!(package.next_string(1), Some((2, String::new())));
        assert_eq!(package.next_string(2), Some((3, "C".into())));
    }

    #[test]
    fn test_mixed_stream_survives_encoding() {
        let font = StringFont {
            font_id: 0,
            size: 19,
            style: 1,
            name: "sys".into(),
        };
        let mut blocks = encode_ucs2("English", None);
        blocks.extend_from_slice(&[SIBT_STRINGS_SCSU, 2, 0]);
        blocks.extend_from_slice(b"a\0b\0");
        blocks.extend_from_slice(&font.encode().unwrap());
        blocks.extend_from_slice(&encode_ucs2("wide", Some(0)));
        blocks.extend_from_slice(&[SIBT_DUPLICATE, 2, 0]);
        blocks.extend_from_slice(&encode_skip(2));
        blocks.extend_from_slice(&[SIBT_EXT1, 0x77, 4, 0xAA]);
        blocks.extend_from_slice(&[SIBT_STRINGS_UCS2, 2, 0, b'x', 0, 0, 0, b'y', 0, 0, 0]);
        blocks.extend_from_slice(&encode_skip(0x100));
        blocks.push(SIBT_STRING_SCSU);
        blocks.extend_from_slice(b"z\0");
        blocks.push(SIBT_END);

        let mut package = StringPackage::parse(&package_bytes("en-US", &blocks)).unwrap();
        package.set_string(3, "B", None).unwrap();
        let reparsed = StringPackage::parse(&package.to_bytes().unwrap()).unwrap();

        let texts = |p: &StringPackage| -> Vec<Result<(String, Option<StringFont>)>> {
            (1..=p.max_string_id()).map(|id| p.get_string(id)).collect()
        };
        let map = texts(&reparsed);
        assert_eq!(map, texts(&package));
        assert_eq!(map.len(), 266);

        let text = |id: usize| map[id - 1].as_ref().map(|(t, _)| t.as_str());
        assert_eq!(text(1), Ok("English"));
        assert_eq!(text(2), Ok("a"));
        assert_eq!(text(3), Ok("B"));
        assert_eq!(map[3], Ok(("wide".into(), Some(font.clone()))));
        assert_eq!(text(5), Ok("a"));
        assert_eq!(text(6), Err(&HiiError::NotFound));
        assert_eq!(text(7), Err(&HiiError::NotFound));
        assert_eq!(text(8), Ok("x"));
        assert_eq!(text(9), Ok("y"));
        assert_eq!(text(200), Err(&HiiError::NotFound));
        assert_eq!(text(266), Ok("z"));
        assert_eq!(reparsed.fonts(), &[font][..]);
    }

    #[test]
    fn test_missing_end_block_is_rejected() {
        let mut package = StringPackage::create("en-US", "English", 2).unwrap();
        package.blocks.pop();
        let bytes = package.to_bytes().unwrap();
        assert!(StringPackage::parse(&bytes).is_err());
    }
}
