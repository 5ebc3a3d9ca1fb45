//! Keyboard layout packages

use alloc::vec::Vec;

use uguid::Guid;

use crate::error::{HiiError, Result};
use crate::stream::{guid_at, u16_at, Cursor};
use crate::types::{PackageHeader, PackageType, PACKAGE_HEADER_SIZE};

/// `{length u16, guid}` prefix of every layout
const LAYOUT_MIN_SIZE: usize = 18;

/// One layout inside a keyboard package, length prefix included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardLayout<'a> {
    pub guid: Guid,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct KeyboardLayoutPackage {
    raw: Vec<u8>,
    /// Offset of each layout inside `raw`
    layouts: Vec<usize>,
}

impl KeyboardLayoutPackage {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = PackageHeader::parse(bytes)?;
        if header.package_type != PackageType::KeyboardLayout.as_u8() || header.length as usize != bytes.len() {
            return Err(HiiError::InvalidInput);
        }
        let mut cursor = Cursor::at(bytes, PACKAGE_HEADER_SIZE)?;
        let count = cursor.read_u16()?;
        let mut layouts = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let start = cursor.position();
            let length = u16_at(bytes, start)? as usize;
            if length < LAYOUT_MIN_SIZE {
                return Err(HiiError::InvalidInput);
            }
            cursor.skip(length)?;
            layouts.push(start);
        }
        Ok(Self {
            raw: bytes.to_vec(),
            layouts,
        })
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn layouts(&self) -> impl Iterator<Item = KeyboardLayout<'_>> + '_ {
        self.layouts.iter().filter_map(move |&start| {
            let length = u16_at(&self.raw, start).ok()? as usize;
            Some(KeyboardLayout {
                guid: guid_at(&self.raw, start + 2).ok()?,
                bytes: self.raw.get(start..start + length)?,
            })
        })
    }

    pub fn find(&self, guid: &Guid) -> Option<KeyboardLayout<'_>> {
        self.layouts().find(|layout| layout.guid == *guid)
    }
}
