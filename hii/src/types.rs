//! Core HII wire types: package headers, package kinds, handles

use alloc::vec::Vec;
use core::fmt;
use uguid::Guid;

use crate::error::{HiiError, Result};
use crate::stream::Cursor;

/// Size of a package header on the wire
pub const PACKAGE_HEADER_SIZE: usize = 4;

/// Size of a package-list header (GUID + u32 length)
pub const PACKAGE_LIST_HEADER_SIZE: usize = 20;

/// Largest value a package's 24-bit length field can hold
pub const MAX_UINT24: usize = 0x00FF_FFFF;

/// One past the largest string or image id
pub const ID_SPACE_END: u32 = 0x1_0000;

/// Package type tag carried in the high byte of every package header
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PackageType {
    /// Filter value matching every type; never stored
    All = 0x00,
    Guid = 0x01,
    Forms = 0x02,
    Strings = 0x04,
    Fonts = 0x05,
    Images = 0x06,
    SimpleFonts = 0x07,
    DevicePath = 0x08,
    KeyboardLayout = 0x09,
    Animations = 0x0A,
    End = 0xDF,
}

impl PackageType {
    /// First type value reserved for system packages
    pub const SYSTEM_BEGIN: u8 = 0xE0;

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::All),
            0x01 => Some(Self::Guid),
            0x02 => Some(Self::Forms),
            0x04 => Some(Self::Strings),
            0x05 => Some(Self::Fonts),
            0x06 => Some(Self::Images),
            0x07 => Some(Self::SimpleFonts),
            0x08 => Some(Self::DevicePath),
            0x09 => Some(Self::KeyboardLayout),
            0x0A => Some(Self::Animations),
            0xDF => Some(Self::End),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Stored package kinds
///
/// Every dispatch point (insert, remove, export, notify) matches this enum
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Guid,
    Form,
    String,
    Font,
    Image,
    SimpleFont,
    KeyboardLayout,
    DevicePath,
}

impl PackageKind {
    /// Order used both for export and for the removal cascade
    pub const ORDER: [PackageKind; 8] = [
        PackageKind::Guid,
        PackageKind::Form,
        PackageKind::KeyboardLayout,
        PackageKind::String,
        PackageKind::Font,
        PackageKind::Image,
        PackageKind::SimpleFont,
        PackageKind::DevicePath,
    ];

    pub const fn package_type(self) -> PackageType {
        match self {
            Self::Guid => PackageType::Guid,
            Self::Form => PackageType::Forms,
            Self::String => PackageType::Strings,
            Self::Font => PackageType::Fonts,
            Self::Image => PackageType::Images,
            Self::SimpleFont => PackageType::SimpleFonts,
            Self::KeyboardLayout => PackageType::KeyboardLayout,
            Self::DevicePath => PackageType::DevicePath,
        }
    }

    /// Kind stored for a wire type, `None` for types that are skipped
    pub fn from_type(package_type: PackageType) -> Option<Self> {
        match package_type {
            PackageType::Guid => Some(Self::Guid),
            PackageType::Forms => Some(Self::Form),
            PackageType::Strings => Some(Self::String),
            PackageType::Fonts => Some(Self::Font),
            PackageType::Images => Some(Self::Image),
            PackageType::SimpleFonts => Some(Self::SimpleFont),
            PackageType::KeyboardLayout => Some(Self::KeyboardLayout),
            PackageType::DevicePath => Some(Self::DevicePath),
            PackageType::All | PackageType::Animations | PackageType::End => None,
        }
    }
}

/// Decoded package header: 24-bit length plus 8-bit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageHeader {
    pub length: u32,
    pub package_type: u8,
}

impl PackageHeader {
    pub fn new(length: usize, package_type: PackageType) -> Result<Self> {
        if length > MAX_UINT24 {
            return Err(HiiError::OutOfResources);
        }
        Ok(Self {
            length: length as u32,
            package_type: package_type.as_u8(),
        })
    }

    pub fn from_u32(raw: u32) -> Self {
        Self {
            length: raw & 0x00FF_FFFF,
            package_type: (raw >> 24) as u8,
        }
    }

    pub fn to_u32(self) -> u32 {
        (self.length & 0x00FF_FFFF) | ((self.package_type as u32) << 24)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Self::from_u32(Cursor::new(data).read_u32()?))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.to_u32().to_le_bytes()
    }

    pub fn kind(&self) -> Option<PackageType> {
        PackageType::from_u8(self.package_type)
    }
}

/// Opaque identifier of a registered package list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HiiHandle(pub(crate) u32);

impl HiiHandle {
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HiiHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hii#{}", self.0)
    }
}

/// Caller-owned handle identifying the driver that registered a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DriverHandle(pub u64);

/// Parsed package-list payload: list GUID plus borrowed package slices
#[derive(Debug, Clone)]
pub struct PackageListRef<'a> {
    pub guid: Guid,
    pub declared_length: u32,
    /// Each package including its 4-byte header, END excluded
    pub packages: Vec<&'a [u8]>,
}

impl<'a> PackageListRef<'a> {
    /// Split a package-list buffer into its packages
    ///
    /// The walk stops at the END package; a package whose declared length
    /// is shorter than its header or runs past the buffer is rejected.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let guid = cursor.read_guid()?;
        let declared_length = cursor.read_u32()?;
        let limit = (declared_length as usize).min(data.len());
        if limit < PACKAGE_LIST_HEADER_SIZE {
            return Err(HiiError::InvalidInput);
        }

        let mut packages = Vec::new();
        loop {
            if cursor.position() + PACKAGE_HEADER_SIZE > limit {
                // Missing END header
                return Err(HiiError::InvalidInput);
            }
            let start = cursor.position();
            let header = PackageHeader::from_u32(cursor.read_u32()?);
            if header.package_type == PackageType::End.as_u8() {
                break;
            }
            let len = header.length as usize;
            if len < PACKAGE_HEADER_SIZE || start + len > limit {
                return Err(HiiError::InvalidInput);
            }
            cursor.skip(len - PACKAGE_HEADER_SIZE)?;
            packages.push(&data[start..start + len]);
        }

        Ok(Self {
            guid,
            declared_length,
            packages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_header_packs_length_and_type() {
        let header = PackageHeader::new(0x1234, PackageType::Strings).unwrap();
        assert_eq!(header.to_u32(), 0x0400_1234);
        assert_eq!(PackageHeader::from_u32(0x0400_1234), header);
        assert_eq!(header.kind(), Some(PackageType::Strings));
    }

    #[test]
    fn test_header_rejects_oversized_length() {
        assert_eq!(
            PackageHeader::new(MAX_UINT24 + 1, PackageType::Images),
            Err(HiiError::OutOfResources)
        );
    }

    #[test]
    fn test_parse_list_splits_packages() {
        let mut data = vec![0u8; 16];
        data.extend_from_slice(&(20u32 + 6 + 4).to_le_bytes());
        data.extend_from_slice(&PackageHeader::new(6, PackageType::Forms).unwrap().to_bytes());
        data.extend_from_slice(&[0xAA, 0xBB]);
        data.extend_from_slice(&PackageHeader::new(4, PackageType::End).unwrap().to_bytes());

        let list = PackageListRef::parse(&data).unwrap();
        assert_eq!(list.packages.len(), 1);
        assert_eq!(list.packages[0].len(), 6);
    }

    #[test]
    fn test_parse_list_requires_end() {
        let mut data = vec![0u8; 16];
        data.extend_from_slice(&26u32.to_le_bytes());
        data.extend_from_slice(&PackageHeader::new(6, PackageType::Forms).unwrap().to_bytes());
        data.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(PackageListRef::parse(&data).unwrap_err(), HiiError::InvalidInput);
    }
}
