//! One registered package list: typed package collections
//!
//! Each package kind lives in its own collection. Images and device paths
//! hold at most one package per list; string packages hold at most one per
//! language. Export and removal walk the kinds in [`PackageKind::ORDER`].

use alloc::vec::Vec;

use uguid::Guid;

use crate::device_path::device_path_size;
use crate::error::{HiiError, Result};
use crate::font::FontPackage;
use crate::form::FormPackage;
use crate::image::ImagePackage;
use crate::keyboard::KeyboardLayoutPackage;
use crate::stream::{guid_at, u16_at};
use crate::string::{compare_language, StringPackage};
use crate::types::{PackageHeader, PackageKind, PackageType, PACKAGE_HEADER_SIZE, PACKAGE_LIST_HEADER_SIZE};

/// Narrow simple-font glyph: weight u16, attributes u8, 19 rows
const NARROW_GLYPH_SIZE: usize = 22;

/// Wide simple-font glyph: narrow layout plus 19 more rows and 3 pad bytes
const WIDE_GLYPH_SIZE: usize = 44;

fn check_header(bytes: &[u8], package_type: PackageType) -> Result<()> {
    let header = PackageHeader::parse(bytes)?;
    if header.package_type != package_type.as_u8() || header.length as usize != bytes.len() {
        return Err(HiiError::InvalidInput);
    }
    Ok(())
}

/// GUID package: header, vendor GUID, opaque data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidPackage {
    guid: Guid,
    raw: Vec<u8>,
}

impl GuidPackage {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        check_header(bytes, PackageType::Guid)?;
        let guid = guid_at(bytes, PACKAGE_HEADER_SIZE).map_err(|_| HiiError::InvalidInput)?;
        Ok(Self {
            guid,
            raw: bytes.to_vec(),
        })
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// Simple font package: narrow and wide glyph arrays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleFontPackage {
    raw: Vec<u8>,
}

impl SimpleFontPackage {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        check_header(bytes, PackageType::SimpleFonts)?;
        let narrow = u16_at(bytes, PACKAGE_HEADER_SIZE).map_err(|_| HiiError::InvalidInput)? as usize;
        let wide = u16_at(bytes, PACKAGE_HEADER_SIZE + 2).map_err(|_| HiiError::InvalidInput)? as usize;
        let needed = PACKAGE_HEADER_SIZE + 4 + narrow * NARROW_GLYPH_SIZE + wide * WIDE_GLYPH_SIZE;
        if needed > bytes.len() {
            return Err(HiiError::InvalidInput);
        }
        Ok(Self { raw: bytes.to_vec() })
    }

    pub fn narrow_glyphs(&self) -> u16 {
        u16::from_le_bytes([self.raw[4], self.raw[5]])
    }

    pub fn wide_glyphs(&self) -> u16 {
        u16::from_le_bytes([self.raw[6], self.raw[7]])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// Device path package: header followed by one device path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePathPackage {
    raw: Vec<u8>,
}

impl DevicePathPackage {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        check_header(bytes, PackageType::DevicePath)?;
        device_path_size(&bytes[PACKAGE_HEADER_SIZE..])?;
        Ok(Self { raw: bytes.to_vec() })
    }

    /// Wrap a bare device path in a package header
    pub fn from_path(path: &[u8]) -> Result<Self> {
        let size = device_path_size(path)?;
        let mut raw = Vec::with_capacity(PACKAGE_HEADER_SIZE + size);
        raw.extend_from_slice(&PackageHeader::new(PACKAGE_HEADER_SIZE + size, PackageType::DevicePath)?.to_bytes());
        raw.extend_from_slice(&path[..size]);
        Ok(Self { raw })
    }

    pub fn path(&self) -> &[u8] {
        &self.raw[PACKAGE_HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// A decoded package ready for insertion
#[derive(Debug, Clone)]
pub enum Package {
    Guid(GuidPackage),
    Form(FormPackage),
    String(StringPackage),
    Font(FontPackage),
    Image(ImagePackage),
    SimpleFont(SimpleFontPackage),
    KeyboardLayout(KeyboardLayoutPackage),
    DevicePath(DevicePathPackage),
}

impl Package {
    /// Decode one package; `None` for types the database does not store
    pub fn parse(bytes: &[u8]) -> Result<Option<Self>> {
        let header = PackageHeader::parse(bytes)?;
        let Some(kind) = header.kind().and_then(PackageKind::from_type) else {
            log::debug!("hii: skipping package type {:#04x}", header.package_type);
            return Ok(None);
        };
        let package = match kind {
            PackageKind::Guid => Self::Guid(GuidPackage::parse(bytes)?),
            PackageKind::Form => Self::Form(FormPackage::parse(bytes)?),
            PackageKind::String => Self::String(StringPackage::parse(bytes)?),
            PackageKind::Font => Self::Font(FontPackage::parse(bytes)?),
            PackageKind::Image => Self::Image(ImagePackage::parse(bytes)?),
            PackageKind::SimpleFont => Self::SimpleFont(SimpleFontPackage::parse(bytes)?),
            PackageKind::KeyboardLayout => Self::KeyboardLayout(KeyboardLayoutPackage::parse(bytes)?),
            PackageKind::DevicePath => Self::DevicePath(DevicePathPackage::parse(bytes)?),
        };
        Ok(Some(package))
    }

    pub fn kind(&self) -> PackageKind {
        match self {
            Self::Guid(_) => PackageKind::Guid,
            Self::Form(_) => PackageKind::Form,
            Self::String(_) => PackageKind::String,
            Self::Font(_) => PackageKind::Font,
            Self::Image(_) => PackageKind::Image,
            Self::SimpleFont(_) => PackageKind::SimpleFont,
            Self::KeyboardLayout(_) => PackageKind::KeyboardLayout,
            Self::DevicePath(_) => PackageKind::DevicePath,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackageList {
    guid: Guid,
    guids: Vec<GuidPackage>,
    forms: Vec<FormPackage>,
    strings: Vec<StringPackage>,
    fonts: Vec<FontPackage>,
    image: Option<ImagePackage>,
    simple_fonts: Vec<SimpleFontPackage>,
    keyboard_layouts: Vec<KeyboardLayoutPackage>,
    device_path: Option<DevicePathPackage>,
}

impl PackageList {
    pub fn new(guid: Guid) -> Self {
        Self {
            guid,
            guids: Vec::new(),
            forms: Vec::new(),
            strings: Vec::new(),
            fonts: Vec::new(),
            image: None,
            simple_fonts: Vec::new(),
            keyboard_layouts: Vec::new(),
            device_path: None,
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn guid_packages(&self) -> &[GuidPackage] {
        &self.guids
    }

    pub fn forms(&self) -> &[FormPackage] {
        &self.forms
    }

    pub fn strings(&self) -> &[StringPackage] {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut Vec<StringPackage> {
        &mut self.strings
    }

    pub fn fonts(&self) -> &[FontPackage] {
        &self.fonts
    }

    pub fn image(&self) -> Option<&ImagePackage> {
        self.image.as_ref()
    }

    pub fn image_mut(&mut self) -> Option<&mut ImagePackage> {
        self.image.as_mut()
    }

    pub fn keyboard_layouts(&self) -> &[KeyboardLayoutPackage] {
        &self.keyboard_layouts
    }

    /// Device path carried by the list's device-path package
    pub fn device_path(&self) -> Option<&[u8]> {
        self.device_path.as_ref().map(|p| p.path())
    }

    /// String package whose language matches `language`
    pub fn find_strings(&self, language: &str) -> Option<usize> {
        self.strings.iter().position(|p| compare_language(p.language(), language))
    }

    pub fn count(&self, kind: PackageKind) -> usize {
        match kind {
            PackageKind::Guid => self.guids.len(),
            PackageKind::Form => self.forms.len(),
            PackageKind::String => self.strings.len(),
            PackageKind::Font => self.fonts.len(),
            PackageKind::Image => self.image.is_some() as usize,
            PackageKind::SimpleFont => self.simple_fonts.len(),
            PackageKind::KeyboardLayout => self.keyboard_layouts.len(),
            PackageKind::DevicePath => self.device_path.is_some() as usize,
        }
    }

    /// Wire bytes of the `index`th package of `kind`
    pub fn encode(&self, kind: PackageKind, index: usize) -> Result<Vec<u8>> {
        let missing = HiiError::NotFound;
        Ok(match kind {
            PackageKind::Guid => self.guids.get(index).ok_or(missing)?.as_bytes().to_vec(),
            PackageKind::Form => self.forms.get(index).ok_or(missing)?.as_bytes().to_vec(),
            PackageKind::String => self.strings.get(index).ok_or(missing)?.to_bytes()?,
            PackageKind::Font => self.fonts.get(index).ok_or(missing)?.as_bytes().to_vec(),
            PackageKind::Image => match (&self.image, index) {
                (Some(image), 0) => image.to_bytes()?,
                _ => return Err(missing),
            },
            PackageKind::SimpleFont => self.simple_fonts.get(index).ok_or(missing)?.as_bytes().to_vec(),
            PackageKind::KeyboardLayout => self.keyboard_layouts.get(index).ok_or(missing)?.as_bytes().to_vec(),
            PackageKind::DevicePath => match (&self.device_path, index) {
                (Some(path), 0) => path.as_bytes().to_vec(),
                _ => return Err(missing),
            },
        })
    }

    fn package_len(&self, kind: PackageKind, index: usize) -> usize {
        match kind {
            PackageKind::Guid => self.guids[index].as_bytes().len(),
            PackageKind::Form => self.forms[index].len(),
            PackageKind::String => self.strings[index].len(),
            PackageKind::Font => self.fonts[index].len(),
            PackageKind::Image => self.image.as_ref().map_or(0, |p| p.len()),
            PackageKind::SimpleFont => self.simple_fonts[index].as_bytes().len(),
            PackageKind::KeyboardLayout => self.keyboard_layouts[index].len(),
            PackageKind::DevicePath => self.device_path.as_ref().map_or(0, |p| p.as_bytes().len()),
        }
    }

    /// Exported size: list header, every package, END header
    pub fn package_length(&self) -> usize {
        let body: usize = PackageKind::ORDER
            .iter()
            .flat_map(|&kind| (0..self.count(kind)).map(move |i| (kind, i)))
            .map(|(kind, i)| self.package_len(kind, i))
            .sum();
        PACKAGE_LIST_HEADER_SIZE + body + PACKAGE_HEADER_SIZE
    }

    /// Store `package`; returns its index within its kind
    ///
    /// Only the per-list checks run here. Database-wide checks (font
    /// identity) belong to the caller.
    pub fn insert(&mut self, package: Package) -> Result<usize> {
        let index = match package {
            Package::Guid(p) => {
                self.guids.push(p);
                self.guids.len() - 1
            }
            Package::Form(p) => {
                self.forms.push(p);
                self.forms.len() - 1
            }
            Package::String(p) => {
                if self.find_strings(p.language()).is_some() {
                    log::warn!("hii: string package for {} already present", p.language());
                    return Err(HiiError::DuplicateConstraintViolated);
                }
                self.strings.push(p);
                self.strings.len() - 1
            }
            Package::Font(p) => {
                self.fonts.push(p);
                self.fonts.len() - 1
            }
            Package::Image(p) => {
                if self.image.is_some() {
                    return Err(HiiError::DuplicateConstraintViolated);
                }
                self.image = Some(p);
                0
            }
            Package::SimpleFont(p) => {
                self.simple_fonts.push(p);
                self.simple_fonts.len() - 1
            }
            Package::KeyboardLayout(p) => {
                self.keyboard_layouts.push(p);
                self.keyboard_layouts.len() - 1
            }
            Package::DevicePath(p) => {
                if self.device_path.is_some() {
                    return Err(HiiError::DuplicateConstraintViolated);
                }
                self.device_path = Some(p);
                0
            }
        };
        Ok(index)
    }

    /// Drop the first package of `kind`
    pub fn remove_first(&mut self, kind: PackageKind) {
        fn pop<T>(items: &mut Vec<T>) {
            if !items.is_empty() {
                items.remove(0);
            }
        }
        match kind {
            PackageKind::Guid => pop(&mut self.guids),
            PackageKind::Form => pop(&mut self.forms),
            PackageKind::String => pop(&mut self.strings),
            PackageKind::Font => pop(&mut self.fonts),
            PackageKind::Image => self.image = None,
            PackageKind::SimpleFont => pop(&mut self.simple_fonts),
            PackageKind::KeyboardLayout => pop(&mut self.keyboard_layouts),
            PackageKind::DevicePath => self.device_path = None,
        }
    }

    /// Largest id reported by any string package
    pub fn max_string_id(&self) -> u16 {
        self.strings.iter().map(|p| p.max_string_id()).max().unwrap_or(0)
    }

    /// Pad every string package with a skip block up to the common max id
    pub fn reconcile_string_ids(&mut self) -> Result<()> {
        let max = self.max_string_id();
        for package in self.strings.iter_mut() {
            package.pad_to(max)?;
        }
        debug_assert!(self.strings.iter().all(|p| p.max_string_id() == max));
        Ok(())
    }
}
