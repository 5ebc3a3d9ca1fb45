//! Image packages
//!
//! Images are stored as a block stream plus an optional palette block.
//! Palette-indexed bitmaps are expanded through [`decode`]; JPEG and PNG
//! payloads are handed to an [`ImageDecoder`] found through a
//! [`DecoderRegistry`].

pub mod block;
pub mod decode;
pub mod package;
pub mod palette;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{HiiError, Result};

pub use block::{EncodedFormat, ImageBlock, ImageBlocks};
pub use package::ImagePackage;
pub use palette::PaletteBlock;

/// Image flag: pixels equal to zero are not drawn
pub const IMAGE_TRANSPARENT: u32 = 0x0000_0001;

/// Display pixel in blue, green, red, reserved order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BltPixel {
    pub blue: u8,
    pub green: u8,
    pub red: u8,
    pub reserved: u8,
}

impl BltPixel {
    pub const fn new(blue: u8, green: u8, red: u8) -> Self {
        Self {
            blue,
            green,
            red,
            reserved: 0,
        }
    }

    fn is_blank(&self) -> bool {
        self.blue == 0 && self.green == 0 && self.red == 0
    }
}

/// Decoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub flags: u32,
    pub width: u16,
    pub height: u16,
    /// Row-major, `width * height` pixels
    pub bitmap: Vec<BltPixel>,
}

impl Image {
    pub fn new(width: u16, height: u16, bitmap: Vec<BltPixel>) -> Result<Self> {
        if bitmap.len() != width as usize * height as usize {
            return Err(HiiError::InvalidInput);
        }
        Ok(Self {
            flags: 0,
            width,
            height,
            bitmap,
        })
    }

    pub fn is_transparent(&self) -> bool {
        self.flags & IMAGE_TRANSPARENT != 0
    }
}

/// Decoder for one compressed image format
pub trait ImageDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Image>;
}

/// Lookup of decoders by image block tag
pub trait DecoderRegistry {
    /// Zero or one decoder able to handle blocks with `tag`
    fn find_decoder(&self, tag: u8) -> Option<&dyn ImageDecoder>;
}

/// Registry with no decoders; JPEG and PNG blocks are unsupported
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecoders;

impl DecoderRegistry for NoDecoders {
    fn find_decoder(&self, _tag: u8) -> Option<&dyn ImageDecoder> {
        None
    }
}

/// Registry backed by a tag-keyed table
#[derive(Default)]
pub struct DecoderTable {
    decoders: BTreeMap<u8, Box<dyn ImageDecoder + Send + Sync>>,
}

impl DecoderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `decoder` for `tag`, replacing any previous one
    pub fn register(&mut self, tag: u8, decoder: Box<dyn ImageDecoder + Send + Sync>) {
        self.decoders.insert(tag, decoder);
    }
}

impl DecoderRegistry for DecoderTable {
    fn find_decoder(&self, tag: u8) -> Option<&dyn ImageDecoder> {
        self.decoders.get(&tag).map(|d| d.as_ref() as &dyn ImageDecoder)
    }
}

/// Caller-owned pixel surface images are drawn into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BltSurface {
    pub width: u16,
    pub height: u16,
    pub pixels: Vec<BltPixel>,
}

impl BltSurface {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: alloc::vec![BltPixel::default(); width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: u16, y: u16) -> Option<BltPixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize).copied()
    }
}

/// Copy `image` into `surface` with its top-left corner at `(x, y)`
///
/// The part falling outside the surface is clipped. Transparent images leave
/// the surface untouched where their pixel is zero. Returns
/// [`HiiError::InvalidInput`] when the origin is off the surface.
pub fn draw_image(image: &Image, surface: &mut BltSurface, x: u16, y: u16) -> Result<()> {
    if x >= surface.width || y >= surface.height {
        return Err(HiiError::InvalidInput);
    }
    let cols = image.width.min(surface.width - x) as usize;
    let rows = image.height.min(surface.height - y) as usize;
    let transparent = image.is_transparent();

    for row in 0..rows {
        for col in 0..cols {
            let src = image.bitmap[row * image.width as usize + col];
            if transparent && src.is_blank() {
                continue;
            }
            let dst = (y as usize + row) * surface.width as usize + x as usize + col;
            surface.pixels[dst] = src;
        }
    }
    Ok(())
}
