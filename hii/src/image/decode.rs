//! Pixel expansion for palette-indexed and direct-color image blocks
//!
//! Output is row-major, `width * height` pixels. The palette is resolved once
//! per call into a fixed lookup table; indices beyond the palette map to a
//! zeroed pixel.

use alloc::vec;
use alloc::vec::Vec;

use super::block::{bitmap_len_1bit, bitmap_len_24bit, bitmap_len_4bit, bitmap_len_8bit};
use super::BltPixel;
use crate::error::{HiiError, Result};

fn lookup_table<const N: usize>(palette: &[BltPixel]) -> [BltPixel; N] {
    let mut table = [BltPixel::default(); N];
    for (slot, color) in table.iter_mut().zip(palette.iter()) {
        *slot = *color;
    }
    table
}

fn check_len(data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        return Err(HiiError::InvalidFormat);
    }
    Ok(())
}

/// 1 bit per pixel, rows byte-aligned, most significant bit first
///
/// Padding bits in the final byte of a row are ignored.
pub fn expand_1bit(width: u16, height: u16, data: &[u8], palette: &[BltPixel]) -> Result<Vec<BltPixel>> {
    check_len(data, bitmap_len_1bit(width, height))?;
    let table: [BltPixel; 2] = lookup_table(palette);
    let (w, h) = (width as usize, height as usize);
    let row_bytes = w.div_ceil(8);
    let mut out = vec![BltPixel::default(); w * h];

    for y in 0..h {
        let row = &data[y * row_bytes..(y + 1) * row_bytes];
        for x in 0..w {
            let byte = row[x / 8];
            let bit = (byte >> (7 - (x % 8))) & 1;
            out[y * w + x] = table[bit as usize];
        }
    }
    Ok(out)
}

/// 4 bits per pixel, high nibble first, rows byte-aligned
pub fn expand_4bit(width: u16, height: u16, data: &[u8], palette: &[BltPixel]) -> Result<Vec<BltPixel>> {
    check_len(data, bitmap_len_4bit(width, height))?;
    let table: [BltPixel; 16] = lookup_table(palette);
    let (w, h) = (width as usize, height as usize);
    let row_bytes = w.div_ceil(2);
    let mut out = vec![BltPixel::default(); w * h];

    for y in 0..h {
        let row = &data[y * row_bytes..(y + 1) * row_bytes];
        for x in 0..w {
            let byte = row[x / 2];
            let nibble = if x % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            out[y * w + x] = table[nibble as usize];
        }
    }
    Ok(out)
}

/// One palette index per byte
pub fn expand_8bit(width: u16, height: u16, data: &[u8], palette: &[BltPixel]) -> Result<Vec<BltPixel>> {
    let len = bitmap_len_8bit(width, height);
    check_len(data, len)?;
    let table: [BltPixel; 256] = lookup_table(palette);
    Ok(data[..len].iter().map(|&i| table[i as usize]).collect())
}

/// Direct `{blue, green, red}` triples
pub fn expand_24bit(width: u16, height: u16, data: &[u8]) -> Result<Vec<BltPixel>> {
    let len = bitmap_len_24bit(width, height);
    check_len(data, len)?;
    Ok(data[..len]
        .chunks_exact(3)
        .map(|bgr| BltPixel::new(bgr[0], bgr[1], bgr[2]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_4bit_odd_width() {
        let palette: Vec<BltPixel> = (0..16).map(|i| BltPixel::new(i, 0, 0)).collect();
        // width 3: two bytes per row, low nibble of the second byte is padding
        let data = [0x12, 0x3F, 0x45, 0x6F];
        let pixels = expand_4bit(3, 2, &data, &palette).unwrap();
        let blues: Vec<u8> = pixels.iter().map(|p| p.blue).collect();
        assert_eq!(blues, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_8bit_short_palette_maps_to_zero() {
        let palette = [BltPixel::new(9, 9, 9)];
        let pixels = expand_8bit(2, 1, &[0, 7], &palette).unwrap();
        assert_eq!(pixels, [BltPixel::new(9, 9, 9), BltPixel::default()]);
    }

    #[test]
    fn test_24bit_channel_order() {
        let pixels = expand_24bit(1, 1, &[1, 2, 3]).unwrap();
        assert_eq!(pixels[0].blue, 1);
        assert_eq!(pixels[0].red, 3);
    }

    #[test]
    fn test_short_data_is_invalid() {
        assert_eq!(expand_24bit(2, 1, &[0; 5]), Err(HiiError::InvalidFormat));
    }
}
