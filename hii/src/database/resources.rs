use alloc::vec::Vec;

use uguid::Guid;

use super::{Database, State};
use crate::error::{HiiError, Result};
use crate::font::{FontInfo, GlyphCell};
use crate::keyboard::KeyboardLayout;

impl State {
    fn find_layout(&self, guid: &Guid) -> Option<KeyboardLayout<'_>> {
        self.records
            .iter()
            .flat_map(|r| r.list.keyboard_layouts())
            .find_map(|p| p.find(guid))
    }
}

impl Database {
    /// GUIDs of every keyboard layout in the database
    pub fn find_keyboard_layouts(&self) -> Result<Vec<Guid>> {
        let state = self.lock();
        let guids: Vec<Guid> = state
            .records
            .iter()
            .flat_map(|r| r.list.keyboard_layouts())
            .flat_map(|p| p.layouts())
            .map(|layout| layout.guid)
            .collect();
        if guids.is_empty() {
            return Err(HiiError::NotFound);
        }
        Ok(guids)
    }

    /// Copy a layout into `buffer`; returns its length
    ///
    /// `None` selects the current layout. A short buffer fails with
    /// [`HiiError::BufferTooSmall`] carrying the layout length.
    pub fn get_keyboard_layout(&self, guid: Option<&Guid>, buffer: &mut [u8]) -> Result<usize> {
        let state = self.lock();
        let layout: &[u8] = match guid {
            None => state.current_layout.as_ref().map(|(_, bytes)| bytes.as_slice()),
            Some(guid) => state.find_layout(guid).map(|l| l.bytes),
        }
        .ok_or(HiiError::NotFound)?;
        if buffer.len() < layout.len() {
            return Err(HiiError::BufferTooSmall(layout.len()));
        }
        buffer[..layout.len()].copy_from_slice(layout);
        Ok(layout.len())
    }

    /// Make `guid` the current layout
    pub fn set_keyboard_layout(&self, guid: &Guid) -> Result<()> {
        let mut state = self.lock();
        if matches!(&state.current_layout, Some((current, _)) if current == guid) {
            return Ok(());
        }
        let bytes = state.find_layout(guid).ok_or(HiiError::NotFound)?.bytes.to_vec();
        state.current_layout = Some((*guid, bytes));
        crate::log_info!("hii: keyboard layout set to {}", guid);
        Ok(())
    }

    /// Metrics and bitmap of `ch` in the registered font matching `font`
    pub fn get_glyph(&self, font: &FontInfo, ch: u16) -> Result<(GlyphCell, Vec<u8>)> {
        let state = self.lock();
        let package = state
            .records
            .iter()
            .flat_map(|r| r.list.fonts())
            .find(|f| f.info() == font)
            .ok_or(HiiError::NotFound)?;
        let glyph = package.find_glyph(ch)?;
        Ok((glyph.cell, glyph.bitmap.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DriverHandle, PackageHeader, PackageType};
    use alloc::vec;

    const US: Guid = uguid::guid!("0e7f2b4c-1111-4222-8333-944455556666");

    fn keyboard_package() -> Vec<u8> {
        let mut layout = vec![];
        layout.extend_from_slice(&24u16.to_le_bytes());
        layout.extend_from_slice(&US.to_bytes());
        layout.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        let mut package = PackageHeader::new(4 + 2 + layout.len(), PackageType::KeyboardLayout)
            .unwrap()
            .to_bytes()
            .to_vec();
        package.extend_from_slice(&1u16.to_le_bytes());
        package.extend_from_slice(&layout);
        package
    }

    fn register(db: &Database) {
        let package = keyboard_package();
        let mut payload = Guid::ZERO.to_bytes().to_vec();
        payload.extend_from_slice(&((24 + package.len()) as u32).to_le_bytes());
        payload.extend_from_slice(&package);
        payload.extend_from_slice(&PackageHeader::new(4, PackageType::End).unwrap().to_bytes());
        db.new_package_list(&payload, DriverHandle(1), None).unwrap();
    }

    #[test]
    fn test_layout_lookup_and_selection() {
        let db = Database::new();
        assert_eq!(db.find_keyboard_layouts(), Err(HiiError::NotFound));
        register(&db);
        assert_eq!(db.find_keyboard_layouts().unwrap(), vec![US]);

        assert_eq!(db.get_keyboard_layout(None, &mut []), Err(HiiError::NotFound));
        assert_eq!(db.get_keyboard_layout(Some(&US), &mut []), Err(HiiError::BufferTooSmall(24)));

        db.set_keyboard_layout(&US).unwrap();
        let mut buffer = [0u8; 32];
        assert_eq!(db.get_keyboard_layout(None, &mut buffer), Ok(24));
        assert_eq!(&buffer[2..18], &US.to_bytes());
        assert_eq!(db.set_keyboard_layout(&Guid::ZERO), Err(HiiError::NotFound));
    }
}
