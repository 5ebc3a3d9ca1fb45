use super::Database;
use crate::error::{HiiError, Result};
use crate::image::block::encode_rgb;
use crate::image::{DecoderRegistry, Image, ImagePackage};
use crate::package_list::Package;
use crate::types::HiiHandle;

fn rgb_block(image: &Image) -> Result<alloc::vec::Vec<u8>> {
    if image.bitmap.len() != image.width as usize * image.height as usize {
        return Err(HiiError::InvalidInput);
    }
    Ok(encode_rgb(image.width, image.height, image.is_transparent(), &image.bitmap))
}

impl Database {
    /// Store `image` as a new 24-bit block; returns its id
    ///
    /// The list's image package is created on first use.
    pub fn new_image(&self, handle: HiiHandle, image: &Image) -> Result<u16> {
        let block = rgb_block(image)?;
        let mut state = self.lock();
        let at = state.position(handle)?;
        let list = &mut state.records[at].list;
        let id = match list.image_mut() {
            Some(package) => package.append_block(&block)?,
            None => {
                list.insert(Package::Image(ImagePackage::with_block(&block)?))?;
                1
            }
        };
        log::debug!("hii: new image {} ({}x{}) in {}", id, image.width, image.height, handle);
        Ok(id)
    }

    /// Decode `image_id`; JPEG and PNG blocks go through `decoders`
    pub fn get_image(&self, handle: HiiHandle, image_id: u16, decoders: &dyn DecoderRegistry) -> Result<Image> {
        let state = self.lock();
        let package = state.list(handle)?.image().ok_or(HiiError::NotFound)?;
        package.get_image(image_id, decoders)
    }

    /// Replace the block stored for `image_id` with a 24-bit block
    pub fn set_image(&self, handle: HiiHandle, image_id: u16, image: &Image) -> Result<()> {
        if image_id == 0 {
            return Err(HiiError::InvalidInput);
        }
        let block = rgb_block(image)?;
        let mut state = self.lock();
        let at = state.position(handle)?;
        let package = state.records[at].list.image_mut().ok_or(HiiError::NotFound)?;
        package.replace_block(image_id, &block)
    }
}
