//! RGBA textures.
//!
//! [`Texture`] is a backend handle plus the pixel size. Image files are decoded with the
//! `image` crate and converted to RGBA8 before upload.

use image::GenericImageView;

use crate::{
    context::GpuResource,
    error::LoadError,
    gpu::{Gpu, TextureId},
};

#[derive(Debug, PartialEq, Eq)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl Texture {
    /// Decode an encoded image (PNG, JPEG, ...) and upload it.
    ///
    /// # Arguments
    ///
    /// * `bytes` the encoded file contents; the format is guessed from the data
    pub fn from_bytes(gpu: &mut dyn Gpu, bytes: &[u8]) -> Result<Self, LoadError> {
        let img = image::load_from_memory(bytes)?;
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();
        Self::from_rgba(gpu, width, height, &rgba)
    }

    /// Upload `width * height` RGBA8 pixels, rows first.
    pub fn from_rgba(
        gpu: &mut dyn Gpu,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self, LoadError> {
        let id = gpu.create_texture(width, height, Some(pixels))?;
        Ok(Self { id, width, height })
    }

    /// Wrap a texture the backend created elsewhere, e.g. a framebuffer attachment.
    pub(crate) fn from_raw(id: TextureId, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bind to `unit`.
    pub fn bind(&self, gpu: &mut dyn Gpu, unit: u32) {
        gpu.bind_texture(unit, Some(self.id));
    }
}

impl GpuResource for Texture {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        gpu.delete_texture(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::RecordingGpu;

    #[test]
    fn png_is_decoded_to_rgba() {
        let mut png = Vec::new();
        image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let mut gpu = RecordingGpu::new();
        let texture = Texture::from_bytes(&mut gpu, &png).unwrap();
        assert_eq!(texture.size(), (3, 2));
        assert_eq!(gpu.live_textures(), 1);
    }

    #[test]
    fn garbage_is_an_image_error() {
        let mut gpu = RecordingGpu::new();
        assert!(matches!(
            Texture::from_bytes(&mut gpu, b"not an image"),
            Err(LoadError::Image(_))
        ));
        assert_eq!(gpu.live_textures(), 0);
    }
}
