use std::{path::Path, rc::Rc};

use cgmath::Vector2;

use crate::{
    components::ui_image::UiImage,
    context::Context,
    data_structures::{scene_graph::Component, texture::Texture, transform::Transform},
    error::LoadError,
    gpu::Gpu,
    render::RenderContext,
};

/// A line of text rasterized into a [`UiImage`].
///
/// The texture is as wide as the measured text and `size * 1.5` pixels high, with the
/// baseline `size` pixels below the top. Changing the text rasterizes it again.
pub struct UiText {
    image: UiImage,
    text: String,
    size: f32,
    colour: [f32; 4],
    font: Rc<fontdue::Font>,
}

impl std::fmt::Debug for UiText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiText")
            .field("text", &self.text)
            .field("size", &self.size)
            .field("colour", &self.colour)
            .field("image", &self.image)
            .finish()
    }
}

/// A rasterized line of RGBA8 pixels, rows top first.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Draw `text` with `font` at `size` pixels in `colour`.
///
/// Glyph coverage is multiplied into the alpha channel; uncovered pixels stay fully
/// transparent. The bitmap is at least one pixel wide.
pub fn rasterize(font: &fontdue::Font, text: &str, size: f32, colour: [f32; 4]) -> TextBitmap {
    let mut advance = 0.0f32;
    let mut prev: Option<char> = None;
    let mut glyphs = Vec::with_capacity(text.len());
    for c in text.chars() {
        if let Some(kern) = prev.and_then(|p| font.horizontal_kern(p, c, size)) {
            advance += kern;
        }
        let (metrics, coverage) = font.rasterize(c, size);
        glyphs.push((advance, metrics, coverage));
        advance += metrics.advance_width;
        prev = Some(c);
    }

    let width = (advance.ceil() as u32).max(1);
    let height = ((size * 1.5) as u32).max(1);
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    let [r, g, b, a] = colour.map(|v| v.clamp(0.0, 1.0));
    let rgb = [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8];
    let baseline = size.round() as i32;

    for (pen, metrics, coverage) in glyphs {
        let left = pen.round() as i32 + metrics.xmin;
        let top = baseline - metrics.height as i32 - metrics.ymin;
        for row in 0..metrics.height {
            for col in 0..metrics.width {
                let x = left + col as i32;
                let y = top + row as i32;
                if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                    continue;
                }
                let alpha = (coverage[row * metrics.width + col] as f32 * a) as u8;
                let idx = ((y as u32 * width + x as u32) * 4) as usize;
                if alpha > pixels[idx + 3] {
                    pixels[idx..idx + 3].copy_from_slice(&rgb);
                    pixels[idx + 3] = alpha;
                }
            }
        }
    }

    TextBitmap {
        width,
        height,
        pixels,
    }
}

impl UiText {
    /// Rasterize `text` with the font at `font_path`, shared through the context's font cache.
    pub fn new<G: Gpu>(
        ctx: &mut Context<G>,
        text: &str,
        font_path: impl AsRef<Path>,
        size: f32,
        colour: [f32; 4],
    ) -> Result<Self, LoadError> {
        let font = ctx.font(font_path)?;
        Self::with_font(&mut ctx.gpu, font, text, size, colour)
    }

    pub fn with_font(
        gpu: &mut dyn Gpu,
        font: Rc<fontdue::Font>,
        text: &str,
        size: f32,
        colour: [f32; 4],
    ) -> Result<Self, LoadError> {
        let bitmap = rasterize(&font, text, size, colour);
        let texture = Texture::from_rgba(gpu, bitmap.width, bitmap.height, &bitmap.pixels)?;
        Ok(Self {
            image: UiImage::from_texture(gpu, texture)?,
            text: text.to_string(),
            size,
            colour,
            font,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Rasterize `text` into a new texture and resize the quad to it.
    pub fn set_text(&mut self, gpu: &mut dyn Gpu, text: &str) -> Result<(), LoadError> {
        let bitmap = rasterize(&self.font, text, self.size, self.colour);
        let texture = Texture::from_rgba(gpu, bitmap.width, bitmap.height, &bitmap.pixels)?;
        self.image.set_texture(gpu, texture);
        self.text = text.to_string();
        self.image
            .set_size(gpu, Vector2::new(bitmap.width as f32, bitmap.height as f32))
    }

    pub fn image(&self) -> &UiImage {
        &self.image
    }

    pub fn position(&self) -> Vector2<f32> {
        self.image.position()
    }

    pub fn set_position(&mut self, gpu: &mut dyn Gpu, position: Vector2<f32>) -> Result<(), LoadError> {
        self.image.set_position(gpu, position)
    }

    pub fn size(&self) -> Vector2<f32> {
        self.image.size()
    }
}

impl Component for UiText {
    fn render(&self, transform: &Transform, ctx: &mut RenderContext<'_>) {
        self.image.render(transform, ctx);
    }

    fn release(&mut self, gpu: &mut dyn Gpu) {
        self.image.release(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gpu::headless::RecordingGpu, resources::AssetLoader};

    #[test]
    fn missing_font_fails_to_load() {
        let mut ctx = Context::new(RecordingGpu::new(), AssetLoader::with_defaults("no-such-dir")).unwrap();
        let text = UiText::new(&mut ctx, "hi", "fonts/missing.ttf", 16.0, [1.0; 4]);
        assert!(matches!(text, Err(LoadError::NotFound { .. })));
        assert_eq!(ctx.gpu.live_textures(), 0);
    }
}
