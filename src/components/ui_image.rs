use std::path::Path;

use cgmath::Vector2;

use crate::{
    context::GpuResource,
    data_structures::{
        mesh::{quad_mesh_data, Mesh},
        scene_graph::Component,
        texture::Texture,
        transform::Transform,
    },
    error::LoadError,
    gpu::{Gpu, UniformValue},
    render::RenderContext,
    resources::{texture::load_texture, AssetLoader},
};

/// The whole texture, top row at the top of the quad.
const FULL_SOURCE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

/// A textured rectangle in screen pixels, drawn with the UI shader.
///
/// The rectangle starts at `position` and spans `size`; the quad mesh is rewritten in
/// place whenever either changes.
#[derive(Debug)]
pub struct UiImage {
    texture: Texture,
    mesh: Mesh,
    position: Vector2<f32>,
    size: Vector2<f32>,
}

fn bounds(position: Vector2<f32>, size: Vector2<f32>) -> [f32; 4] {
    [position.x, position.y, position.x + size.x, position.y + size.y]
}

impl UiImage {
    /// Show `texture` at its own pixel size at the origin. The image takes ownership.
    pub fn from_texture(gpu: &mut dyn Gpu, mut texture: Texture) -> Result<Self, LoadError> {
        let position = Vector2::new(0.0, 0.0);
        let size = Vector2::new(texture.width() as f32, texture.height() as f32);
        let data = quad_mesh_data(bounds(position, size), FULL_SOURCE);
        match Mesh::load_from_data(gpu, &AssetLoader::new(), &[data]) {
            Ok(mesh) => Ok(Self {
                texture,
                mesh,
                position,
                size,
            }),
            Err(e) => {
                texture.release(gpu);
                Err(e)
            }
        }
    }

    pub fn load(gpu: &mut dyn Gpu, assets: &AssetLoader, path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let texture = load_texture(gpu, assets, path.as_ref())?;
        Self::from_texture(gpu, texture)
    }

    pub fn from_rgba(gpu: &mut dyn Gpu, width: u32, height: u32, pixels: &[u8]) -> Result<Self, LoadError> {
        let texture = Texture::from_rgba(gpu, width, height, pixels)?;
        Self::from_texture(gpu, texture)
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Replace the texture, releasing the old one. Position and size are kept.
    pub fn set_texture(&mut self, gpu: &mut dyn Gpu, texture: Texture) {
        let mut old = std::mem::replace(&mut self.texture, texture);
        old.release(gpu);
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn position(&self) -> Vector2<f32> {
        self.position
    }

    pub fn set_position(&mut self, gpu: &mut dyn Gpu, position: Vector2<f32>) -> Result<(), LoadError> {
        self.position = position;
        self.update_mesh(gpu)
    }

    pub fn size(&self) -> Vector2<f32> {
        self.size
    }

    pub fn set_size(&mut self, gpu: &mut dyn Gpu, size: Vector2<f32>) -> Result<(), LoadError> {
        self.size = size;
        self.update_mesh(gpu)
    }

    /// `(x0, y0, x1, y1)` of the drawn rectangle.
    pub fn bounds(&self) -> [f32; 4] {
        bounds(self.position, self.size)
    }

    fn update_mesh(&mut self, gpu: &mut dyn Gpu) -> Result<(), LoadError> {
        let data = quad_mesh_data(self.bounds(), FULL_SOURCE);
        self.mesh.update_data(gpu, &[data])
    }
}

impl Component for UiImage {
    fn render(&self, _transform: &Transform, ctx: &mut RenderContext<'_>) {
        let ui = &ctx.shaders.ui;
        ui.bind(ctx.gpu, ctx.projection);
        ui.program().set_uniform(ctx.gpu, "uTexture", UniformValue::Int(0));
        self.texture.bind(ctx.gpu, 0);
        self.mesh.render(ctx.gpu, ui.program());
        ctx.gpu.bind_texture(0, None);
    }

    fn release(&mut self, gpu: &mut dyn Gpu) {
        self.texture.release(gpu);
        self.mesh.release(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{GpuCommand, RecordingGpu};

    #[test]
    fn moving_rewrites_the_quad_in_place() {
        let mut gpu = RecordingGpu::new();
        let mut image = UiImage::from_rgba(&mut gpu, 2, 2, &[255; 16]).unwrap();
        assert_eq!(image.bounds(), [0.0, 0.0, 2.0, 2.0]);
        gpu.take_commands();

        image.set_position(&mut gpu, Vector2::new(10.0, 20.0)).unwrap();
        assert_eq!(image.bounds(), [10.0, 20.0, 12.0, 22.0]);
        assert!(matches!(gpu.commands(), [GpuCommand::WriteBuffer { .. }]));
    }

    #[test]
    fn release_frees_texture_and_quad() {
        let mut gpu = RecordingGpu::new();
        let texture = Texture::from_rgba(&mut gpu, 1, 1, &[0; 4]).unwrap();
        let mut image = UiImage::from_texture(&mut gpu, texture).unwrap();
        assert_eq!(image.size(), Vector2::new(1.0, 1.0));

        image.release(&mut gpu);
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.live_buffers(), 0);
    }
}
