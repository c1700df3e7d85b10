//! A layer drawn on top of the 3D scene.
//!
//! [`UiLayer`] renders its entities into an offscreen colour + depth target with an
//! orthographic projection covering `(0, 0)` to `(width, height)`, then composites the
//! colour target onto the default framebuffer with one screen-sized quad.

use cgmath::{ortho, Matrix4};

use crate::{
    context::{GpuResource, ResourceScope},
    data_structures::{
        mesh::{quad_mesh_data, Mesh},
        scene_graph::{Entity, EntityId, Layer, SceneLayer},
        texture::Texture,
    },
    error::{GpuError, LoadError},
    flow::UpdateContext,
    gpu::{ClearFlags, FramebufferId, Gpu, UniformValue},
    render::RenderContext,
    resources::AssetLoader,
};

/// Source rectangle of the screen quad; the offscreen target is stored bottom row first.
const SCREEN_SOURCE: [f32; 4] = [0.0, 1.0, 1.0, 0.0];

#[derive(Debug)]
pub struct UiLayer {
    layer: Layer,
    framebuffer: FramebufferId,
    colour: Texture,
    screen: Mesh,
    projection: Matrix4<f32>,
}

fn ui_projection(width: u32, height: u32) -> Matrix4<f32> {
    ortho(0.0, width as f32, 0.0, height as f32, -1.0, 1.0)
}

fn screen_quad(width: u32, height: u32) -> [f32; 4] {
    [0.0, 0.0, width as f32, height as f32]
}

impl UiLayer {
    /// Create the offscreen target and the screen quad for a `width` x `height` window.
    pub fn new(gpu: &mut dyn Gpu, width: u32, height: u32) -> Result<Self, LoadError> {
        let mut scope = ResourceScope::new(gpu);
        let (framebuffer, colour) = scope.create_framebuffer(width, height)?;
        let screen = Mesh::load_from_data(
            scope.gpu(),
            &AssetLoader::new(),
            &[quad_mesh_data(screen_quad(width, height), SCREEN_SOURCE)],
        )?;
        scope.commit();

        Ok(Self {
            layer: Layer::new(),
            framebuffer,
            colour: Texture::from_raw(colour, width, height),
            screen,
            projection: ui_projection(width, height),
        })
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut Layer {
        &mut self.layer
    }

    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        self.layer.add_entity(entity)
    }

    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        self.layer.remove_entity(id)
    }

    pub fn projection(&self) -> Matrix4<f32> {
        self.projection
    }

    /// The offscreen colour target.
    pub fn colour(&self) -> &Texture {
        &self.colour
    }

    pub fn size(&self) -> (u32, u32) {
        self.colour.size()
    }
}

impl SceneLayer for UiLayer {
    fn update(&mut self, ctx: &UpdateContext) {
        self.layer.update(ctx);
    }

    fn render(&self, ctx: &mut RenderContext<'_>) {
        let shaders = ctx.shaders;
        shaders.ui.bind(ctx.gpu, self.projection);

        ctx.gpu.bind_framebuffer(Some(self.framebuffer));
        ctx.gpu.clear(ClearFlags::COLOUR | ClearFlags::DEPTH, [0.0; 4]);
        {
            let mut ui_ctx = ctx.with_projection(self.projection);
            for entity in self.layer.entities() {
                entity.render(&mut ui_ctx);
                ui_ctx.gpu.clear(ClearFlags::DEPTH, [0.0; 4]);
            }
        }
        ctx.gpu.bind_framebuffer(None);

        let program = shaders.ui.program();
        shaders.ui.bind(ctx.gpu, self.projection);
        program.set_uniform(ctx.gpu, "uTexture", UniformValue::Int(0));
        self.colour.bind(ctx.gpu, 0);
        ctx.gpu.clear(ClearFlags::DEPTH, [0.0; 4]);
        self.screen.render(ctx.gpu, program);
        ctx.gpu.bind_texture(0, None);
    }

    /// Recreate the offscreen target at the new size and stretch the screen quad.
    fn resize(&mut self, gpu: &mut dyn Gpu, width: u32, height: u32) -> Result<(), GpuError> {
        let (framebuffer, colour) = gpu.create_framebuffer(width, height)?;
        gpu.delete_framebuffer(self.framebuffer);
        self.framebuffer = framebuffer;
        self.colour = Texture::from_raw(colour, width, height);
        self.projection = ui_projection(width, height);
        self.screen
            .update_data(gpu, &[quad_mesh_data(screen_quad(width, height), SCREEN_SOURCE)])
            .map_err(|e| GpuError::Backend(e.to_string()))
    }
}

impl GpuResource for UiLayer {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        self.layer.release(gpu);
        self.screen.release(gpu);
        // the colour texture goes with the framebuffer
        gpu.delete_framebuffer(self.framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{GpuCommand, RecordingGpu};

    #[test]
    fn resize_swaps_the_target() {
        let mut gpu = RecordingGpu::new();
        let mut ui = UiLayer::new(&mut gpu, 800, 600).unwrap();
        let old = ui.colour().id();
        ui.resize(&mut gpu, 1024, 768).unwrap();

        assert_ne!(ui.colour().id(), old);
        assert_eq!(ui.size(), (1024, 768));
        assert_eq!(gpu.live_framebuffers(), 1);
        assert!(gpu
            .commands()
            .iter()
            .any(|c| matches!(c, GpuCommand::WriteBuffer { .. })));
    }

    #[test]
    fn release_frees_everything() {
        let mut gpu = RecordingGpu::new();
        let mut ui = UiLayer::new(&mut gpu, 800, 600).unwrap();
        ui.release(&mut gpu);
        assert_eq!(gpu.live_framebuffers(), 0);
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.live_vertex_arrays(), 0);
    }
}
