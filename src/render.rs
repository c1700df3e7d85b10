//! Per-frame render state handed down the scene graph.
//!
//! A [`RenderContext`] bundles the backend with the built-in shaders, the active
//! projection and the camera. Layers may render their children with a different
//! projection through [`RenderContext::with_projection`], which is how the UI layer
//! switches to its orthographic view.

use cgmath::Matrix4;

use crate::{camera::Camera, gpu::Gpu, pipelines::Shaders};

pub struct RenderContext<'a> {
    pub gpu: &'a mut dyn Gpu,
    pub shaders: &'a Shaders,
    pub projection: Matrix4<f32>,
    pub camera: &'a Camera,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        gpu: &'a mut dyn Gpu,
        shaders: &'a Shaders,
        projection: Matrix4<f32>,
        camera: &'a Camera,
    ) -> Self {
        Self {
            gpu,
            shaders,
            projection,
            camera,
        }
    }

    /// A context for the same frame that renders with `projection`.
    pub fn with_projection(&mut self, projection: Matrix4<f32>) -> RenderContext<'_> {
        RenderContext {
            gpu: &mut *self.gpu,
            shaders: self.shaders,
            projection,
            camera: self.camera,
        }
    }
}
