use std::path::Path;

use crate::{
    context::{Context, GpuResource},
    data_structures::{mesh::Mesh, scene_graph::Component, transform::Transform},
    error::LoadError,
    gpu::Gpu,
    pipelines::{default::bind_transforms, shader::ShaderProgram},
    render::RenderContext,
};

/// A mesh drawn at its entity's transform.
///
/// Without a program of its own the model uses the built-in default shader.
#[derive(Debug)]
pub struct Model {
    mesh: Mesh,
    program: Option<ShaderProgram>,
}

impl Model {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            program: None,
        }
    }

    pub fn with_program(mesh: Mesh, program: ShaderProgram) -> Self {
        Self {
            mesh,
            program: Some(program),
        }
    }

    /// Load a model file through the context's format registry.
    pub fn load<G: Gpu>(ctx: &mut Context<G>, path: impl AsRef<Path>) -> Result<Self, LoadError> {
        Ok(Self::new(ctx.load_mesh(path)?))
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    pub fn program(&self) -> Option<&ShaderProgram> {
        self.program.as_ref()
    }

    /// Swap the program, returning the previous one for the caller to release.
    pub fn set_program(&mut self, program: Option<ShaderProgram>) -> Option<ShaderProgram> {
        std::mem::replace(&mut self.program, program)
    }
}

impl Component for Model {
    fn render(&self, transform: &Transform, ctx: &mut RenderContext<'_>) {
        let model = transform.matrix();
        match &self.program {
            Some(program) => {
                program.bind(ctx.gpu);
                bind_transforms(program, ctx, model);
                self.mesh.render(ctx.gpu, program);
            }
            None => {
                let shaders = ctx.shaders;
                shaders.default.bind(ctx, model);
                self.mesh.render(ctx.gpu, shaders.default.program());
            }
        }
    }

    fn release(&mut self, gpu: &mut dyn Gpu) {
        self.mesh.release(gpu);
        if let Some(program) = self.program.as_mut() {
            program.release(gpu);
        }
    }
}
