use cgmath::Matrix4;

use crate::{
    error::ShaderError,
    gpu::Gpu,
    pipelines::shader::{ShaderCompiler, ShaderProgram},
};

pub const UI_SHADER_FILES: [&str; 2] = ["data/shaders/ui.vs.glsl", "data/shaders/ui.fs.glsl"];

/// Draws textured screen-space quads; used by UI elements and for compositing UI layers.
#[derive(Debug)]
pub struct UiShader {
    program: ShaderProgram,
}

impl UiShader {
    pub fn load(compiler: &mut ShaderCompiler<'_>) -> Result<Self, ShaderError> {
        Ok(Self {
            program: ShaderProgram::from_files(compiler, &UI_SHADER_FILES)?,
        })
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub(crate) fn program_mut(&mut self) -> &mut ShaderProgram {
        &mut self.program
    }

    /// Make the program current with `projection` as `uProjection`.
    pub fn bind(&self, gpu: &mut dyn Gpu, projection: Matrix4<f32>) {
        self.program.bind(gpu);
        self.program.set_uniform(gpu, "uProjection", projection.into());
    }
}
