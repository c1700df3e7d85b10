use cgmath::Matrix4;

use crate::{
    error::ShaderError,
    gpu::UniformValue,
    pipelines::shader::{ShaderCompiler, ShaderProgram},
    render::RenderContext,
};

pub const DEFAULT_SHADER_FILES: [&str; 2] = [
    "data/shaders/default.vs.glsl",
    "data/shaders/default.fs.glsl",
];

/// The lit mesh shader used by every model without a program of its own.
#[derive(Debug)]
pub struct DefaultShader {
    program: ShaderProgram,
}

impl DefaultShader {
    pub fn load(compiler: &mut ShaderCompiler<'_>) -> Result<Self, ShaderError> {
        Ok(Self {
            program: ShaderProgram::from_files(compiler, &DEFAULT_SHADER_FILES)?,
        })
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub(crate) fn program_mut(&mut self) -> &mut ShaderProgram {
        &mut self.program
    }

    /// Make the program current and write the transform uniforms for one draw.
    pub fn bind(&self, ctx: &mut RenderContext<'_>, model: Matrix4<f32>) {
        self.program.bind(ctx.gpu);
        bind_transforms(&self.program, ctx, model);
    }
}

/// Write `uProjection`, `uView`, `uModel`, `uMVP` and `uCamera` for a draw with `model`.
///
/// Works with any program that follows the built-in uniform names; uniforms the program
/// does not use are skipped.
pub fn bind_transforms(program: &ShaderProgram, ctx: &mut RenderContext<'_>, model: Matrix4<f32>) {
    let view = ctx.camera.view();
    let mvp = ctx.projection * view * model;
    let eye = ctx.camera.position();

    program.set_uniform(ctx.gpu, "uProjection", ctx.projection.into());
    program.set_uniform(ctx.gpu, "uView", view.into());
    program.set_uniform(ctx.gpu, "uModel", model.into());
    program.set_uniform(ctx.gpu, "uMVP", mvp.into());
    program.set_uniform(ctx.gpu, "uCamera", UniformValue::Vec3([eye.x, eye.y, eye.z]));
}
