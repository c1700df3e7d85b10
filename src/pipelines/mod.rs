//! Shader programs and the binding protocol.
//!
//! - `preprocess` expands `#include`, `#define` and `#ifdef` in GLSL sources
//! - `shader` compiles preprocessed files into a [`shader::ShaderProgram`]
//! - `default` is the lit mesh shader, `ui` the screen-space quad shader
//!
//! A component draws by binding a program, writing its per-draw uniforms, letting each
//! mesh group bind its material, and unbinding the material's texture units after the draw.

use crate::{context::GpuResource, error::ShaderError, gpu::Gpu};

pub mod default;
pub mod preprocess;
pub mod shader;
pub mod ui;

use default::DefaultShader;
use shader::ShaderCompiler;
use ui::UiShader;

/// The built-in programs, compiled once when the [`crate::context::Context`] is created.
#[derive(Debug)]
pub struct Shaders {
    pub default: DefaultShader,
    pub ui: UiShader,
}

impl Shaders {
    pub fn load(compiler: &mut ShaderCompiler<'_>) -> Result<Self, ShaderError> {
        let default = DefaultShader::load(compiler)?;
        let ui = match UiShader::load(compiler) {
            Ok(ui) => ui,
            Err(e) => {
                let mut default = default;
                default.program_mut().release(compiler.gpu);
                return Err(e);
            }
        };
        Ok(Self { default, ui })
    }
}

impl GpuResource for Shaders {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        self.default.program_mut().release(gpu);
        self.ui.program_mut().release(gpu);
    }
}
