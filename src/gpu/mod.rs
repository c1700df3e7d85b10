//! The graphics collaborator.
//!
//! The engine never talks to a graphics API directly. Everything it needs is expressed
//! through the [`Gpu`] trait in the vocabulary of "upload this vertex data", "compile
//! this shader source" and "bind this texture unit". Resources are referred to by small
//! copyable handles that are only meaningful to the backend that created them.
//!
//! # Backends
//!
//! - [`wgpu_backend::WgpuGpu`] renders through `wgpu`, onto a window surface or offscreen
//! - [`headless::RecordingGpu`] records every call and draws nothing, used for tests and tools

use bitflags::bitflags;

use crate::error::GpuError;

pub mod headless;
pub mod wgpu_backend;

macro_rules! handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

handle!(
    /// A vertex buffer.
    BufferId,
    /// A vertex buffer paired with the layout used to read it.
    VertexArrayId,
    /// An RGBA8 2D texture.
    TextureId,
    /// A single compiled shader stage.
    ShaderId,
    /// A linked shader program.
    ProgramId,
    /// An offscreen render target with a colour texture and a depth buffer.
    FramebufferId,
    /// The location of a uniform inside a linked program.
    UniformLocation,
);

/// Number of texture units a material can occupy.
pub const TEXTURE_UNITS: usize = 4;

/// Vertex attribute slots shared by every shader.
pub const ATTR_POSITION: u32 = 0;
pub const ATTR_NORMAL: u32 = 1;
pub const ATTR_TEXCOORD: u32 = 2;

/// Uniforms understood by the built-in shaders, in location order.
///
/// Both backends hand out the index into this table as the [`UniformLocation`].
pub const UNIFORM_NAMES: [&str; 14] = [
    "uProjection",
    "uView",
    "uModel",
    "uMVP",
    "uCamera",
    "uAmbient",
    "uDiffuse",
    "uSpecular",
    "uMapFlags",
    "uAmbientMap",
    "uDiffuseMap",
    "uSpecularMap",
    "uNormalMap",
    "uTexture",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
}

impl From<cgmath::Matrix4<f32>> for UniformValue {
    fn from(matrix: cgmath::Matrix4<f32>) -> Self {
        UniformValue::Mat4(matrix.into())
    }
}

/// Which optional attributes follow the position in an interleaved vertex.
///
/// Vertices are always `position(3f)`, then `normal(3f)` if present, then `texcoord(2f)`
/// if present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub normals: bool,
    pub texcoords: bool,
}

impl VertexLayout {
    /// Number of floats per vertex.
    pub fn components(&self) -> usize {
        3 + if self.normals { 3 } else { 0 } + if self.texcoords { 2 } else { 0 }
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> usize {
        self.components() * std::mem::size_of::<f32>()
    }

    /// Byte offset of the texture coordinates inside a vertex.
    pub fn texcoord_offset(&self) -> usize {
        (3 + if self.normals { 3 } else { 0 }) * std::mem::size_of::<f32>()
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOUR = 1;
        const DEPTH = 2;
    }
}

/// The operations the engine needs from a graphics backend.
///
/// All calls happen on the thread that owns the backend. Handles are never shared
/// between backends.
pub trait Gpu {
    fn create_vertex_buffer(&mut self, data: &[u8]) -> Result<BufferId, GpuError>;

    /// Overwrite the contents of `buffer` with `data` of the same size.
    fn write_vertex_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GpuError>;

    /// Reallocate `buffer` to the size of `data` and upload it.
    fn resize_vertex_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GpuError>;

    fn delete_buffer(&mut self, buffer: BufferId);

    fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        layout: VertexLayout,
    ) -> Result<VertexArrayId, GpuError>;

    fn delete_vertex_array(&mut self, vao: VertexArrayId);

    /// Create an RGBA8 texture. `pixels`, when given, holds `width * height * 4` bytes.
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Result<TextureId, GpuError>;

    fn delete_texture(&mut self, texture: TextureId);

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    /// The shading language version as reported by the runtime, e.g. `"4.50 wgpu"`.
    fn shading_language_version(&self) -> String;

    /// Compile one stage. On failure the compiler log is returned.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String>;

    fn delete_shader(&mut self, shader: ShaderId);

    /// Link compiled stages into a program. On failure the linker log is returned.
    fn link_program(&mut self, shaders: &[ShaderId]) -> Result<ProgramId, String>;

    fn delete_program(&mut self, program: ProgramId);

    fn use_program(&mut self, program: Option<ProgramId>);

    /// Uniforms that are active in a linked program.
    fn active_uniforms(&self, program: ProgramId) -> Vec<(String, UniformLocation)>;

    /// Set a uniform of the program in use.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Create an offscreen target. The returned texture is its colour attachment and is
    /// deleted together with the framebuffer.
    fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<(FramebufferId, TextureId), GpuError>;

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Direct subsequent clears and draws to `framebuffer`, or to the default framebuffer
    /// for `None`.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    fn clear(&mut self, flags: ClearFlags, colour: [f32; 4]);

    /// Draw `count` vertices of `vao` as a triangle list.
    fn draw_triangles(&mut self, vao: VertexArrayId, count: u32);

    /// The default framebuffer changed size.
    fn resize(&mut self, _width: u32, _height: u32) {}

    /// Submit everything recorded since the last call and present it.
    fn end_frame(&mut self) -> Result<(), GpuError> {
        Ok(())
    }
}

/// Find the built-in uniforms a shader source refers to.
///
/// Identifiers are matched as whole words so `uModel` does not match `uModelView`.
pub(crate) fn declared_uniforms<'a>(
    sources: impl IntoIterator<Item = &'a str>,
) -> Vec<(String, UniformLocation)> {
    let sources: Vec<&str> = sources.into_iter().collect();
    UNIFORM_NAMES
        .iter()
        .enumerate()
        .filter(|(_, name)| sources.iter().any(|src| contains_word(src, name)))
        .map(|(idx, name)| (name.to_string(), UniformLocation(idx as u32)))
        .collect()
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}
