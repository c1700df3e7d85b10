//! The engine context.
//!
//! A [`Context`] owns everything that used to be process-wide state: the graphics
//! backend, the asset loader chain, the model format registry, the shader define table,
//! the compiled built-in shaders and the font cache. It is created once by the
//! application loop and passed to whoever needs it.
//!
//! # Key types
//!
//! - [`GpuResource`] is implemented by every type holding backend handles
//! - [`ResourceScope`] releases the handles of a multi-step load that did not finish
//! - [`Context`] is the service container

use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    path::{Path, PathBuf},
    rc::Rc,
};

use cgmath::Matrix4;

use crate::{
    camera::Camera,
    data_structures::{
        material::{register_map_flag_defines, Material, MapSlot},
        mesh::Mesh,
        texture::Texture,
    },
    error::{GpuError, LoadError, ShaderError},
    gpu::{
        BufferId, FramebufferId, Gpu, TextureId, VertexArrayId, VertexLayout, ATTR_NORMAL,
        ATTR_POSITION, ATTR_TEXCOORD,
    },
    pipelines::{
        preprocess::{register_shader_defines, version_header, ShaderDefines},
        shader::{ShaderCompiler, ShaderProgram},
        Shaders,
    },
    render::RenderContext,
    resources::{clean_path, mesh::MeshFormatRegistry, texture::load_texture, AssetLoader},
};

/// Something that owns backend handles and must give them back explicitly.
///
/// Dropping a value without calling `release` leaks its handles on the backend.
pub trait GpuResource {
    fn release(&mut self, gpu: &mut dyn Gpu);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Handle {
    Buffer(BufferId),
    VertexArray(VertexArrayId),
    Texture(TextureId),
    Framebuffer(FramebufferId),
}

/// Tracks the handles created while building a composite resource.
///
/// Dropping the scope deletes every tracked handle in reverse creation order, so an
/// early return with `?` cleans up whatever was created so far. [`commit`](Self::commit)
/// hands the handles over to the finished resource instead.
pub struct ResourceScope<'g> {
    gpu: &'g mut dyn Gpu,
    handles: Vec<Handle>,
}

impl<'g> ResourceScope<'g> {
    pub fn new(gpu: &'g mut dyn Gpu) -> Self {
        Self {
            gpu,
            handles: Vec::new(),
        }
    }

    /// The backend, for calls whose results are tracked separately.
    pub fn gpu(&mut self) -> &mut dyn Gpu {
        &mut *self.gpu
    }

    pub fn create_vertex_buffer(&mut self, data: &[u8]) -> Result<BufferId, GpuError> {
        let buffer = self.gpu.create_vertex_buffer(data)?;
        self.handles.push(Handle::Buffer(buffer));
        Ok(buffer)
    }

    pub fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        layout: VertexLayout,
    ) -> Result<VertexArrayId, GpuError> {
        let vao = self.gpu.create_vertex_array(buffer, layout)?;
        self.handles.push(Handle::VertexArray(vao));
        Ok(vao)
    }

    pub fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<(FramebufferId, TextureId), GpuError> {
        let (framebuffer, colour) = self.gpu.create_framebuffer(width, height)?;
        self.handles.push(Handle::Framebuffer(framebuffer));
        Ok((framebuffer, colour))
    }

    /// Track a texture created elsewhere.
    pub fn track_texture(&mut self, texture: TextureId) {
        self.handles.push(Handle::Texture(texture));
    }

    /// Track every map of `material`.
    pub fn track_material(&mut self, material: &Material) {
        for slot in MapSlot::ALL {
            if let Some(texture) = material.map(slot) {
                self.track_texture(texture.id());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Keep everything created in this scope.
    pub fn commit(mut self) {
        self.handles.clear();
    }
}

impl Drop for ResourceScope<'_> {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        log::debug!("releasing {} handles of an unfinished load", self.handles.len());
        for handle in self.handles.drain(..).rev() {
            match handle {
                Handle::Buffer(id) => self.gpu.delete_buffer(id),
                Handle::VertexArray(id) => self.gpu.delete_vertex_array(id),
                Handle::Texture(id) => self.gpu.delete_texture(id),
                Handle::Framebuffer(id) => self.gpu.delete_framebuffer(id),
            }
        }
    }
}

/// Seed a define table with the attribute slots and the material map flags.
pub fn default_shader_defines() -> ShaderDefines {
    let mut defines = ShaderDefines::new();
    register_shader_defines(
        &mut defines,
        [
            ("ATTR_POSITION", ATTR_POSITION),
            ("ATTR_NORMAL", ATTR_NORMAL),
            ("ATTR_TEXCOORD", ATTR_TEXCOORD),
        ],
    );
    register_map_flag_defines(&mut defines);
    defines
}

pub struct Context<G: Gpu> {
    pub gpu: G,
    pub assets: AssetLoader,
    pub formats: MeshFormatRegistry,
    defines: ShaderDefines,
    version: String,
    shaders: Shaders,
    fonts: HashMap<PathBuf, Rc<fontdue::Font>>,
}

impl<G: Gpu> Debug for Context<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("assets", &self.assets)
            .field("formats", &self.formats)
            .field("version", &self.version)
            .field("fonts", &self.fonts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<G: Gpu> Context<G> {
    /// Seed the define table, derive the `#version` header from the backend and compile
    /// the built-in shaders.
    pub fn new(mut gpu: G, assets: AssetLoader) -> Result<Self, ShaderError> {
        let defines = default_shader_defines();
        let version = version_header(&gpu.shading_language_version());
        log::info!("shader header [{}]", version);

        let shaders = Shaders::load(&mut ShaderCompiler {
            gpu: &mut gpu,
            assets: &assets,
            defines: &defines,
            version: &version,
        })?;

        Ok(Self {
            gpu,
            assets,
            formats: MeshFormatRegistry::with_builtin_formats(),
            defines,
            version,
            shaders,
            fonts: HashMap::new(),
        })
    }

    /// A copy of the define table.
    pub fn shader_defines(&self) -> ShaderDefines {
        self.defines.clone()
    }

    /// Add defines for shaders compiled from now on.
    pub fn register_shader_defines<V: Display>(
        &mut self,
        values: impl IntoIterator<Item = (&'static str, V)>,
    ) {
        register_shader_defines(&mut self.defines, values);
    }

    pub fn version_header(&self) -> &str {
        &self.version
    }

    pub fn shaders(&self) -> &Shaders {
        &self.shaders
    }

    pub fn compiler(&mut self) -> ShaderCompiler<'_> {
        ShaderCompiler {
            gpu: &mut self.gpu,
            assets: &self.assets,
            defines: &self.defines,
            version: &self.version,
        }
    }

    /// Compile and link a program from one file per stage.
    ///
    /// Only the uniforms in [`crate::gpu::UNIFORM_NAMES`] can be set on the result; other
    /// uniforms keep their GLSL defaults and setting them logs a warning.
    pub fn load_shader<P: AsRef<Path>>(&mut self, files: &[P]) -> Result<ShaderProgram, ShaderError> {
        ShaderProgram::from_files(&mut self.compiler(), files)
    }

    /// Load a model file with the format registered for its extension.
    pub fn load_mesh(&mut self, path: impl AsRef<Path>) -> Result<Mesh, LoadError> {
        let data = self.formats.load(&self.assets, path.as_ref())?;
        Mesh::load_from_data(&mut self.gpu, &self.assets, &data)
    }

    pub fn load_texture(&mut self, path: impl AsRef<Path>) -> Result<Texture, LoadError> {
        load_texture(&mut self.gpu, &self.assets, path.as_ref())
    }

    /// A parsed font, shared by every caller asking for the same cleaned path.
    pub fn font(&mut self, path: impl AsRef<Path>) -> Result<Rc<fontdue::Font>, LoadError> {
        let path = clean_path(path.as_ref());
        if let Some(font) = self.fonts.get(&path) {
            log::debug!("font [{}] from cache", path.display());
            return Ok(Rc::clone(font));
        }
        log::info!("loading font [{}]", path.display());
        let bytes = self.assets.load(&path)?;
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| LoadError::Font(e.to_string()))?;
        let font = Rc::new(font);
        self.fonts.insert(path, Rc::clone(&font));
        Ok(font)
    }

    /// Per-frame render state drawing with `camera` and `projection`.
    pub fn render_context<'a>(
        &'a mut self,
        camera: &'a Camera,
        projection: Matrix4<f32>,
    ) -> RenderContext<'a> {
        RenderContext::new(&mut self.gpu, &self.shaders, projection, camera)
    }

    /// Delete the built-in shaders and drop cached fonts.
    pub fn release(&mut self) {
        self.shaders.release(&mut self.gpu);
        self.fonts.clear();
    }
}
