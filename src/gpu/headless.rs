//! A backend that records calls instead of drawing.
//!
//! [`RecordingGpu`] hands out deterministic handles, keeps track of which resources are
//! alive and appends every state-changing call to a command log. It lets scene, loader
//! and shader code run without a GPU and makes their effect on the graphics API
//! observable.

use std::collections::{HashMap, HashSet};

use crate::{
    error::GpuError,
    gpu::{
        declared_uniforms, BufferId, ClearFlags, FramebufferId, Gpu, ProgramId, ShaderId,
        ShaderStage, TextureId, UniformLocation, UniformValue, VertexArrayId, VertexLayout,
        TEXTURE_UNITS, UNIFORM_NAMES,
    },
};

#[derive(Clone, Debug, PartialEq)]
pub enum GpuCommand {
    CreateBuffer { buffer: BufferId, size: usize },
    WriteBuffer { buffer: BufferId, size: usize },
    ResizeBuffer { buffer: BufferId, size: usize },
    DeleteBuffer(BufferId),
    CreateVertexArray { vao: VertexArrayId, buffer: BufferId, layout: VertexLayout },
    DeleteVertexArray(VertexArrayId),
    CreateTexture { texture: TextureId, width: u32, height: u32 },
    DeleteTexture(TextureId),
    BindTexture { unit: u32, texture: Option<TextureId> },
    CompileShader { shader: ShaderId, stage: ShaderStage },
    DeleteShader(ShaderId),
    LinkProgram { program: ProgramId, shaders: Vec<ShaderId> },
    DeleteProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    SetUniform { name: String, value: UniformValue },
    CreateFramebuffer { framebuffer: FramebufferId, colour: TextureId, width: u32, height: u32 },
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer(Option<FramebufferId>),
    Clear { flags: ClearFlags, colour: [f32; 4] },
    Draw {
        vao: VertexArrayId,
        count: u32,
        target: Option<FramebufferId>,
        textures: [Option<TextureId>; TEXTURE_UNITS],
    },
    EndFrame,
}

#[derive(Debug)]
pub struct RecordingGpu {
    version: String,
    next_handle: u32,
    commands: Vec<GpuCommand>,
    buffers: HashMap<BufferId, usize>,
    arrays: HashMap<VertexArrayId, BufferId>,
    textures: HashSet<TextureId>,
    shaders: HashMap<ShaderId, String>,
    programs: HashMap<ProgramId, Vec<(String, UniformLocation)>>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    units: [Option<TextureId>; TEXTURE_UNITS],
    framebuffer: Option<FramebufferId>,
    fail_compiles: bool,
    texture_budget: Option<usize>,
}

impl Default for RecordingGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self {
            version: "4.10 headless".to_string(),
            next_handle: 1,
            commands: Vec::new(),
            buffers: HashMap::new(),
            arrays: HashMap::new(),
            textures: HashSet::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            framebuffers: HashMap::new(),
            units: [None; TEXTURE_UNITS],
            framebuffer: None,
            fail_compiles: false,
            texture_budget: None,
        }
    }

    /// Report a different shading language version.
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Make every subsequent shader compilation fail.
    pub fn fail_compiles(&mut self, fail: bool) {
        self.fail_compiles = fail;
    }

    /// Let only `count` more textures be created; later attempts fail.
    pub fn limit_textures(&mut self, count: usize) {
        self.texture_budget = Some(count);
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Drain the command log.
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Sources of all shader stages compiled so far, in handle order.
    pub fn shader_sources(&self) -> Vec<&str> {
        let mut sources: Vec<_> = self.shaders.iter().collect();
        sources.sort_by_key(|(id, _)| **id);
        sources.into_iter().map(|(_, src)| src.as_str()).collect()
    }

    pub fn buffer_size(&self, buffer: BufferId) -> Option<usize> {
        self.buffers.get(&buffer).copied()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.arrays.len()
    }

    /// Live textures, framebuffer colour attachments included.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    fn next<T>(&mut self, wrap: impl FnOnce(u32) -> T) -> T {
        let id = self.next_handle;
        self.next_handle += 1;
        wrap(id)
    }
}

impl Gpu for RecordingGpu {
    fn create_vertex_buffer(&mut self, data: &[u8]) -> Result<BufferId, GpuError> {
        let buffer = self.next(BufferId);
        self.buffers.insert(buffer, data.len());
        self.commands.push(GpuCommand::CreateBuffer { buffer, size: data.len() });
        Ok(buffer)
    }

    fn write_vertex_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GpuError> {
        match self.buffers.get(&buffer) {
            Some(&size) if size == data.len() => {
                self.commands.push(GpuCommand::WriteBuffer { buffer, size });
                Ok(())
            }
            Some(size) => Err(GpuError::Backend(format!(
                "write of {} bytes into a buffer of {} bytes",
                data.len(),
                size
            ))),
            None => Err(GpuError::InvalidHandle(buffer.0)),
        }
    }

    fn resize_vertex_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GpuError> {
        let size = self
            .buffers
            .get_mut(&buffer)
            .ok_or(GpuError::InvalidHandle(buffer.0))?;
        *size = data.len();
        self.commands.push(GpuCommand::ResizeBuffer { buffer, size: data.len() });
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_some() {
            self.commands.push(GpuCommand::DeleteBuffer(buffer));
        }
    }

    fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        layout: VertexLayout,
    ) -> Result<VertexArrayId, GpuError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(GpuError::InvalidHandle(buffer.0));
        }
        let vao = self.next(VertexArrayId);
        self.arrays.insert(vao, buffer);
        self.commands.push(GpuCommand::CreateVertexArray { vao, buffer, layout });
        Ok(vao)
    }

    fn delete_vertex_array(&mut self, vao: VertexArrayId) {
        if self.arrays.remove(&vao).is_some() {
            self.commands.push(GpuCommand::DeleteVertexArray(vao));
        }
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Result<TextureId, GpuError> {
        if let Some(budget) = self.texture_budget.as_mut() {
            if *budget == 0 {
                return Err(GpuError::Backend("out of texture memory".to_string()));
            }
            *budget -= 1;
        }
        if let Some(pixels) = pixels {
            if pixels.len() != (width * height * 4) as usize {
                return Err(GpuError::Backend(format!(
                    "{} bytes of pixel data for a {}x{} texture",
                    pixels.len(),
                    width,
                    height
                )));
            }
        }
        let texture = self.next(TextureId);
        self.textures.insert(texture);
        self.commands.push(GpuCommand::CreateTexture { texture, width, height });
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture) {
            self.commands.push(GpuCommand::DeleteTexture(texture));
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        if let Some(slot) = self.units.get_mut(unit as usize) {
            *slot = texture;
        }
        self.commands.push(GpuCommand::BindTexture { unit, texture });
    }

    fn shading_language_version(&self) -> String {
        self.version.clone()
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        if self.fail_compiles {
            return Err("0:1: error: compilation disabled".to_string());
        }
        let shader = self.next(ShaderId);
        self.shaders.insert(shader, source.to_string());
        self.commands.push(GpuCommand::CompileShader { shader, stage });
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(&shader).is_some() {
            self.commands.push(GpuCommand::DeleteShader(shader));
        }
    }

    fn link_program(&mut self, shaders: &[ShaderId]) -> Result<ProgramId, String> {
        let sources = shaders
            .iter()
            .map(|id| {
                self.shaders
                    .get(id)
                    .map(String::as_str)
                    .ok_or_else(|| format!("unknown shader {}", id.0))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let uniforms = declared_uniforms(sources);
        let program = self.next(ProgramId);
        self.programs.insert(program, uniforms);
        self.commands.push(GpuCommand::LinkProgram { program, shaders: shaders.to_vec() });
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() {
            self.commands.push(GpuCommand::DeleteProgram(program));
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.commands.push(GpuCommand::UseProgram(program));
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<(String, UniformLocation)> {
        self.programs.get(&program).cloned().unwrap_or_default()
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let name = UNIFORM_NAMES
            .get(location.0 as usize)
            .map_or_else(|| format!("#{}", location.0), |name| name.to_string());
        self.commands.push(GpuCommand::SetUniform { name, value });
    }

    fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<(FramebufferId, TextureId), GpuError> {
        let colour = self.next(TextureId);
        self.textures.insert(colour);
        let framebuffer = self.next(FramebufferId);
        self.framebuffers.insert(framebuffer, colour);
        self.commands.push(GpuCommand::CreateFramebuffer { framebuffer, colour, width, height });
        Ok((framebuffer, colour))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(colour) = self.framebuffers.remove(&framebuffer) {
            self.textures.remove(&colour);
            self.commands.push(GpuCommand::DeleteFramebuffer(framebuffer));
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.framebuffer = framebuffer;
        self.commands.push(GpuCommand::BindFramebuffer(framebuffer));
    }

    fn clear(&mut self, flags: ClearFlags, colour: [f32; 4]) {
        self.commands.push(GpuCommand::Clear { flags, colour });
    }

    fn draw_triangles(&mut self, vao: VertexArrayId, count: u32) {
        self.commands.push(GpuCommand::Draw {
            vao,
            count,
            target: self.framebuffer,
            textures: self.units,
        });
    }

    fn end_frame(&mut self) -> Result<(), GpuError> {
        self.commands.push(GpuCommand::EndFrame);
        Ok(())
    }
}
