//! `wgpu` implementation of [`Gpu`].
//!
//! GLSL stages are compiled through wgpu's GLSL front end. The immediate-mode calls of the
//! [`Gpu`] trait are recorded into render passes and submitted in [`Gpu::end_frame`]:
//!
//! - uniforms are shadowed in one std140 [`Globals`] block; every draw snapshots it and
//!   binds its snapshot through a dynamic offset into a per-frame uniform buffer
//! - texture units `0..TEXTURE_UNITS` map to bindings `0..TEXTURE_UNITS` of bind group 1,
//!   followed by a shared sampler
//! - a clear issued after something has been drawn to the same target starts a new pass
//! - attributes a vertex array does not carry are read from a zeroed, stride-0 buffer
//!
//! Pipelines are created lazily per program, vertex layout and target format.

use std::{borrow::Cow, collections::HashMap, num::NonZeroU64, sync::Arc};

use instant::Duration;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    error::GpuError,
    gpu::{
        declared_uniforms, BufferId, ClearFlags, FramebufferId, Gpu, ProgramId, ShaderId,
        ShaderStage, TextureId, UniformLocation, UniformValue, VertexArrayId, VertexLayout,
        ATTR_NORMAL, ATTR_POSITION, ATTR_TEXCOORD, TEXTURE_UNITS,
    },
};

/// The uniform block declared by `mvp.inc.glsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Globals {
    projection: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    mvp: [[f32; 4]; 4],
    camera: [f32; 4],
    ambient: [f32; 4],
    diffuse: [f32; 4],
    specular: [f32; 4],
    map_flags: i32,
    _padding: [i32; 3],
}

impl Default for Globals {
    fn default() -> Self {
        let identity = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        Self {
            projection: identity,
            view: identity,
            model: identity,
            mvp: identity,
            camera: [0.0; 4],
            ambient: [0.0; 4],
            diffuse: [0.0; 4],
            specular: [0.0; 4],
            map_flags: 0,
            _padding: [0; 3],
        }
    }
}

impl Globals {
    fn set(&mut self, location: UniformLocation, value: UniformValue) {
        use UniformValue::*;
        match (location.0, value) {
            (0, Mat4(m)) => self.projection = m,
            (1, Mat4(m)) => self.view = m,
            (2, Mat4(m)) => self.model = m,
            (3, Mat4(m)) => self.mvp = m,
            (4, Vec3([x, y, z])) => self.camera = [x, y, z, 1.0],
            (4, Vec4(v)) => self.camera = v,
            (5, Vec4(v)) => self.ambient = v,
            (6, Vec4(v)) => self.diffuse = v,
            (7, Vec4(v)) => self.specular = v,
            (8, Int(flags)) => self.map_flags = flags,
            // sampler uniforms: units are bound to fixed bindings
            (9..=13, Int(_)) => {}
            (loc, value) => log::warn!("uniform {} cannot hold {:?}", loc, value),
        }
    }

    /// Convert the GL-style projections to wgpu clip space.
    ///
    /// Depth goes from `-w..w` to `0..w`. Offscreen targets are also flipped vertically so
    /// their first row is the bottom one, like a GL framebuffer texture.
    fn to_clip_space(mut self, offscreen: bool) -> Self {
        for matrix in [&mut self.projection, &mut self.mvp] {
            for column in matrix.iter_mut() {
                column[2] = 0.5 * column[2] + 0.5 * column[3];
                if offscreen {
                    column[1] = -column[1];
                }
            }
        }
        self
    }
}

const COLOUR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// A texture with its default view.
#[derive(Debug)]
struct DeviceTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DeviceTexture {
    fn depth(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    fn colour(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
        label: &str,
    ) -> Self {
        let size = extent(width, height);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOUR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        if let Some(pixels) = pixels {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * size.width),
                    rows_per_image: Some(size.height),
                },
                size,
            );
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    }
}

/// Where the default framebuffer lives.
enum Target {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        colour: DeviceTexture,
        width: u32,
        height: u32,
    },
}

impl Target {
    fn format(&self) -> wgpu::TextureFormat {
        match self {
            Target::Surface { config, .. } => config.format,
            Target::Offscreen { .. } => COLOUR_FORMAT,
        }
    }
}

struct VertexArray {
    buffer: BufferId,
    layout: VertexLayout,
}

struct Framebuffer {
    colour: TextureId,
    depth: DeviceTexture,
}

struct Program {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    uniforms: Vec<(String, UniformLocation)>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    layout: VertexLayout,
    format: wgpu::TextureFormat,
}

struct Draw {
    pipeline: PipelineKey,
    vao: VertexArrayId,
    count: u32,
    globals: usize,
    units: [Option<TextureId>; TEXTURE_UNITS],
}

struct Pass {
    target: Option<FramebufferId>,
    colour: Option<wgpu::Color>,
    depth: bool,
    draws: Vec<Draw>,
}

pub struct WgpuGpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: Target,
    depth: DeviceTexture,
    globals_layout: wgpu::BindGroupLayout,
    textures_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    blank: DeviceTexture,
    zeros: wgpu::Buffer,
    next_handle: u32,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    arrays: HashMap<VertexArrayId, VertexArray>,
    textures: HashMap<TextureId, DeviceTexture>,
    framebuffers: HashMap<FramebufferId, Framebuffer>,
    shaders: HashMap<ShaderId, (ShaderStage, wgpu::ShaderModule, String)>,
    programs: HashMap<ProgramId, Program>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    program: Option<ProgramId>,
    globals: Globals,
    units: [Option<TextureId>; TEXTURE_UNITS],
    framebuffer: Option<FramebufferId>,
    snapshots: Vec<Globals>,
    passes: Vec<Pass>,
}

impl WgpuGpu {
    /// Render into the surface of `window`.
    pub async fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| GpuError::Surface(e.to_string()))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GpuError::NoAdapter(e.to_string()))?;
        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| GpuError::Surface("surface reports no formats".to_string()))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let (width, height) = (config.width, config.height);
        Ok(Self::with_target(
            device,
            queue,
            Target::Surface { surface, config },
            width,
            height,
        ))
    }

    /// Render into an offscreen colour texture instead of a window.
    pub async fn headless(width: u32, height: u32) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|e| GpuError::NoAdapter(e.to_string()))?;
        let (device, queue) = request_device(&adapter).await?;
        let colour = DeviceTexture::colour(&device, &queue, width, height, None, "default framebuffer");
        Ok(Self::with_target(
            device,
            queue,
            Target::Offscreen { colour, width, height },
            width,
            height,
        ))
    }

    fn with_target(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: Target,
        width: u32,
        height: u32,
    ) -> Self {
        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<Globals>() as u64),
                },
                count: None,
            }],
        });

        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = (0..TEXTURE_UNITS as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            })
            .collect();
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: TEXTURE_UNITS as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        let textures_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture_units_bind_group_layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, &textures_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let blank = DeviceTexture::colour(&device, &queue, 1, 1, Some(&[255, 255, 255, 255]), "blank");
        let zeros = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Missing Attributes Buffer"),
            contents: &[0u8; 32],
            usage: wgpu::BufferUsages::VERTEX,
        });
        let depth = DeviceTexture::depth(&device, width, height);

        Self {
            device,
            queue,
            target,
            depth,
            globals_layout,
            textures_layout,
            pipeline_layout,
            sampler,
            blank,
            zeros,
            next_handle: 1,
            buffers: HashMap::new(),
            arrays: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            program: None,
            globals: Globals::default(),
            units: [None; TEXTURE_UNITS],
            framebuffer: None,
            snapshots: Vec::new(),
            passes: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn target_format(&self, framebuffer: Option<FramebufferId>) -> wgpu::TextureFormat {
        match framebuffer {
            Some(_) => COLOUR_FORMAT,
            None => self.target.format(),
        }
    }

    /// The pass draws and clears currently go to, opened on demand.
    fn current_pass(&mut self) -> &mut Pass {
        let target = self.framebuffer;
        let reuse = self.passes.last().is_some_and(|pass| pass.target == target);
        if !reuse {
            self.passes.push(Pass {
                target,
                colour: None,
                depth: false,
                draws: Vec::new(),
            });
        }
        let last = self.passes.len() - 1;
        &mut self.passes[last]
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> bool {
        if self.pipelines.contains_key(&key) {
            return true;
        }
        let Some(program) = self.programs.get(&key.program) else {
            return false;
        };

        let stride = key.layout.stride() as wgpu::BufferAddress;
        let mut attributes = vec![wgpu::VertexAttribute {
            offset: 0,
            shader_location: ATTR_POSITION,
            format: wgpu::VertexFormat::Float32x3,
        }];
        let mut missing = Vec::new();
        if key.layout.normals {
            attributes.push(wgpu::VertexAttribute {
                offset: 12,
                shader_location: ATTR_NORMAL,
                format: wgpu::VertexFormat::Float32x3,
            });
        } else {
            missing.push(wgpu::VertexAttribute {
                offset: 0,
                shader_location: ATTR_NORMAL,
                format: wgpu::VertexFormat::Float32x3,
            });
        }
        if key.layout.texcoords {
            attributes.push(wgpu::VertexAttribute {
                offset: key.layout.texcoord_offset() as wgpu::BufferAddress,
                shader_location: ATTR_TEXCOORD,
                format: wgpu::VertexFormat::Float32x2,
            });
        } else {
            missing.push(wgpu::VertexAttribute {
                offset: 16,
                shader_location: ATTR_TEXCOORD,
                format: wgpu::VertexFormat::Float32x2,
            });
        }
        let mut buffers = vec![wgpu::VertexBufferLayout {
            array_stride: stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        if !missing.is_empty() {
            buffers.push(wgpu::VertexBufferLayout {
                array_stride: 0,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &missing,
            });
        }

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            cache: None,
            label: Some("Render Pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Some("main"),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.fragment,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });
        self.pipelines.insert(key, pipeline);
        true
    }

    fn texture_bind_group(&self, units: &[Option<TextureId>; TEXTURE_UNITS]) -> wgpu::BindGroup {
        let mut entries: Vec<wgpu::BindGroupEntry> = units
            .iter()
            .enumerate()
            .map(|(binding, unit)| {
                let view = unit
                    .and_then(|id| self.textures.get(&id))
                    .map_or(&self.blank.view, |texture| &texture.view);
                wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: wgpu::BindingResource::TextureView(view),
                }
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: TEXTURE_UNITS as u32,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texture_units_bind_group"),
            layout: &self.textures_layout,
            entries: &entries,
        })
    }

    /// Read back the offscreen default framebuffer as tightly packed RGBA8 rows.
    pub fn read_pixels(&self) -> Result<Vec<u8>, GpuError> {
        let Target::Offscreen { colour, width, height } = &self.target else {
            return Err(GpuError::Surface("only offscreen targets can be read back".to_string()));
        };
        let unpadded = 4 * width;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &colour.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(*height),
                },
            },
            extent(*width, *height),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = std::sync::mpsc::channel();
        let slice = output.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(3)),
            })
            .map_err(|e| GpuError::Backend(e.to_string()))?;
        rx.recv()
            .map_err(|e| GpuError::Backend(e.to_string()))?
            .map_err(|e| GpuError::Backend(e.to_string()))?;

        let data = slice.get_mapped_range();
        let pixels = data
            .chunks(padded as usize)
            .flat_map(|row| &row[..unpadded as usize])
            .copied()
            .collect();
        drop(data);
        output.unmap();
        Ok(pixels)
    }
}

async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), GpuError> {
    let device = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
            ..Default::default()
        })
        .await?;
    Ok(device)
}

impl Gpu for WgpuGpu {
    fn create_vertex_buffer(&mut self, data: &[u8]) -> Result<BufferId, GpuError> {
        let id = BufferId(self.next_id());
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: data,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn write_vertex_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GpuError> {
        let target = self.buffers.get(&buffer).ok_or(GpuError::InvalidHandle(buffer.0))?;
        self.queue.write_buffer(target, 0, data);
        Ok(())
    }

    fn resize_vertex_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GpuError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(GpuError::InvalidHandle(buffer.0));
        }
        let replacement = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: data,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        self.buffers.insert(buffer, replacement);
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        layout: VertexLayout,
    ) -> Result<VertexArrayId, GpuError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(GpuError::InvalidHandle(buffer.0));
        }
        let id = VertexArrayId(self.next_id());
        self.arrays.insert(id, VertexArray { buffer, layout });
        Ok(id)
    }

    fn delete_vertex_array(&mut self, vao: VertexArrayId) {
        self.arrays.remove(&vao);
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Result<TextureId, GpuError> {
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
        let id = TextureId(self.next_id());
        let texture = DeviceTexture::colour(&self.device, &self.queue, width, height, pixels, "texture");
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match self.units.get_mut(unit as usize) {
            Some(slot) => *slot = texture,
            None => log::warn!("texture unit {} does not exist", unit),
        }
    }

    fn shading_language_version(&self) -> String {
        "4.50 wgpu".to_string()
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        let naga_stage = match stage {
            ShaderStage::Vertex => wgpu::naga::ShaderStage::Vertex,
            ShaderStage::Fragment => wgpu::naga::ShaderStage::Fragment,
        };
        // validate up front so a bad shader is reported instead of raising a device error
        let mut frontend = wgpu::naga::front::glsl::Frontend::default();
        frontend
            .parse(&wgpu::naga::front::glsl::Options::from(naga_stage), source)
            .map_err(|errors| format!("{:?}", errors))?;

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("GLSL Shader"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source.to_string()),
                stage: naga_stage,
                defines: Default::default(),
            },
        });
        let id = ShaderId(self.next_id());
        self.shaders.insert(id, (stage, module, source.to_string()));
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn link_program(&mut self, shaders: &[ShaderId]) -> Result<ProgramId, String> {
        let mut vertex = None;
        let mut fragment = None;
        let mut sources = Vec::new();
        for id in shaders {
            let (stage, module, source) = self
                .shaders
                .get(id)
                .ok_or_else(|| format!("unknown shader {}", id.0))?;
            match stage {
                ShaderStage::Vertex => vertex = Some(module.clone()),
                ShaderStage::Fragment => fragment = Some(module.clone()),
            }
            sources.push(source.as_str());
        }
        let uniforms = declared_uniforms(sources);
        let (Some(vertex), Some(fragment)) = (vertex, fragment) else {
            return Err("a program needs a vertex and a fragment stage".to_string());
        };
        let id = ProgramId(self.next_id());
        self.programs.insert(id, Program { vertex, fragment, uniforms });
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.program = program;
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<(String, UniformLocation)> {
        self.programs
            .get(&program)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        self.globals.set(location, value);
    }

    fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<(FramebufferId, TextureId), GpuError> {
        let colour = TextureId(self.next_id());
        let texture = DeviceTexture::colour(&self.device, &self.queue, width, height, None, "framebuffer colour");
        self.textures.insert(colour, texture);
        let id = FramebufferId(self.next_id());
        let depth = DeviceTexture::depth(&self.device, width, height);
        self.framebuffers.insert(id, Framebuffer { colour, depth });
        Ok((id, colour))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(fb) = self.framebuffers.remove(&framebuffer) {
            self.textures.remove(&fb.colour);
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.framebuffer = framebuffer;
    }

    fn clear(&mut self, flags: ClearFlags, colour: [f32; 4]) {
        let target = self.framebuffer;
        let fresh = self
            .passes
            .last()
            .is_some_and(|pass| pass.target == target && pass.draws.is_empty());
        if !fresh {
            self.passes.push(Pass {
                target,
                colour: None,
                depth: false,
                draws: Vec::new(),
            });
        }
        let pass = self.current_pass();
        if flags.contains(ClearFlags::COLOUR) {
            let [r, g, b, a] = colour.map(f64::from);
            pass.colour = Some(wgpu::Color { r, g, b, a });
        }
        if flags.contains(ClearFlags::DEPTH) {
            pass.depth = true;
        }
    }

    fn draw_triangles(&mut self, vao: VertexArrayId, count: u32) {
        let Some(program) = self.program else {
            log::warn!("draw without a program in use");
            return;
        };
        let Some(layout) = self.arrays.get(&vao).map(|a| a.layout) else {
            log::warn!("draw of unknown vertex array {}", vao.0);
            return;
        };
        let key = PipelineKey {
            program,
            layout,
            format: self.target_format(self.framebuffer),
        };
        if !self.ensure_pipeline(key) {
            log::warn!("program {} is not linked", program.0);
            return;
        }
        self.snapshots
            .push(self.globals.to_clip_space(self.framebuffer.is_some()));
        let draw = Draw {
            pipeline: key,
            vao,
            count,
            globals: self.snapshots.len() - 1,
            units: self.units,
        };
        self.current_pass().draws.push(draw);
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Target::Surface { surface, config } = &mut self.target {
            config.width = width;
            config.height = height;
            surface.configure(&self.device, config);
            self.depth = DeviceTexture::depth(&self.device, width, height);
        }
    }

    fn end_frame(&mut self) -> Result<(), GpuError> {
        let passes = std::mem::take(&mut self.passes);
        let mut snapshots = std::mem::take(&mut self.snapshots);
        if snapshots.is_empty() {
            snapshots.push(Globals::default());
        }

        let (frame, default_view) = match &self.target {
            Target::Surface { surface, .. } => {
                let frame = surface
                    .get_current_texture()
                    .map_err(|e| GpuError::Surface(e.to_string()))?;
                let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                (Some(frame), view)
            }
            Target::Offscreen { colour, .. } => (None, colour.view.clone()),
        };

        let size = std::mem::size_of::<Globals>();
        let align = self.device.limits().min_uniform_buffer_offset_alignment as usize;
        let stride = size.div_ceil(align) * align;
        let mut bytes = vec![0u8; stride * snapshots.len()];
        for (idx, snapshot) in snapshots.iter().enumerate() {
            bytes[idx * stride..idx * stride + size].copy_from_slice(bytemuck::bytes_of(snapshot));
        }
        let globals_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globals Buffer"),
            contents: &bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let globals_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals_bind_group"),
            layout: &self.globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &globals_buffer,
                    offset: 0,
                    size: NonZeroU64::new(size as u64),
                }),
            }],
        });

        let mut texture_groups: HashMap<[Option<TextureId>; TEXTURE_UNITS], wgpu::BindGroup> =
            HashMap::new();
        for draw in passes.iter().flat_map(|pass| &pass.draws) {
            if !texture_groups.contains_key(&draw.units) {
                let group = self.texture_bind_group(&draw.units);
                texture_groups.insert(draw.units, group);
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Render Encoder") });
        for pass in &passes {
            let (colour_view, depth_view) = match pass.target.and_then(|id| self.framebuffers.get(&id)) {
                Some(fb) => match self.textures.get(&fb.colour) {
                    Some(colour) => (&colour.view, &fb.depth.view),
                    None => continue,
                },
                None if pass.target.is_some() => continue,
                None => (&default_view, &self.depth.view),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: colour_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: pass.colour.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: if pass.depth { wgpu::LoadOp::Clear(1.0) } else { wgpu::LoadOp::Load },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for draw in &pass.draws {
                let (Some(pipeline), Some(array), Some(textures)) = (
                    self.pipelines.get(&draw.pipeline),
                    self.arrays.get(&draw.vao),
                    texture_groups.get(&draw.units),
                ) else {
                    continue;
                };
                let Some(vertices) = self.buffers.get(&array.buffer) else {
                    continue;
                };
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &globals_group, &[(draw.globals * stride) as u32]);
                render_pass.set_bind_group(1, textures, &[]);
                render_pass.set_vertex_buffer(0, vertices.slice(..));
                if !(array.layout.normals && array.layout.texcoords) {
                    render_pass.set_vertex_buffer(1, self.zeros.slice(..));
                }
                render_pass.draw(0..draw.count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }
}
