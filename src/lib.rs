//! dusk-ngin
//!
//! A small real-time 3D engine built around an entity/component scene graph. Meshes
//! are loaded from Wavefront OBJ and binary FBX files, shaders are plain GLSL run
//! through a small preprocessor, and every graphics call goes through the [`gpu::Gpu`]
//! trait so the engine runs on `wgpu` or headless.
//!
//! High-level modules
//! - `camera`: camera and perspective projection
//! - `components`: built-in components (models, UI images and text, rotator)
//! - `context`: the engine context owning the backend, assets, shaders and fonts
//! - `data_structures`: meshes, materials, textures and the scene graph
//! - `error`: typed library errors
//! - `flow`: the application loop and the scene it drives
//! - `gpu`: the graphics backend trait and its implementations
//! - `pipelines`: shader preprocessing, programs and the built-in shaders
//! - `render`: per-frame render state
//! - `resources`: asset sources and mesh file loaders
//!

pub mod camera;
pub mod components;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod gpu;
pub mod pipelines;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use context::{Context, GpuResource};
pub use data_structures::scene_graph::{Component, Entity, Layer, SceneLayer};
pub use error::{GpuError, LoadError, ShaderError};
pub use flow::{run, AppConfig, GraphicsFlow, Scene, UpdateContext};
pub use winit::event::WindowEvent;
