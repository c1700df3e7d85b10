//! Error types.
//!
//! Library operations return one of the typed errors below; the application layer
//! ([`crate::flow`]) wraps them in [`anyhow::Error`].
//!
//! # Key types
//!
//! - [`LoadError`] covers asset, texture, mesh and model-file failures
//! - [`ShaderError`] covers preprocessing, compilation and linking
//! - [`GpuError`] covers failures reported by a [`crate::gpu::Gpu`] backend

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    /// No registered asset source could provide the file.
    #[error("asset not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported mesh format: {path:?}")]
    UnsupportedExtension { path: PathBuf },

    #[error("invalid file header in {path:?}")]
    BadMagic { path: PathBuf },

    #[error("unexpected end of data at byte {offset}")]
    Truncated { offset: usize },

    #[error("invalid property type {tag:?} at byte {offset}")]
    InvalidProperty { tag: char, offset: usize },

    #[error("nodes nested deeper than {limit} levels at byte {offset}")]
    NestingTooDeep { offset: usize, limit: usize },

    #[error("failed to decompress array: {0}")]
    Decompress(std::io::Error),

    #[error("FBX has no 'Objects' node")]
    MissingObjects,

    #[error("no objects loaded from {path:?}")]
    NoGeometry { path: PathBuf },

    #[error("a mesh needs at least one group")]
    EmptyMesh,

    /// `update_data` was given groups that do not match the uploaded layout.
    #[error("mesh update does not match the uploaded layout: {0}")]
    LayoutMismatch(String),

    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("font parsing failed: {0}")]
    Font(String),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("cannot determine shader stage of {path:?}")]
    UnknownStage { path: PathBuf },

    /// Conditional blocks do not nest.
    #[error("{file}:{line}: nested #ifdef/#ifndef is not supported")]
    NestedConditional { file: String, line: usize },

    #[error("{file}: #include nesting is too deep")]
    IncludeDepth { file: String },

    #[error("failed to compile shader {name}: {log}")]
    Compile { name: String, log: String },

    #[error("failed to link program: {log}")]
    Link { log: String },

    #[error(transparent)]
    Load(#[from] LoadError),
}

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("no suitable GPU adapter found: {0}")]
    NoAdapter(String),

    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("unknown GPU handle {0}")]
    InvalidHandle(u32),

    #[error("GPU backend error: {0}")]
    Backend(String),
}
