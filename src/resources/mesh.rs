//! Intermediate mesh records and the model format registry.
//!
//! Model loaders never touch the GPU. They return one [`MeshData`] per material group with
//! flat, already de-indexed vertex attributes and material descriptions whose texture
//! paths are resolved against the model file's directory. [`crate::data_structures::mesh::Mesh`]
//! turns the records into vertex buffers.

use std::{fmt::Debug, path::Path};

use crate::{
    data_structures::material::MaterialData,
    error::LoadError,
    gpu::VertexLayout,
    resources::{clean_path, AssetLoader},
};

/// One material group of a model.
///
/// `normals` and `texcoords` are either empty or hold one entry per vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub material: Option<MaterialData>,
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
}

impl MeshData {
    pub fn layout(&self) -> VertexLayout {
        VertexLayout {
            normals: !self.normals.is_empty(),
            texcoords: !self.texcoords.is_empty(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Interleave `position`, `normal?` and `texcoord?` per vertex.
    ///
    /// Missing entries in a present attribute array read as zero.
    pub fn interleave(&self) -> Vec<f32> {
        let layout = self.layout();
        let mut buf = Vec::with_capacity(self.vertices.len() * layout.components());
        for (i, position) in self.vertices.iter().enumerate() {
            buf.extend_from_slice(position);
            if layout.normals {
                buf.extend_from_slice(&self.normals.get(i).copied().unwrap_or_default());
            }
            if layout.texcoords {
                buf.extend_from_slice(&self.texcoords.get(i).copied().unwrap_or_default());
            }
        }
        buf
    }
}

/// Decodes one model file into material groups.
pub type MeshLoader = Box<dyn Fn(&AssetLoader, &Path) -> Result<Vec<MeshData>, LoadError>>;

struct MeshFormat {
    name: String,
    extensions: Vec<String>,
    loader: MeshLoader,
}

/// Maps lowercase file extensions to model loaders.
#[derive(Default)]
pub struct MeshFormatRegistry {
    formats: Vec<MeshFormat>,
}

impl Debug for MeshFormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.formats.iter().map(|format| (&format.name, &format.extensions)))
            .finish()
    }
}

impl MeshFormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in OBJ and FBX loaders.
    pub fn with_builtin_formats() -> Self {
        let mut registry = Self::new();
        super::obj::register(&mut registry);
        super::fbx::register(&mut registry);
        registry
    }

    /// # Arguments
    ///
    /// * `name` is used in log messages
    /// * `extensions` with or without the leading dot, matched case-insensitively; a later
    ///   registration for the same extension takes precedence
    pub fn register(
        &mut self,
        name: &str,
        extensions: &[&str],
        loader: impl Fn(&AssetLoader, &Path) -> Result<Vec<MeshData>, LoadError> + 'static,
    ) {
        let extensions = extensions
            .iter()
            .map(|ext| format!(".{}", ext.trim_start_matches('.').to_lowercase()))
            .collect();
        self.formats.push(MeshFormat {
            name: name.to_string(),
            extensions,
            loader: Box::new(loader),
        });
    }

    fn find(&self, path: &Path) -> Option<&MeshFormat> {
        let ext = format!(".{}", path.extension()?.to_str()?.to_lowercase());
        self.formats
            .iter()
            .rev()
            .find(|format| format.extensions.contains(&ext))
    }

    /// Name of the format that would load `path`.
    pub fn format_of(&self, path: &Path) -> Option<&str> {
        self.find(path).map(|format| format.name.as_str())
    }

    /// Decode `path` with the loader registered for its extension.
    pub fn load(&self, assets: &AssetLoader, path: &Path) -> Result<Vec<MeshData>, LoadError> {
        let path = clean_path(path);
        let format = self.find(&path).ok_or_else(|| LoadError::UnsupportedExtension {
            path: path.clone(),
        })?;
        log::info!("loading mesh [{}] as {}", path.display(), format.name);
        let groups = (format.loader)(assets, &path)?;
        if groups.is_empty() {
            return Err(LoadError::NoGeometry { path });
        }
        Ok(groups)
    }
}
