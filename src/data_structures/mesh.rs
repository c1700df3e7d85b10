//! GPU meshes.
//!
//! A [`Mesh`] is a non-empty list of [`MeshGroup`]s. Each group owns one interleaved
//! vertex buffer, the vertex array describing it and an optional [`Material`]. The vertex
//! layout of a group is fixed when it is created; later updates must keep it.

use crate::{
    context::{GpuResource, ResourceScope},
    data_structures::material::Material,
    error::LoadError,
    gpu::{BufferId, Gpu, VertexArrayId, VertexLayout},
    pipelines::shader::ShaderProgram,
    resources::{mesh::MeshData, AssetLoader},
};

#[derive(Debug)]
pub struct MeshGroup {
    buffer: BufferId,
    vao: VertexArrayId,
    /// Bytes currently allocated for `buffer`.
    size: usize,
    count: u32,
    layout: VertexLayout,
    material: Option<Material>,
}

impl MeshGroup {
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn vertex_array(&self) -> VertexArrayId {
        self.vao
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn vertex_count(&self) -> u32 {
        self.count
    }

    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    pub fn material(&self) -> Option<&Material> {
        self.material.as_ref()
    }

    pub fn material_mut(&mut self) -> Option<&mut Material> {
        self.material.as_mut()
    }

    /// Bind the material, draw, then unbind the material again.
    pub fn render(&self, gpu: &mut dyn Gpu, program: &ShaderProgram) {
        if let Some(material) = &self.material {
            material.bind(gpu, program);
        }
        gpu.draw_triangles(self.vao, self.count);
        if let Some(material) = &self.material {
            material.unbind(gpu);
        }
    }
}

impl GpuResource for MeshGroup {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        if let Some(material) = self.material.as_mut() {
            material.release(gpu);
        }
        gpu.delete_vertex_array(self.vao);
        gpu.delete_buffer(self.buffer);
    }
}

#[derive(Debug)]
pub struct Mesh {
    groups: Vec<MeshGroup>,
}

impl Mesh {
    /// Upload every group and load the textures of its material.
    ///
    /// If anything fails, all buffers, vertex arrays and textures created so far are
    /// deleted before the error is returned.
    pub fn load_from_data(
        gpu: &mut dyn Gpu,
        assets: &AssetLoader,
        data: &[MeshData],
    ) -> Result<Self, LoadError> {
        if data.is_empty() {
            return Err(LoadError::EmptyMesh);
        }

        let mut scope = ResourceScope::new(gpu);
        let mut groups = Vec::with_capacity(data.len());
        for group in data {
            let layout = group.layout();
            let vertices = group.interleave();
            let bytes: &[u8] = bytemuck::cast_slice(&vertices);

            let buffer = scope.create_vertex_buffer(bytes)?;
            let vao = scope.create_vertex_array(buffer, layout)?;
            let material = match &group.material {
                Some(data) => {
                    let material = Material::from_data(scope.gpu(), assets, data)?;
                    scope.track_material(&material);
                    Some(material)
                }
                None => None,
            };
            groups.push(MeshGroup {
                buffer,
                vao,
                size: bytes.len(),
                count: group.vertex_count() as u32,
                layout,
                material,
            });
        }
        scope.commit();
        Ok(Self { groups })
    }

    /// Replace the vertex data of every group.
    ///
    /// `data` must have one entry per group, each with the layout the group was created
    /// with; otherwise nothing is written and [`LoadError::LayoutMismatch`] is returned.
    /// A buffer is overwritten in place when the new data has the same byte size and
    /// reallocated otherwise. Materials are left untouched.
    pub fn update_data(&mut self, gpu: &mut dyn Gpu, data: &[MeshData]) -> Result<(), LoadError> {
        if data.len() != self.groups.len() {
            return Err(LoadError::LayoutMismatch(format!(
                "{} groups given, mesh has {}",
                data.len(),
                self.groups.len()
            )));
        }
        if let Some((idx, (group, new))) = self
            .groups
            .iter()
            .zip(data)
            .enumerate()
            .find(|(_, (group, new))| group.layout != new.layout())
        {
            return Err(LoadError::LayoutMismatch(format!(
                "group {}: {:?} given, created with {:?}",
                idx,
                new.layout(),
                group.layout
            )));
        }

        for (group, new) in self.groups.iter_mut().zip(data) {
            let vertices = new.interleave();
            let bytes: &[u8] = bytemuck::cast_slice(&vertices);
            if bytes.len() == group.size {
                gpu.write_vertex_buffer(group.buffer, bytes)?;
            } else {
                gpu.resize_vertex_buffer(group.buffer, bytes)?;
                group.size = bytes.len();
            }
            group.count = new.vertex_count() as u32;
        }
        Ok(())
    }

    pub fn groups(&self) -> &[MeshGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [MeshGroup] {
        &mut self.groups
    }

    /// Draw every group with `program`, which must be in use.
    pub fn render(&self, gpu: &mut dyn Gpu, program: &ShaderProgram) {
        for group in &self.groups {
            group.render(gpu, program);
        }
    }
}

impl GpuResource for Mesh {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        for group in self.groups.iter_mut() {
            group.release(gpu);
        }
        self.groups.clear();
    }
}

/// A screen-space rectangle as two triangles.
///
/// # Arguments
///
/// * `dst` the corners `(x0, y0, x1, y1)` of the rectangle, at `z = 0`
/// * `src` the texture coordinates `(u0, v0, u1, v1)` mapped onto those corners
pub fn quad_mesh_data(dst: [f32; 4], src: [f32; 4]) -> MeshData {
    let [x0, y0, x1, y1] = dst;
    let [u0, v0, u1, v1] = src;
    MeshData {
        name: "quad".to_string(),
        material: None,
        vertices: vec![
            [x1, y0, 0.0],
            [x1, y1, 0.0],
            [x0, y1, 0.0],
            [x1, y0, 0.0],
            [x0, y1, 0.0],
            [x0, y0, 0.0],
        ],
        normals: Vec::new(),
        texcoords: vec![
            [u1, v1],
            [u1, v0],
            [u0, v0],
            [u1, v1],
            [u0, v0],
            [u0, v1],
        ],
    }
}
