use std::path::PathBuf;

use dusk_ngin::{
    context::GpuResource,
    data_structures::{
        material::{MapSlot, MaterialData},
        mesh::Mesh,
    },
    error::LoadError,
    gpu::headless::GpuCommand,
    resources::mesh::MeshData,
};

use crate::common::test_utils::{context_with, png_bytes};
mod common;

fn triangle(material: Option<MaterialData>) -> MeshData {
    MeshData {
        name: "tri".to_string(),
        material,
        vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        normals: vec![[0.0, 0.0, 1.0]; 3],
        texcoords: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
    }
}

fn textured(path: &str) -> MaterialData {
    MaterialData {
        diffuse_map: Some(PathBuf::from(path)),
        ..Default::default()
    }
}

#[test]
fn groups_are_uploaded_interleaved() {
    let mut ctx = context_with(vec![]);
    let mesh = Mesh::load_from_data(&mut ctx.gpu, &ctx.assets, &[triangle(None), triangle(None)]).unwrap();

    assert_eq!(mesh.groups().len(), 2);
    let group = &mesh.groups()[0];
    assert_eq!(group.vertex_count(), 3);
    assert_eq!(group.size(), 3 * 8 * 4);
    assert!(group.layout().normals && group.layout().texcoords);
    assert_eq!(ctx.gpu.buffer_size(group.buffer()), Some(96));
}

#[test]
fn bigger_update_reallocates() {
    let mut ctx = context_with(vec![]);
    let mut mesh = Mesh::load_from_data(&mut ctx.gpu, &ctx.assets, &[triangle(None)]).unwrap();
    let buffer = mesh.groups()[0].buffer();
    ctx.gpu.take_commands();

    let mut bigger = triangle(None);
    bigger.vertices.extend_from_within(..);
    bigger.normals.extend_from_within(..);
    bigger.texcoords.extend_from_within(..);
    mesh.update_data(&mut ctx.gpu, &[bigger]).unwrap();

    assert_eq!(ctx.gpu.commands(), &[GpuCommand::ResizeBuffer { buffer, size: 192 }]);
    assert_eq!(mesh.groups()[0].vertex_count(), 6);
}

#[test]
fn failed_group_releases_everything_created_before() {
    let mut ctx = context_with(vec![
        ("a.png", png_bytes([255, 0, 0, 255])),
        ("b.png", png_bytes([0, 255, 0, 255])),
    ]);
    ctx.gpu.limit_textures(1);

    let result = Mesh::load_from_data(
        &mut ctx.gpu,
        &ctx.assets,
        &[triangle(Some(textured("a.png"))), triangle(Some(textured("b.png")))],
    );
    assert!(matches!(result, Err(LoadError::Gpu(_))));
    assert_eq!(ctx.gpu.live_buffers(), 0);
    assert_eq!(ctx.gpu.live_vertex_arrays(), 0);
    assert_eq!(ctx.gpu.live_textures(), 0);
}

#[test]
fn missing_texture_in_a_later_group_leaks_nothing() {
    let mut ctx = context_with(vec![("a.png", png_bytes([255, 0, 0, 255]))]);
    let result = Mesh::load_from_data(
        &mut ctx.gpu,
        &ctx.assets,
        &[triangle(Some(textured("a.png"))), triangle(Some(textured("nope.png")))],
    );
    assert!(matches!(result, Err(LoadError::NotFound { .. })));
    assert_eq!(ctx.gpu.live_buffers(), 0);
    assert_eq!(ctx.gpu.live_textures(), 0);
}

#[test]
fn render_binds_draws_and_unbinds_per_group() {
    let mut ctx = context_with(vec![("a.png", png_bytes([255, 0, 0, 255]))]);
    let program = ctx
        .load_shader(&["data/shaders/default.vs.glsl", "data/shaders/default.fs.glsl"])
        .unwrap();
    let groups = [triangle(Some(textured("a.png"))), triangle(None)];
    let mesh = Mesh::load_from_data(&mut ctx.gpu, &ctx.assets, &groups).unwrap();
    let diffuse = mesh.groups()[0].material().unwrap().map(MapSlot::Diffuse).unwrap().id();
    ctx.gpu.take_commands();

    program.bind(&mut ctx.gpu);
    mesh.render(&mut ctx.gpu, &program);

    let draws: Vec<_> = ctx
        .gpu
        .commands()
        .iter()
        .filter_map(|c| match c {
            GpuCommand::Draw { count, textures, .. } => Some((*count, textures[1])),
            _ => None,
        })
        .collect();
    assert_eq!(draws, vec![(3, Some(diffuse)), (3, None)]);
    let unbinds = ctx
        .gpu
        .commands()
        .iter()
        .filter(|c| matches!(c, GpuCommand::BindTexture { texture: None, .. }))
        .count();
    assert_eq!(unbinds, 4);
}

#[test]
fn release_deletes_buffers_arrays_and_textures() {
    let mut ctx = context_with(vec![("a.png", png_bytes([255, 0, 0, 255]))]);
    let mut mesh = Mesh::load_from_data(&mut ctx.gpu, &ctx.assets, &[triangle(Some(textured("a.png")))]).unwrap();
    mesh.release(&mut ctx.gpu);
    assert_eq!(ctx.gpu.live_buffers(), 0);
    assert_eq!(ctx.gpu.live_vertex_arrays(), 0);
    assert_eq!(ctx.gpu.live_textures(), 0);
    assert!(mesh.groups().is_empty());
}
