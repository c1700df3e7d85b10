use std::path::{Path, PathBuf};

use dusk_ngin::{context::GpuResource, data_structures::material::MapSlot, error::LoadError};

use crate::common::test_utils::{context_with, png_bytes};
mod common;

const TRIANGLE: &str = "mtllib tri.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl red\nf 1 2 3\n";
const TRIANGLE_MTL: &str = "newmtl red\nKd 1 0 0\nmap_Kd red.png\n";

#[test]
fn single_triangle_with_sidecar_material() {
    let ctx = context_with(vec![
        ("models/tri.obj", TRIANGLE.as_bytes().to_vec()),
        ("models/tri.mtl", TRIANGLE_MTL.as_bytes().to_vec()),
    ]);
    let groups = ctx.formats.load(&ctx.assets, Path::new("models/tri.obj")).unwrap();

    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.vertices, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    assert!(group.normals.is_empty());
    assert!(group.texcoords.is_empty());

    let material = group.material.as_ref().unwrap();
    assert_eq!(material.name, "red");
    assert_eq!(material.diffuse, [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(material.ambient, [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(material.map(MapSlot::Diffuse), Some(&PathBuf::from("models/red.png")));
}

#[test]
fn triangle_without_material_library() {
    let ctx = context_with(vec![("tri.obj", b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n".to_vec())]);
    let groups = ctx.formats.load(&ctx.assets, Path::new("tri.obj")).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].vertex_count(), 3);
    assert!(groups[0].material.is_none());
}

#[test]
fn quad_expands_to_two_triangles() {
    let source = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\nf 1/1 2/2 3/3 4/4\n";
    let ctx = context_with(vec![("quad.obj", source.as_bytes().to_vec())]);
    let groups = ctx.formats.load(&ctx.assets, Path::new("quad.obj")).unwrap();

    let group = &groups[0];
    assert_eq!(group.vertex_count(), 6);
    let expected = [0, 1, 2, 2, 3, 0].map(|i| [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]][i]);
    assert_eq!(group.texcoords, expected.to_vec());
    assert!(group.normals.is_empty());
}

#[test]
fn negative_indices_and_normals() {
    let source = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf -3//1 -2//1 -1//1\n";
    let ctx = context_with(vec![("neg.obj", source.as_bytes().to_vec())]);
    let groups = ctx.formats.load(&ctx.assets, Path::new("neg.obj")).unwrap();
    assert_eq!(groups[0].vertices[0], [0.0, 0.0, 0.0]);
    assert_eq!(groups[0].vertices[2], [0.0, 1.0, 0.0]);
    assert_eq!(groups[0].normals, vec![[0.0, 0.0, 1.0]; 3]);
}

#[test]
fn usemtl_splits_groups() {
    let source = "mtllib m.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl a\nf 1 2 3\nusemtl b\nf 3 2 1\n";
    let mtl = "newmtl a\nKd 1 0 0\nnewmtl b\nKd 0 1 0\n";
    let ctx = context_with(vec![
        ("m.obj", source.as_bytes().to_vec()),
        ("m.mtl", mtl.as_bytes().to_vec()),
    ]);
    let groups = ctx.formats.load(&ctx.assets, Path::new("m.obj")).unwrap();
    let names: Vec<_> = groups.iter().map(|g| g.material.as_ref().unwrap().name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn file_without_faces_has_no_geometry() {
    let ctx = context_with(vec![("empty.obj", b"v 0 0 0\n".to_vec())]);
    let result = ctx.formats.load(&ctx.assets, Path::new("empty.obj"));
    assert!(matches!(result, Err(LoadError::NoGeometry { .. })));
}

#[test]
fn unknown_extension_is_unsupported() {
    let ctx = context_with(vec![("model.gltf", Vec::new())]);
    let result = ctx.formats.load(&ctx.assets, Path::new("model.gltf"));
    assert!(matches!(result, Err(LoadError::UnsupportedExtension { .. })));
}

#[test]
fn extensions_match_case_insensitively() {
    let ctx = context_with(vec![]);
    assert_eq!(ctx.formats.format_of(Path::new("A.OBJ")), Some("obj"));
    assert_eq!(ctx.formats.format_of(Path::new("b.Fbx")), Some("fbx"));
}

#[test]
fn loaded_mesh_owns_its_textures() {
    let mut ctx = context_with(vec![
        ("models/tri.obj", TRIANGLE.as_bytes().to_vec()),
        ("models/tri.mtl", TRIANGLE_MTL.as_bytes().to_vec()),
        ("models/red.png", png_bytes([255, 0, 0, 255])),
    ]);
    let mut mesh = ctx.load_mesh("models/tri.obj").unwrap();
    let material = mesh.groups()[0].material().unwrap();
    assert!(material.map(MapSlot::Diffuse).is_some());
    assert_eq!(ctx.gpu.live_textures(), 1);

    mesh.release(&mut ctx.gpu);
    assert_eq!(ctx.gpu.live_textures(), 0);
    assert_eq!(ctx.gpu.live_buffers(), 0);
}
