use std::path::PathBuf;

use dusk_ngin::{
    context::GpuResource,
    data_structures::material::{MapFlags, MapSlot, Material, MaterialData},
    error::LoadError,
    gpu::{headless::GpuCommand, UniformValue},
};

use crate::common::test_utils::{context_with, png_bytes};
mod common;

const DEFAULT_SHADER: [&str; 2] = ["data/shaders/default.vs.glsl", "data/shaders/default.fs.glsl"];

fn uniform_writes(commands: &[GpuCommand], uniform: &str) -> Vec<UniformValue> {
    commands
        .iter()
        .filter_map(|c| match c {
            GpuCommand::SetUniform { name, value } if name == uniform => Some(*value),
            _ => None,
        })
        .collect()
}

#[test]
fn bind_writes_the_flags_of_present_maps_once() {
    let mut ctx = context_with(vec![
        ("diffuse.png", png_bytes([255, 255, 255, 255])),
        ("normal.png", png_bytes([128, 128, 255, 255])),
    ]);
    let program = ctx.load_shader(&DEFAULT_SHADER).unwrap();
    let data = MaterialData {
        name: "textured".to_string(),
        ambient: [0.1, 0.2, 0.3, 1.0],
        diffuse_map: Some(PathBuf::from("diffuse.png")),
        normal_map: Some(PathBuf::from("normal.png")),
        ..Default::default()
    };
    let material = Material::from_data(&mut ctx.gpu, &ctx.assets, &data).unwrap();
    assert_eq!(material.flags(), MapFlags::DIFFUSE | MapFlags::NORMAL);

    ctx.gpu.take_commands();
    program.bind(&mut ctx.gpu);
    let flags = material.bind(&mut ctx.gpu, &program);
    assert_eq!(flags, MapFlags::DIFFUSE | MapFlags::NORMAL);

    let commands = ctx.gpu.take_commands();
    assert_eq!(uniform_writes(&commands, "uMapFlags"), vec![UniformValue::Int(10)]);
    assert_eq!(uniform_writes(&commands, "uAmbient"), vec![UniformValue::Vec4([0.1, 0.2, 0.3, 1.0])]);
    let diffuse = material.map(MapSlot::Diffuse).unwrap().id();
    assert!(commands.contains(&GpuCommand::BindTexture { unit: 1, texture: Some(diffuse) }));
    assert!(matches!(commands.last(), Some(GpuCommand::SetUniform { name, .. }) if name == "uMapFlags"));
}

#[test]
fn material_without_maps_writes_zero_flags_and_colours() {
    let mut ctx = context_with(vec![]);
    let program = ctx.load_shader(&DEFAULT_SHADER).unwrap();
    let data = MaterialData {
        diffuse: [1.0, 0.0, 0.0, 1.0],
        ..Default::default()
    };
    let material = Material::from_data(&mut ctx.gpu, &ctx.assets, &data).unwrap();

    ctx.gpu.take_commands();
    program.bind(&mut ctx.gpu);
    assert_eq!(material.bind(&mut ctx.gpu, &program), MapFlags::empty());

    let commands = ctx.gpu.take_commands();
    assert_eq!(uniform_writes(&commands, "uMapFlags"), vec![UniformValue::Int(0)]);
    assert_eq!(uniform_writes(&commands, "uDiffuse"), vec![UniformValue::Vec4([1.0, 0.0, 0.0, 1.0])]);
    assert!(!commands
        .iter()
        .any(|c| matches!(c, GpuCommand::BindTexture { texture: Some(_), .. })));
}

#[test]
fn unbind_clears_every_unit() {
    let mut ctx = context_with(vec![("diffuse.png", png_bytes([0, 0, 0, 255]))]);
    let data = MaterialData {
        diffuse_map: Some(PathBuf::from("diffuse.png")),
        ..Default::default()
    };
    let material = Material::from_data(&mut ctx.gpu, &ctx.assets, &data).unwrap();
    ctx.gpu.take_commands();

    material.unbind(&mut ctx.gpu);
    let cleared: Vec<_> = ctx
        .gpu
        .commands()
        .iter()
        .filter_map(|c| match c {
            GpuCommand::BindTexture { unit, texture: None } => Some(*unit),
            _ => None,
        })
        .collect();
    assert_eq!(cleared, vec![0, 1, 2, 3]);
}

#[test]
fn failed_map_releases_the_maps_loaded_before_it() {
    let mut ctx = context_with(vec![("diffuse.png", png_bytes([0, 0, 0, 255]))]);
    let data = MaterialData {
        diffuse_map: Some(PathBuf::from("diffuse.png")),
        specular_map: Some(PathBuf::from("missing.png")),
        ..Default::default()
    };
    let result = Material::from_data(&mut ctx.gpu, &ctx.assets, &data);
    assert!(matches!(result, Err(LoadError::NotFound { .. })));
    assert_eq!(ctx.gpu.live_textures(), 0);
}

#[test]
fn release_deletes_all_maps() {
    let mut ctx = context_with(vec![("a.png", png_bytes([0; 4])), ("b.png", png_bytes([0; 4]))]);
    let data = MaterialData {
        ambient_map: Some(PathBuf::from("a.png")),
        specular_map: Some(PathBuf::from("b.png")),
        ..Default::default()
    };
    let mut material = Material::from_data(&mut ctx.gpu, &ctx.assets, &data).unwrap();
    assert_eq!(ctx.gpu.live_textures(), 2);
    material.release(&mut ctx.gpu);
    assert_eq!(ctx.gpu.live_textures(), 0);
    assert_eq!(material.flags(), MapFlags::empty());
}
