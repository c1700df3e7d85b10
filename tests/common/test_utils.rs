#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::{self, Write},
    path::{Path, PathBuf},
};

use dusk_ngin::{
    context::Context,
    gpu::headless::RecordingGpu,
    resources::{clean_path, AssetLoader},
};
use flate2::{write::ZlibEncoder, Compression};

/// An asset source answering from a map of in-memory files.
pub fn memory_source(files: Vec<(&str, Vec<u8>)>) -> impl Fn(&Path) -> io::Result<Vec<u8>> + 'static {
    let files: HashMap<PathBuf, Vec<u8>> = files
        .into_iter()
        .map(|(path, bytes)| (clean_path(Path::new(path)), bytes))
        .collect();
    move |path: &Path| {
        files
            .get(&clean_path(path))
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

/// A headless context whose assets come from `files` (plus the built-in shaders).
pub fn context_with(files: Vec<(&str, Vec<u8>)>) -> Context<RecordingGpu> {
    let mut assets = AssetLoader::with_defaults("does-not-exist");
    assets.register(memory_source(files));
    Context::new(RecordingGpu::new(), assets).unwrap()
}

/// A 1x1 PNG of a single colour.
pub fn png_bytes(rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(1, 1, image::Rgba(rgba));
    let mut out = io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[derive(Clone, Debug)]
pub enum Prop {
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    F64Array { values: Vec<f64>, compressed: bool },
    I32Array { values: Vec<i32>, compressed: bool },
}

pub fn s(value: &str) -> Prop {
    Prop::Str(value.to_string())
}

pub fn doubles(values: &[f64]) -> Prop {
    Prop::F64Array {
        values: values.to_vec(),
        compressed: false,
    }
}

pub fn ints(values: &[i32]) -> Prop {
    Prop::I32Array {
        values: values.to_vec(),
        compressed: false,
    }
}

/// One record of a binary FBX file.
#[derive(Clone, Debug, Default)]
pub struct FbxNode {
    pub name: String,
    pub props: Vec<Prop>,
    pub children: Vec<FbxNode>,
}

impl FbxNode {
    pub fn new(name: &str, props: Vec<Prop>) -> Self {
        Self {
            name: name.to_string(),
            props,
            children: Vec::new(),
        }
    }

    pub fn with(mut self, children: Vec<FbxNode>) -> Self {
        self.children = children;
        self
    }

    /// A `P` entry of a `Properties70` block holding a colour or vector.
    pub fn vector(name: &str, [x, y, z]: [f64; 3]) -> Self {
        Self::new(
            "P",
            vec![s(name), s("Vector3D"), s("Vector"), s("A"), Prop::F64(x), Prop::F64(y), Prop::F64(z)],
        )
    }

    /// A `C` connection record.
    pub fn connection(kind: &str, from: i64, to: i64, bind: Option<&str>) -> Self {
        let mut props = vec![s(kind), Prop::I64(from), Prop::I64(to)];
        if let Some(bind) = bind {
            props.push(s(bind));
        }
        Self::new("C", props)
    }
}

fn encode_array<T: Copy>(out: &mut Vec<u8>, tag: u8, values: &[T], compressed: bool, bytes: impl Fn(T) -> Vec<u8>) {
    let raw: Vec<u8> = values.iter().flat_map(|v| bytes(*v)).collect();
    out.push(tag);
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    if compressed {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let packed = encoder.finish().unwrap();
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        out.extend_from_slice(&packed);
    } else {
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        out.extend_from_slice(&raw);
    }
}

fn encode_prop(out: &mut Vec<u8>, prop: &Prop) {
    match prop {
        Prop::I32(v) => {
            out.push(b'I');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Prop::I64(v) => {
            out.push(b'L');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Prop::F64(v) => {
            out.push(b'D');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Prop::Str(v) => {
            out.push(b'S');
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v.as_bytes());
        }
        Prop::F64Array { values, compressed } => {
            encode_array(out, b'd', values, *compressed, |v| v.to_le_bytes().to_vec())
        }
        Prop::I32Array { values, compressed } => {
            encode_array(out, b'i', values, *compressed, |v| v.to_le_bytes().to_vec())
        }
    }
}

fn write_field(out: &mut Vec<u8>, value: usize, wide: bool) {
    if wide {
        out.extend_from_slice(&(value as u64).to_le_bytes());
    } else {
        out.extend_from_slice(&(value as u32).to_le_bytes());
    }
}

fn null_record(out: &mut Vec<u8>, wide: bool) {
    let len = if wide { 25 } else { 13 };
    out.extend(std::iter::repeat_n(0u8, len));
}

fn encode_node(out: &mut Vec<u8>, node: &FbxNode, wide: bool) {
    let mut props = Vec::new();
    for prop in &node.props {
        encode_prop(&mut props, prop);
    }

    let start = out.len();
    write_field(out, 0, wide);
    write_field(out, node.props.len(), wide);
    write_field(out, props.len(), wide);
    out.push(node.name.len() as u8);
    out.extend_from_slice(node.name.as_bytes());
    out.extend_from_slice(&props);
    for child in &node.children {
        encode_node(out, child, wide);
    }
    if !node.children.is_empty() {
        null_record(out, wide);
    }

    let end = out.len();
    let mut patched = Vec::new();
    write_field(&mut patched, end, wide);
    out[start..start + patched.len()].copy_from_slice(&patched);
}

/// Serialise `nodes` as a binary FBX file of `version`.
pub fn fbx_bytes(version: u32, nodes: &[FbxNode]) -> Vec<u8> {
    let wide = version >= 7500;
    let mut out = b"Kaydara FBX Binary  \x00".to_vec();
    out.extend_from_slice(&[0x1a, 0x00]);
    out.extend_from_slice(&version.to_le_bytes());
    for node in nodes {
        encode_node(&mut out, node, wide);
    }
    null_record(&mut out, wide);
    out
}
