//! Wavefront OBJ models and their MTL material libraries.
//!
//! Faces are de-indexed while parsing: every triangle corner becomes its own vertex.
//! Quads are split into two triangles with the corner order `0 1 2 2 3 0`. Negative
//! indices count back from the end of the respective pool.
//!
//! A new group starts at `o`/`g` lines and at `usemtl` lines, unless the current group
//! has no vertices yet, in which case it is reused.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    data_structures::material::{MapSlot, MaterialData},
    error::LoadError,
    resources::{
        directory_of,
        mesh::{MeshData, MeshFormatRegistry},
        AssetLoader,
    },
};

pub fn register(registry: &mut MeshFormatRegistry) {
    registry.register("obj", &[".obj"], load);
}

/// Load `path` and every material library it references.
pub fn load(assets: &AssetLoader, path: &Path) -> Result<Vec<MeshData>, LoadError> {
    let source = assets.load_string(path)?;
    let dir = directory_of(path);
    parse(&source, &dir, |mtl| {
        log::info!("loading material library [{}]", mtl.display());
        let source = assets.load_string(mtl)?;
        Ok(parse_mtl(&source, &directory_of(mtl)))
    })
}

/// Parse OBJ text.
///
/// # Arguments
///
/// * `dir` the directory `mtllib` paths are relative to
/// * `load_mtl` reads and parses one material library
pub fn parse<F>(source: &str, dir: &Path, mut load_mtl: F) -> Result<Vec<MeshData>, LoadError>
where
    F: FnMut(&Path) -> Result<HashMap<String, MaterialData>, LoadError>,
{
    let mut state = ObjState::default();

    for (idx, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(k, r)| (k, r.trim()));

        match keyword {
            "v" => state.positions.push(parse_floats(rest, idx)),
            "vn" => state.normals.push(parse_floats(rest, idx)),
            "vt" => state.texcoords.push(parse_floats(rest, idx)),
            "f" => state.face(rest, idx),
            "o" | "g" => state.object(rest),
            "mtllib" => {
                let libraries = load_mtl(&dir.join(rest))?;
                state.materials.extend(libraries);
            }
            "usemtl" => state.use_material(rest),
            "s" | "l" | "p" => {}
            other => log::debug!("obj line {}: ignoring '{}'", idx + 1, other),
        }
    }

    Ok(state
        .groups
        .into_iter()
        .filter(|group| !group.is_empty())
        .collect())
}

#[derive(Default)]
struct ObjState {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    materials: HashMap<String, MaterialData>,
    groups: Vec<MeshData>,
    object: String,
}

/// One face corner: position, optional texcoord and optional normal index, 1-based or
/// negative.
type Corner = (i64, Option<i64>, Option<i64>);

impl ObjState {
    /// The group faces are appended to, opened on demand.
    fn current(&mut self) -> &mut MeshData {
        if self.groups.is_empty() {
            self.groups.push(MeshData {
                name: self.object.clone(),
                ..Default::default()
            });
        }
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    fn object(&mut self, name: &str) {
        log::debug!("processing object [{}]", name);
        self.object = name.to_string();
        match self.groups.last_mut() {
            Some(group) if group.name.is_empty() => group.name = name.to_string(),
            _ => self.groups.push(MeshData {
                name: name.to_string(),
                ..Default::default()
            }),
        }
    }

    fn use_material(&mut self, name: &str) {
        let reuse = self.groups.last().is_some_and(MeshData::is_empty);
        if !reuse {
            self.groups.push(MeshData {
                name: self.object.clone(),
                ..Default::default()
            });
        }
        let material = self.materials.get(name).cloned();
        if material.is_none() {
            log::warn!("material [{}] is not defined in any material library", name);
        }
        self.current().material = material;
    }

    fn face(&mut self, args: &str, idx: usize) {
        let corners: Option<Vec<Corner>> = args.split_whitespace().map(parse_corner).collect();
        let Some(corners) = corners else {
            log::warn!("obj line {}: malformed face '{}'", idx + 1, args);
            return;
        };
        let order: &[usize] = match corners.len() {
            3 => &[0, 1, 2],
            4 => &[0, 1, 2, 2, 3, 0],
            n => {
                log::warn!("obj line {}: faces with {} corners are not supported", idx + 1, n);
                return;
            }
        };

        let mut resolved = Vec::with_capacity(order.len());
        for &i in order {
            let (v, vt, vn) = corners[i];
            let position = resolve(v, &self.positions);
            let texcoord = vt.map(|vt| resolve(vt, &self.texcoords));
            let normal = vn.map(|vn| resolve(vn, &self.normals));
            match (position, texcoord, normal) {
                (Some(_), Some(None), _) | (Some(_), _, Some(None)) => {
                    log::warn!("obj line {}: texcoord or normal index out of range", idx + 1);
                    return;
                }
                (Some(p), t, n) => resolved.push((p, t.flatten(), n.flatten())),
                (None, _, _) => {
                    log::warn!("obj line {}: vertex index {} out of range", idx + 1, v);
                    return;
                }
            }
        }

        let group = self.current();
        for (position, texcoord, normal) in resolved {
            let count = group.vertices.len();
            push_attribute(&mut group.normals, count, normal);
            push_attribute(&mut group.texcoords, count, texcoord);
            group.vertices.push(position);
        }
    }
}

/// Keep an optional attribute array aligned with the vertex array.
///
/// The array stays empty until the first corner that carries the attribute; from then on
/// every vertex gets an entry, zero where the face had none.
fn push_attribute<T: Default + Copy>(values: &mut Vec<T>, count: usize, value: Option<T>) {
    match value {
        Some(value) => {
            values.resize(count, T::default());
            values.push(value);
        }
        None if !values.is_empty() => values.push(T::default()),
        None => {}
    }
}

fn parse_corner(token: &str) -> Option<Corner> {
    let mut parts = token.split('/');
    let v = parts.next()?.parse().ok()?;
    let vt = match parts.next() {
        None | Some("") => None,
        Some(s) => Some(s.parse().ok()?),
    };
    let vn = match parts.next() {
        None | Some("") => None,
        Some(s) => Some(s.parse().ok()?),
    };
    Some((v, vt, vn))
}

/// Resolve a 1-based or negative index into `pool`.
fn resolve<T: Copy>(index: i64, pool: &[T]) -> Option<T> {
    let idx = match index {
        i if i > 0 => i - 1,
        i if i < 0 => pool.len() as i64 + i,
        _ => return None,
    };
    usize::try_from(idx).ok().and_then(|i| pool.get(i)).copied()
}

fn parse_floats<const N: usize>(args: &str, idx: usize) -> [f32; N] {
    let mut out = [0.0; N];
    for (slot, token) in out.iter_mut().zip(args.split_whitespace()) {
        match token.parse() {
            Ok(value) => *slot = value,
            Err(_) => log::warn!("obj line {}: '{}' is not a number", idx + 1, token),
        }
    }
    out
}

/// Parse MTL text. Map paths are made relative to `dir`.
pub fn parse_mtl(source: &str, dir: &Path) -> HashMap<String, MaterialData> {
    let mut materials = HashMap::new();
    let mut current: Option<MaterialData> = None;

    for (idx, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(k, r)| (k, r.trim()));

        if keyword == "newmtl" {
            if let Some(done) = current.take() {
                materials.insert(done.name.clone(), done);
            }
            current = Some(MaterialData {
                name: rest.to_string(),
                ..Default::default()
            });
            continue;
        }
        let Some(material) = current.as_mut() else {
            log::warn!("mtl line {}: '{}' before any newmtl", idx + 1, keyword);
            continue;
        };

        match keyword {
            "Ka" => set_rgb(&mut material.ambient, rest, idx),
            "Kd" => set_rgb(&mut material.diffuse, rest, idx),
            "Ks" => set_rgb(&mut material.specular, rest, idx),
            "map_Ka" => material.set_map(MapSlot::Ambient, map_path(dir, rest)),
            "map_Kd" => material.set_map(MapSlot::Diffuse, map_path(dir, rest)),
            "map_Ks" => material.set_map(MapSlot::Specular, map_path(dir, rest)),
            "map_bump" | "bump" | "map_Bump" => {
                material.set_map(MapSlot::Normal, map_path(dir, rest))
            }
            "Ns" | "Ni" | "d" | "Tr" | "Tf" | "Ke" | "illum" | "map_Ns" | "disp" | "refl"
            | "map_d" => {}
            other => log::warn!("mtl line {}: unknown key '{}'", idx + 1, other),
        }
    }
    if let Some(done) = current {
        materials.insert(done.name.clone(), done);
    }
    materials
}

fn set_rgb(colour: &mut [f32; 4], args: &str, idx: usize) {
    let [r, g, b] = parse_floats::<3>(args, idx);
    *colour = [r, g, b, colour[3]];
}

/// The file name is the last token; option flags such as `-bm 1` come before it.
fn map_path(dir: &Path, args: &str) -> PathBuf {
    let file = args.split_whitespace().last().unwrap_or_default();
    dir.join(file.replace('\\', "/"))
}
