//! Binary FBX models.
//!
//! Loading happens in two passes. [`tree::parse`] decodes the container into a generic
//! node tree, then [`meshes_from_tree`] interprets it: every `Model` under `Objects` is
//! joined with its `Geometry` and `Material` through the `Connections` edge list, the
//! material with its `Texture`s and each texture with its `Video`.
//!
//! Objects are only ever referred to by the 64-bit ID in their first property. The
//! [`ObjectGraph`] indexes them once and keeps the connections as per-target adjacency
//! lists so every hop of the join is a map lookup.
//!
//! Geometry is extracted with a fixed correction: vertices and normals are rotated by the
//! model's negated `Lcl Rotation` about X, then Y, then Z, and vertices are scaled by its
//! `Lcl Scaling` divided by 100.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use cgmath::{ElementWise, Matrix3, Rad, Vector3};

use crate::{
    data_structures::material::{MapSlot, MaterialData},
    error::LoadError,
    resources::{
        clean_path, directory_of,
        mesh::{MeshData, MeshFormatRegistry},
        AssetLoader,
    },
};

pub mod tree;

pub use tree::{Node, Property};

pub fn register(registry: &mut MeshFormatRegistry) {
    registry.register("fbx", &[".fbx"], load);
}

pub fn load(assets: &AssetLoader, path: &Path) -> Result<Vec<MeshData>, LoadError> {
    let bytes = assets.load(path)?;
    parse(&bytes, &directory_of(path)).map_err(|e| match e {
        LoadError::BadMagic { .. } => LoadError::BadMagic {
            path: path.to_path_buf(),
        },
        e => e,
    })
}

/// Decode a binary FBX file. Texture paths are resolved against `dir`.
pub fn parse(bytes: &[u8], dir: &Path) -> Result<Vec<MeshData>, LoadError> {
    let document = tree::parse(bytes)?;
    meshes_from_tree(&document.root, dir)
}

/// One record of the `Connections` node.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection<'a> {
    pub kind: &'a str,
    pub from: i64,
    pub to: i64,
    /// Only object-to-property (`OP`) connections name a bind target.
    pub bind: Option<&'a str>,
}

/// The objects of a file keyed by ID, and their connections.
#[derive(Debug, Default)]
pub struct ObjectGraph<'a> {
    objects: HashMap<i64, &'a Node>,
    incoming: HashMap<i64, Vec<Connection<'a>>>,
}

impl<'a> ObjectGraph<'a> {
    pub fn new(root: &'a Node) -> Result<Self, LoadError> {
        let objects_node = root.child("Objects").ok_or(LoadError::MissingObjects)?;
        let mut graph = ObjectGraph::default();
        for object in &objects_node.children {
            if let Some(id) = object.id() {
                graph.objects.entry(id).or_insert(object);
            }
        }

        let records = root.child("Connections").into_iter().flat_map(|c| c.children_named("C"));
        for record in records {
            match connection(record) {
                Some(c) => graph.incoming.entry(c.to).or_default().push(c),
                None => log::warn!("skipping malformed connection {:?}", record.properties),
            }
        }
        Ok(graph)
    }

    /// The object whose first property is `id`.
    pub fn object(&self, id: i64) -> Option<&'a Node> {
        self.objects.get(&id).copied()
    }

    /// Resolve both ends of a connection. An unknown ID resolves to `None`.
    pub fn resolve(&self, connection: &Connection) -> (Option<&'a Node>, Option<&'a Node>) {
        (self.object(connection.from), self.object(connection.to))
    }

    /// Objects called `name` connected into `target`, with the bind name of each edge.
    pub fn sources<'s>(
        &'s self,
        target: i64,
        name: &'s str,
    ) -> impl Iterator<Item = (&'a Node, Option<&'a str>)> + 's {
        self.incoming
            .get(&target)
            .into_iter()
            .flatten()
            .filter_map(move |c| {
                let source = self.object(c.from)?;
                (source.name == name).then_some((source, c.bind))
            })
    }
}

fn connection(record: &Node) -> Option<Connection<'_>> {
    let kind = record.property(0)?.as_str()?;
    let from = record.property(1)?.as_i64()?;
    let to = record.property(2)?.as_i64()?;
    let bind = match kind {
        "OP" => record.property(3).and_then(Property::as_str),
        _ => None,
    };
    Some(Connection {
        kind,
        from,
        to,
        bind,
    })
}

/// Build one mesh record per model that has a geometry attached.
pub fn meshes_from_tree(root: &Node, dir: &Path) -> Result<Vec<MeshData>, LoadError> {
    let graph = ObjectGraph::new(root)?;
    let defaults = Templates::from_definitions(root);
    let mut meshes = Vec::new();

    let Some(objects) = root.child("Objects") else {
        return Err(LoadError::MissingObjects);
    };
    for model in objects.children_named("Model") {
        let Some(id) = model.id() else {
            log::warn!("model without an ID");
            continue;
        };
        let name = object_name(model);
        log::debug!("processing model [{}]", name);

        let Some((geometry, _)) = graph.sources(id, "Geometry").last() else {
            log::warn!("model [{}] has no geometry", name);
            continue;
        };
        let material = graph
            .sources(id, "Material")
            .last()
            .map(|(material, _)| material_data(&graph, material, &defaults.material, dir));

        let correction = Correction::of(model, &defaults);
        let Some(mut mesh) = geometry_data(geometry, &correction) else {
            log::warn!("model [{}] has unusable geometry", name);
            continue;
        };
        mesh.name = name.to_string();
        mesh.material = material;
        meshes.push(mesh);
    }
    Ok(meshes)
}

/// Object names are stored as `name\0\x01Class`.
fn object_name(node: &Node) -> &str {
    node.property(1)
        .and_then(Property::as_str)
        .and_then(|s| s.split('\0').next())
        .unwrap_or("")
}

fn properties70(node: &Node) -> impl Iterator<Item = &Node> {
    node.child("Properties70")
        .into_iter()
        .flat_map(|props| props.children_named("P"))
}

/// The three numeric values of a vector-typed `P` entry.
fn vec3(p: &Node) -> Option<[f64; 3]> {
    let values: Vec<f64> = p.properties.iter().skip(4).filter_map(Property::as_f64).collect();
    if values.len() < 3 {
        log::warn!(
            "property {:?} has {} values, expected 3",
            p.property(0).and_then(Property::as_str).unwrap_or(""),
            values.len()
        );
        return None;
    }
    Some([values[0], values[1], values[2]])
}

fn apply_colours(material: &mut MaterialData, node: &Node) {
    for p in properties70(node) {
        let target = match p.property(0).and_then(Property::as_str) {
            Some("Color") | Some("DiffuseColor") => &mut material.diffuse,
            Some("AmbientColor") => &mut material.ambient,
            Some("SpecularColor") => &mut material.specular,
            _ => continue,
        };
        if let Some([r, g, b]) = vec3(p) {
            *target = [r as f32, g as f32, b as f32, 1.0];
        }
    }
}

/// Property defaults from the `Definitions` section.
#[derive(Debug, Default)]
struct Templates {
    material: MaterialData,
    rotation: Option<[f64; 3]>,
    scaling: Option<[f64; 3]>,
}

impl Templates {
    fn from_definitions(root: &Node) -> Self {
        let mut templates = Templates::default();
        let object_types = root
            .child("Definitions")
            .into_iter()
            .flat_map(|d| d.children_named("ObjectType"));
        for object_type in object_types {
            let Some(template) = object_type.child("PropertyTemplate") else {
                continue;
            };
            match object_type.property(0).and_then(Property::as_str) {
                Some("Material") => apply_colours(&mut templates.material, template),
                Some("Model") => {
                    let (rotation, scaling) = local_transform(template);
                    templates.rotation = rotation.or(templates.rotation);
                    templates.scaling = scaling.or(templates.scaling);
                }
                _ => {}
            }
        }
        templates
    }
}

fn local_transform(node: &Node) -> (Option<[f64; 3]>, Option<[f64; 3]>) {
    let mut rotation = None;
    let mut scaling = None;
    for p in properties70(node) {
        match p.property(0).and_then(Property::as_str) {
            Some("Lcl Rotation") => rotation = vec3(p),
            Some("Lcl Scaling") => scaling = vec3(p),
            _ => {}
        }
    }
    (rotation, scaling)
}

fn material_data(graph: &ObjectGraph, material: &Node, defaults: &MaterialData, dir: &Path) -> MaterialData {
    let mut data = MaterialData {
        name: object_name(material).to_string(),
        ..defaults.clone()
    };
    apply_colours(&mut data, material);

    let Some(id) = material.id() else {
        return data;
    };
    for (texture, bind) in graph.sources(id, "Texture") {
        let slot = match bind {
            Some("AmbientColor") => MapSlot::Ambient,
            Some("DiffuseColor") => MapSlot::Diffuse,
            Some("SpecularColor") | Some("Specular") => MapSlot::Specular,
            Some("Bump") | Some("NormalMap") => MapSlot::Normal,
            other => {
                log::warn!("ignoring texture bound to {:?}", other);
                continue;
            }
        };
        let video = texture
            .id()
            .and_then(|id| graph.sources(id, "Video").next())
            .map(|(video, _)| video);
        match video.and_then(|v| file_of(v, dir)).or_else(|| file_of(texture, dir)) {
            Some(path) => data.set_map(slot, path),
            None => log::warn!("texture [{}] has no file name", object_name(texture)),
        }
    }
    data
}

fn string_child<'a>(node: &'a Node, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| node.child(name))
        .find_map(|child| child.property(0).and_then(Property::as_str))
}

fn looks_absolute(path: &str) -> bool {
    path.starts_with('/') || path.get(1..3) == Some(":/") || path.get(1..3) == Some(":\\")
}

/// The image path of a video or texture node, relative to `dir`.
fn file_of(node: &Node, dir: &Path) -> Option<PathBuf> {
    let relative = string_child(node, &["RelativeFilename"]).unwrap_or("");
    let file = if relative.is_empty() || looks_absolute(relative) {
        string_child(node, &["Filename", "FileName"]).unwrap_or("")
    } else {
        relative
    };
    if file.is_empty() {
        return None;
    }
    Some(dir.join(clean_path(Path::new(&file.replace('\\', "/")))))
}

/// Rotation and scale applied to extracted geometry.
struct Correction {
    rotation: Matrix3<f64>,
    scale: Vector3<f64>,
}

impl Correction {
    fn of(model: &Node, defaults: &Templates) -> Self {
        let (rotation, scaling) = local_transform(model);
        let [x, y, z] = rotation.or(defaults.rotation).unwrap_or_default();
        let scale = scaling
            .or(defaults.scaling)
            .map(|[x, y, z]| Vector3::new(x, y, z) / 100.0)
            .unwrap_or(Vector3::new(1.0, 1.0, 1.0));

        let rx = Matrix3::from_angle_x(Rad(-x.to_radians()));
        let ry = Matrix3::from_angle_y(Rad(-y.to_radians()));
        let rz = Matrix3::from_angle_z(Rad(-z.to_radians()));
        Self {
            rotation: rz * ry * rx,
            scale,
        }
    }

    fn vertex(&self, v: [f64; 3]) -> [f32; 3] {
        let r = self.rotation * Vector3::from(v);
        let s = r.mul_element_wise(self.scale);
        [s.x as f32, s.y as f32, s.z as f32]
    }

    fn normal(&self, n: [f64; 3]) -> [f32; 3] {
        let r = self.rotation * Vector3::from(n);
        [r.x as f32, r.y as f32, r.z as f32]
    }
}

/// Per-polygon-vertex attribute data of a `LayerElement*` node.
struct LayerElement {
    values: Vec<f64>,
    index: Option<Vec<i32>>,
    width: usize,
}

impl LayerElement {
    fn read(geometry: &Node, element: &str, values: &str, index: &str, width: usize) -> Option<Self> {
        let layer = geometry.child(element)?;
        let mapping = string_child(layer, &["MappingInformationType"]).unwrap_or("");
        match mapping {
            "ByPolygonVertex" => {}
            "ByVertex" | "ByVertice" => {
                log::warn!("{}: per-vertex mapping is not supported", element);
                return None;
            }
            other => {
                log::warn!("{}: unknown mapping {:?}", element, other);
                return None;
            }
        }
        let Some(values) = layer.child(values).and_then(|v| v.property(0)?.as_f64_array()) else {
            log::warn!("{}: no {} array", element, values);
            return None;
        };
        let index = match string_child(layer, &["ReferenceInformationType"]).unwrap_or("") {
            "Direct" => None,
            "IndexToDirect" | "Index" => {
                let Some(index) = layer.child(index).and_then(|i| i.property(0)?.as_i32_array())
                else {
                    log::warn!("{}: no {} array", element, index);
                    return None;
                };
                Some(index)
            }
            other => {
                log::warn!("{}: unknown reference mode {:?}", element, other);
                return None;
            }
        };
        Some(Self {
            values,
            index,
            width,
        })
    }

    /// The value for the `polygon_vertex`-th entry of `PolygonVertexIndex`.
    fn at(&self, polygon_vertex: usize) -> Option<&[f64]> {
        let i = match &self.index {
            Some(index) => usize::try_from(*index.get(polygon_vertex)?).ok()?,
            None => polygon_vertex,
        };
        self.values.get(i * self.width..(i + 1) * self.width)
    }
}

/// Corner order of a polygon with `n` corners.
fn triangulate(n: usize) -> Option<Vec<usize>> {
    match n {
        3 => Some(vec![0, 1, 2]),
        4 => Some(vec![0, 1, 2, 2, 3, 0]),
        n if n > 4 => Some((1..n - 1).flat_map(|k| [0, k, k + 1]).collect()),
        _ => None,
    }
}

fn geometry_data(geometry: &Node, correction: &Correction) -> Option<MeshData> {
    let Some(vertices) = geometry
        .child("Vertices")
        .and_then(|v| v.property(0)?.as_f64_array())
    else {
        log::warn!("geometry has no Vertices");
        return None;
    };
    let Some(indices) = geometry
        .child("PolygonVertexIndex")
        .and_then(|i| i.property(0)?.as_i32_array())
    else {
        log::warn!("geometry has no PolygonVertexIndex");
        return None;
    };
    let mut normal_layer = LayerElement::read(geometry, "LayerElementNormal", "Normals", "NormalsIndex", 3);
    let mut uv_layer = LayerElement::read(geometry, "LayerElementUV", "UV", "UVIndex", 2);

    let mut mesh = MeshData::default();
    let mut start = 0;
    for (end, raw) in indices.iter().enumerate() {
        if *raw >= 0 {
            continue;
        }
        let polygon = start..end + 1;
        start = end + 1;
        let Some(order) = triangulate(polygon.len()) else {
            log::warn!("skipping polygon with {} corners", polygon.len());
            continue;
        };

        let corners: Option<Vec<[f64; 3]>> = order
            .iter()
            .map(|o| {
                let raw = indices[polygon.start + o];
                let v = usize::try_from(if raw < 0 { raw ^ -1 } else { raw }).ok()?;
                let p = vertices.get(v * 3..v * 3 + 3)?;
                Some([p[0], p[1], p[2]])
            })
            .collect();
        let Some(corners) = corners else {
            log::warn!("skipping polygon with a vertex index out of range");
            continue;
        };

        for (o, position) in order.iter().zip(corners) {
            let pv = polygon.start + o;
            mesh.vertices.push(correction.vertex(position));
            match normal_layer.as_ref().map(|layer| layer.at(pv).map(|n| [n[0], n[1], n[2]])) {
                Some(Some(n)) => mesh.normals.push(correction.normal(n)),
                Some(None) => {
                    log::warn!("normal index out of range, dropping normals");
                    normal_layer = None;
                    mesh.normals.clear();
                }
                None => {}
            }
            match uv_layer.as_ref().map(|layer| layer.at(pv).map(|uv| [uv[0] as f32, uv[1] as f32])) {
                Some(Some(uv)) => mesh.texcoords.push(uv),
                Some(None) => {
                    log::warn!("uv index out of range, dropping texcoords");
                    uv_layer = None;
                    mesh.texcoords.clear();
                }
                None => {}
            }
        }
    }
    Some(mesh)
}
