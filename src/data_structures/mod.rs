//! Engine data structures: meshes, materials, textures and the scene graph.
//!
//! This module contains the core data types for scene representation:
//!
//! - `mesh` holds uploaded vertex data split into groups, one material per group
//! - `material` holds colours and texture maps and binds them to a program
//! - `texture` is a GPU texture handle with its size
//! - `transform` is an entity's position, rotation and scale
//! - `scene_graph` has the entity, component and layer types
//! - `ui_layer` is a layer composited from an offscreen framebuffer

pub mod material;
pub mod mesh;
pub mod scene_graph;
pub mod texture;
pub mod transform;
pub mod ui_layer;
