//! Surface materials.
//!
//! A [`Material`] has three scalar colours and up to four texture maps. A present map
//! always wins over its colour: [`Material::bind`] binds the map to its texture unit and
//! reports it through the `uMapFlags` bitfield, otherwise the colour is written to the
//! matching uniform.
//!
//! | slot     | unit | sampler uniform | colour uniform | flag |
//! |----------|------|-----------------|----------------|------|
//! | ambient  | 0    | `uAmbientMap`   | `uAmbient`     | 1    |
//! | diffuse  | 1    | `uDiffuseMap`   | `uDiffuse`     | 2    |
//! | specular | 2    | `uSpecularMap`  | `uSpecular`    | 4    |
//! | normal   | 3    | `uNormalMap`    | none           | 8    |

use std::path::PathBuf;

use bitflags::bitflags;

use crate::{
    context::GpuResource,
    data_structures::texture::Texture,
    error::LoadError,
    gpu::{Gpu, UniformValue, TEXTURE_UNITS},
    pipelines::{
        preprocess::{register_shader_defines, ShaderDefines},
        shader::ShaderProgram,
    },
    resources::{texture::load_texture, AssetLoader},
};

bitflags! {
    /// Which texture maps a bound material provides.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        const AMBIENT = 1;
        const DIFFUSE = 2;
        const SPECULAR = 4;
        const NORMAL = 8;
    }
}

/// Make the flag values available to shaders as `*_MAP_FLAG` defines.
pub fn register_map_flag_defines(defines: &mut ShaderDefines) {
    register_shader_defines(
        defines,
        [
            ("AMBIENT_MAP_FLAG", MapFlags::AMBIENT.bits()),
            ("DIFFUSE_MAP_FLAG", MapFlags::DIFFUSE.bits()),
            ("SPECULAR_MAP_FLAG", MapFlags::SPECULAR.bits()),
            ("NORMAL_MAP_FLAG", MapFlags::NORMAL.bits()),
        ],
    );
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapSlot {
    Ambient,
    Diffuse,
    Specular,
    Normal,
}

impl MapSlot {
    pub const ALL: [MapSlot; TEXTURE_UNITS] = [
        MapSlot::Ambient,
        MapSlot::Diffuse,
        MapSlot::Specular,
        MapSlot::Normal,
    ];

    pub fn unit(self) -> u32 {
        self as u32
    }

    pub fn flag(self) -> MapFlags {
        match self {
            MapSlot::Ambient => MapFlags::AMBIENT,
            MapSlot::Diffuse => MapFlags::DIFFUSE,
            MapSlot::Specular => MapFlags::SPECULAR,
            MapSlot::Normal => MapFlags::NORMAL,
        }
    }

    fn sampler_uniform(self) -> &'static str {
        match self {
            MapSlot::Ambient => "uAmbientMap",
            MapSlot::Diffuse => "uDiffuseMap",
            MapSlot::Specular => "uSpecularMap",
            MapSlot::Normal => "uNormalMap",
        }
    }

    fn colour_uniform(self) -> Option<&'static str> {
        match self {
            MapSlot::Ambient => Some("uAmbient"),
            MapSlot::Diffuse => Some("uDiffuse"),
            MapSlot::Specular => Some("uSpecular"),
            MapSlot::Normal => None,
        }
    }
}

const DEFAULT_COLOUR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// A material as described by a model file, before any texture is loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub ambient_map: Option<PathBuf>,
    pub diffuse_map: Option<PathBuf>,
    pub specular_map: Option<PathBuf>,
    pub normal_map: Option<PathBuf>,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: String::new(),
            ambient: DEFAULT_COLOUR,
            diffuse: DEFAULT_COLOUR,
            specular: DEFAULT_COLOUR,
            ambient_map: None,
            diffuse_map: None,
            specular_map: None,
            normal_map: None,
        }
    }
}

impl MaterialData {
    pub fn map(&self, slot: MapSlot) -> Option<&PathBuf> {
        match slot {
            MapSlot::Ambient => self.ambient_map.as_ref(),
            MapSlot::Diffuse => self.diffuse_map.as_ref(),
            MapSlot::Specular => self.specular_map.as_ref(),
            MapSlot::Normal => self.normal_map.as_ref(),
        }
        .filter(|path| !path.as_os_str().is_empty())
    }

    pub fn set_map(&mut self, slot: MapSlot, path: PathBuf) {
        let target = match slot {
            MapSlot::Ambient => &mut self.ambient_map,
            MapSlot::Diffuse => &mut self.diffuse_map,
            MapSlot::Specular => &mut self.specular_map,
            MapSlot::Normal => &mut self.normal_map,
        };
        *target = Some(path);
    }
}

#[derive(Debug, Default)]
pub struct Material {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    maps: [Option<Texture>; TEXTURE_UNITS],
}

impl Material {
    /// Load every map named in `data`.
    ///
    /// If one map fails to load, the maps loaded before it are released and the error is
    /// returned.
    pub fn from_data(
        gpu: &mut dyn Gpu,
        assets: &AssetLoader,
        data: &MaterialData,
    ) -> Result<Self, LoadError> {
        let mut material = Material {
            ambient: data.ambient,
            diffuse: data.diffuse,
            specular: data.specular,
            maps: Default::default(),
        };
        for slot in MapSlot::ALL {
            let Some(path) = data.map(slot) else {
                continue;
            };
            match load_texture(gpu, assets, path) {
                Ok(texture) => material.maps[slot as usize] = Some(texture),
                Err(e) => {
                    material.release(gpu);
                    return Err(e);
                }
            }
        }
        Ok(material)
    }

    pub fn map(&self, slot: MapSlot) -> Option<&Texture> {
        self.maps[slot as usize].as_ref()
    }

    /// Replace the map of `slot`, returning the previous one.
    pub fn set_map(&mut self, slot: MapSlot, texture: Option<Texture>) -> Option<Texture> {
        std::mem::replace(&mut self.maps[slot as usize], texture)
    }

    /// The maps this material provides.
    pub fn flags(&self) -> MapFlags {
        MapSlot::ALL
            .into_iter()
            .filter(|slot| self.map(*slot).is_some())
            .fold(MapFlags::empty(), |flags, slot| flags | slot.flag())
    }

    fn colour(&self, slot: MapSlot) -> [f32; 4] {
        match slot {
            MapSlot::Ambient => self.ambient,
            MapSlot::Diffuse => self.diffuse,
            MapSlot::Specular => self.specular,
            MapSlot::Normal => [0.0; 4],
        }
    }

    /// Bind maps and colours for `program`, which must be in use.
    ///
    /// `uMapFlags` is written once, after all slots, and the written value is returned.
    pub fn bind(&self, gpu: &mut dyn Gpu, program: &ShaderProgram) -> MapFlags {
        let mut flags = MapFlags::empty();
        for slot in MapSlot::ALL {
            program.set_uniform(gpu, slot.sampler_uniform(), UniformValue::Int(slot.unit() as i32));
            let colour = match self.map(slot) {
                Some(texture) => {
                    texture.bind(gpu, slot.unit());
                    flags |= slot.flag();
                    [0.0; 4]
                }
                None => self.colour(slot),
            };
            if let Some(name) = slot.colour_uniform() {
                program.set_uniform(gpu, name, UniformValue::Vec4(colour));
            }
        }
        program.set_uniform(gpu, "uMapFlags", UniformValue::Int(flags.bits() as i32));
        flags
    }

    /// Clear all texture units a material can use.
    pub fn unbind(&self, gpu: &mut dyn Gpu) {
        for slot in MapSlot::ALL {
            gpu.bind_texture(slot.unit(), None);
        }
    }
}

impl GpuResource for Material {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        for map in self.maps.iter_mut() {
            if let Some(mut texture) = map.take() {
                texture.release(gpu);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_values_are_registered_as_defines() {
        let mut defines = ShaderDefines::new();
        register_map_flag_defines(&mut defines);
        assert_eq!(defines["AMBIENT_MAP_FLAG"], "1");
        assert_eq!(defines["NORMAL_MAP_FLAG"], "8");
    }

    #[test]
    fn empty_map_paths_count_as_absent() {
        let mut data = MaterialData::default();
        data.set_map(MapSlot::Diffuse, PathBuf::new());
        assert!(data.map(MapSlot::Diffuse).is_none());
        assert_eq!(data.ambient, [0.0, 0.0, 0.0, 1.0]);
    }
}
