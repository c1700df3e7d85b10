use std::path::Path;

use crate::{
    data_structures::texture::Texture,
    error::LoadError,
    gpu::Gpu,
    resources::{clean_path, AssetLoader},
};

/// Read an image through the asset chain and upload it as a texture.
pub fn load_texture(
    gpu: &mut dyn Gpu,
    assets: &AssetLoader,
    path: &Path,
) -> Result<Texture, LoadError> {
    let path = clean_path(path);
    log::info!("loading texture [{}]", path.display());
    let bytes = assets.load(&path)?;
    Texture::from_bytes(gpu, &bytes)
}
