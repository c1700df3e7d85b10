//! Everything that turns external files into engine data.
//!
//! Files are read through an [`AssetLoader`]: a chain of [`AssetSource`]s tried from the
//! most recently registered to the oldest, so a packaged source can override or supplement
//! plain filesystem reads. Model files are decoded by format plugins registered in a
//! [`mesh::MeshFormatRegistry`].
//!
//! - `mesh` contains the intermediate mesh records and the format registry
//! - `obj` and `fbx` are the built-in model formats
//! - `texture` decodes image files into textures

use std::{
    collections::HashMap,
    fmt::Debug,
    io,
    path::{Component, Path, PathBuf},
};

use crate::error::LoadError;

pub mod fbx;
pub mod mesh;
pub mod obj;
pub mod texture;

/// Directory consulted for every `#include <...>`.
pub const SHADER_INCLUDE_PATH: &str = "data/shaders/include";

/// A single place assets can be read from.
pub trait AssetSource {
    fn load(&self, path: &Path) -> io::Result<Vec<u8>>;
}

impl<F> AssetSource for F
where
    F: Fn(&Path) -> io::Result<Vec<u8>>,
{
    fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        self(path)
    }
}

/// Reads files relative to a root directory.
#[derive(Clone, Debug)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for FsSource {
    fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(path))
    }
}

/// Files compiled into the binary, looked up by their cleaned path.
#[derive(Clone, Debug, Default)]
pub struct EmbeddedSource {
    files: HashMap<PathBuf, &'static [u8]>,
}

impl EmbeddedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, contents: &'static [u8]) -> Self {
        self.files.insert(clean_path(path.as_ref()), contents);
        self
    }

    /// The GLSL sources of the built-in shaders and their include files.
    pub fn builtin_shaders() -> Self {
        Self::new()
            .with_file(
                "data/shaders/include/attribute.inc.glsl",
                include_bytes!("../../data/shaders/include/attribute.inc.glsl"),
            )
            .with_file(
                "data/shaders/include/mvp.inc.glsl",
                include_bytes!("../../data/shaders/include/mvp.inc.glsl"),
            )
            .with_file(
                "data/shaders/include/material.inc.glsl",
                include_bytes!("../../data/shaders/include/material.inc.glsl"),
            )
            .with_file(
                "data/shaders/default.vs.glsl",
                include_bytes!("../../data/shaders/default.vs.glsl"),
            )
            .with_file(
                "data/shaders/default.fs.glsl",
                include_bytes!("../../data/shaders/default.fs.glsl"),
            )
            .with_file("data/shaders/ui.vs.glsl", include_bytes!("../../data/shaders/ui.vs.glsl"))
            .with_file("data/shaders/ui.fs.glsl", include_bytes!("../../data/shaders/ui.fs.glsl"))
    }
}

impl AssetSource for EmbeddedSource {
    fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .get(&clean_path(path))
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

/// The chain of asset sources. Sources registered last are tried first.
#[derive(Default)]
pub struct AssetLoader {
    sources: Vec<Box<dyn AssetSource>>,
}

impl Debug for AssetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetLoader")
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl AssetLoader {
    /// A loader without any source; every load fails until one is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filesystem reads below `root`, overridden by the built-in shader sources.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        let mut loader = Self::new();
        loader.register(FsSource::new(root));
        loader.register(EmbeddedSource::builtin_shaders());
        loader
    }

    pub fn register(&mut self, source: impl AssetSource + 'static) {
        self.sources.push(Box::new(source));
    }

    pub fn load(&self, path: &Path) -> Result<Vec<u8>, LoadError> {
        for source in self.sources.iter().rev() {
            match source.load(path) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => log::debug!("asset source failed for {:?}: {}", path, e),
            }
        }
        Err(LoadError::NotFound {
            path: path.to_path_buf(),
        })
    }

    pub fn load_string(&self, path: &Path) -> Result<String, LoadError> {
        let bytes = self.load(path)?;
        String::from_utf8(bytes)
            .map_err(|e| LoadError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

/// Lexically normalise a path: drop `.` components and fold `..` into their parent.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let folded = matches!(
                    cleaned.components().next_back(),
                    Some(Component::Normal(_))
                );
                if folded {
                    cleaned.pop();
                } else {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Directory of `path`, or the empty path for bare file names.
pub(crate) fn directory_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_path_folds_dots() {
        assert_eq!(clean_path(Path::new("./a/b/../c.glsl")), PathBuf::from("a/c.glsl"));
        assert_eq!(clean_path(Path::new("../x/./y")), PathBuf::from("../x/y"));
    }

    #[test]
    fn newest_source_wins() {
        let mut loader = AssetLoader::new();
        loader.register(|_: &Path| -> io::Result<Vec<u8>> { Ok(b"old".to_vec()) });
        loader.register(|path: &Path| -> io::Result<Vec<u8>> {
            if path == Path::new("new.txt") {
                Ok(b"new".to_vec())
            } else {
                Err(io::Error::from(io::ErrorKind::NotFound))
            }
        });
        assert_eq!(loader.load(Path::new("new.txt")).unwrap(), b"new");
        assert_eq!(loader.load(Path::new("other.txt")).unwrap(), b"old");
    }

    #[test]
    fn missing_asset_is_not_found() {
        let loader = AssetLoader::new();
        assert!(matches!(
            loader.load(Path::new("nope")),
            Err(LoadError::NotFound { .. })
        ));
    }

    #[test]
    fn builtin_shaders_are_embedded() {
        let source = EmbeddedSource::builtin_shaders();
        assert!(source.load(Path::new("./data/shaders/include/mvp.inc.glsl")).is_ok());
    }
}
