//! Linked shader programs built from preprocessed GLSL files.
//!
//! The stage of every file is chosen by its suffix: `*.vs.glsl` is a vertex shader and
//! `*.fs.glsl` is a fragment shader. Each file is expanded by the [`Preprocessor`] with a
//! private copy of the define table, so defines set inside one stage never leak into another.

use std::{
    cell::{OnceCell, RefCell},
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use crate::{
    context::GpuResource,
    error::ShaderError,
    gpu::{Gpu, ProgramId, ShaderId, ShaderStage, UniformLocation, UniformValue, UNIFORM_NAMES},
    pipelines::preprocess::{add_line_numbers, Preprocessor, ShaderDefines},
    resources::{clean_path, AssetLoader},
};

/// Everything needed to turn shader files into a program.
pub struct ShaderCompiler<'a> {
    pub gpu: &'a mut dyn Gpu,
    pub assets: &'a AssetLoader,
    /// Seed table; every stage works on its own copy.
    pub defines: &'a ShaderDefines,
    /// The `#version` header line.
    pub version: &'a str,
}

impl ShaderCompiler<'_> {
    /// Compile and link `files`. Intermediate stage objects are deleted on every path.
    pub fn link(&mut self, files: &[PathBuf]) -> Result<ProgramId, ShaderError> {
        let mut stages: Vec<ShaderId> = Vec::with_capacity(files.len());
        for file in files {
            match self.compile(file) {
                Ok(shader) => stages.push(shader),
                Err(e) => {
                    self.delete_stages(&stages);
                    return Err(e);
                }
            }
        }

        let linked = self.gpu.link_program(&stages);
        self.delete_stages(&stages);
        linked.map_err(|log| {
            log::error!("failed to link program {:?}: {}", files, log);
            ShaderError::Link { log }
        })
    }

    fn compile(&mut self, file: &Path) -> Result<ShaderId, ShaderError> {
        let stage = stage_of(file)?;
        log::info!("loading shader [{}]", file.display());
        let source = self.assets.load_string(file)?;

        let mut defines = self.defines.clone();
        let code = Preprocessor::new(self.assets, self.version).process(&source, file, &mut defines)?;

        self.gpu.compile_shader(stage, &code).map_err(|log| {
            log::error!(
                "failed to compile shader [{}]\n{}\n{}",
                file.display(),
                add_line_numbers(&code),
                log
            );
            ShaderError::Compile {
                name: file.display().to_string(),
                log,
            }
        })
    }

    fn delete_stages(&mut self, stages: &[ShaderId]) {
        for shader in stages {
            self.gpu.delete_shader(*shader);
        }
    }
}

/// Pick the stage from the file name suffix.
pub fn stage_of(file: &Path) -> Result<ShaderStage, ShaderError> {
    let name = file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if name.ends_with(".vs.glsl") {
        Ok(ShaderStage::Vertex)
    } else if name.ends_with(".fs.glsl") {
        Ok(ShaderStage::Fragment)
    } else {
        Err(ShaderError::UnknownStage {
            path: file.to_path_buf(),
        })
    }
}

/// A linked program plus the files it was built from.
///
/// Uniform locations are looked up lazily: the first call to
/// [`uniform_location`](Self::uniform_location) after linking asks the backend for all
/// active uniforms and caches them by name.
///
/// Backends only expose the names in [`UNIFORM_NAMES`]. Setting any other uniform has no
/// effect and is reported once per name.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    files: Vec<PathBuf>,
    uniforms: OnceCell<HashMap<String, UniformLocation>>,
    ignored: RefCell<BTreeSet<String>>,
}

impl ShaderProgram {
    /// # Arguments
    ///
    /// * `compiler` the GPU, asset chain and define table to build with
    /// * `files` one path per stage, cleaned before use
    pub fn from_files<P: AsRef<Path>>(
        compiler: &mut ShaderCompiler<'_>,
        files: &[P],
    ) -> Result<Self, ShaderError> {
        let files: Vec<PathBuf> = files.iter().map(|f| clean_path(f.as_ref())).collect();
        let id = compiler.link(&files)?;
        Ok(Self {
            id,
            files,
            uniforms: OnceCell::new(),
            ignored: RefCell::new(BTreeSet::new()),
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Rebuild the program from its files.
    ///
    /// On failure the previous program stays in place and the error is returned. On
    /// success the old program is deleted and the uniform cache starts over.
    pub fn reload(&mut self, compiler: &mut ShaderCompiler<'_>) -> Result<(), ShaderError> {
        let id = compiler.link(&self.files)?;
        compiler.gpu.delete_program(self.id);
        self.id = id;
        self.uniforms = OnceCell::new();
        Ok(())
    }

    /// Make this program current.
    pub fn bind(&self, gpu: &mut dyn Gpu) {
        gpu.use_program(Some(self.id));
    }

    /// Location of `name`, or `None` when the program does not use it.
    pub fn uniform_location(&self, gpu: &dyn Gpu, name: &str) -> Option<UniformLocation> {
        self.uniforms
            .get_or_init(|| gpu.active_uniforms(self.id).into_iter().collect())
            .get(name)
            .copied()
    }

    /// Set `name` on the current program if the program uses it. Returns whether a value
    /// was written.
    pub fn set_uniform(&self, gpu: &mut dyn Gpu, name: &str, value: UniformValue) -> bool {
        match self.uniform_location(gpu, name) {
            Some(location) => {
                gpu.set_uniform(location, value);
                true
            }
            None => {
                if !UNIFORM_NAMES.contains(&name) && self.ignored.borrow_mut().insert(name.to_string()) {
                    log::warn!(
                        "uniform {} of program {:?} is not supported by the backend and is ignored",
                        name,
                        self.files
                    );
                }
                false
            }
        }
    }

    /// Names passed to [`set_uniform`](Self::set_uniform) that no backend can write.
    pub fn ignored_uniforms(&self) -> Vec<String> {
        self.ignored.borrow().iter().cloned().collect()
    }
}

impl GpuResource for ShaderProgram {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        gpu.delete_program(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{GpuCommand, RecordingGpu};

    fn assets() -> AssetLoader {
        let mut assets = AssetLoader::new();
        assets.register(|path: &Path| -> std::io::Result<Vec<u8>> {
            match path.to_str() {
                Some("a.vs.glsl") => Ok(b"uniform mat4 uMVP;\nvoid main() {}".to_vec()),
                Some("a.fs.glsl") => Ok(b"uniform vec4 uDiffuse;\nvoid main() {}".to_vec()),
                Some("a.gs.glsl") => Ok(b"void main() {}".to_vec()),
                _ => Err(std::io::ErrorKind::NotFound.into()),
            }
        });
        assets
    }

    #[test]
    fn stage_is_chosen_by_suffix() {
        assert_eq!(stage_of(Path::new("x/y.vs.glsl")).unwrap(), ShaderStage::Vertex);
        assert_eq!(stage_of(Path::new("y.fs.glsl")).unwrap(), ShaderStage::Fragment);
        assert!(matches!(
            stage_of(Path::new("y.glsl")),
            Err(ShaderError::UnknownStage { .. })
        ));
    }

    #[test]
    fn stages_are_deleted_after_linking() {
        let mut gpu = RecordingGpu::new();
        let assets = assets();
        let defines = ShaderDefines::new();
        let mut compiler = ShaderCompiler {
            gpu: &mut gpu,
            assets: &assets,
            defines: &defines,
            version: "#version 410 core",
        };
        let program = ShaderProgram::from_files(&mut compiler, &["a.vs.glsl", "a.fs.glsl"]).unwrap();

        let deleted = gpu
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::DeleteShader(_)))
            .count();
        assert_eq!(deleted, 2);
        assert_eq!(gpu.live_programs(), 1);
        assert!(program.uniform_location(&gpu, "uMVP").is_some());
        assert!(program.uniform_location(&gpu, "uDiffuse").is_some());
        assert!(program.uniform_location(&gpu, "uModel").is_none());
    }

    #[test]
    fn unsupported_uniforms_are_recorded_once_and_not_written() {
        let mut gpu = RecordingGpu::new();
        let assets = assets();
        let defines = ShaderDefines::new();
        let mut compiler = ShaderCompiler {
            gpu: &mut gpu,
            assets: &assets,
            defines: &defines,
            version: "#version 410 core",
        };
        let program = ShaderProgram::from_files(&mut compiler, &["a.vs.glsl", "a.fs.glsl"]).unwrap();
        gpu.take_commands();

        assert!(!program.set_uniform(&mut gpu, "uTint", UniformValue::Int(1)));
        assert!(!program.set_uniform(&mut gpu, "uTint", UniformValue::Int(2)));
        // built-in names the program does not declare are not reported
        assert!(!program.set_uniform(&mut gpu, "uModel", UniformValue::Int(0)));
        assert!(program.set_uniform(&mut gpu, "uMVP", UniformValue::Int(0)));

        assert_eq!(program.ignored_uniforms(), vec!["uTint".to_string()]);
        assert_eq!(gpu.commands().len(), 1);
    }

    #[test]
    fn unknown_stage_cleans_up_compiled_stages() {
        let mut gpu = RecordingGpu::new();
        let assets = assets();
        let defines = ShaderDefines::new();
        let mut compiler = ShaderCompiler {
            gpu: &mut gpu,
            assets: &assets,
            defines: &defines,
            version: "#version 410 core",
        };
        let result = ShaderProgram::from_files(&mut compiler, &["a.vs.glsl", "a.gs.glsl"]);
        assert!(matches!(result, Err(ShaderError::UnknownStage { .. })));
        assert!(gpu.shader_sources().is_empty());
        assert_eq!(gpu.live_programs(), 0);
    }

    #[test]
    fn failed_reload_keeps_the_old_program() {
        let mut gpu = RecordingGpu::new();
        let assets = assets();
        let defines = ShaderDefines::new();
        let mut program = {
            let mut compiler = ShaderCompiler {
                gpu: &mut gpu,
                assets: &assets,
                defines: &defines,
                version: "#version 410 core",
            };
            ShaderProgram::from_files(&mut compiler, &["a.vs.glsl", "a.fs.glsl"]).unwrap()
        };
        let before = program.id();

        gpu.fail_compiles(true);
        let mut compiler = ShaderCompiler {
            gpu: &mut gpu,
            assets: &assets,
            defines: &defines,
            version: "#version 410 core",
        };
        assert!(matches!(
            program.reload(&mut compiler),
            Err(ShaderError::Compile { .. })
        ));
        assert_eq!(program.id(), before);

        gpu.fail_compiles(false);
        let mut compiler = ShaderCompiler {
            gpu: &mut gpu,
            assets: &assets,
            defines: &defines,
            version: "#version 410 core",
        };
        program.reload(&mut compiler).unwrap();
        assert_ne!(program.id(), before);
        assert_eq!(gpu.live_programs(), 1);
    }
}
