//! GLSL source preprocessing.
//!
//! Shader sources are expanded line by line before they reach the compiler:
//!
//! - `#include <name>` splices `name` from [`SHADER_INCLUDE_PATH`], `#include "name"` splices
//!   `name` relative to the including file; included text is expanded recursively
//! - `#define NAME [value]` and `#undef NAME` edit the define table
//! - `#ifdef NAME` / `#ifndef NAME` skip lines up to the next `#endif`; blocks do not nest.
//!   Only plain lines are skipped: `#include`, `#define` and `#undef` apply in either case
//! - every other `#` line is dropped
//!
//! Surviving lines get every define name replaced by its value. The result is prefixed with
//! a `#version N core` line derived from the runtime's shading language version.

use std::{collections::HashMap, fmt::Display, path::Path};

use crate::{
    error::ShaderError,
    resources::{directory_of, AssetLoader, SHADER_INCLUDE_PATH},
};

/// Name to replacement text.
pub type ShaderDefines = HashMap<String, String>;

/// Includes deeper than this are treated as a cycle.
const MAX_INCLUDE_DEPTH: usize = 32;

/// Add `values` to `defines`, formatting each value with [`Display`].
pub fn register_shader_defines<V: Display>(
    defines: &mut ShaderDefines,
    values: impl IntoIterator<Item = (&'static str, V)>,
) {
    for (name, value) in values {
        defines.insert(name.to_string(), value.to_string());
    }
}

/// Build the `#version N core` header from a version string such as `"4.50 NVIDIA"`.
///
/// N is made of the digits found before the first space.
pub fn version_header(shading_language_version: &str) -> String {
    let digits: String = shading_language_version
        .split(' ')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    format!("#version {} core", digits)
}

/// Prefix every line with its 1-based number, padded to the widest number.
pub fn add_line_numbers(source: &str) -> String {
    let count = source.lines().count().max(1);
    let width = count.to_string().len();
    source
        .lines()
        .enumerate()
        .map(|(idx, line)| format!("{:>width$}: {}", idx + 1, line, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Preprocessor<'a> {
    assets: &'a AssetLoader,
    version: &'a str,
}

impl<'a> Preprocessor<'a> {
    /// # Arguments
    ///
    /// * `assets` resolves `#include`s
    /// * `version` is the header line produced by [`version_header`]
    pub fn new(assets: &'a AssetLoader, version: &'a str) -> Self {
        Self { assets, version }
    }

    /// Expand `source`, read from `file`, into compiler-ready text.
    ///
    /// `defines` is mutated by the directives met on the way, includes included.
    pub fn process(
        &self,
        source: &str,
        file: &Path,
        defines: &mut ShaderDefines,
    ) -> Result<String, ShaderError> {
        let body = self.expand(source, file, defines, 0)?;
        Ok(format!("{}\n{}\n", self.version, body))
    }

    fn expand(
        &self,
        source: &str,
        file: &Path,
        defines: &mut ShaderDefines,
        depth: usize,
    ) -> Result<String, ShaderError> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(ShaderError::IncludeDepth {
                file: file.display().to_string(),
            });
        }
        let dir = directory_of(file);
        let mut lines: Vec<String> = Vec::new();
        let mut open = false;
        let mut skip = false;

        for (idx, raw) in source.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            let trimmed = line.trim_start();
            if let Some(directive) = trimmed.strip_prefix('#') {
                let (word, arg) = match directive.split_once(char::is_whitespace) {
                    Some((word, arg)) => (word, arg.trim()),
                    None => (directive.trim_end(), ""),
                };
                match word {
                    "ifdef" | "ifndef" => {
                        if open {
                            return Err(ShaderError::NestedConditional {
                                file: file.display().to_string(),
                                line: idx + 1,
                            });
                        }
                        open = true;
                        skip = defines.contains_key(arg) == (word == "ifndef");
                    }
                    "endif" => {
                        open = false;
                        skip = false;
                    }
                    "include" => {
                        if let Some(text) = self.include(arg, &dir, defines, depth)? {
                            lines.push(text);
                        }
                    }
                    "define" => {
                        let (name, value) = match arg.split_once(char::is_whitespace) {
                            Some((name, value)) => (name, value.trim()),
                            None => (arg, ""),
                        };
                        if name.is_empty() {
                            log::warn!("{}:{}: #define without a name", file.display(), idx + 1);
                        } else {
                            defines.insert(name.to_string(), value.to_string());
                        }
                    }
                    "undef" => {
                        defines.remove(arg);
                    }
                    _ => log::debug!("{}:{}: dropping directive #{}", file.display(), idx + 1, word),
                }
                continue;
            }
            if skip {
                continue;
            }
            let mut line = line.to_string();
            for (name, value) in defines.iter() {
                if !name.is_empty() && line.contains(name.as_str()) {
                    line = line.replace(name.as_str(), value);
                }
            }
            lines.push(line);
        }

        Ok(lines.join("\n"))
    }

    /// Resolve and expand one `#include` argument. Malformed or missing includes only warn.
    fn include(
        &self,
        arg: &str,
        dir: &Path,
        defines: &mut ShaderDefines,
        depth: usize,
    ) -> Result<Option<String>, ShaderError> {
        if arg.len() < 3 {
            log::warn!("No filename specified in #include");
            return Ok(None);
        }
        let path = match (arg.chars().next(), arg.chars().next_back()) {
            (Some('<'), Some('>')) => Path::new(SHADER_INCLUDE_PATH).join(&arg[1..arg.len() - 1]),
            (Some('"'), Some('"')) => dir.join(&arg[1..arg.len() - 1]),
            _ => {
                log::warn!("Invalid #include format [{}], use \"filename\" or <filename>", arg);
                return Ok(None);
            }
        };
        let source = match self.assets.load_string(&path) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("Failed to include shader [{}]: {}", path.display(), e);
                return Ok(None);
            }
        };
        log::debug!("including shader [{}]", path.display());
        let text = self.expand(&source, &path, defines, depth + 1)?;
        Ok((!text.is_empty()).then_some(text))
    }
}
