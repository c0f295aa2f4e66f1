// src/shader_library.rs
//! WGSL chunk library for the standard material.
//!
//! The material program is a template made of `#include <chunk>` lines.
//! Injections are applied to that template first (see [`crate::shader_patch`]);
//! afterwards [`ShaderLibrary::resolve`] replaces every include line with the
//! chunk text, recursively, and rejects unknown or self-including chunks.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::shader_patch::ShaderSource;
use crate::{Error, Result};

pub const STANDARD_VERTEX: &str = include_str!("shaders/standard.vert.wgsl");
pub const STANDARD_FRAGMENT: &str = include_str!("shaders/standard.frag.wgsl");

const BUILTIN_CHUNKS: &[(&str, &str)] = &[
    ("common", include_str!("shaders/chunks/common.wgsl")),
    ("attributes", ""),
    ("varyings", ""),
    ("beginnormal_vertex", include_str!("shaders/chunks/beginnormal_vertex.wgsl")),
    ("begin_vertex", include_str!("shaders/chunks/begin_vertex.wgsl")),
    ("project_vertex", include_str!("shaders/chunks/project_vertex.wgsl")),
    ("lights_pars_begin", include_str!("shaders/chunks/lights_pars_begin.wgsl")),
    ("clipping_planes_fragment", include_str!("shaders/chunks/clipping_planes_fragment.wgsl")),
    ("map_fragment", include_str!("shaders/chunks/map_fragment.wgsl")),
    ("aomap_fragment", include_str!("shaders/chunks/aomap_fragment.wgsl")),
    ("lights_fragment", include_str!("shaders/chunks/lights_fragment.wgsl")),
    ("output_fragment", include_str!("shaders/chunks/output_fragment.wgsl")),
    ("simplex_noise", include_str!("shaders/chunks/simplex_noise.wgsl")),
];

/// Expanded WGSL, ready for `create_shader_module`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProgram {
    pub vertex: String,
    pub fragment: String,
}

/// Parses `#include <name>` (leading whitespace allowed).
pub fn include_name(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("#include")?;
    let rest = rest.trim();
    rest.strip_prefix('<')?.strip_suffix('>').map(str::trim)
}

#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    chunks: HashMap<String, Cow<'static, str>>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::standard()
    }
}

impl ShaderLibrary {
    /// Library holding the standard material chunks.
    pub fn standard() -> Self {
        let chunks = BUILTIN_CHUNKS
            .iter()
            .map(|(name, text)| (name.to_string(), Cow::Borrowed(*text)))
            .collect();
        Self { chunks }
    }

    /// Fresh copy of the unpatched standard material template.
    pub fn standard_source() -> ShaderSource {
        ShaderSource::new(STANDARD_VERTEX, STANDARD_FRAGMENT)
    }

    /// Adds or replaces a chunk.
    pub fn register(&mut self, name: impl Into<String>, text: impl Into<Cow<'static, str>>) -> &mut Self {
        self.chunks.insert(name.into(), text.into());
        self
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.chunks.contains_key(name)
    }

    /// Expands every include line in `source`.
    pub fn resolve(&self, source: &str) -> Result<String> {
        let mut out = String::with_capacity(source.len() * 2);
        let mut stack = Vec::new();
        self.expand(source, &mut stack, &mut out)?;
        Ok(out)
    }

    fn expand<'a>(&'a self, source: &'a str, stack: &mut Vec<&'a str>, out: &mut String) -> Result<()> {
        for line in source.lines() {
            if line.trim_start().starts_with("#include") {
                let name = include_name(line)
                    .ok_or_else(|| Error::custom(format!("malformed include directive: {}", line.trim())))?;
                let (key, text) = self
                    .chunks
                    .get_key_value(name)
                    .ok_or_else(|| Error::UnknownChunk(name.to_string()))?;
                if stack.contains(&key.as_str()) {
                    return Err(Error::RecursiveInclude(name.to_string()));
                }
                stack.push(key.as_str());
                self.expand(text, stack, out)?;
                stack.pop();
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }
        Ok(())
    }

    /// Expands both stages of a (possibly patched) source.
    pub fn build(&self, source: &ShaderSource) -> Result<ShaderProgram> {
        Ok(ShaderProgram {
            vertex: self.resolve(source.vertex())?,
            fragment: self.resolve(source.fragment())?,
        })
    }
}

#[cfg(test)]
pub(crate) fn validate_wgsl(source: &str) -> std::result::Result<(), String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::empty())
        .validate(&module)
        .map_err(|e| format!("{e:?}"))?;
    Ok(())
}
