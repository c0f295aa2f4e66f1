// src/error.rs
//! Error handling for the whole crate.
//!
//! - One enum, cheap to match, allocations only on the error path.
//! - Context chaining (`.context()` / `.with_context()` via [`crate::context`]).
//! - Asset, shader and configuration failures stay distinguishable so the
//!   loader can report a failed state instead of leaving the scene half built.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::shader_patch::PatchError;

/// Main error type. Send + Sync + 'static so it can cross the loader thread.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O errors (missing asset files, config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Texture decoding.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// glTF / GLB parsing.
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    /// Config (de)serialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A shader injection could not be applied.
    #[error("shader patch error: {0}")]
    Patch(#[from] PatchError),

    /// `#include <name>` referenced a chunk the library does not know.
    #[error("unknown shader chunk <{0}>")]
    UnknownChunk(String),

    /// A chunk includes itself, directly or through other chunks.
    #[error("recursive shader include <{0}>")]
    RecursiveInclude(String),

    /// The model needs Draco decompression and no decompressed sibling exists.
    #[error("model {path:?} uses KHR_draco_mesh_compression; provide a .decompressed.glb sibling")]
    CompressedModel { path: PathBuf },

    /// The model has no triangle primitive with positions.
    #[error("model {0:?} contains no usable mesh geometry")]
    MissingGeometry(PathBuf),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Surface creation / acquisition failures.
    #[error("surface error: {0}")]
    Surface(String),

    /// Simple custom message.
    #[error("{0}")]
    Custom(String),

    /// Context chaining.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    /// Formatted custom error (backs the `bail!` macro).
    #[inline]
    pub fn format(args: fmt::Arguments) -> Self {
        Self::Custom(fmt::format(args))
    }

    /// Wrap this error with a context message.
    #[inline]
    pub fn context<C: Into<String>>(self, context: C) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(self.root(), Error::Io(_))
    }

    #[inline]
    pub fn is_asset(&self) -> bool {
        matches!(
            self.root(),
            Error::Io(_)
                | Error::Image(_)
                | Error::Gltf(_)
                | Error::CompressedModel { .. }
                | Error::MissingGeometry(_)
        )
    }

    #[inline]
    pub fn is_patch(&self) -> bool {
        matches!(self.root(), Error::Patch(_))
    }
}

/// Convenient `Result` alias, use `crate::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_root() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "bar.glb"))
            .context("loading model")
            .context("loading assets");
        assert!(err.is_io());
        assert!(err.is_asset());
        assert!(!err.is_patch());
        let text = err.to_string();
        assert!(text.starts_with("loading assets: loading model: I/O error"));
    }

    #[test]
    fn test_compressed_model_message() {
        let err = Error::CompressedModel { path: PathBuf::from("models/bar.glb") };
        assert!(err.is_asset());
        assert!(err.to_string().contains("decompressed"));
    }
}
