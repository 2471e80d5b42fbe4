mod external;
#[cfg(feature = "vtracer")]
mod library;
mod normalize;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use async_trait::async_trait;
use crate::config::VectorizeConfig;
use crate::error::{Error, Result};

pub(crate) use crate::artifact::TempFile;
pub use external::ExternalVectorizer;
#[cfg(feature = "vtracer")]
pub use library::LibraryVectorizer;
pub use normalize::{normalize_raster, NormalizedRaster, CANONICAL_FORMAT};

/// Raster to SVG conversion.
///
/// Implementations must leave no intermediate files behind, whatever the outcome.
#[async_trait]
pub trait Vectorizer: Send + Sync {
    async fn vectorize(&self, raster: &Path) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorizerKind {
    /// ImageMagick posterize followed by potrace
    External,
    /// In-process tracing with vtracer
    Library,
    /// Library when compiled in, external tools otherwise
    Auto,
}

impl FromStr for VectorizerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" | "potrace" => Ok(Self::External),
            "library" | "vtracer" => Ok(Self::Library),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown vectorizer '{other}' (expected external, library or auto)")),
        }
    }
}

impl fmt::Display for VectorizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::External => "external",
            Self::Library => "library",
            Self::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// Builds the vectorizer selected by `config.kind`.
pub fn from_config(config: &VectorizeConfig) -> Result<Arc<dyn Vectorizer>> {
    match config.kind {
        VectorizerKind::External => Ok(Arc::new(ExternalVectorizer::new(config.clone()))),
        VectorizerKind::Library => library_vectorizer(),
        VectorizerKind::Auto => match library_vectorizer() {
            Ok(v) => Ok(v),
            Err(_) => Ok(Arc::new(ExternalVectorizer::new(config.clone()))),
        },
    }
}

#[cfg(feature = "vtracer")]
fn library_vectorizer() -> Result<Arc<dyn Vectorizer>> {
    Ok(Arc::new(LibraryVectorizer::default()))
}

#[cfg(not(feature = "vtracer"))]
fn library_vectorizer() -> Result<Arc<dyn Vectorizer>> {
    Err(Error::ToolUnavailable("vtracer (build with the `vtracer` feature)".into()))
}

/// Reads the raster, rejecting missing and zero-length files.
pub(crate) async fn read_input(raster: &Path) -> Result<Vec<u8>> {
    match tokio::fs::read(raster).await {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        Ok(_) => Err(Error::InputNotFound(raster.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::InputNotFound(raster.to_path_buf())),
        Err(e) => Err(Error::io(raster, e)),
    }
}
