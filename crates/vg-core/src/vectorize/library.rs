use std::path::Path;
use async_trait::async_trait;
use log::info;
use vtracer::{ColorImage, Config as TraceConfig};
use crate::error::{Error, Result};
use super::{normalize_raster, read_input, Vectorizer};

/// In-process tracing through vtracer. Creates no files of its own.
#[derive(Default)]
pub struct LibraryVectorizer {
    trace: TraceConfig,
}

#[async_trait]
impl Vectorizer for LibraryVectorizer {
    async fn vectorize(&self, raster: &Path) -> Result<String> {
        let bytes = read_input(raster).await?;
        let trace = self.trace.clone();

        let svg = tokio::task::spawn_blocking(move || -> Result<String> {
            let normalized = normalize_raster(&bytes)?;
            let image = ColorImage {
                width: normalized.width() as usize,
                height: normalized.height() as usize,
                pixels: normalized.pixels.into_raw(),
            };

            vtracer::convert(image, trace)
                .map(|file| file.to_string())
                .map_err(Error::Conversion)
        })
        .await
        .map_err(|e| Error::Conversion(format!("Tracing task failed: {e}")))??;

        info!("Traced {} into {} bytes of SVG", raster.display(), svg.len());
        Ok(svg)
    }
}
