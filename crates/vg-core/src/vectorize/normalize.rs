use std::io::Cursor;
use image::{DynamicImage, ImageFormat, RgbaImage};
use crate::error::{Error, Result};

/// Every raster is re-encoded to this format before tracing
pub const CANONICAL_FORMAT: ImageFormat = ImageFormat::Png;

pub struct NormalizedRaster {
    /// RGBA8 PNG encoding of `pixels`
    pub bytes: Vec<u8>,
    pub pixels: RgbaImage,
    /// Format the upstream bytes were detected as, if recognisable
    pub source_format: Option<ImageFormat>,
}

impl NormalizedRaster {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Decodes whatever the generator returned and re-encodes it as an RGBA8 PNG.
pub fn normalize_raster(bytes: &[u8]) -> Result<NormalizedRaster> {
    let source_format = image::guess_format(bytes).ok();

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::Conversion(format!("Failed to decode raster image: {e}")))?;
    let pixels = decoded.to_rgba8();

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(pixels.clone())
        .write_to(&mut out, CANONICAL_FORMAT)
        .map_err(|e| Error::Conversion(format!("Failed to re-encode raster image: {e}")))?;

    Ok(NormalizedRaster {
        bytes: out.into_inner(),
        pixels,
        source_format,
    })
}
