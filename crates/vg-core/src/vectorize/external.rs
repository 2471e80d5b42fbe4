use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;
use crate::config::VectorizeConfig;
use crate::error::{Error, Result};
use super::{normalize_raster, read_input, TempFile, Vectorizer};

/// Two-step command-line tracing: ImageMagick posterizes the normalized
/// raster into a bitmap, potrace turns the bitmap into an SVG.
pub struct ExternalVectorizer {
    config: VectorizeConfig,
}

impl ExternalVectorizer {
    pub fn new(config: VectorizeConfig) -> Self {
        Self { config }
    }

    async fn ensure_tools(&self) -> Result<()> {
        for tool in [&self.config.magick_path, &self.config.potrace_path] {
            if !tool_exists(tool).await {
                return Err(Error::ToolUnavailable(tool.display().to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Vectorizer for ExternalVectorizer {
    async fn vectorize(&self, raster: &Path) -> Result<String> {
        let bytes = read_input(raster).await?;
        self.ensure_tools().await?;

        let normalized_file = TempFile::new(sibling(raster, "_normalized.png"));
        let posterized_file = TempFile::new(sibling(raster, "_posterized.bmp"));
        let traced_file = TempFile::new(sibling(raster, "_traced.svg"));

        let normalized = tokio::task::spawn_blocking(move || normalize_raster(&bytes))
            .await
            .map_err(|e| Error::Conversion(format!("Normalization task failed: {e}")))??;
        debug!(
            "Normalized {}x{} raster ({:?}) for tracing",
            normalized.width(),
            normalized.height(),
            normalized.source_format
        );

        tokio::fs::write(normalized_file.path(), &normalized.bytes)
            .await
            .map_err(|e| Error::io(normalized_file.path(), e))?;

        let levels = self.config.posterize_levels.to_string();
        run_tool(
            "ImageMagick",
            &self.config.magick_path,
            [
                normalized_file.path().as_os_str(),
                OsStr::new("-posterize"),
                OsStr::new(&levels),
                posterized_file.path().as_os_str(),
            ],
        )
        .await?;

        run_tool(
            "Potrace",
            &self.config.potrace_path,
            [
                posterized_file.path().as_os_str(),
                OsStr::new("--svg"),
                OsStr::new("-o"),
                traced_file.path().as_os_str(),
            ],
        )
        .await?;

        let svg = tokio::fs::read_to_string(traced_file.path())
            .await
            .map_err(|e| Error::Conversion(format!("Potrace produced no readable SVG: {e}")))?;

        if svg.trim().is_empty() {
            return Err(Error::Conversion("Potrace produced an empty SVG".into()));
        }

        info!("Traced {} into {} bytes of SVG", raster.display(), svg.len());
        Ok(svg)
    }
}

/// Path next to `raster` named `<stem><suffix>`
fn sibling(raster: &Path, suffix: &str) -> PathBuf {
    let stem = raster
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "raster".to_string());
    raster.with_file_name(format!("{stem}{suffix}"))
}

/// A tool counts as present if it answers `--version` or `-version`.
async fn tool_exists(tool: &Path) -> bool {
    for flag in ["--version", "-version"] {
        let status = Command::new(tool)
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if matches!(status, Ok(s) if s.success()) {
            return true;
        }
    }
    false
}

async fn run_tool<I, S>(label: &str, tool: &Path, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(tool);
    command.args(args).stdin(Stdio::null());
    debug!("Running {:?}", command.as_std());

    let output = command.output().await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::ToolUnavailable(tool.display().to_string()),
        _ => Error::Conversion(format!("Failed to start {label}: {e}")),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Conversion(format!(
            "Error during {label} processing ({}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}
