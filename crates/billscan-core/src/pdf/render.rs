//! Page rasterization through poppler's `pdftoppm`.

use std::path::PathBuf;
use std::process::Command;

use image::DynamicImage;
use tracing::debug;

use super::Result;
use crate::error::PdfError;
use crate::models::config::PdfConfig;

/// Renderer program looked up on `PATH` by default.
pub const DEFAULT_RENDERER: &str = "pdftoppm";

/// Default rendering resolution, in dots per inch.
pub const DEFAULT_DPI: u32 = 200;

/// Rasterizes PDF pages by running `pdftoppm` on a temporary copy.
#[derive(Debug, Clone)]
pub struct PageRenderer {
    program: PathBuf,
    dpi: u32,
}

impl PageRenderer {
    /// Create a renderer for the given program and resolution.
    pub fn new(program: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            program: program.into(),
            dpi: dpi.max(1),
        }
    }

    pub fn from_config(config: &PdfConfig) -> Self {
        Self::new(&config.renderer, config.dpi)
    }

    /// Render one page (1-indexed) to an image.
    pub fn render_page(&self, data: &[u8], page: u32) -> Result<DynamicImage> {
        let dir = tempfile::tempdir().map_err(render_error)?;
        let input = dir.path().join("upload.pdf");
        std::fs::write(&input, data).map_err(render_error)?;
        let prefix = dir.path().join("page");

        debug!(program = %self.program.display(), dpi = self.dpi, page, "Rendering PDF page");
        let output = Command::new(&self.program)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg(&input)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                PdfError::Render(format!("failed to run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            return Err(PdfError::Render(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        image::open(prefix.with_extension("png")).map_err(render_error)
    }
}

impl Default for PageRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_RENDERER, DEFAULT_DPI)
    }
}

fn render_error(e: impl std::fmt::Display) -> PdfError {
    PdfError::Render(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_a_render_error() {
        let renderer = PageRenderer::new("billscan-no-such-renderer", 72);
        let err = renderer.render_page(b"%PDF-1.5", 1).unwrap_err();

        assert!(matches!(err, PdfError::Render(_)));
        assert!(err.to_string().contains("billscan-no-such-renderer"));
    }

    #[test]
    fn test_from_config() {
        let config = PdfConfig {
            renderer: "/opt/poppler/bin/pdftoppm".into(),
            dpi: 0,
        };
        let renderer = PageRenderer::from_config(&config);
        assert_eq!(renderer.program, PathBuf::from("/opt/poppler/bin/pdftoppm"));
        assert_eq!(renderer.dpi, 1);
    }
}
