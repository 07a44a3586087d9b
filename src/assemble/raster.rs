//! Page rasterization and the printable HTML view
//!
//! Each PDF page is rendered to a PNG by a [`PageRasterizer`]; the pages are
//! then embedded as data URLs into one HTML document that opens the print
//! dialog after a settle delay.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::Error;

/// Why a document could not be rendered
#[derive(Debug, Error)]
pub enum RenderError {
    /// The document itself could not be parsed; the run continues without it
    #[error("{0}")]
    Unreadable(String),

    /// The renderer is broken; the run is aborted
    #[error(transparent)]
    Fatal(#[from] Error),
}

impl From<std::io::Error> for RenderError {
    fn from(e: std::io::Error) -> Self {
        RenderError::Fatal(Error::Io(e))
    }
}

/// Renders every page of a PDF to PNG bytes
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render all pages of `pdf` at `dpi`, in page order
    async fn render_pages(
        &self,
        pdf: &[u8],
        dpi: u32,
    ) -> std::result::Result<Vec<Vec<u8>>, RenderError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// [`PageRasterizer`] backed by the `pdftoppm` binary from poppler
///
/// # Examples
///
/// ```no_run
/// use label_dl::assemble::{CliRasterizer, PageRasterizer};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let rasterizer = CliRasterizer::from_path().expect("pdftoppm not found in PATH");
/// let pdf = std::fs::read("label.pdf")?;
/// let pages = rasterizer.render_pages(&pdf, 144).await?;
/// println!("{} pages", pages.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CliRasterizer {
    binary_path: PathBuf,
    temp_dir: Option<PathBuf>,
}

impl CliRasterizer {
    /// Create a rasterizer with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            temp_dir: None,
        }
    }

    /// Put scratch files under `dir` instead of the system temp dir
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Attempt to find pdftoppm in PATH
    pub fn from_path() -> Option<Self> {
        which::which("pdftoppm").ok().map(Self::new)
    }

    /// Build from configuration
    ///
    /// An explicit `print.pdftoppm_path` wins; otherwise PATH is searched when
    /// `print.search_path` is set. `None` means raster output is unavailable.
    pub fn from_config(config: &Config) -> Option<Self> {
        let rasterizer = match &config.print.pdftoppm_path {
            Some(path) => Some(Self::new(path.clone())),
            None if config.print.search_path => Self::from_path(),
            None => None,
        };
        rasterizer.map(|r| r.with_temp_dir(config.output.temp_dir.clone()))
    }

    /// Path of the binary this rasterizer runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("label-dl-");
        match &self.temp_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl PageRasterizer for CliRasterizer {
    async fn render_pages(
        &self,
        pdf: &[u8],
        dpi: u32,
    ) -> std::result::Result<Vec<Vec<u8>>, RenderError> {
        let scratch = self.scratch_dir()?;
        let input = scratch.path().join("input.pdf");
        tokio::fs::write(&input, pdf).await?;

        let output = Command::new(&self.binary_path)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(&input)
            .arg(scratch.path().join("page"))
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute pdftoppm: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.trim();
            return Err(RenderError::Unreadable(if reason.is_empty() {
                format!("pdftoppm exited with {}", output.status)
            } else {
                reason.to_string()
            }));
        }

        let pages = collect_pages(scratch.path()).await?;
        if pages.is_empty() {
            return Err(RenderError::Unreadable("document has no pages".to_string()));
        }
        debug!(pages = pages.len(), dpi, "rendered document");
        Ok(pages)
    }

    fn name(&self) -> &'static str {
        "pdftoppm"
    }
}

/// Read `page-<n>.png` files from `dir` in page-number order
///
/// pdftoppm zero-pads the number to the width of the page count, so the
/// numeric suffix is parsed rather than sorting names.
async fn collect_pages(dir: &Path) -> std::io::Result<Vec<Vec<u8>>> {
    let mut numbered = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(number) = name
            .to_str()
            .and_then(|n| n.strip_prefix("page-"))
            .and_then(|n| n.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        numbered.push((number, entry.path()));
    }
    numbered.sort_by_key(|(number, _)| *number);

    let mut pages = Vec::with_capacity(numbered.len());
    for (_, path) in numbered {
        pages.push(tokio::fs::read(path).await?);
    }
    Ok(pages)
}

/// HTML print view with one full-bleed page per PNG, printing after `settle_delay`
pub fn print_view_html(pages: &[Vec<u8>], settle_delay: Duration) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Shipping labels</title>\n<style>\n\
         @page { margin: 0; }\n\
         html, body { margin: 0; padding: 0; }\n\
         .page { page-break-after: always; break-after: page; }\n\
         .page:last-child { page-break-after: auto; break-after: auto; }\n\
         .page img { display: block; width: 100%; height: auto; }\n\
         </style>\n</head>\n<body>\n",
    );

    for (i, png) in pages.iter().enumerate() {
        html.push_str(&format!(
            "<div class=\"page\"><img src=\"data:image/png;base64,{}\" alt=\"Label page {}\"></div>\n",
            BASE64.encode(png),
            i + 1
        ));
    }

    html.push_str(&format!(
        "<script>\nwindow.addEventListener('load', function () {{\n  \
         setTimeout(function () {{ window.print(); }}, {});\n}});\n</script>\n\
         </body>\n</html>\n",
        settle_delay.as_millis()
    ));
    html
}
