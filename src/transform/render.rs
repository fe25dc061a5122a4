//! Page rendering with `pdftoppm`.
//!
//! # Data Flow
//! ```text
//! PDF → scratch dir/input.pdf → pdftoppm -png (per page or whole document) → page-N.png
//!     → read into memory, file removed → re-encoded (png, jpg, webp)
//! ```
//!
//! Rendered pages exist on disk only between the renderer writing them and
//! the transform reading them back; anything left behind goes with the
//! invocation's scratch directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::transform::image::RasterFormat;
use crate::transform::options::{in_range, OptionError, PageSelection};
use crate::transform::pdf::document::page_count;
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};
use crate::validation::ValidatedPayload;

pub const DEFAULT_DPI: u32 = 200;
pub const MIN_DPI: u32 = 72;
pub const MAX_DPI: u32 = 600;
pub const DEFAULT_QUALITY: u8 = 85;
const PAGE_PREFIX: &str = "page";

fn scratch_unavailable() -> TransformError {
    TransformError::failure("Scratch storage is not available")
}

fn render_failed() -> TransformError {
    TransformError::failure("Failed to render PDF pages")
}

/// Copy the document into `dir` for the renderer.
pub(crate) async fn write_input(dir: &Path, bytes: &[u8]) -> Result<PathBuf, TransformError> {
    let input = dir.join("input.pdf");
    tokio::fs::write(&input, bytes).await.map_err(|_| scratch_unavailable())?;
    Ok(input)
}

/// Remove a rendered page once its contents are in memory.
pub(crate) async fn discard_page(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        tracing::warn!(error_kind = ?err.kind(), "Failed to remove rendered page");
    }
}

/// Page number encoded in a `pdftoppm` output name (`page-7.png`, `page-007.png`).
fn rendered_page_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    if path.extension()? != "png" {
        return None;
    }
    stem.strip_prefix(PAGE_PREFIX)?.strip_prefix('-')?.parse().ok()
}

async fn rendered_pages(dir: &Path) -> Result<Vec<(u32, PathBuf)>, TransformError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|_| scratch_unavailable())?;
    let mut pages = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|_| scratch_unavailable())? {
        let path = entry.path();
        if let Some(number) = rendered_page_number(&path) {
            pages.push((number, path));
        }
    }
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages)
}

async fn run_renderer(ctx: &TransformContext<'_>, command: Command) -> Result<(), TransformError> {
    let output = ctx.run_command(command).await?;
    if !output.status.success() {
        tracing::warn!(exit_code = output.status.code(), "Page rendering failed");
        return Err(render_failed());
    }
    Ok(())
}

/// Render every page of `input` as `page-N.png` in `dir`, in page order.
pub(crate) async fn render_all(ctx: &TransformContext<'_>, dir: &Path, input: &Path, dpi: u32) -> Result<Vec<(u32, PathBuf)>, TransformError> {
    let mut command = Command::new(&ctx.tools().pdftoppm);
    command
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-png")
        .arg(input)
        .arg(dir.join(PAGE_PREFIX));
    run_renderer(ctx, command).await?;
    rendered_pages(dir).await
}

/// Render one page of `input` to `dir/page-{page}.png`.
async fn render_page(ctx: &TransformContext<'_>, dir: &Path, input: &Path, page: u32, dpi: u32) -> Result<PathBuf, TransformError> {
    let prefix = dir.join(format!("{PAGE_PREFIX}-{page}"));
    let mut command = Command::new(&ctx.tools().pdftoppm);
    command
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-f")
        .arg(page.to_string())
        .arg("-l")
        .arg(page.to_string())
        .arg("-singlefile")
        .arg("-png")
        .arg(input)
        .arg(&prefix);
    run_renderer(ctx, command).await?;
    Ok(prefix.with_extension("png"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub format: RasterFormat,
    pub pages: PageSelection,
    pub dpi: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl RenderOptions {
    pub fn new(format: Option<&str>, pages: PageSelection, dpi: Option<i64>, quality: Option<i64>) -> Result<Self, OptionError> {
        Ok(Self {
            format: format.map(str::parse).transpose()?.unwrap_or_default(),
            pages,
            dpi: match dpi {
                Some(dpi) => in_range("dpi", dpi, MIN_DPI as i64, MAX_DPI as i64)? as u32,
                None => DEFAULT_DPI,
            },
            quality: match quality {
                Some(quality) => in_range("quality", quality, 1, 100)? as u8,
                None => DEFAULT_QUALITY,
            },
        })
    }
}

/// PDF pages to images named `page_NNN.ext`.
pub struct PdfToImages;

#[async_trait]
impl Transform for PdfToImages {
    type Input = ValidatedPayload;
    type Options = RenderOptions;

    fn operation(&self) -> &'static str {
        "pdf_to_images"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, options: RenderOptions) -> Result<TransformResult, TransformError> {
        let owned = input.clone();
        let total = ctx.blocking(move || page_count(owned.bytes())).await?;
        let selected = options.pages.resolve(total)?;

        let dir = ctx.scratch_dir()?;
        let source = write_input(&dir, input.bytes()).await?;
        let RenderOptions { format, quality, dpi, .. } = options;

        let mut images = Vec::with_capacity(selected.len());
        for page in selected {
            let path = render_page(ctx, &dir, &source, page, dpi).await?;
            let rendered = tokio::fs::read(&path).await.map_err(|_| render_failed());
            discard_page(&path).await;
            let rendered = rendered?;
            let encoded = ctx.blocking(move || format.reencode_png(rendered, quality)).await?;
            let name = format!("page_{page:03}.{}", format.extension());
            images.push(NamedBuffer::new(name, format.media_type(), encoded));
        }
        tracing::debug!(pages = images.len(), "Pages rendered");
        Ok(TransformResult::Multiple(images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::scratch::{ResourceTracker, ScratchScope};
    use crate::transform::pdf::fixtures::sample;
    use crate::validation::ExpectedKind;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[test]
    fn rendered_page_names() {
        assert_eq!(rendered_page_number(Path::new("/s/page-7.png")), Some(7));
        assert_eq!(rendered_page_number(Path::new("/s/page-012.png")), Some(12));
        assert_eq!(rendered_page_number(Path::new("/s/input.pdf")), None);
        assert_eq!(rendered_page_number(Path::new("/s/page-1.ppm")), None);
    }

    #[test]
    fn render_option_bounds() {
        let defaults = RenderOptions::new(None, PageSelection::All, None, None).unwrap();
        assert_eq!(defaults.format, RasterFormat::Png);
        assert_eq!((defaults.dpi, defaults.quality), (200, 85));

        let jpg = RenderOptions::new(Some("jpg"), PageSelection::First, Some(72), Some(1)).unwrap();
        assert_eq!((jpg.format, jpg.dpi, jpg.quality), (RasterFormat::Jpeg, 72, 1));

        assert_eq!(
            RenderOptions::new(None, PageSelection::All, Some(601), None).unwrap_err().to_string(),
            "dpi must be between 72 and 600"
        );
        assert!(RenderOptions::new(None, PageSelection::All, None, Some(0)).is_err());
        assert!(RenderOptions::new(Some("bmp"), PageSelection::All, None, None).is_err());
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.scratch.root = std::env::temp_dir();
        settings.tools.pdftoppm = "/nonexistent/notrace-pdftoppm".into();
        settings
    }

    #[tokio::test]
    async fn missing_renderer_releases_scratch() {
        let tracker = ResourceTracker::new();
        let settings = settings();
        let scope = ScratchScope::new(tracker.clone(), settings.scratch.root.clone());
        let ctx = TransformContext::new(&scope, &settings);

        let input = ValidatedPayload::trusted(ExpectedKind::Pdf, sample(2));
        let options = RenderOptions::new(None, PageSelection::All, None, None).unwrap();
        let err = PdfToImages.run(&ctx, input, options).await.unwrap_err();
        assert!(matches!(err, TransformError::ToolUnavailable));
        assert_eq!(scope.held(), 1);

        scope.close();
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn pages_are_checked_before_rendering() {
        let tracker = ResourceTracker::new();
        let settings = settings();
        let scope = ScratchScope::new(tracker.clone(), settings.scratch.root.clone());
        let ctx = TransformContext::new(&scope, &settings);

        let input = ValidatedPayload::trusted(ExpectedKind::Pdf, sample(2));
        let options = RenderOptions::new(None, PageSelection::Specific(vec![5]), None, None).unwrap();
        let err = PdfToImages.run(&ctx, input, options).await.unwrap_err();
        assert!(matches!(err, TransformError::PageOutOfRange { page: 5, total: 2 }));
        assert_eq!(scope.held(), 0);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_page_removal_is_logged_without_the_path() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let path = std::env::temp_dir().join("notrace-vanished-page-7.png");
        discard_page(&path).await;

        let logs = String::from_utf8_lossy(&captured.0.lock().unwrap()).into_owned();
        assert!(logs.contains("Failed to remove rendered page"), "{logs}");
        assert!(logs.contains("NotFound"), "{logs}");
        assert!(!logs.contains("notrace-vanished-page-7"), "{logs}");
    }
}
