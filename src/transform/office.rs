//! LibreOffice conversions.
//!
//! # Responsibilities
//! - Office, RTF and HTML documents to PDF
//! - PDF to docx, xlsx and pptx
//!
//! # Design Decisions
//! - The input is written into a tracked scratch directory and LibreOffice
//!   writes its output next to it; the directory goes away with the scope
//! - Each run gets a private LibreOffice profile inside that same directory,
//!   so nothing is left in the service user's home
//! - The process is tracked and bounded by the conversion timeout

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};
use crate::validation::ValidatedPayload;

/// Output format of a LibreOffice conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeTarget {
    Pdf,
    Docx,
    Xlsx,
    Pptx,
}

impl OfficeTarget {
    pub fn extension(self) -> &'static str {
        match self {
            OfficeTarget::Pdf => "pdf",
            OfficeTarget::Docx => "docx",
            OfficeTarget::Xlsx => "xlsx",
            OfficeTarget::Pptx => "pptx",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            OfficeTarget::Pdf => crate::transform::PDF_MEDIA_TYPE,
            OfficeTarget::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            OfficeTarget::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            OfficeTarget::Pptx => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        }
    }

    /// Import filter forced when the source is a PDF.
    fn pdf_import_filter(self) -> Option<&'static str> {
        match self {
            OfficeTarget::Pdf => None,
            OfficeTarget::Docx | OfficeTarget::Xlsx => Some("writer_pdf_import"),
            OfficeTarget::Pptx => Some("impress_pdf_import"),
        }
    }
}

/// Argument list for one headless conversion of `input` into `outdir`.
pub fn command_args(input: &Path, outdir: &Path, profile: &Path, target: OfficeTarget) -> Vec<String> {
    let mut args = vec![
        format!("-env:UserInstallation=file://{}", profile.display()),
        "--headless".to_string(),
        "--nofilter".to_string(),
        "--accept=none".to_string(),
    ];
    if let Some(filter) = target.pdf_import_filter() {
        args.push(format!("--infilter={filter}"));
    }
    args.extend([
        "--convert-to".to_string(),
        target.extension().to_string(),
        "--outdir".to_string(),
        outdir.display().to_string(),
        input.display().to_string(),
    ]);
    args
}

/// Convert `bytes` (a file with extension `source_extension`) into `target`.
pub async fn convert(
    ctx: &TransformContext<'_>,
    bytes: &[u8],
    source_extension: &str,
    target: OfficeTarget,
) -> Result<Vec<u8>, TransformError> {
    let dir = ctx.scratch_dir()?;
    let input = dir.join(format!("input.{source_extension}"));
    let outdir = dir.join("out");
    let profile = dir.join("profile");

    tokio::fs::write(&input, bytes)
        .await
        .map_err(|_| TransformError::failure("Scratch storage is not available"))?;
    tokio::fs::create_dir(&outdir)
        .await
        .map_err(|_| TransformError::failure("Scratch storage is not available"))?;

    let mut command = Command::new(&ctx.tools().soffice);
    command.args(command_args(&input, &outdir, &profile, target));
    let output = ctx.run_command(command).await?;

    if !output.status.success() {
        tracing::warn!(
            exit_code = output.status.code(),
            target = target.extension(),
            "LibreOffice conversion failed"
        );
        return Err(TransformError::failure("Document conversion failed"));
    }

    let produced = outdir.join(format!("input.{}", target.extension()));
    match tokio::fs::read(&produced).await {
        Ok(converted) if !converted.is_empty() => Ok(converted),
        _ => Err(TransformError::failure("Conversion produced no output")),
    }
}

/// Office, RTF or HTML document to PDF.
pub struct ToPdf;

#[async_trait]
impl Transform for ToPdf {
    type Input = ValidatedPayload;
    type Options = ();

    fn operation(&self) -> &'static str {
        "office_to_pdf"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, _: ()) -> Result<TransformResult, TransformError> {
        let extension = input.kind().scratch_extension();
        let pdf = convert(ctx, input.bytes(), extension, OfficeTarget::Pdf).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("converted.pdf", pdf)))
    }
}

/// PDF to an Office Open XML format.
pub struct FromPdf(pub OfficeTarget);

#[async_trait]
impl Transform for FromPdf {
    type Input = ValidatedPayload;
    type Options = ();

    fn operation(&self) -> &'static str {
        match self.0 {
            OfficeTarget::Docx => "pdf_to_word",
            OfficeTarget::Xlsx => "pdf_to_excel",
            OfficeTarget::Pptx => "pdf_to_powerpoint",
            OfficeTarget::Pdf => "pdf_to_pdf",
        }
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, _: ()) -> Result<TransformResult, TransformError> {
        let target = self.0;
        let converted = convert(ctx, input.bytes(), "pdf", target).await?;
        Ok(TransformResult::Single(NamedBuffer::new(
            format!("converted.{}", target.extension()),
            target.media_type(),
            converted,
        )))
    }
}
