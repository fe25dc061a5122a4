//! OCR with Tesseract.
//!
//! # Data Flow
//! ```text
//! PDF   → scratch dir → pdftoppm -r 300 -png → page-N.png ─┐
//! image → scratch dir ──────────────────────────────────────┴→ tesseract (per page) → TextReport
//! ```
//!
//! # Design Decisions
//! - Rendered pages and the input copy live only in the tracked scratch
//!   directory of the invocation
//! - A page Tesseract cannot read is reported as failed; the others still
//!   come back
//! - Language codes are restricted to `[A-Za-z0-9_+]` before they reach the
//!   command line

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;

use crate::transform::pdf::document::page_count;
use crate::transform::pdf::extract::{PageText, TextReport};
use crate::transform::render::{discard_page, render_all, write_input};
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};
use crate::validation::{sniff_image, ValidatedPayload};

pub const DEFAULT_LANGUAGE: &str = "eng";
const RENDER_DPI: u32 = 300;
const FAILED_PAGE_TEXT: &str = "(OCR failed for this page)";

/// Accept a Tesseract language list such as `eng` or `eng+deu`.
pub fn parse_language(raw: Option<&str>) -> Result<String, TransformError> {
    let language = raw.map(str::trim).filter(|value| !value.is_empty()).unwrap_or(DEFAULT_LANGUAGE);
    let valid = language.len() <= 64
        && language
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '+');
    if valid {
        Ok(language.to_string())
    } else {
        Err(TransformError::invalid("Invalid language code"))
    }
}

async fn recognize(ctx: &TransformContext<'_>, image: &Path, language: &str) -> Result<Option<String>, TransformError> {
    let mut command = Command::new(&ctx.tools().tesseract);
    command.arg(image).arg("stdout").arg("-l").arg(language);
    let output = ctx.run_command(command).await?;
    if output.status.success() {
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    } else {
        tracing::warn!(exit_code = output.status.code(), "Tesseract failed on a page");
        Ok(None)
    }
}

/// Recognize every page of a PDF, or the single page of an image.
pub async fn extract(ctx: &TransformContext<'_>, input: &ValidatedPayload, language: &str) -> Result<TextReport, TransformError> {
    let dir = ctx.scratch_dir()?;
    let pages = if input.is_pdf() {
        let owned = input.clone();
        ctx.blocking(move || page_count(owned.bytes())).await?;
        let source = write_input(&dir, input.bytes()).await?;
        render_all(ctx, &dir, &source, RENDER_DPI).await?
    } else {
        let extension = sniff_image(input.bytes()).map_or("png", |signature| signature.extension());
        let path = dir.join(format!("input.{extension}"));
        tokio::fs::write(&path, input.bytes())
            .await
            .map_err(|_| TransformError::failure("Scratch storage is not available"))?;
        vec![(1, path)]
    };
    if pages.is_empty() {
        return Err(TransformError::EmptyResult("No pages to process".into()));
    }

    let total = pages.len();
    let mut recognized = Vec::with_capacity(total);
    let mut failed = Vec::new();
    for (number, path) in pages {
        match recognize(ctx, &path, language).await? {
            Some(text) => recognized.push((number, text)),
            None => failed.push(number),
        }
        // Each page image is dropped as soon as it has been read.
        discard_page(&path).await;
    }

    let mut report = TextReport::from_pages(total, recognized);
    report.pages.extend(failed.into_iter().map(|page_number| PageText {
        page_number,
        text: FAILED_PAGE_TEXT.to_string(),
        character_count: 0,
    }));
    report.pages.sort_by_key(|page| page.page_number);
    Ok(report)
}

/// Languages from `tesseract --list-langs` output.
pub fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of") && !line.ends_with(':'))
        .map(str::to_string)
        .collect()
}

pub struct Extract;

#[async_trait]
impl Transform for Extract {
    type Input = ValidatedPayload;
    /// Validated language list.
    type Options = String;

    fn operation(&self) -> &'static str {
        "ocr_extract"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, language: String) -> Result<TransformResult, TransformError> {
        let report = extract(ctx, &input, &language).await?;
        Ok(TransformResult::Single(NamedBuffer::json(&report)?))
    }
}

#[derive(Debug, Serialize)]
struct LanguageList {
    languages: Vec<String>,
}

pub struct Languages;

#[async_trait]
impl Transform for Languages {
    type Input = ();
    type Options = ();

    fn operation(&self) -> &'static str {
        "ocr_languages"
    }

    async fn run(&self, ctx: &TransformContext<'_>, _: (), _: ()) -> Result<TransformResult, TransformError> {
        let mut command = Command::new(&ctx.tools().tesseract);
        command.arg("--list-langs");
        let languages = match ctx.run_command(command).await {
            Ok(output) if output.status.success() => {
                // Older releases print the list on stderr.
                let mut listed = parse_language_list(&String::from_utf8_lossy(&output.stdout));
                if listed.is_empty() {
                    listed = parse_language_list(&String::from_utf8_lossy(&output.stderr));
                }
                listed
            }
            Ok(_) | Err(TransformError::ToolUnavailable) => Vec::new(),
            Err(err) => return Err(err),
        };
        let languages = if languages.is_empty() {
            vec![DEFAULT_LANGUAGE.to_string()]
        } else {
            languages
        };
        Ok(TransformResult::Single(NamedBuffer::json(&LanguageList { languages })?))
    }
}
