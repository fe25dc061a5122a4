//! Text extraction and document info.
//!
//! Both operations answer with a JSON body instead of a document. The page
//! report shape is shared with OCR so clients can treat the two alike.

use async_trait::async_trait;
use lopdf::Document;
use serde::Serialize;

use crate::transform::options::PageSelection;
use crate::transform::pdf::document::{corrupt, load};
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};
use crate::validation::ValidatedPayload;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
    pub character_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextReport {
    pub total_pages: usize,
    pub total_characters: usize,
    pub pages: Vec<PageText>,
}

impl TextReport {
    /// Build a report from raw per-page text, cleaning each page.
    pub fn from_pages(total_pages: usize, pages: impl IntoIterator<Item = (u32, String)>) -> Self {
        let pages: Vec<PageText> = pages
            .into_iter()
            .map(|(page_number, raw)| {
                let text = clean_text(&raw);
                let character_count = text.chars().count();
                PageText { page_number, text, character_count }
            })
            .collect();
        let total_characters = pages.iter().map(|page| page.character_count).sum();
        Self { total_pages, total_characters, pages }
    }
}

/// Normalize line endings, squeeze runs of three or more spaces or newlines
/// down to two, drop NUL characters and trim.
pub fn clean_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len());
    let mut run: Option<(char, usize)> = None;
    for ch in normalized.chars() {
        if ch == '\0' {
            continue;
        }
        let repeat = match run {
            Some((prev, count)) if prev == ch => count + 1,
            _ => 1,
        };
        run = Some((ch, repeat));
        if matches!(ch, ' ' | '\n') && repeat > 2 {
            continue;
        }
        out.push(ch);
    }
    out.trim().to_string()
}

pub fn extract_text(bytes: &[u8], pages: &PageSelection) -> Result<TextReport, TransformError> {
    let doc = load(bytes)?;
    let total = doc.get_pages().len();
    let selected = pages.resolve(total)?;
    let texts = selected.into_iter().map(|page| {
        let raw = doc.extract_text(&[page]).unwrap_or_else(|err| {
            tracing::debug!(page, error = %err, "Page text unreadable");
            String::new()
        });
        (page, raw)
    });
    Ok(TextReport::from_pages(total, texts))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub encrypted: bool,
    pub version: String,
}

/// Encrypted documents are still described; their page tree stays readable.
pub fn info(bytes: &[u8]) -> Result<DocumentInfo, TransformError> {
    let doc = Document::load_mem(bytes).map_err(|err| match err {
        lopdf::Error::InvalidPassword => TransformError::invalid(super::document::LOCKED_DETAIL),
        _ => corrupt(),
    })?;
    Ok(DocumentInfo {
        page_count: doc.get_pages().len(),
        encrypted: doc.is_encrypted(),
        version: doc.version.clone(),
    })
}

pub struct ExtractText;

#[async_trait]
impl Transform for ExtractText {
    type Input = ValidatedPayload;
    type Options = PageSelection;

    fn operation(&self) -> &'static str {
        "extract_text"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, pages: PageSelection) -> Result<TransformResult, TransformError> {
        let report = ctx.blocking(move || extract_text(input.bytes(), &pages)).await?;
        Ok(TransformResult::Single(NamedBuffer::json(&report)?))
    }
}

pub struct Info;

#[async_trait]
impl Transform for Info {
    type Input = ValidatedPayload;
    type Options = ();

    fn operation(&self) -> &'static str {
        "info"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, _: ()) -> Result<TransformResult, TransformError> {
        let info = ctx.blocking(move || info(input.bytes())).await?;
        Ok(TransformResult::Single(NamedBuffer::json(&info)?))
    }
}
