//! Markdown to PDF.
//!
//! The Markdown is rendered to a standalone HTML document and handed to the
//! LibreOffice HTML path. Raw HTML in the source is shown as text and images
//! are reduced to their alt text, so the converter never loads anything the
//! request did not carry.

use async_trait::async_trait;
use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};

use crate::transform::office::{self, OfficeTarget};
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};

const DOCUMENT_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<title>Converted Document</title>
<style>
body { font-family: "Liberation Sans", Arial, sans-serif; line-height: 1.6; color: #333; }
h1, h2 { border-bottom: 1px solid #eee; padding-bottom: 0.3em; }
code, pre { font-family: "Liberation Mono", "Courier New", monospace; background-color: #f4f4f4; }
pre { padding: 1em; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ddd; padding: 8px 12px; text-align: left; }
th { background-color: #f4f4f4; }
blockquote { border-left: 4px solid #ddd; margin-left: 0; padding-left: 1em; color: #666; }
</style>
</head>
<body>
"#;
const DOCUMENT_TAIL: &str = "</body>\n</html>\n";

fn contained(event: Event<'_>) -> Option<Event<'_>> {
    match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Some(Event::Text(raw)),
        Event::Start(Tag::Image { .. }) | Event::End(TagEnd::Image) => None,
        // Line breaks in the source are kept.
        Event::SoftBreak => Some(Event::HardBreak),
        other => Some(other),
    }
}

/// Render `markdown` as a complete HTML document.
pub fn render_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let events = Parser::new_ext(markdown, options).filter_map(contained);

    let mut document = String::with_capacity(DOCUMENT_HEAD.len() + markdown.len() * 2);
    document.push_str(DOCUMENT_HEAD);
    html::push_html(&mut document, events);
    document.push_str(DOCUMENT_TAIL);
    document
}

pub struct MarkdownToPdf;

#[async_trait]
impl Transform for MarkdownToPdf {
    type Input = String;
    type Options = ();

    fn operation(&self) -> &'static str {
        "markdown_to_pdf"
    }

    async fn run(&self, ctx: &TransformContext<'_>, markdown: String, _: ()) -> Result<TransformResult, TransformError> {
        if markdown.trim().is_empty() {
            return Err(TransformError::invalid("Markdown content is empty"));
        }
        let document = render_html(&markdown);
        let pdf = office::convert(ctx, document.as_bytes(), "html", OfficeTarget::Pdf).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("converted.pdf", pdf)))
    }
}
