//! Plain text to PDF.
//!
//! Text is laid out on A4 pages with a one inch margin using one of the
//! standard Type1 fonts, so no font program is embedded. Long lines wrap at
//! the last space in the second half of the line, otherwise mid-word.

use std::str::FromStr;

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, Stream};

use crate::transform::options::{in_range, OptionError};
use crate::transform::pdf::document::{literal, save};
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 72.0;
const LINE_SPACING: f32 = 1.5;
const TAB: &str = "    ";

pub const DEFAULT_FONT_SIZE: u32 = 12;
pub const MIN_FONT_SIZE: u32 = 6;
pub const MAX_FONT_SIZE: u32 = 72;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextFont {
    #[default]
    Helvetica,
    Courier,
    Times,
}

impl TextFont {
    fn base_font(self) -> &'static str {
        match self {
            TextFont::Helvetica => "Helvetica",
            TextFont::Courier => "Courier",
            TextFont::Times => "Times-Roman",
        }
    }

    /// Average advance width as a fraction of the font size.
    fn glyph_width(self) -> f32 {
        match self {
            TextFont::Courier => 0.6,
            TextFont::Helvetica | TextFont::Times => 0.5,
        }
    }
}

impl FromStr for TextFont {
    type Err = OptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "helv" => Ok(TextFont::Helvetica),
            "cour" => Ok(TextFont::Courier),
            "tim" => Ok(TextFont::Times),
            _ => Err(OptionError::new("Invalid font family. Must be one of: helv, cour, tim")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextOptions {
    pub font_size: u32,
    pub font: TextFont,
}

impl TextOptions {
    pub fn new(font_size: Option<i64>, font: Option<&str>) -> Result<Self, OptionError> {
        let font_size = match font_size {
            Some(size) => in_range("font_size", size, MIN_FONT_SIZE as i64, MAX_FONT_SIZE as i64)? as u32,
            None => DEFAULT_FONT_SIZE,
        };
        let font = font.map(str::parse).transpose()?.unwrap_or_default();
        Ok(Self { font_size, font })
    }
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            font: TextFont::default(),
        }
    }
}

/// Break `text` into output lines of at most `max_chars` characters.
pub fn wrap_lines(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for source in text.replace("\r\n", "\n").replace('\r', "\n").split('\n') {
        let mut rest: Vec<char> = source.replace('\t', TAB).chars().collect();
        if rest.is_empty() {
            lines.push(String::new());
            continue;
        }
        while !rest.is_empty() {
            if rest.len() <= max_chars {
                lines.push(rest.iter().collect());
                break;
            }
            let break_at = rest[..max_chars]
                .iter()
                .rposition(|ch| *ch == ' ')
                .filter(|pos| *pos > max_chars / 2)
                .map_or(max_chars, |pos| pos + 1);
            let line: String = rest[..break_at].iter().collect();
            lines.push(line.trim_end().to_string());
            let next = rest[break_at..].iter().position(|ch| *ch != ' ').unwrap_or(rest.len() - break_at);
            rest.drain(..break_at + next);
        }
    }
    lines
}

/// Lay `text` out over as many pages as it needs.
pub fn text_to_pdf(text: &str, options: TextOptions) -> Result<Vec<u8>, TransformError> {
    if text.trim().is_empty() {
        return Err(TransformError::invalid("Text content is empty"));
    }
    let size = options.font_size as f32;
    let line_height = size * LINE_SPACING;
    let max_chars = ((PAGE_WIDTH - 2.0 * MARGIN) / (size * options.font.glyph_width())) as usize;
    let per_page = (((PAGE_HEIGHT - 2.0 * MARGIN) / line_height) as usize).max(1);
    let lines = wrap_lines(text, max_chars);

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => options.font.base_font(),
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for chunk in lines.chunks(per_page) {
        let mut content = format!(
            "BT /F1 {size} Tf {line_height} TL {MARGIN} {} Td\n",
            PAGE_HEIGHT - MARGIN - size
        )
        .into_bytes();
        for line in chunk {
            content.push(b'(');
            content.extend(literal(line));
            content.extend_from_slice(b") Tj T*\n");
        }
        content.extend_from_slice(b"ET");

        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(PAGE_WIDTH), Object::Real(PAGE_HEIGHT)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    save(&mut doc)
}

pub struct TextToPdf;

#[async_trait]
impl Transform for TextToPdf {
    type Input = String;
    type Options = TextOptions;

    fn operation(&self) -> &'static str {
        "text_to_pdf"
    }

    async fn run(&self, ctx: &TransformContext<'_>, text: String, options: TextOptions) -> Result<TransformResult, TransformError> {
        let pdf = ctx.blocking(move || text_to_pdf(&text, options)).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("converted.pdf", pdf)))
    }
}
