//! Text and image watermarks.
//!
//! The existing page content is wrapped in `q ... Q` so its graphics state
//! cannot leak into the overlay, then the watermark is drawn on top with its
//! own transparency state: one text object in standard Helvetica, or one
//! image XObject whose alpha channel travels as a soft mask.

use async_trait::async_trait;
use lopdf::{dictionary, Document, ObjectId, Stream};

use crate::transform::image::embed_overlay;
use crate::transform::options::{Color, PageSelection, WatermarkPosition};
use crate::transform::pdf::document::{
    corrupt, flatten_inherited, literal, load, page_ids, page_size, resolved_dict, save,
};
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};
use crate::validation::ValidatedPayload;

const MARGIN: f32 = 20.0;
/// Average Helvetica glyph width as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.6;
const FONT_RESOURCE: &str = "NtpWmFont";
const STATE_RESOURCE: &str = "NtpWmState";
const IMAGE_RESOURCE: &str = "NtpWmImage";

/// Parsed watermark options.
#[derive(Debug, Clone)]
pub struct WatermarkOptions {
    pub text: String,
    pub font_size: u32,
    pub color: Color,
    pub opacity: f32,
    pub position: WatermarkPosition,
    pub pages: PageSelection,
}

/// Parsed image watermark options.
#[derive(Debug, Clone)]
pub struct ImageWatermarkOptions {
    pub opacity: f32,
    pub position: WatermarkPosition,
    /// Drawn width as a fraction of the page width.
    pub scale: f32,
    pub pages: PageSelection,
}

/// Matrix `[a b c d x y]` placing a `box_width` x `box_height` box on a
/// `width` x `height` page. For text the box is the run of glyphs.
pub fn placement(position: WatermarkPosition, width: f32, height: f32, box_width: f32, box_height: f32) -> [f32; 6] {
    let (x, y) = match position {
        WatermarkPosition::Diagonal => {
            let angle = height.atan2(width);
            let (sin, cos) = angle.sin_cos();
            let x = width / 2.0 - cos * box_width / 2.0 + sin * box_height / 2.0;
            let y = height / 2.0 - sin * box_width / 2.0 - cos * box_height / 2.0;
            return [cos, sin, -sin, cos, x, y];
        }
        WatermarkPosition::Center => ((width - box_width) / 2.0, (height - box_height) / 2.0),
        WatermarkPosition::TopLeft => (MARGIN, height - MARGIN - box_height),
        WatermarkPosition::TopRight => (width - MARGIN - box_width, height - MARGIN - box_height),
        WatermarkPosition::BottomLeft => (MARGIN, MARGIN),
        WatermarkPosition::BottomRight => (width - MARGIN - box_width, MARGIN),
    };
    [1.0, 0.0, 0.0, 1.0, x, y]
}

/// Register `(category, name, object)` entries in the page's resources.
fn with_resources(doc: &mut Document, page_id: ObjectId, entries: &[(&str, &str, ObjectId)]) -> Result<(), TransformError> {
    let page = doc.get_dictionary(page_id).map_err(|_| corrupt())?;
    let mut resources = resolved_dict(doc, page.get(b"Resources").ok());

    for &(category, name, id) in entries {
        let mut named = resolved_dict(doc, resources.get(category.as_bytes()).ok());
        named.set(name, id);
        resources.set(category, named);
    }

    doc.get_dictionary_mut(page_id)
        .map_err(|_| corrupt())?
        .set("Resources", resources);
    Ok(())
}

/// Replace the page content with the isolated original plus `overlay`.
fn draw_over(doc: &mut Document, page_id: ObjectId, overlay: &[u8]) -> Result<(), TransformError> {
    let mut content = b"q\n".to_vec();
    content.extend(doc.get_page_content(page_id).unwrap_or_default());
    content.extend_from_slice(b"\nQ\n");
    content.extend_from_slice(overlay);

    let stream_id = doc.add_object(Stream::new(dictionary! {}, content));
    doc.get_dictionary_mut(page_id)
        .map_err(|_| corrupt())?
        .set("Contents", stream_id);
    Ok(())
}

fn transparency_state(doc: &mut Document, opacity: f32) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => opacity,
        "CA" => opacity,
    })
}

/// Draw `options.text` on the selected pages.
pub fn add_text_watermark(bytes: &[u8], options: &WatermarkOptions) -> Result<Vec<u8>, TransformError> {
    if options.text.trim().is_empty() {
        return Err(TransformError::invalid("Watermark text must not be empty"));
    }
    let mut doc = load(bytes)?;
    let ids = page_ids(&doc);
    let selected = options.pages.resolve(ids.len())?;

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let state_id = transparency_state(&mut doc, options.opacity);

    let size = options.font_size as f32;
    let text = literal(&options.text);
    let text_width = options.text.chars().count() as f32 * size * GLYPH_WIDTH;
    let Color { r, g, b } = options.color;

    for page in selected {
        let page_id = ids[page as usize - 1];
        flatten_inherited(&mut doc, page_id)?;
        with_resources(
            &mut doc,
            page_id,
            &[("Font", FONT_RESOURCE, font_id), ("ExtGState", STATE_RESOURCE, state_id)],
        )?;

        let (width, height) = page_size(&doc, page_id);
        let [ma, mb, mc, md, mx, my] = placement(options.position, width, height, text_width, size);

        let mut overlay = format!(
            "q /{STATE_RESOURCE} gs {r:.3} {g:.3} {b:.3} rg BT /{FONT_RESOURCE} {size} Tf \
             {ma:.4} {mb:.4} {mc:.4} {md:.4} {mx:.2} {my:.2} Tm ("
        )
        .into_bytes();
        overlay.extend_from_slice(&text);
        overlay.extend_from_slice(b") Tj ET Q\n");
        draw_over(&mut doc, page_id, &overlay)?;
    }

    doc.prune_objects();
    doc.compress();
    save(&mut doc)
}

/// Draw `image` on the selected pages, `options.scale` of the page wide.
pub fn add_image_watermark(bytes: &[u8], image: &[u8], options: &ImageWatermarkOptions) -> Result<Vec<u8>, TransformError> {
    let mut doc = load(bytes)?;
    let ids = page_ids(&doc);
    let selected = options.pages.resolve(ids.len())?;

    let embedded = embed_overlay(image)?;
    let aspect = embedded.height as f32 / embedded.width as f32;
    let image_id = embedded.add_to(&mut doc);
    let state_id = transparency_state(&mut doc, options.opacity);

    for page in selected {
        let page_id = ids[page as usize - 1];
        flatten_inherited(&mut doc, page_id)?;
        with_resources(
            &mut doc,
            page_id,
            &[("XObject", IMAGE_RESOURCE, image_id), ("ExtGState", STATE_RESOURCE, state_id)],
        )?;

        let (width, height) = page_size(&doc, page_id);
        let drawn_width = width * options.scale;
        let drawn_height = drawn_width * aspect;
        let [ma, mb, mc, md, mx, my] = placement(options.position, width, height, drawn_width, drawn_height);
        // Image space is the unit square, so the box size folds into the matrix.
        let overlay = format!(
            "q /{STATE_RESOURCE} gs {:.4} {:.4} {:.4} {:.4} {mx:.2} {my:.2} cm /{IMAGE_RESOURCE} Do Q\n",
            ma * drawn_width,
            mb * drawn_width,
            mc * drawn_height,
            md * drawn_height,
        );
        draw_over(&mut doc, page_id, overlay.as_bytes())?;
    }

    doc.prune_objects();
    doc.compress();
    save(&mut doc)
}

pub struct TextWatermark;

#[async_trait]
impl Transform for TextWatermark {
    type Input = ValidatedPayload;
    type Options = WatermarkOptions;

    fn operation(&self) -> &'static str {
        "watermark_text"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, options: WatermarkOptions) -> Result<TransformResult, TransformError> {
        let bytes = ctx
            .blocking(move || add_text_watermark(input.bytes(), &options))
            .await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("watermarked.pdf", bytes)))
    }
}

pub struct ImageWatermark;

#[async_trait]
impl Transform for ImageWatermark {
    /// The document, then the watermark image.
    type Input = (ValidatedPayload, ValidatedPayload);
    type Options = ImageWatermarkOptions;

    fn operation(&self) -> &'static str {
        "watermark_image"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, options: ImageWatermarkOptions) -> Result<TransformResult, TransformError> {
        let (document, image) = input;
        let bytes = ctx
            .blocking(move || add_image_watermark(document.bytes(), image.bytes(), &options))
            .await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("watermarked.pdf", bytes)))
    }
}
