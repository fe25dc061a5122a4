//! Images to PDF, and raster output shared by the image-producing transforms.
//!
//! # Responsibilities
//! - One page per uploaded image, in upload order
//! - Page sizing (fixed paper, fit-to-image, original) and centred placement
//! - Image XObjects for overlays, keeping transparency as a soft mask
//! - Encoding decoded images as PNG, JPEG or WebP
//!
//! # Design Decisions
//! - Baseline RGB and grayscale JPEGs are embedded as-is with `DCTDecode`
//! - Everything else is decoded, flattened onto white and embedded as
//!   Flate-compressed RGB samples
//! - Images are never upscaled when fitted to the page
//! - WebP output is lossless; the quality setting only applies to JPEG

use std::io::Cursor;
use std::str::FromStr;

use async_trait::async_trait;
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageFormat, Rgb, RgbImage};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::transform::options::{in_range, OptionError};
use crate::transform::pdf::document::save;
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};
use crate::validation::{sniff_image, ImageSignature, ValidatedPayload};

pub const DEFAULT_MARGIN: u32 = 20;
pub const MAX_MARGIN: u32 = 100;
const A4: (f32, f32) = (595.28, 841.89);
const LETTER: (f32, f32) = (612.0, 792.0);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageSize {
    #[default]
    A4,
    Letter,
    /// Page sized to the image plus margins.
    Fit,
    /// Page sized to the image.
    Original,
}

impl FromStr for PageSize {
    type Err = OptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "a4" => Ok(PageSize::A4),
            "letter" => Ok(PageSize::Letter),
            "fit" => Ok(PageSize::Fit),
            "original" => Ok(PageSize::Original),
            _ => Err(OptionError::new("Invalid page_size. Must be one of: a4, letter, fit, original")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageLayout {
    pub page_size: PageSize,
    pub margin: u32,
    pub fit_to_page: bool,
}

impl Default for ImageLayout {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            margin: DEFAULT_MARGIN,
            fit_to_page: true,
        }
    }
}

impl ImageLayout {
    pub fn new(page_size: Option<&str>, margin: Option<i64>, fit_to_page: Option<bool>) -> Result<Self, OptionError> {
        Ok(Self {
            page_size: page_size.map(str::parse).transpose()?.unwrap_or_default(),
            margin: match margin {
                Some(value) => in_range("margin", value, 0, MAX_MARGIN as i64)? as u32,
                None => DEFAULT_MARGIN,
            },
            fit_to_page: fit_to_page.unwrap_or(true),
        })
    }

    /// Page dimensions in points for an image of `width` x `height` pixels.
    pub fn page_dimensions(&self, width: f32, height: f32) -> (f32, f32) {
        let margin = self.margin as f32;
        match self.page_size {
            PageSize::A4 => A4,
            PageSize::Letter => LETTER,
            PageSize::Fit => (width + 2.0 * margin, height + 2.0 * margin),
            PageSize::Original => (width, height),
        }
    }

    /// Drawn rectangle `(x, y, width, height)` on a page of `page` size.
    pub fn placement(&self, page: (f32, f32), width: f32, height: f32) -> (f32, f32, f32, f32) {
        let (page_width, page_height) = page;
        let (drawn_width, drawn_height) = if self.fit_to_page {
            let margin = self.margin as f32;
            let available_width = (page_width - 2.0 * margin).max(1.0);
            let available_height = (page_height - 2.0 * margin).max(1.0);
            let scale = (available_width / width).min(available_height / height).min(1.0);
            (width * scale, height * scale)
        } else {
            (width, height)
        };
        (
            (page_width - drawn_width) / 2.0,
            (page_height - drawn_height) / 2.0,
            drawn_width,
            drawn_height,
        )
    }
}

/// Output encoding for rendered or extracted images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RasterFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl FromStr for RasterFormat {
    type Err = OptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "png" => Ok(RasterFormat::Png),
            "jpg" | "jpeg" => Ok(RasterFormat::Jpeg),
            "webp" => Ok(RasterFormat::Webp),
            _ => Err(OptionError::new("Invalid format. Must be one of: png, jpg, webp")),
        }
    }
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
            RasterFormat::Webp => "webp",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
            RasterFormat::Webp => "image/webp",
        }
    }

    /// Encode `image`; `quality` (1-100) is used for JPEG.
    pub fn encode(self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, TransformError> {
        let failed = |_| TransformError::failure("Failed to encode image");
        let mut out = Cursor::new(Vec::new());
        match self {
            RasterFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                    .encode_image(&image.to_rgb8())
                    .map_err(failed)?;
            }
            RasterFormat::Png => image.write_to(&mut out, ImageFormat::Png).map_err(failed)?,
            RasterFormat::Webp => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut out, ImageFormat::WebP)
                .map_err(failed)?,
        }
        Ok(out.into_inner())
    }

    /// Re-encode a PNG, passing it through untouched when PNG is wanted.
    pub fn reencode_png(self, png: Vec<u8>, quality: u8) -> Result<Vec<u8>, TransformError> {
        if self == RasterFormat::Png {
            return Ok(png);
        }
        let image = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(|_| TransformError::failure("Failed to read rendered page"))?;
        self.encode(&image, quality)
    }
}

fn unreadable() -> TransformError {
    TransformError::invalid("Invalid image file. Could not decode image.")
}

/// An image XObject ready to be added to a document.
pub(crate) struct Embedded {
    stream: Stream,
    /// Alpha channel as a `DeviceGray` soft mask.
    mask: Option<Stream>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl Embedded {
    /// Add the image (and its mask) to `doc`.
    pub(crate) fn add_to(self, doc: &mut Document) -> ObjectId {
        let mut stream = self.stream;
        if let Some(mask) = self.mask {
            let mask_id = doc.add_object(mask);
            stream.dict.set("SMask", mask_id);
        }
        doc.add_object(stream)
    }
}

/// JPEGs whose samples PDF can consume directly.
fn passthrough_jpeg(bytes: &[u8]) -> Option<Embedded> {
    let decoder = JpegDecoder::new(Cursor::new(bytes)).ok()?;
    let (width, height) = decoder.dimensions();
    let color_space = match decoder.original_color_type() {
        ExtendedColorType::Rgb8 => "DeviceRGB",
        ExtendedColorType::L8 => "DeviceGray",
        _ => return None,
    };
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        bytes.to_vec(),
    );
    Some(Embedded {
        stream,
        mask: None,
        width,
        height,
    })
}

/// Decode anything else and flatten transparency onto white.
fn decoded_rgb(bytes: &[u8]) -> Result<Embedded, TransformError> {
    let rgba = image::load_from_memory(bytes).map_err(|_| unreadable())?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let flattened = RgbImage::from_fn(width, height, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |channel: u8| ((channel as u16 * a as u16 + 255 * (255 - a as u16)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    });
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        flattened.into_raw(),
    );
    Ok(Embedded {
        stream,
        mask: None,
        width,
        height,
    })
}

/// Decode anything else, keeping transparency as a soft mask.
fn decoded_with_alpha(bytes: &[u8]) -> Result<Embedded, TransformError> {
    let rgba = image::load_from_memory(bytes).map_err(|_| unreadable())?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut samples = Vec::with_capacity(rgba.len() / 4 * 3);
    let mut alpha = Vec::with_capacity(rgba.len() / 4);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        samples.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    let mask = alpha.iter().any(|a| *a < u8::MAX).then(|| {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        )
    });
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        samples,
    );
    Ok(Embedded {
        stream,
        mask,
        width,
        height,
    })
}

fn embed_with(bytes: &[u8], decode: fn(&[u8]) -> Result<Embedded, TransformError>) -> Result<Embedded, TransformError> {
    let jpeg = (sniff_image(bytes) == Some(ImageSignature::Jpeg))
        .then(|| passthrough_jpeg(bytes))
        .flatten();
    let embedded = match jpeg {
        Some(embedded) => embedded,
        None => decode(bytes)?,
    };
    if embedded.width == 0 || embedded.height == 0 {
        return Err(unreadable());
    }
    Ok(embedded)
}

/// An image for a full page, transparency flattened onto white.
fn embed(bytes: &[u8]) -> Result<Embedded, TransformError> {
    embed_with(bytes, decoded_rgb)
}

/// An image drawn over existing content, transparency preserved.
pub(crate) fn embed_overlay(bytes: &[u8]) -> Result<Embedded, TransformError> {
    embed_with(bytes, decoded_with_alpha)
}

fn add_page(doc: &mut Document, pages_id: ObjectId, image: Embedded, layout: &ImageLayout) -> ObjectId {
    let (width, height) = (image.width as f32, image.height as f32);
    let page = layout.page_dimensions(width, height);
    let (x, y, drawn_width, drawn_height) = layout.placement(page, width, height);

    let image_id = image.add_to(doc);
    let content = format!("q {drawn_width:.2} 0 0 {drawn_height:.2} {x:.2} {y:.2} cm /Im0 Do Q");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(page.0), Object::Real(page.1)],
        "Resources" => dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
        "Contents" => content_id,
    })
}

/// Build one PDF with a page per image.
pub fn images_to_pdf(images: &[ValidatedPayload], layout: &ImageLayout) -> Result<Vec<u8>, TransformError> {
    if images.is_empty() {
        return Err(TransformError::invalid("At least one image is required"));
    }
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(images.len());
    for payload in images {
        let image = embed(payload.bytes())?;
        kids.push(Object::Reference(add_page(&mut doc, pages_id, image, layout)));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
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

pub struct ImagesToPdf;

#[async_trait]
impl Transform for ImagesToPdf {
    type Input = Vec<ValidatedPayload>;
    type Options = ImageLayout;

    fn operation(&self) -> &'static str {
        "images_to_pdf"
    }

    async fn run(&self, ctx: &TransformContext<'_>, images: Self::Input, layout: ImageLayout) -> Result<TransformResult, TransformError> {
        let pdf = ctx.blocking(move || images_to_pdf(&images, &layout)).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("combined.pdf", pdf)))
    }
}
