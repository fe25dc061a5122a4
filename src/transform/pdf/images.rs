//! Image extraction.
//!
//! Image XObjects are collected from the selected pages' resources, following
//! nested form XObjects, and each distinct object is written once in the
//! order it is first met. JPEG data is passed through untouched when the
//! original encoding is kept. 8-bit gray and RGB samples are rebuilt into an
//! image and encoded. Anything else (masks, indexed or CMYK samples, JBIG2,
//! JPEG 2000) is skipped.

use std::collections::HashSet;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::transform::image::RasterFormat;
use crate::transform::options::{OptionError, PageSelection};
use crate::transform::pdf::document::{corrupt, flatten_inherited, load, page_ids, resolved_dict};
use crate::transform::{archive, NamedBuffer, Transform, TransformContext, TransformError, TransformResult, ZIP_MEDIA_TYPE};
use crate::validation::ValidatedPayload;

const MAX_FORM_DEPTH: usize = 8;
/// Largest decoded sample buffer rebuilt into an image.
const MAX_SAMPLE_BYTES: usize = 256 << 20;
const CONVERTED_QUALITY: u8 = 90;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageExtraction {
    pub pages: PageSelection,
    /// `None` keeps JPEGs as they are stored and writes everything else as PNG.
    pub format: Option<RasterFormat>,
}

/// `original` (the default) or one of the raster formats.
pub fn parse_format(raw: Option<&str>) -> Result<Option<RasterFormat>, OptionError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("original") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| OptionError::new("Invalid format. Must be one of: png, jpg, webp, original")),
    }
}

enum Extracted {
    Jpeg(Vec<u8>),
    Decoded(DynamicImage),
}

fn collect_images(doc: &Document, resources: &Dictionary, depth: usize, seen: &mut HashSet<ObjectId>, found: &mut Vec<ObjectId>) {
    let xobjects = resolved_dict(doc, resources.get(b"XObject").ok());
    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            continue;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => found.push(id),
            Ok(b"Form") if depth < MAX_FORM_DEPTH => {
                let nested = resolved_dict(doc, stream.dict.get(b"Resources").ok());
                collect_images(doc, &nested, depth + 1, seen, found);
            }
            _ => {}
        }
    }
}

fn filters(stream: &Stream) -> Vec<&[u8]> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(items)) => items.iter().filter_map(|item| item.as_name().ok()).collect(),
        _ => Vec::new(),
    }
}

/// Colour components per sample for the colour spaces that map onto
/// gray or RGB pixels.
fn components(doc: &Document, stream: &Stream) -> Option<usize> {
    let space = match stream.dict.get(b"ColorSpace").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    match space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" => Some(1),
            b"DeviceRGB" => Some(3),
            _ => None,
        },
        Object::Array(items) => match items.first()?.as_name().ok()? {
            b"CalGray" => Some(1),
            b"CalRGB" => Some(3),
            b"ICCBased" => {
                let profile_id = items.get(1)?.as_reference().ok()?;
                let profile = doc.get_object(profile_id).and_then(Object::as_stream).ok()?;
                match profile.dict.get(b"N").and_then(Object::as_i64).ok()? {
                    1 => Some(1),
                    3 => Some(3),
                    _ => None,
                }
            }
            _ => None,
        },
        _ => None,
    }
}

fn dimension(stream: &Stream, key: &[u8]) -> Option<u32> {
    let value = stream.dict.get(key).and_then(Object::as_i64).ok()?;
    u32::try_from(value).ok().filter(|value| *value > 0)
}

fn read_image(doc: &Document, stream: &Stream) -> Option<Extracted> {
    if stream.dict.get(b"ImageMask").and_then(Object::as_bool).unwrap_or(false) {
        return None;
    }
    let encoded = match filters(stream).as_slice() {
        [b"DCTDecode"] => return Some(Extracted::Jpeg(stream.content.clone())),
        [] => false,
        [b"FlateDecode"] => true,
        _ => return None,
    };
    if stream.dict.get(b"BitsPerComponent").and_then(Object::as_i64).ok()? != 8 {
        return None;
    }
    let components = components(doc, stream)?;
    let (width, height) = (dimension(stream, b"Width")?, dimension(stream, b"Height")?);
    let expected = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(components)
        .filter(|len| *len <= MAX_SAMPLE_BYTES)?;

    let mut samples = if encoded {
        stream.decompressed_content().ok()?
    } else {
        stream.content.clone()
    };
    if samples.len() < expected {
        return None;
    }
    samples.truncate(expected);
    let image = match components {
        1 => DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, samples)?),
        _ => DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, samples)?),
    };
    Some(Extracted::Decoded(image))
}

/// Encoded bytes plus the format they are in; `None` when a stored JPEG
/// cannot be decoded for conversion.
fn encode(extracted: Extracted, format: Option<RasterFormat>) -> Result<Option<(Vec<u8>, &'static str, &'static str)>, TransformError> {
    let (image, format) = match (extracted, format) {
        (Extracted::Jpeg(bytes), None) => return Ok(Some((bytes, "jpg", "image/jpeg"))),
        (Extracted::Jpeg(bytes), Some(format)) => match image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg) {
            Ok(image) => (image, format),
            Err(_) => return Ok(None),
        },
        (Extracted::Decoded(image), format) => (image, format.unwrap_or_default()),
    };
    let bytes = format.encode(&image, CONVERTED_QUALITY)?;
    Ok(Some((bytes, format.extension(), format.media_type())))
}

/// Every readable image on the selected pages, named `image_NNN.ext`.
pub fn extract_images(bytes: &[u8], options: &ImageExtraction) -> Result<Vec<NamedBuffer>, TransformError> {
    let mut doc = load(bytes)?;
    let ids = page_ids(&doc);
    let selected = options.pages.resolve(ids.len())?;

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for page in selected {
        let page_id = ids[page as usize - 1];
        flatten_inherited(&mut doc, page_id)?;
        let page = doc.get_dictionary(page_id).map_err(|_| corrupt())?;
        let resources = resolved_dict(&doc, page.get(b"Resources").ok());
        collect_images(&doc, &resources, 0, &mut seen, &mut found);
    }

    let mut images = Vec::with_capacity(found.len());
    let mut skipped = 0usize;
    for id in found {
        let extracted = doc
            .get_object(id)
            .and_then(Object::as_stream)
            .ok()
            .and_then(|stream| read_image(&doc, stream));
        match extracted.map(|extracted| encode(extracted, options.format)).transpose()?.flatten() {
            Some((bytes, extension, media_type)) => {
                let name = format!("image_{:03}.{extension}", images.len() + 1);
                images.push(NamedBuffer::new(name, media_type, bytes));
            }
            None => skipped += 1,
        }
    }
    tracing::debug!(extracted = images.len(), skipped, "Images extracted");

    if images.is_empty() {
        return Err(TransformError::EmptyResult("No images found in PDF".into()));
    }
    Ok(images)
}

pub struct ExtractImages;

#[async_trait]
impl Transform for ExtractImages {
    type Input = ValidatedPayload;
    type Options = ImageExtraction;

    fn operation(&self) -> &'static str {
        "extract_images"
    }

    /// Always answers with an archive, even for a single image.
    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, options: ImageExtraction) -> Result<TransformResult, TransformError> {
        let zip = ctx
            .blocking(move || archive::pack(&extract_images(input.bytes(), &options)?))
            .await?;
        Ok(TransformResult::Single(NamedBuffer::new("extracted_images.zip", ZIP_MEDIA_TYPE, zip)))
    }
}
