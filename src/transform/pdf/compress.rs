//! Size reduction presets.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use lopdf::{Object, Stream};

use crate::transform::options::QualityPreset;
use crate::transform::pdf::document::{load, save};
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};
use crate::validation::ValidatedPayload;

/// Re-encode a baseline DCT image stream at `quality` when that shrinks it.
fn recompress_jpeg(stream: &mut Stream, quality: u8) -> bool {
    let dict = &stream.dict;
    let is_image = dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|name| name == b"Image");
    let is_dct = matches!(dict.get(b"Filter"), Ok(Object::Name(name)) if name == b"DCTDecode");
    let eight_bit = dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .map_or(true, |bits| bits == 8);
    let gray = match dict.get(b"ColorSpace").and_then(Object::as_name) {
        Ok(b"DeviceGray") => true,
        Ok(b"DeviceRGB") => false,
        _ => return false,
    };
    if !(is_image && is_dct && eight_bit) {
        return false;
    }

    let Ok(decoded) = image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg) else {
        return false;
    };
    let decoded = if gray {
        DynamicImage::ImageLuma8(decoded.to_luma8())
    } else {
        DynamicImage::ImageRgb8(decoded.to_rgb8())
    };

    let mut encoded = Vec::new();
    if JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode_image(&decoded)
        .is_err()
        || encoded.len() >= stream.content.len()
    {
        return false;
    }
    stream.set_content(encoded);
    true
}

/// Apply `preset`; the page structure is left untouched.
pub fn compress(bytes: &[u8], preset: QualityPreset) -> Result<Vec<u8>, TransformError> {
    let mut doc = load(bytes)?;

    let mut reencoded = 0usize;
    if let Some(quality) = preset.jpeg_quality() {
        for object in doc.objects.values_mut() {
            if let Object::Stream(stream) = object {
                if recompress_jpeg(stream, quality) {
                    reencoded += 1;
                }
            }
        }
    }
    tracing::debug!(reencoded, "Image streams re-encoded");

    doc.prune_objects();
    doc.compress();
    save(&mut doc)
}

pub struct Compress;

#[async_trait]
impl Transform for Compress {
    type Input = ValidatedPayload;
    type Options = QualityPreset;

    fn operation(&self) -> &'static str {
        "compress"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, preset: QualityPreset) -> Result<TransformResult, TransformError> {
        let bytes = ctx.blocking(move || compress(input.bytes(), preset)).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("compressed.pdf", bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::pdf::document::{page_count, page_ids};
    use crate::transform::pdf::fixtures::sample;
    use image::{Rgb, RgbImage};
    use lopdf::dictionary;

    fn photo_stream() -> Stream {
        let img = RgbImage::from_fn(96, 96, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, ((x + y) % 255) as u8]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 100)
            .encode_image(&DynamicImage::ImageRgb8(img))
            .unwrap();
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 96,
                "Height" => 96,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
    }

    #[test]
    fn reencodes_photos_below_their_original_size() {
        let mut stream = photo_stream();
        let before = stream.content.len();
        assert!(recompress_jpeg(&mut stream, 60));
        assert!(stream.content.len() < before);
        assert!(stream.content.starts_with(&[0xff, 0xd8]));
    }

    #[test]
    fn leaves_other_streams_alone() {
        let mut stream = Stream::new(dictionary! {}, b"BT ET".to_vec());
        assert!(!recompress_jpeg(&mut stream, 60));
    }

    #[test]
    fn keeps_page_count() {
        for preset in [QualityPreset::Low, QualityPreset::Medium, QualityPreset::High] {
            let out = compress(&sample(3), preset).unwrap();
            assert!(out.starts_with(b"%PDF-"));
            assert_eq!(page_count(&out).unwrap(), 3);
        }
    }

    #[test]
    fn compresses_embedded_images() {
        let mut doc = load(&sample(1)).unwrap();
        let image_id = doc.add_object(photo_stream());
        let page = page_ids(&doc)[0];
        doc.get_dictionary_mut(page).unwrap().set(
            "Resources",
            dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
        );
        let original = save(&mut doc).unwrap();

        let out = compress(&original, QualityPreset::Low).unwrap();
        assert!(out.len() < original.len());
        assert_eq!(page_count(&out).unwrap(), 1);
    }
}
