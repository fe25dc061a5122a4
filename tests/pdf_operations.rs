//! End-to-end PDF operations against a running server.

use std::io::{Cursor, Read, Write};

use reqwest::multipart::Form;
use reqwest::StatusCode;

mod common;

use common::{client, file_part, first_page_rotation, page_count, pdf_part, sample_pdf, start_server, test_settings};

fn logo_png() -> Vec<u8> {
    let logo = image::RgbaImage::from_pixel(32, 16, image::Rgba([0, 90, 160, 200]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(logo)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn photo_jpeg() -> Vec<u8> {
    let photo = image::RgbImage::from_pixel(24, 24, image::Rgb([180, 140, 60]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(photo)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

/// Entry names and contents of a zip body.
fn zip_entries(body: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(body)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            (entry.name().to_string(), contents)
        })
        .collect()
}

#[tokio::test]
async fn merge_concatenates_pages() {
    let (_services, base) = start_server(28301, test_settings()).await;

    let form = Form::new()
        .part("files", pdf_part(sample_pdf(1), "a.pdf"))
        .part("files", pdf_part(sample_pdf(2), "b.pdf"));
    let response = client()
        .post(format!("{base}/api/v1/pdf/merge"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"merged.pdf\""
    );
    let body = response.bytes().await.unwrap();
    assert!(body.starts_with(b"%PDF-"));
    assert_eq!(page_count(&body), 3);
}

#[tokio::test]
async fn merge_needs_two_files() {
    let (_services, base) = start_server(28302, test_settings()).await;

    let form = Form::new().part("files", pdf_part(sample_pdf(2), "only.pdf"));
    let response = client()
        .post(format!("{base}/api/v1/pdf/merge"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("At least 2"));
}

#[tokio::test]
async fn rotate_sets_page_rotation() {
    let (_services, base) = start_server(28303, test_settings()).await;

    let form = Form::new()
        .part("file", pdf_part(sample_pdf(2), "scan.pdf"))
        .text("degrees", "90");
    let response = client()
        .post(format!("{base}/api/v1/pdf/rotate"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.bytes().await.unwrap();
    assert_eq!(first_page_rotation(&body), 90);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let (_services, base) = start_server(28304, test_settings()).await;
    let client = client();

    let form = Form::new()
        .part("file", pdf_part(sample_pdf(1), "plain.pdf"))
        .text("password", "correct horse");
    let response = client
        .post(format!("{base}/api/v1/pdf/password/add"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let protected = response.bytes().await.unwrap().to_vec();

    let form = Form::new()
        .part("file", pdf_part(protected, "protected.pdf"))
        .text("password", "battery staple");
    let response = client
        .post(format!("{base}/api/v1/pdf/password/remove"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Incorrect password provided");
}

#[tokio::test]
async fn bad_header_is_rejected() {
    let (services, base) = start_server(28305, test_settings()).await;

    let form = Form::new().part("file", pdf_part(b"not a pdf!".to_vec(), "fake.pdf"));
    let response = client()
        .post(format!("{base}/api/v1/pdf/compress"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Invalid PDF file. File does not start with PDF header.");
    assert!(services.tracker.is_empty());
}

#[tokio::test]
async fn compress_keeps_page_count() {
    let (services, base) = start_server(28306, test_settings()).await;

    let form = Form::new()
        .part("file", pdf_part(sample_pdf(3), "big.pdf"))
        .text("quality", "medium");
    let response = client()
        .post(format!("{base}/api/v1/pdf/compress"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.bytes().await.unwrap();
    assert!(body.starts_with(b"%PDF-"));
    assert_eq!(page_count(&body), 3);
    assert!(services.tracker.is_empty());
}

#[tokio::test]
async fn invalid_options_are_bad_requests() {
    let (_services, base) = start_server(28307, test_settings()).await;
    let client = client();

    let form = Form::new()
        .part("file", pdf_part(sample_pdf(1), "a.pdf"))
        .text("degrees", "45");
    let response = client
        .post(format!("{base}/api/v1/pdf/rotate"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let form = Form::new()
        .part("file", pdf_part(sample_pdf(2), "a.pdf"))
        .text("pages", "[3]");
    let response = client
        .post(format!("{base}/api/v1/pdf/delete-pages"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Page 3 is out of range. PDF has 2 pages.");
}

#[tokio::test]
async fn extract_text_and_info_are_json() {
    let (_services, base) = start_server(28308, test_settings()).await;
    let client = client();

    let form = Form::new().part("file", pdf_part(sample_pdf(2), "a.pdf"));
    let response = client
        .post(format!("{base}/api/v1/pdf/extract/text"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("content-disposition").is_none());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["pages"][1]["page_number"], 2);
    assert!(body["pages"][1]["text"].as_str().unwrap().contains("Page 2"));

    let form = Form::new().part("file", pdf_part(sample_pdf(4), "a.pdf"));
    let response = client
        .post(format!("{base}/api/v1/pdf/info"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["page_count"], 4);
    assert_eq!(body["encrypted"], false);
}

#[tokio::test]
async fn split_into_chunks_is_zipped() {
    let (_services, base) = start_server(28309, test_settings()).await;

    let form = Form::new()
        .part("file", pdf_part(sample_pdf(4), "a.pdf"))
        .text("mode", "every_n")
        .text("n_pages", "2");
    let response = client()
        .post(format!("{base}/api/v1/pdf/split"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"split.zip\""
    );
    let body = response.bytes().await.unwrap();
    assert!(body.starts_with(b"PK\x03\x04"));
}

#[tokio::test]
async fn text_to_pdf_accepts_urlencoded_forms() {
    let (_services, base) = start_server(28310, test_settings()).await;

    let response = client()
        .post(format!("{base}/api/v1/convert/text-to-pdf"))
        .form(&[("text", "Hello\nworld"), ("font", "cour")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.bytes().await.unwrap();
    assert_eq!(page_count(&body), 1);
}

#[tokio::test]
async fn image_watermark_is_drawn_on_selected_pages() {
    let (_services, base) = start_server(28311, test_settings()).await;

    let form = Form::new()
        .part("file", pdf_part(sample_pdf(2), "contract.pdf"))
        .part("image", file_part(logo_png(), "logo.png", "image/png"))
        .text("pages", "[2]")
        .text("position", "bottom-right")
        .text("scale", "0.25");
    let response = client()
        .post(format!("{base}/api/v1/pdf/watermark/image"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"watermarked.pdf\""
    );
    let body = response.bytes().await.unwrap();
    let doc = lopdf::Document::load_mem(&body).unwrap();
    let pages: Vec<_> = doc.get_pages().into_values().collect();
    assert_eq!(pages.len(), 2);
    let first = String::from_utf8_lossy(&doc.get_page_content(pages[0]).unwrap()).into_owned();
    let second = String::from_utf8_lossy(&doc.get_page_content(pages[1]).unwrap()).into_owned();
    assert!(!first.contains(" Do Q"));
    assert!(second.contains(" Do Q"));
}

#[tokio::test]
async fn images_come_back_out_of_a_pdf() {
    let (_services, base) = start_server(28312, test_settings()).await;
    let client = client();
    let photo = photo_jpeg();

    let form = Form::new()
        .part("files", file_part(logo_png(), "logo.png", "image/png"))
        .part("files", file_part(photo.clone(), "photo.jpg", "image/jpeg"));
    let response = client
        .post(format!("{base}/api/v1/image/images-to-pdf"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let album = response.bytes().await.unwrap().to_vec();

    let form = Form::new().part("file", pdf_part(album, "album.pdf"));
    let response = client
        .post(format!("{base}/api/v1/pdf/extract/images"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"extracted_images.zip\""
    );
    let entries = zip_entries(&response.bytes().await.unwrap());
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["image_001.png", "image_002.jpg"]);
    assert_eq!(entries[1].1, photo);

    let form = Form::new().part("file", pdf_part(sample_pdf(1), "plain.pdf"));
    let response = client
        .post(format!("{base}/api/v1/pdf/extract/images"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "No images found in PDF");
}

#[tokio::test]
async fn batch_split_writes_one_file_per_part() {
    let (_services, base) = start_server(28313, test_settings()).await;

    let mut upload = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, pages) in [("q1.pdf", 2), ("q2.pdf", 3)] {
        upload
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        upload.write_all(&sample_pdf(pages)).unwrap();
    }
    let upload = upload.finish().unwrap().into_inner();

    let form = Form::new()
        .part("file", file_part(upload, "reports.zip", "application/zip"))
        .text("operation", "split")
        .text("split_mode", "every_n")
        .text("n_pages", "2");
    let response = client()
        .post(format!("{base}/api/v1/batch/process"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let entries = zip_entries(&response.bytes().await.unwrap());
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["file_1_part_1.pdf", "file_2_part_1.pdf", "file_2_part_2.pdf"]);
    assert_eq!(page_count(&entries[2].1), 1);
}

#[tokio::test]
async fn pdf_to_images_validates_options_first() {
    let (_services, base) = start_server(28314, test_settings()).await;

    let form = Form::new()
        .part("file", pdf_part(sample_pdf(1), "a.pdf"))
        .text("dpi", "1200");
    let response = client()
        .post(format!("{base}/api/v1/image/pdf-to-images"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "dpi must be between 72 and 600");
}
