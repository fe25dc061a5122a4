//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use lopdf::{dictionary, Document, Object, Stream};
use tokio::net::TcpListener;
use tracing_subscriber::fmt::MakeWriter;

use notrace_pdf::config::Settings;
use notrace_pdf::http::HttpServer;
use notrace_pdf::lifecycle::Services;

/// Settings suitable for tests: scratch under the OS temp directory.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.scratch.root = std::env::temp_dir().join("notrace-pdf-tests");
    settings
}

/// Start the real server on `127.0.0.1:{port}`.
pub async fn start_server(port: u16, settings: Settings) -> (Services, String) {
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let services = Services::new(settings).unwrap();
    let listener = TcpListener::bind(addr).await.unwrap();
    let server = HttpServer::new(&services);
    tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });
    (services, format!("http://{addr}"))
}

/// Serve an already-built router on `127.0.0.1:{port}`.
pub async fn serve_router(port: u16, router: Router) -> String {
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

/// A multipart part carrying `bytes` under `filename` with `content_type`.
pub fn file_part(bytes: Vec<u8>, filename: &str, content_type: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(bytes)
        .file_name(filename.to_string())
        .mime_str(content_type)
        .unwrap()
}

pub fn pdf_part(bytes: Vec<u8>, filename: &str) -> reqwest::multipart::Part {
    file_part(bytes, filename, "application/pdf")
}

/// A valid document with `pages` pages.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for n in 1..=pages {
        let content = format!("BT /F1 24 Tf 72 720 Td (Page {n}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
            "Resources" => resources_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn page_count(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).unwrap().get_pages().len()
}

/// `/Rotate` of the first page, 0 when absent.
pub fn first_page_rotation(bytes: &[u8]) -> i64 {
    let doc = Document::load_mem(bytes).unwrap();
    let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
    doc.get_dictionary(page_id)
        .unwrap()
        .get(b"Rotate")
        .ok()
        .and_then(|value| value.as_i64().ok())
        .unwrap_or(0)
}

/// In-memory log sink for `tracing_subscriber::fmt`.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }
}

pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: self.buffer.clone(),
        }
    }
}
