//! Route handlers.
//!
//! Every handler follows the same shape: validate uploads at the boundary,
//! parse options into typed records, hand both to the dispatcher, and turn
//! the result into a `Download`. None of them touch storage directly.

pub mod batch;
pub mod convert;
pub mod health;
pub mod image;
pub mod ocr;
pub mod pdf;

use axum::{routing::get, routing::post, Router};

use crate::http::server::AppState;

/// All API routes, without middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1/pdf", pdf::routes())
        .nest("/api/v1/convert", convert::routes())
        .route("/api/v1/image/images-to-pdf", post(image::images_to_pdf))
        .route("/api/v1/image/pdf-to-images", post(image::pdf_to_images))
        .route("/api/v1/ocr/extract", post(ocr::extract))
        .route("/api/v1/ocr/languages", get(ocr::languages))
        .route("/api/v1/batch/process", post(batch::process))
}
