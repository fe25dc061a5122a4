//! `/api/v1/image/...` handlers.

use axum::extract::State;

use crate::error::AppError;
use crate::http::request::FormData;
use crate::http::response::Download;
use crate::http::server::AppState;
use crate::transform::image::{ImageLayout, ImagesToPdf};
use crate::transform::options::PageSelection;
use crate::transform::render::{PdfToImages, RenderOptions};
use crate::validation::ExpectedKind;

pub async fn images_to_pdf(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let images = form.validated_all("files", ExpectedKind::Image, &state.validator)?;
    let layout = ImageLayout::new(form.text("page_size"), form.integer("margin")?, form.boolean("fit_to_page")?)?;
    let result = state.dispatcher.run(&ImagesToPdf, images, layout).await?;
    Download::from_result(result, "combined.zip")
}

pub async fn pdf_to_images(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let pages: PageSelection = form.text("pages").unwrap_or("all").parse()?;
    let options = RenderOptions::new(form.text("format"), pages, form.integer("dpi")?, form.integer("quality")?)?;
    let result = state.dispatcher.run(&PdfToImages, file, options).await?;
    Download::from_result(result, "images.zip")
}
