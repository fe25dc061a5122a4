//! `/api/v1/pdf/...` handlers.

use axum::{extract::State, routing::post, Router};

use crate::error::AppError;
use crate::http::request::FormData;
use crate::http::response::Download;
use crate::http::server::AppState;
use crate::transform::options::{
    in_range, parse_page_list, parse_permissions, PageSelection, QualityPreset, Rotation, SplitMode,
};
use crate::transform::pdf::images::{parse_format, ImageExtraction};
use crate::transform::pdf::watermark::{ImageWatermarkOptions, WatermarkOptions};
use crate::transform::pdf::{
    AddPassword, Compress, DeletePages, ExtractImages, ExtractPages, ExtractText, ImageWatermark, Info, Merge,
    RemovePassword, Reorder, Rotate, Split, TextWatermark,
};
use crate::validation::ExpectedKind;

const DEFAULT_WATERMARK_SIZE: i64 = 48;
const DEFAULT_WATERMARK_COLOR: &str = "#808080";
const DEFAULT_WATERMARK_OPACITY: f64 = 0.3;
const DEFAULT_WATERMARK_SCALE: f64 = 0.5;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/merge", post(merge))
        .route("/split", post(split))
        .route("/rotate", post(rotate))
        .route("/reorder", post(reorder))
        .route("/delete-pages", post(delete_pages))
        .route("/compress", post(compress))
        .route("/password/add", post(add_password))
        .route("/password/remove", post(remove_password))
        .route("/watermark/text", post(watermark_text))
        .route("/watermark/image", post(watermark_image))
        .route("/extract/text", post(extract_text))
        .route("/extract/images", post(extract_images))
        .route("/extract/pages", post(extract_pages))
        .route("/info", post(info))
}

fn page_selection(form: &FormData) -> Result<PageSelection, AppError> {
    Ok(form.text("pages").unwrap_or("all").parse()?)
}

fn page_list(form: &FormData, field: &str) -> Result<Vec<i64>, AppError> {
    Ok(parse_page_list(form.require_text(field)?)?)
}

pub async fn merge(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let files = form.validated_all("files", ExpectedKind::Pdf, &state.validator)?;
    let result = state.dispatcher.run(&Merge, files, ()).await?;
    Download::from_result(result, "merged.zip")
}

pub async fn split(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let mode = SplitMode::parse(
        form.text("mode").unwrap_or("range"),
        form.integer("start")?,
        form.integer("end")?,
        form.integer("n_pages")?,
        form.text("pages"),
    )?;
    let result = state.dispatcher.run(&Split, file, mode).await?;
    Download::from_result(result, "split.zip")
}

pub async fn rotate(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let rotation = Rotation::try_from(form.require_integer("degrees")?)?;
    let pages = page_selection(&form)?;
    let result = state.dispatcher.run(&Rotate, file, (pages, rotation)).await?;
    Download::from_result(result, "rotated.zip")
}

pub async fn reorder(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let order = page_list(&form, "page_order")?;
    let result = state.dispatcher.run(&Reorder, file, order).await?;
    Download::from_result(result, "reordered.zip")
}

pub async fn delete_pages(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let pages = page_list(&form, "pages")?;
    let result = state.dispatcher.run(&DeletePages, file, pages).await?;
    Download::from_result(result, "pages_deleted.zip")
}

pub async fn compress(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let quality: QualityPreset = form.text("quality").unwrap_or("medium").parse()?;
    let result = state.dispatcher.run(&Compress, file, quality).await?;
    Download::from_result(result, "compressed.zip")
}

pub async fn add_password(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let password = form.require_text("password")?.to_string();
    let permissions = parse_permissions(form.text("permissions"))?;
    let result = state.dispatcher.run(&AddPassword, file, (password, permissions)).await?;
    Download::from_result(result, "protected.zip")
}

pub async fn remove_password(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let password = form.require_text("password")?.to_string();
    let result = state.dispatcher.run(&RemovePassword, file, password).await?;
    Download::from_result(result, "unlocked.zip")
}

fn watermark_options(form: &FormData) -> Result<WatermarkOptions, AppError> {
    let text = form.require_text("text")?.trim().to_string();
    let font_size = in_range("font_size", form.integer("font_size")?.unwrap_or(DEFAULT_WATERMARK_SIZE), 1, 500)?;
    let opacity = in_range("opacity", form.float("opacity")?.unwrap_or(DEFAULT_WATERMARK_OPACITY), 0.0, 1.0)?;
    Ok(WatermarkOptions {
        text,
        font_size: font_size as u32,
        color: form.text("color").unwrap_or(DEFAULT_WATERMARK_COLOR).parse()?,
        opacity: opacity as f32,
        position: form.text("position").unwrap_or("diagonal").parse()?,
        pages: page_selection(form)?,
    })
}

pub async fn watermark_text(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let options = watermark_options(&form)?;
    let result = state.dispatcher.run(&TextWatermark, file, options).await?;
    Download::from_result(result, "watermarked.zip")
}

fn image_watermark_options(form: &FormData) -> Result<ImageWatermarkOptions, AppError> {
    let opacity = in_range("opacity", form.float("opacity")?.unwrap_or(DEFAULT_WATERMARK_OPACITY), 0.0, 1.0)?;
    let scale = in_range("scale", form.float("scale")?.unwrap_or(DEFAULT_WATERMARK_SCALE), 0.1, 1.0)?;
    Ok(ImageWatermarkOptions {
        opacity: opacity as f32,
        position: form.text("position").unwrap_or("center").parse()?,
        scale: scale as f32,
        pages: page_selection(form)?,
    })
}

pub async fn watermark_image(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let image = form.validated("image", ExpectedKind::Image, &state.validator)?;
    let options = image_watermark_options(&form)?;
    let result = state.dispatcher.run(&ImageWatermark, (file, image), options).await?;
    Download::from_result(result, "watermarked.zip")
}

pub async fn extract_text(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let pages = page_selection(&form)?;
    let result = state.dispatcher.run(&ExtractText, file, pages).await?;
    Download::from_result(result, "text.zip")
}

pub async fn extract_pages(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let pages = page_list(&form, "pages")?;
    let result = state.dispatcher.run(&ExtractPages, file, pages).await?;
    Download::from_result(result, "extracted_pages.zip")
}

pub async fn extract_images(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let options = ImageExtraction {
        pages: page_selection(&form)?,
        format: parse_format(form.text("format"))?,
    };
    let result = state.dispatcher.run(&ExtractImages, file, options).await?;
    Download::from_result(result, "extracted_images.zip")
}

pub async fn info(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let result = state.dispatcher.run(&Info, file, ()).await?;
    Download::from_result(result, "info.zip")
}
