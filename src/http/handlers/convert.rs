//! `/api/v1/convert/...` handlers.

use std::time::Duration;

use axum::{extract::State, routing::post, Router};

use crate::error::AppError;
use crate::http::request::FormData;
use crate::http::response::Download;
use crate::http::server::AppState;
use crate::transform::markdown::MarkdownToPdf;
use crate::transform::office::{FromPdf, OfficeTarget, ToPdf};
use crate::transform::options::in_range;
use crate::transform::text::{TextOptions, TextToPdf};
use crate::transform::web::{UrlToPdf, DEFAULT_FETCH_SECS, MAX_FETCH_SECS, MIN_FETCH_SECS};
use crate::validation::ExpectedKind;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/word-to-pdf", post(word_to_pdf))
        .route("/excel-to-pdf", post(excel_to_pdf))
        .route("/powerpoint-to-pdf", post(powerpoint_to_pdf))
        .route("/rtf-to-pdf", post(rtf_to_pdf))
        .route("/html-to-pdf", post(html_to_pdf))
        .route("/pdf-to-word", post(pdf_to_word))
        .route("/pdf-to-excel", post(pdf_to_excel))
        .route("/pdf-to-powerpoint", post(pdf_to_powerpoint))
        .route("/url-to-pdf", post(url_to_pdf))
        .route("/text-to-pdf", post(text_to_pdf))
        .route("/markdown-to-pdf", post(markdown_to_pdf))
}

async fn to_pdf(state: &AppState, form: &FormData, kind: ExpectedKind) -> Result<Download, AppError> {
    let file = form.validated("file", kind, &state.validator)?;
    let result = state.dispatcher.run(&ToPdf, file, ()).await?;
    Download::from_result(result, "converted.zip")
}

async fn from_pdf(state: &AppState, form: &FormData, target: OfficeTarget) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::Pdf, &state.validator)?;
    let result = state.dispatcher.run(&FromPdf(target), file, ()).await?;
    Download::from_result(result, "converted.zip")
}

pub async fn word_to_pdf(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    to_pdf(&state, &form, ExpectedKind::Word).await
}

pub async fn excel_to_pdf(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    to_pdf(&state, &form, ExpectedKind::Excel).await
}

pub async fn powerpoint_to_pdf(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    to_pdf(&state, &form, ExpectedKind::PowerPoint).await
}

pub async fn rtf_to_pdf(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    to_pdf(&state, &form, ExpectedKind::Rtf).await
}

pub async fn html_to_pdf(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    to_pdf(&state, &form, ExpectedKind::Html).await
}

pub async fn pdf_to_word(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    from_pdf(&state, &form, OfficeTarget::Docx).await
}

pub async fn pdf_to_excel(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    from_pdf(&state, &form, OfficeTarget::Xlsx).await
}

pub async fn pdf_to_powerpoint(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    from_pdf(&state, &form, OfficeTarget::Pptx).await
}

fn fetch_timeout(form: &FormData) -> Result<Duration, AppError> {
    let secs = match form.integer("timeout")? {
        Some(secs) => in_range("timeout", secs, MIN_FETCH_SECS as i64, MAX_FETCH_SECS as i64)? as u64,
        None => DEFAULT_FETCH_SECS,
    };
    Ok(Duration::from_secs(secs))
}

pub async fn url_to_pdf(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let url = form.require_text("url")?.to_string();
    let limit = fetch_timeout(&form)?;
    let result = state.dispatcher.run(&UrlToPdf, url, limit).await?;
    Download::from_result(result, "webpage.zip")
}

pub async fn text_to_pdf(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let text = form
        .text("text")
        .ok_or_else(|| AppError::invalid("Text content is empty"))?
        .to_string();
    let options = TextOptions::new(form.integer("font_size")?, form.text("font"))?;
    let result = state.dispatcher.run(&TextToPdf, text, options).await?;
    Download::from_result(result, "converted.zip")
}

pub async fn markdown_to_pdf(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let markdown = form
        .text("markdown")
        .ok_or_else(|| AppError::invalid("Markdown content is empty"))?
        .to_string();
    let result = state.dispatcher.run(&MarkdownToPdf, markdown, ()).await?;
    Download::from_result(result, "converted.zip")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> FormData {
        FormData::new(
            fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            Vec::new(),
        )
    }

    #[test]
    fn fetch_timeout_bounds() {
        assert_eq!(fetch_timeout(&form(&[])).unwrap(), Duration::from_secs(30));
        assert_eq!(fetch_timeout(&form(&[("timeout", "120")])).unwrap(), Duration::from_secs(120));
        assert!(fetch_timeout(&form(&[("timeout", "4")])).is_err());
        assert!(fetch_timeout(&form(&[("timeout", "121")])).is_err());
    }
}
