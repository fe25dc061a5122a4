//! `/api/v1/ocr/...` handlers.

use axum::extract::State;

use crate::error::AppError;
use crate::http::request::FormData;
use crate::http::response::Download;
use crate::http::server::AppState;
use crate::transform::ocr::{parse_language, Extract, Languages};
use crate::validation::ExpectedKind;

pub async fn extract(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let file = form.validated("file", ExpectedKind::PdfOrImage, &state.validator)?;
    let language = parse_language(form.text("language"))?;
    let result = state.dispatcher.run(&Extract, file, language).await?;
    Download::from_result(result, "ocr.zip")
}

pub async fn languages(State(state): State<AppState>) -> Result<Download, AppError> {
    let result = state.dispatcher.run(&Languages, (), ()).await?;
    Download::from_result(result, "languages.zip")
}
