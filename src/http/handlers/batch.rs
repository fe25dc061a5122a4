//! `/api/v1/batch/process` handler.

use axum::extract::State;

use crate::error::AppError;
use crate::http::request::FormData;
use crate::http::response::Download;
use crate::http::server::AppState;
use crate::transform::batch::{Batch, BatchOperation};
use crate::validation::ExpectedKind;

pub async fn process(State(state): State<AppState>, form: FormData) -> Result<Download, AppError> {
    let archive = form.validated("file", ExpectedKind::Zip, &state.validator)?;
    let operation = BatchOperation::parse(
        form.require_text("operation")?,
        form.text("quality"),
        form.integer("degrees")?,
        form.text("split_mode"),
        form.integer("n_pages")?,
        form.text("password"),
    )?;
    let result = state.dispatcher.run(&Batch, archive, operation).await?;
    Download::from_result(result, "batch_result.zip")
}
