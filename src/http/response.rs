//! Download responses.
//!
//! # Responsibilities
//! - Turn a transform's output into an HTTP body
//! - Attach `Content-Disposition` with the generated name for files
//!
//! # Design Decisions
//! - JSON results are returned inline without a disposition header
//! - Caching headers are not set here; the guard middleware owns them

use axum::{
    http::{header::CONTENT_DISPOSITION, header::CONTENT_TYPE, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::security::headers::attachment;
use crate::transform::{NamedBuffer, TransformResult};

/// One downloadable transform output.
#[derive(Debug)]
pub struct Download(pub NamedBuffer);

impl Download {
    /// Collapse `result`, zipping several outputs under `archive_name`.
    pub fn from_result(result: TransformResult, archive_name: &str) -> Result<Self, AppError> {
        Ok(Self(result.into_download(archive_name)?))
    }
}

impl IntoResponse for Download {
    fn into_response(self) -> Response {
        let buffer = self.0;
        let content_type = HeaderValue::from_static(buffer.media_type());
        if buffer.is_json() {
            return ([(CONTENT_TYPE, content_type)], buffer.into_bytes()).into_response();
        }
        let disposition = attachment(buffer.name());
        (
            [(CONTENT_TYPE, content_type), (CONTENT_DISPOSITION, disposition)],
            buffer.into_bytes(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::PDF_MEDIA_TYPE;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn files_are_attachments() {
        let response = Download(NamedBuffer::pdf("merged.pdf", b"%PDF-1.7".to_vec())).into_response();
        assert_eq!(response.headers()[CONTENT_TYPE], PDF_MEDIA_TYPE);
        assert_eq!(response.headers()[CONTENT_DISPOSITION], "attachment; filename=\"merged.pdf\"");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"%PDF-1.7");
    }

    #[test]
    fn json_is_inline() {
        let buffer = NamedBuffer::json(&serde_json::json!({ "page_count": 2 })).unwrap();
        let response = Download(buffer).into_response();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert!(response.headers().get(CONTENT_DISPOSITION).is_none());
    }
}
