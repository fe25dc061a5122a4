//! Transform dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! handler (validated payload + parsed options)
//!     → dispatch.rs (Dispatcher::run: open scratch scope, invoke, close scope)
//!     → Transform::run (pdf/, office.rs, web.rs, text.rs, markdown.rs, image.rs,
//!                       render.rs, ocr.rs, batch.rs)
//!     → TransformResult (one named buffer, or several packed by archive.rs)
//! ```
//!
//! # Design Decisions
//! - Transforms take owned in-memory buffers and return owned buffers
//! - Anything a transform needs beyond memory comes from `TransformContext`,
//!   which registers it with the scratch tracker
//! - Failures are `TransformError`; the HTTP layer never sees library errors

pub mod archive;
pub mod batch;
pub mod dispatch;
pub mod image;
pub mod markdown;
pub mod ocr;
pub mod office;
pub mod options;
pub mod pdf;
pub mod render;
pub mod text;
pub mod web;

use async_trait::async_trait;
use thiserror::Error;

pub use dispatch::{Dispatcher, TransformContext};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const ZIP_MEDIA_TYPE: &str = "application/zip";
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// A transform's failure, before it is mapped onto the HTTP taxonomy.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("Page {page} is out of range. PDF has {total} pages.")]
    PageOutOfRange { page: i64, total: usize },

    #[error("Incorrect password provided")]
    IncorrectCredential,

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    EmptyResult(String),

    #[error("{0}")]
    Failure(String),

    #[error("Conversion tool is not available")]
    ToolUnavailable,

    #[error("Transform was cancelled")]
    Cancelled,
}

impl TransformError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        TransformError::InvalidParameter(detail.into())
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        TransformError::Failure(detail.into())
    }

    /// Metric label for this outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            TransformError::InvalidParameter(_)
            | TransformError::PageOutOfRange { .. }
            | TransformError::EmptyResult(_) => "rejected",
            TransformError::IncorrectCredential => "credential",
            TransformError::Timeout(_) => "timeout",
            TransformError::Failure(_) | TransformError::ToolUnavailable => "failure",
            TransformError::Cancelled => "cancelled",
        }
    }
}

impl From<options::OptionError> for TransformError {
    fn from(err: options::OptionError) -> Self {
        TransformError::InvalidParameter(err.0)
    }
}

/// One output document with a server-generated name.
#[derive(Clone)]
pub struct NamedBuffer {
    name: String,
    media_type: &'static str,
    bytes: Vec<u8>,
}

impl NamedBuffer {
    pub fn new(name: impl Into<String>, media_type: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type,
            bytes,
        }
    }

    pub fn pdf(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(name, PDF_MEDIA_TYPE, bytes)
    }

    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, TransformError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|_| TransformError::failure("Failed to encode result"))?;
        Ok(Self::new("result.json", JSON_MEDIA_TYPE, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn is_json(&self) -> bool {
        self.media_type == JSON_MEDIA_TYPE
    }
}

impl std::fmt::Debug for NamedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedBuffer")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .finish_non_exhaustive()
    }
}

/// What a transform produced.
#[derive(Debug)]
pub enum TransformResult {
    Single(NamedBuffer),
    /// Ordered outputs; packed into one archive for download.
    Multiple(Vec<NamedBuffer>),
}

impl TransformResult {
    /// Collapse into one downloadable buffer.
    ///
    /// A one-element `Multiple` is returned as that element; longer lists are
    /// zipped under `archive_name`.
    pub fn into_download(self, archive_name: &str) -> Result<NamedBuffer, TransformError> {
        match self {
            TransformResult::Single(buffer) => Ok(buffer),
            TransformResult::Multiple(mut buffers) => match buffers.len() {
                0 => Err(TransformError::EmptyResult("Operation produced no output".into())),
                1 => Ok(buffers.remove(0)),
                _ => Ok(NamedBuffer::new(
                    archive_name,
                    ZIP_MEDIA_TYPE,
                    archive::pack(&buffers)?,
                )),
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TransformResult::Single(_) => 1,
            TransformResult::Multiple(buffers) => buffers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Uniform calling convention for every document operation.
///
/// `Input` is the validated in-memory payload (or payloads) and `Options` the
/// already-parsed option record. Scratch storage and external processes must
/// be obtained through `ctx` so they are released when the call ends.
#[async_trait]
pub trait Transform: Send + Sync {
    type Input: Send + 'static;
    type Options: Send + 'static;

    /// Stable operation name for metrics.
    fn operation(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &TransformContext<'_>,
        input: Self::Input,
        options: Self::Options,
    ) -> Result<TransformResult, TransformError>;
}
