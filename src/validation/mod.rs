//! Request boundary validation.
//!
//! # Responsibilities
//! - Gate every upload before any transform sees it
//! - Type check (declared MIME, then filename extension)
//! - Size ceiling, emptiness, then content signature
//!
//! # Design Decisions
//! - Checks run in that fixed order and stop at the first failure
//! - Works on the in-memory buffer only; nothing touches storage
//! - The filename is consulted for its extension and then forgotten

pub mod kinds;

use axum::body::Bytes;
use thiserror::Error;

pub use kinds::{sniff_image, ExpectedKind, ImageSignature};

/// Why an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid file type: {declared}. Expected {expected}.")]
    UnsupportedType {
        declared: String,
        expected: &'static str,
    },

    #[error("File too large. Maximum size is {max_mb}MB.")]
    PayloadTooLarge { max_mb: u64 },

    #[error("Empty file provided.")]
    EmptyPayload,

    #[error("{detail}")]
    MalformedContent { detail: &'static str },
}

/// An upload that passed every boundary check.
#[derive(Clone)]
pub struct ValidatedPayload {
    kind: ExpectedKind,
    bytes: Bytes,
}

impl ValidatedPayload {
    pub fn kind(&self) -> ExpectedKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the content is a PDF (as opposed to an image) for mixed kinds.
    pub fn is_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF-")
    }

    /// Wrap fixture bytes without running the checks.
    #[cfg(test)]
    pub(crate) fn trusted(kind: ExpectedKind, bytes: impl Into<Bytes>) -> Self {
        Self {
            kind,
            bytes: bytes.into(),
        }
    }
}

impl std::fmt::Debug for ValidatedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedPayload")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Per-upload gate configured with the service's size ceiling.
#[derive(Debug, Clone)]
pub struct BoundaryValidator {
    max_bytes: usize,
    max_mb: u64,
}

impl BoundaryValidator {
    pub fn new(max_mb: u64) -> Self {
        Self {
            max_bytes: max_mb as usize * 1024 * 1024,
            max_mb,
        }
    }

    /// Ceiling with a byte granularity, for tests and embedding.
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            max_mb: (max_bytes / (1024 * 1024)) as u64,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Run the four checks in order.
    pub fn validate(
        &self,
        content_type: Option<&str>,
        filename: Option<&str>,
        bytes: Bytes,
        kind: ExpectedKind,
    ) -> Result<ValidatedPayload, ValidationError> {
        if !type_allowed(content_type, filename, kind) {
            return Err(ValidationError::UnsupportedType {
                declared: content_type
                    .map(essence)
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or_else(|| "unknown".to_string()),
                expected: kind.label(),
            });
        }

        if bytes.len() > self.max_bytes {
            return Err(ValidationError::PayloadTooLarge { max_mb: self.max_mb });
        }

        if bytes.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }

        if !kind.signature_matches(&bytes) {
            return Err(ValidationError::MalformedContent {
                detail: kind.malformed_detail(),
            });
        }

        Ok(ValidatedPayload { kind, bytes })
    }
}

/// MIME type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn type_allowed(content_type: Option<&str>, filename: Option<&str>, kind: ExpectedKind) -> bool {
    let declared_ok = content_type
        .map(essence)
        .is_some_and(|ct| kind.mime_types().contains(&ct.as_str()));
    if declared_ok {
        return true;
    }
    filename
        .map(|name| name.to_ascii_lowercase())
        .is_some_and(|name| kind.extensions().iter().any(|ext| name.ends_with(ext)))
}
