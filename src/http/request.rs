//! Form extraction.
//!
//! # Responsibilities
//! - Read `multipart/form-data` and `application/x-www-form-urlencoded`
//!   bodies into text fields and uploads
//! - Map framing failures onto the error taxonomy
//! - Hand uploads to the boundary validator
//!
//! # Design Decisions
//! - Uploads stay in memory as `Bytes`; nothing is spooled to storage
//! - The client's filename is kept only until validation has looked at its
//!   extension and never appears in `Debug` output
//! - Empty optional fields count as absent, as browsers send them

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::{header::CONTENT_TYPE, StatusCode},
    Form,
};

use crate::error::AppError;
use crate::http::server::AppState;
use crate::validation::{BoundaryValidator, ExpectedKind, ValidatedPayload};

/// One uploaded file, not yet validated.
pub struct Upload {
    field: String,
    content_type: Option<String>,
    filename: Option<String>,
    bytes: Bytes,
}

impl Upload {
    pub fn new(field: impl Into<String>, content_type: Option<&str>, filename: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        Self {
            field: field.into(),
            content_type: content_type.map(str::to_string),
            filename: filename.map(str::to_string),
            bytes: bytes.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Run the boundary checks for `kind`.
    pub fn validate(&self, kind: ExpectedKind, validator: &BoundaryValidator) -> Result<ValidatedPayload, AppError> {
        validator
            .validate(
                self.content_type.as_deref(),
                self.filename.as_deref(),
                self.bytes.clone(),
                kind,
            )
            .map_err(AppError::from)
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("field", &self.field)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Text fields and uploads of one request body.
#[derive(Debug, Default)]
pub struct FormData {
    fields: Vec<(String, String)>,
    uploads: Vec<Upload>,
}

impl FormData {
    pub fn new(fields: Vec<(String, String)>, uploads: Vec<Upload>) -> Self {
        Self { fields, uploads }
    }

    /// First non-empty value of `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, value)| field == name && !value.trim().is_empty())
            .map(|(_, value)| value.as_str())
    }

    pub fn require_text(&self, name: &str) -> Result<&str, AppError> {
        self.text(name)
            .ok_or_else(|| AppError::invalid(format!("Missing required field: {name}")))
    }

    pub fn integer(&self, name: &str) -> Result<Option<i64>, AppError> {
        self.text(name)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|_| AppError::invalid(format!("{name} must be an integer")))
            })
            .transpose()
    }

    pub fn require_integer(&self, name: &str) -> Result<i64, AppError> {
        self.integer(name)?
            .ok_or_else(|| AppError::invalid(format!("Missing required field: {name}")))
    }

    pub fn float(&self, name: &str) -> Result<Option<f64>, AppError> {
        self.text(name)
            .map(|raw| {
                raw.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| AppError::invalid(format!("{name} must be a number")))
            })
            .transpose()
    }

    pub fn boolean(&self, name: &str) -> Result<Option<bool>, AppError> {
        self.text(name)
            .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(AppError::invalid(format!("{name} must be a boolean"))),
            })
            .transpose()
    }

    /// Validate the first upload of `field`.
    pub fn validated(&self, field: &str, kind: ExpectedKind, validator: &BoundaryValidator) -> Result<ValidatedPayload, AppError> {
        self.uploads
            .iter()
            .find(|upload| upload.field == field)
            .ok_or_else(|| AppError::invalid("No file provided"))?
            .validate(kind, validator)
    }

    /// Validate every upload of `field`, in submission order.
    pub fn validated_all(&self, field: &str, kind: ExpectedKind, validator: &BoundaryValidator) -> Result<Vec<ValidatedPayload>, AppError> {
        self.uploads
            .iter()
            .filter(|upload| upload.field == field)
            .map(|upload| upload.validate(kind, validator))
            .collect()
    }
}

/// Map a body framing failure onto the taxonomy.
fn framing_error(status: StatusCode, max_file_size_mb: u64) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("File too large. Maximum size is {max_file_size_mb}MB."))
    } else {
        AppError::invalid("Malformed form data")
    }
}

fn essence(request: &Request) -> String {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

impl FromRequest<AppState> for FormData {
    type Rejection = AppError;

    async fn from_request(request: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let max_mb = state.settings.limits.max_file_size_mb;
        let max_files = state.settings.limits.max_files_per_request;

        match essence(&request).as_str() {
            "multipart/form-data" => {
                let mut multipart = Multipart::from_request(request, state)
                    .await
                    .map_err(|rejection| framing_error(rejection.status(), max_mb))?;
                let mut form = FormData::default();
                while let Some(field) = multipart
                    .next_field()
                    .await
                    .map_err(|err| framing_error(err.status(), max_mb))?
                {
                    let name = field.name().unwrap_or_default().to_string();
                    match field.file_name().map(str::to_string) {
                        Some(filename) => {
                            let content_type = field.content_type().map(str::to_string);
                            let bytes = field.bytes().await.map_err(|err| framing_error(err.status(), max_mb))?;
                            if filename.is_empty() && bytes.is_empty() {
                                continue;
                            }
                            if form.uploads.len() >= max_files {
                                return Err(AppError::invalid(format!(
                                    "Too many files. Maximum is {max_files} files per request."
                                )));
                            }
                            form.uploads.push(Upload {
                                field: name,
                                content_type,
                                filename: Some(filename),
                                bytes,
                            });
                        }
                        None => {
                            let value = field.text().await.map_err(|err| framing_error(err.status(), max_mb))?;
                            form.fields.push((name, value));
                        }
                    }
                }
                Ok(form)
            }
            "application/x-www-form-urlencoded" => {
                let Form(fields) = Form::<Vec<(String, String)>>::from_request(request, state)
                    .await
                    .map_err(|rejection| framing_error(rejection.status(), max_mb))?;
                Ok(FormData::new(fields, Vec::new()))
            }
            _ => Ok(FormData::default()),
        }
    }
}
