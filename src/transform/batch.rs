//! Batch processing of zipped PDFs.
//!
//! Every `.pdf` member of the uploaded archive (outside `__MACOSX/`) is
//! unpacked into memory, run through one operation and written into a new
//! archive as `file_{k}.pdf`, or `file_{k}_part_{j}.pdf` for a split.
//! Member names from the upload are never echoed back. A member that is not
//! a PDF or fails the operation is skipped. The archive is read under the
//! same size and count bounds as a multi-file request.

use async_trait::async_trait;

use crate::transform::archive::ArchiveLimits;
use crate::transform::options::{OptionError, PageSelection, QualityPreset, Rotation, SplitMode};
use crate::transform::pdf::{compress, pages, security};
use crate::transform::{archive, NamedBuffer, Transform, TransformContext, TransformError, TransformResult, ZIP_MEDIA_TYPE};
use crate::validation::ValidatedPayload;

const DEFAULT_DEGREES: i64 = 90;

/// Operation applied to each document.
#[derive(Clone, PartialEq)]
pub enum BatchOperation {
    Compress(QualityPreset),
    Rotate(Rotation),
    /// Pages per output part.
    Split(usize),
    Password(String),
}

impl std::fmt::Debug for BatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchOperation::Compress(preset) => f.debug_tuple("Compress").field(preset).finish(),
            BatchOperation::Rotate(rotation) => f.debug_tuple("Rotate").field(rotation).finish(),
            BatchOperation::Split(pages) => f.debug_tuple("Split").field(pages).finish(),
            BatchOperation::Password(_) => f.write_str("Password(..)"),
        }
    }
}

impl BatchOperation {
    pub fn parse(
        operation: &str,
        quality: Option<&str>,
        degrees: Option<i64>,
        split_mode: Option<&str>,
        n_pages: Option<i64>,
        password: Option<&str>,
    ) -> Result<Self, OptionError> {
        match operation.trim().to_ascii_lowercase().as_str() {
            "compress" => Ok(BatchOperation::Compress(
                quality.map(str::parse).transpose()?.unwrap_or_default(),
            )),
            "rotate" => Ok(BatchOperation::Rotate(Rotation::try_from(
                degrees.unwrap_or(DEFAULT_DEGREES),
            )?)),
            "split" => match split_mode.map(str::trim).unwrap_or("range").to_ascii_lowercase().as_str() {
                "" | "range" => Ok(BatchOperation::Split(1)),
                "every_n" => match n_pages.unwrap_or(1) {
                    n if n >= 1 => Ok(BatchOperation::Split(n as usize)),
                    _ => Err(OptionError::new("n_pages must be >= 1")),
                },
                _ => Err(OptionError::new("Invalid split_mode. Must be one of: range, every_n")),
            },
            "password" => match password {
                Some(password) if !password.is_empty() => Ok(BatchOperation::Password(password.to_string())),
                _ => Err(OptionError::new("Password is required for password operation")),
            },
            _ => Err(OptionError::new("Invalid operation. Must be one of: compress, rotate, split, password")),
        }
    }

    /// Outputs for one document, in order.
    fn apply(&self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, TransformError> {
        let single = match self {
            BatchOperation::Compress(preset) => compress::compress(bytes, *preset)?,
            BatchOperation::Rotate(rotation) => pages::rotate(bytes, &PageSelection::All, *rotation)?,
            BatchOperation::Password(password) => security::add_password(bytes, password, &[])?,
            BatchOperation::Split(per_part) => {
                let parts = pages::split(bytes, &SplitMode::EveryN(*per_part))?;
                return Ok(parts.into_iter().map(NamedBuffer::into_bytes).collect());
            }
        };
        Ok(vec![single])
    }
}

fn is_pdf_member(name: &str) -> bool {
    !name.starts_with("__MACOSX/") && name.to_ascii_lowercase().ends_with(".pdf")
}

/// Process every PDF member of `zip` and pack the results.
pub fn process(zip: &[u8], operation: &BatchOperation, limits: ArchiveLimits) -> Result<Vec<u8>, TransformError> {
    let members = archive::unpack(zip, limits, is_pdf_member)?;
    if members.is_empty() {
        return Err(TransformError::EmptyResult("No PDF files found in archive".into()));
    }

    let mut outputs = Vec::with_capacity(members.len());
    let mut processed_count = 0usize;
    let mut skipped = 0usize;
    for member in &members {
        let processed = if member.starts_with(b"%PDF-") {
            operation.apply(member)
        } else {
            Err(TransformError::invalid("Archive member is not a PDF"))
        };
        match processed {
            Ok(parts) => {
                processed_count += 1;
                let k = processed_count;
                match operation {
                    BatchOperation::Split(_) => outputs.extend(
                        parts
                            .into_iter()
                            .enumerate()
                            .map(|(j, bytes)| NamedBuffer::pdf(format!("file_{k}_part_{}.pdf", j + 1), bytes)),
                    ),
                    _ => outputs.extend(parts.into_iter().map(|bytes| NamedBuffer::pdf(format!("file_{k}.pdf"), bytes))),
                }
            }
            Err(err) => {
                skipped += 1;
                tracing::debug!(outcome = err.outcome(), "Skipping archive member");
            }
        }
    }
    tracing::debug!(members = members.len(), processed = processed_count, skipped, "Batch processed");

    if outputs.is_empty() {
        return Err(TransformError::EmptyResult("No PDF files could be processed".into()));
    }
    archive::pack(&outputs)
}

pub struct Batch;

#[async_trait]
impl Transform for Batch {
    type Input = ValidatedPayload;
    type Options = BatchOperation;

    fn operation(&self) -> &'static str {
        "batch_process"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, operation: BatchOperation) -> Result<TransformResult, TransformError> {
        let limits = ctx.archive_limits();
        let zip = ctx
            .blocking(move || process(input.bytes(), &operation, limits))
            .await?;
        Ok(TransformResult::Single(NamedBuffer::new("batch_result.zip", ZIP_MEDIA_TYPE, zip)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::pdf::document::page_count;
    use crate::transform::pdf::fixtures::sample;
    use std::io::{Cursor, Read};

    fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let buffers: Vec<NamedBuffer> = entries
            .iter()
            .map(|(name, bytes)| NamedBuffer::pdf(*name, bytes.clone()))
            .collect();
        archive::pack(&buffers).unwrap()
    }

    fn names_and_contents(zip: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(zip)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    fn limits(max_entry_bytes: u64) -> ArchiveLimits {
        ArchiveLimits {
            max_entry_bytes,
            max_total_bytes: max_entry_bytes * 20,
            max_entries: 20,
        }
    }

    #[test]
    fn parses_operations() {
        assert_eq!(
            BatchOperation::parse("compress", None, None, None, None, None).unwrap(),
            BatchOperation::Compress(QualityPreset::Medium)
        );
        assert_eq!(
            BatchOperation::parse("ROTATE", None, None, None, None, None).unwrap(),
            BatchOperation::Rotate(Rotation::try_from(90).unwrap())
        );
        assert!(BatchOperation::parse("rotate", None, Some(45), None, None, None).is_err());
        assert!(BatchOperation::parse("password", None, None, None, None, Some("")).is_err());
        assert!(BatchOperation::parse("merge", None, None, None, None, None).is_err());
    }

    #[test]
    fn parses_split_modes() {
        assert_eq!(
            BatchOperation::parse("split", None, None, None, None, None).unwrap(),
            BatchOperation::Split(1)
        );
        assert_eq!(
            BatchOperation::parse("split", None, None, Some("every_n"), Some(3), None).unwrap(),
            BatchOperation::Split(3)
        );
        assert!(BatchOperation::parse("split", None, None, Some("every_n"), Some(0), None).is_err());
        assert!(BatchOperation::parse("split", None, None, Some("halves"), None, None).is_err());
    }

    #[test]
    fn split_writes_every_part() {
        let zip = zip_of(&[("Quarterly.pdf", sample(3)), ("Memo.pdf", sample(1))]);
        let out = process(&zip, &BatchOperation::Split(2), limits(1 << 20)).unwrap();

        let entries = names_and_contents(&out);
        let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["file_1_part_1.pdf", "file_1_part_2.pdf", "file_2_part_1.pdf"]);
        assert_eq!(page_count(&entries[0].1).unwrap(), 2);
        assert_eq!(page_count(&entries[1].1).unwrap(), 1);
        assert_eq!(page_count(&entries[2].1).unwrap(), 1);
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let op = BatchOperation::Password("hunter2".into());
        assert!(!format!("{op:?}").contains("hunter2"));
    }

    #[test]
    fn renames_outputs_and_skips_other_members() {
        let zip = zip_of(&[
            ("Secret Report.pdf", sample(2)),
            ("__MACOSX/._Secret Report.pdf", b"junk".to_vec()),
            ("notes.txt", b"hello".to_vec()),
            ("fake.pdf", b"not a pdf".to_vec()),
            ("nested/Other.PDF", sample(1)),
        ]);
        let out = process(&zip, &BatchOperation::Rotate(Rotation::try_from(180).unwrap()), limits(1 << 20)).unwrap();

        let entries = names_and_contents(&out);
        let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["file_1.pdf", "file_2.pdf"]);
        assert_eq!(page_count(&entries[0].1).unwrap(), 2);
        assert_eq!(page_count(&entries[1].1).unwrap(), 1);
    }

    #[test]
    fn archive_without_pdfs_is_empty_result() {
        let zip = zip_of(&[("readme.txt", b"hi".to_vec())]);
        let err = process(&zip, &BatchOperation::Compress(QualityPreset::Low), limits(1 << 20)).unwrap_err();
        assert!(matches!(err, TransformError::EmptyResult(_)));
        assert_eq!(err.to_string(), "No PDF files found in archive");
    }

    #[test]
    fn oversized_members_are_rejected() {
        let zip = zip_of(&[("big.pdf", sample(3))]);
        let err = process(&zip, &BatchOperation::Compress(QualityPreset::High), limits(16)).unwrap_err();
        assert_eq!(err.to_string(), "Archive entry exceeds the maximum file size");
    }

    #[test]
    fn too_many_members_are_rejected() {
        let entries: Vec<(String, Vec<u8>)> = (0..4).map(|i| (format!("doc_{i}.pdf"), sample(1))).collect();
        let refs: Vec<(&str, Vec<u8>)> = entries.iter().map(|(name, bytes)| (name.as_str(), bytes.clone())).collect();
        let zip = zip_of(&refs);
        let few = ArchiveLimits {
            max_entries: 3,
            ..limits(1 << 20)
        };
        let err = process(&zip, &BatchOperation::Compress(QualityPreset::High), few).unwrap_err();
        assert_eq!(err.to_string(), "Too many files in archive. Maximum is 3 files.");
    }
}
