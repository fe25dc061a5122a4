//! In-memory ZIP packing and unpacking.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::transform::{NamedBuffer, TransformError};

/// Pack `buffers` into a deflated archive, in order.
pub fn pack(buffers: &[NamedBuffer]) -> Result<Vec<u8>, TransformError> {
    let failed = |_| TransformError::failure("Failed to build archive");

    let mut out = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut out));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for buffer in buffers {
            zip.start_file(buffer.name(), options).map_err(failed)?;
            zip.write_all(buffer.bytes())
                .map_err(|_| TransformError::failure("Failed to build archive"))?;
        }
        zip.finish().map_err(failed)?;
    }
    Ok(out)
}

/// Bounds applied while reading an uploaded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Largest decompressed size of a single kept entry.
    pub max_entry_bytes: u64,
    /// Largest decompressed size of all kept entries together.
    pub max_total_bytes: u64,
    /// Most entries that may be kept.
    pub max_entries: usize,
}

fn oversized_entry() -> TransformError {
    TransformError::invalid("Archive entry exceeds the maximum file size")
}

fn oversized_total() -> TransformError {
    TransformError::invalid("Archive contents exceed the maximum total size")
}

/// Entries of an uploaded archive, read fully into memory.
///
/// Directories are skipped; `accept` decides which file names are kept.
/// Only kept entries count against `limits`, and reads stop as soon as a
/// bound is crossed, whatever sizes the archive declares.
pub fn unpack<F>(bytes: &[u8], limits: ArchiveLimits, accept: F) -> Result<Vec<Vec<u8>>, TransformError>
where
    F: Fn(&str) -> bool,
{
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|_| TransformError::invalid("Invalid ZIP archive"))?;

    let mut entries = Vec::new();
    let mut total: u64 = 0;
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|_| TransformError::invalid("Invalid ZIP archive"))?;
        if file.is_dir() || !accept(file.name()) {
            continue;
        }
        if entries.len() >= limits.max_entries {
            return Err(TransformError::invalid(format!(
                "Too many files in archive. Maximum is {} files.",
                limits.max_entries
            )));
        }
        if file.size() > limits.max_entry_bytes {
            return Err(oversized_entry());
        }

        let remaining = limits.max_total_bytes.saturating_sub(total);
        let budget = limits.max_entry_bytes.min(remaining);
        let mut content = Vec::with_capacity(file.size().min(budget) as usize);
        file.by_ref()
            .take(budget + 1)
            .read_to_end(&mut content)
            .map_err(|_| TransformError::invalid("Invalid ZIP archive"))?;
        let read = content.len() as u64;
        if read > budget {
            return Err(if read > limits.max_entry_bytes { oversized_entry() } else { oversized_total() });
        }
        total += read;
        entries.push(content);
    }
    Ok(entries)
}
