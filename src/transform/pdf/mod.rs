//! PDF transforms built on lopdf.
//!
//! # Responsibilities
//! - Page operations (merge, split, rotate, reorder, delete, extract pages)
//! - Security (add and remove passwords)
//! - Text and image watermarks
//! - Text and image extraction, document info
//! - Compression
//!
//! # Design Decisions
//! - Everything runs on in-memory buffers inside `TransformContext::blocking`
//! - Encrypted input is refused by every operation except password removal

pub mod compress;
pub mod document;
pub mod extract;
pub mod images;
pub mod pages;
pub mod security;
pub mod watermark;

pub use compress::Compress;
pub use extract::{ExtractText, Info};
pub use images::ExtractImages;
pub use pages::{DeletePages, ExtractPages, Merge, Reorder, Rotate, Split};
pub use security::{AddPassword, RemovePassword};
pub use watermark::{ImageWatermark, TextWatermark};
