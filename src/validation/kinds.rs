//! Allow-lists and content signatures per upload kind.

/// What an endpoint expects to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedKind {
    Pdf,
    Image,
    Word,
    Excel,
    PowerPoint,
    Rtf,
    Html,
    Text,
    Zip,
    /// OCR input: a PDF or a raster image.
    PdfOrImage,
}

const PDF_SIGNATURE: &[u8] = b"%PDF-";
const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";
const RTF_SIGNATURE: &[u8] = b"{\\rtf";

const IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp", "image/bmp"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

impl ExpectedKind {
    /// Declared MIME types accepted for this kind.
    pub fn mime_types(self) -> &'static [&'static str] {
        match self {
            ExpectedKind::Pdf => &["application/pdf"],
            ExpectedKind::Image => IMAGE_MIME_TYPES,
            ExpectedKind::Word => &[
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/msword",
            ],
            ExpectedKind::Excel => &[
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/vnd.ms-excel",
            ],
            ExpectedKind::PowerPoint => &[
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                "application/vnd.ms-powerpoint",
            ],
            ExpectedKind::Rtf => &["application/rtf", "text/rtf"],
            ExpectedKind::Html => &["text/html", "application/xhtml+xml"],
            ExpectedKind::Text => &["text/plain"],
            ExpectedKind::Zip => &["application/zip", "application/x-zip-compressed"],
            ExpectedKind::PdfOrImage => &[
                "application/pdf",
                "image/jpeg",
                "image/png",
                "image/gif",
                "image/webp",
                "image/bmp",
            ],
        }
    }

    /// Filename extensions accepted when the declared type does not match.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ExpectedKind::Pdf => &[".pdf"],
            ExpectedKind::Image => IMAGE_EXTENSIONS,
            ExpectedKind::Word => &[".docx", ".doc"],
            ExpectedKind::Excel => &[".xlsx", ".xls"],
            ExpectedKind::PowerPoint => &[".pptx", ".ppt"],
            ExpectedKind::Rtf => &[".rtf"],
            ExpectedKind::Html => &[".html", ".htm"],
            ExpectedKind::Text => &[".txt"],
            ExpectedKind::Zip => &[".zip"],
            ExpectedKind::PdfOrImage => &[".pdf", ".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"],
        }
    }

    /// Whether `bytes` starts with a signature valid for this kind.
    pub fn signature_matches(self, bytes: &[u8]) -> bool {
        match self {
            ExpectedKind::Pdf => bytes.starts_with(PDF_SIGNATURE),
            ExpectedKind::Image => sniff_image(bytes).is_some(),
            ExpectedKind::Word | ExpectedKind::Excel | ExpectedKind::PowerPoint | ExpectedKind::Zip => {
                bytes.starts_with(ZIP_LOCAL_HEADER) || bytes.starts_with(ZIP_EMPTY_ARCHIVE)
            }
            ExpectedKind::Rtf => bytes.starts_with(RTF_SIGNATURE),
            ExpectedKind::Html | ExpectedKind::Text => {
                !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
            }
            ExpectedKind::PdfOrImage => {
                bytes.starts_with(PDF_SIGNATURE) || sniff_image(bytes).is_some()
            }
        }
    }

    /// Human label used in "Expected ..." messages.
    pub fn label(self) -> &'static str {
        match self {
            ExpectedKind::Pdf => "PDF",
            ExpectedKind::Image => "image",
            ExpectedKind::Word => "Word document",
            ExpectedKind::Excel => "Excel spreadsheet",
            ExpectedKind::PowerPoint => "PowerPoint presentation",
            ExpectedKind::Rtf => "RTF document",
            ExpectedKind::Html => "HTML document",
            ExpectedKind::Text => "text file",
            ExpectedKind::Zip => "ZIP archive",
            ExpectedKind::PdfOrImage => "PDF or image",
        }
    }

    /// Detail for a failed signature check.
    pub fn malformed_detail(self) -> &'static str {
        match self {
            ExpectedKind::Pdf => "Invalid PDF file. File does not start with PDF header.",
            ExpectedKind::Image => "Invalid image file. File does not have a known image header.",
            ExpectedKind::Word => "Invalid Word document. File does not have expected format.",
            ExpectedKind::Excel => "Invalid Excel file. File does not have expected format.",
            ExpectedKind::PowerPoint => "Invalid PowerPoint file. File does not have expected format.",
            ExpectedKind::Rtf => "Invalid RTF file. File does not have RTF header.",
            ExpectedKind::Html => "Invalid HTML file. File is not UTF-8 text.",
            ExpectedKind::Text => "Invalid text file. File is not UTF-8 text.",
            ExpectedKind::Zip => "Invalid ZIP file. File does not have expected format.",
            ExpectedKind::PdfOrImage => "Invalid file. Expected a PDF or image header.",
        }
    }

    /// Extension used when a transform has to put the payload on disk.
    pub fn scratch_extension(self) -> &'static str {
        match self {
            ExpectedKind::Pdf | ExpectedKind::PdfOrImage => "pdf",
            ExpectedKind::Image => "img",
            ExpectedKind::Word => "docx",
            ExpectedKind::Excel => "xlsx",
            ExpectedKind::PowerPoint => "pptx",
            ExpectedKind::Rtf => "rtf",
            ExpectedKind::Html => "html",
            ExpectedKind::Text => "txt",
            ExpectedKind::Zip => "zip",
        }
    }
}

/// Raster formats recognised by their header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSignature {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
}

impl ImageSignature {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            ImageSignature::Png => "png",
            ImageSignature::Jpeg => "jpg",
            ImageSignature::Gif => "gif",
            ImageSignature::Webp => "webp",
            ImageSignature::Bmp => "bmp",
        }
    }
}

/// Identify a raster image by its leading bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageSignature> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageSignature::Png)
    } else if bytes.starts_with(b"\xff\xd8\xff") {
        Some(ImageSignature::Jpeg)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageSignature::Gif)
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        Some(ImageSignature::Webp)
    } else if bytes.starts_with(b"BM") {
        Some(ImageSignature::Bmp)
    } else {
        None
    }
}
