//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits so an optional TOML file can seed the values
//! before environment overrides are applied.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the document service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Application name reported by the health endpoint.
    pub app_name: String,

    /// Human-readable logs and debug-level filtering.
    pub debug: bool,

    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Upload and request limits.
    pub limits: LimitsConfig,

    /// Timeouts for requests and external tools.
    pub timeouts: TimeoutConfig,

    /// Scratch storage for tools that need a filesystem.
    pub scratch: ScratchConfig,

    /// External conversion tools.
    pub tools: ToolsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "NoTracePDF".to_string(),
            debug: false,
            bind_address: "0.0.0.0:8000".to_string(),
            limits: LimitsConfig::default(),
            timeouts: TimeoutConfig::default(),
            scratch: ScratchConfig::default(),
            tools: ToolsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Settings {
    /// Per-file upload ceiling in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.limits.max_file_size_mb as usize * 1024 * 1024
    }

    /// Ceiling for a whole request body, large enough for a full multi-file upload.
    pub fn max_body_bytes(&self) -> usize {
        self.max_upload_bytes()
            .saturating_mul(self.limits.max_files_per_request)
            .saturating_add(1024 * 1024)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_secs)
    }

    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.conversion_secs)
    }
}

/// Upload limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a single uploaded file, in megabytes.
    pub max_file_size_mb: u64,

    /// Maximum number of files accepted by multi-file endpoints.
    pub max_files_per_request: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_files_per_request: 20,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time for one request/response cycle in seconds.
    pub request_secs: u64,

    /// Bound on a single external conversion process in seconds.
    pub conversion_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            conversion_secs: 60,
        }
    }
}

/// Scratch storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Directory under which per-transform scratch directories are created.
    /// Should be RAM-backed (tmpfs).
    pub root: PathBuf,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            root: default_scratch_root(),
        }
    }
}

/// `/dev/shm` when the host provides it, the OS temp directory otherwise.
pub fn default_scratch_root() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// External tool binaries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// LibreOffice executable.
    pub soffice: String,

    /// Tesseract OCR executable.
    pub tesseract: String,

    /// Poppler page rasterizer.
    pub pdftoppm: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            soffice: "soffice".to_string(),
            tesseract: "tesseract".to_string(),
            pdftoppm: "pdftoppm".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Prometheus scrape address. Metrics stay disabled when unset.
    pub metrics_address: Option<String>,
}
