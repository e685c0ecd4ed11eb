use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A successfully ingested photo as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: i64,
    /// Generated storage filename (unique, never reused)
    pub filename: String,
    /// Sanitized client-supplied filename
    pub original_name: String,
    pub guest_name: Option<String>,
    pub caption: Option<String>,
    /// MIME type of the stored (post-processing) bytes
    pub mime_type: String,
    pub file_size: i64,
    pub width: u32,
    pub height: u32,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_ip: Option<String>,
}

/// Attributes of a photo before the store has assigned id and timestamp
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub filename: String,
    pub original_name: String,
    pub guest_name: Option<String>,
    pub caption: Option<String>,
    pub mime_type: String,
    pub file_size: i64,
    pub width: u32,
    pub height: u32,
    pub uploader_ip: Option<String>,
}

/// Snapshot of the denormalized storage aggregate
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StorageStats {
    pub total_files: i64,
    pub total_size_bytes: i64,
}

impl StorageStats {
    pub fn total_size_gb(&self) -> f64 {
        self.total_size_bytes as f64 / BYTES_PER_GB
    }
}

/// Configuration for the ingest pipeline
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Content directory for processed images
    pub storage_path: PathBuf,
    /// Maximum stored width in pixels; larger images are resized to fit
    pub max_width: u32,
    /// Maximum stored height in pixels
    pub max_height: u32,
    /// JPEG re-encode quality (1-100)
    pub quality: u8,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./data/photos"),
            max_width: 4096,
            max_height: 4096,
            quality: 82,
        }
    }
}
