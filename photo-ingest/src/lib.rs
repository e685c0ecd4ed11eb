//! # Photo Ingest
//!
//! Image ingest pipeline and SQLite-backed photo store with storage
//! accounting, the core of a guest-facing event photo service.
//!
//! This crate provides:
//! - Magic-byte format validation with a fixed allow-list (JPEG, PNG, WebP)
//! - Normalization: EXIF auto-rotation, resize-to-fit, metadata-stripping
//!   re-encode at a configured quality
//! - A `PhotoStore` over a single SQLite file (WAL mode) whose storage
//!   aggregate is updated transactionally with every insert and delete
//! - A `QuotaGuard` admission check against a configured storage ceiling
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use photo_ingest::{IngestConfig, IngestPipeline, PhotoStore, QuotaGuard};
//!
//! let store = PhotoStore::open("./data/fotowand.db")?;
//! let pipeline = IngestPipeline::new(IngestConfig::default());
//! let quota = QuotaGuard::new(10.0);
//!
//! quota.admit(&store.stats()?, upload.len() as i64)?;
//! let processed = pipeline.process(upload, "party.jpg".into()).await?;
//! ```

pub mod models;
pub mod pipeline;
pub mod quota;
pub mod schema;
pub mod store;

pub use models::{IngestConfig, NewPhoto, Photo, StorageStats};
pub use pipeline::{
    sanitize_original_name, sniff_format, IngestPipeline, OutputFormat, PipelineError,
    ProcessedPhoto, SniffedFormat,
};
pub use quota::{QuotaExceeded, QuotaGuard};
pub use schema::init_schema;
pub use store::{PhotoStore, StoreError};
