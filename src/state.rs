use std::sync::Arc;

use photo_ingest::{IngestConfig, IngestPipeline, PhotoStore, QuotaGuard};

use super::config::Config;

/// Shared application state: explicitly constructed and passed to the
/// handlers, no process-wide singletons.
pub struct AppState {
    pub config: Config,
    pub store: PhotoStore,
    pub pipeline: IngestPipeline,
    pub quota: QuotaGuard,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let config = Config::load();

        let store = PhotoStore::open(&config.database_path).expect("Database misconfigured!");

        let pipeline = IngestPipeline::new(IngestConfig {
            storage_path: config.storage_path.clone(),
            max_width: config.max_width,
            max_height: config.max_height,
            quality: config.quality,
        });

        let quota = QuotaGuard::new(config.max_storage_gb);

        Arc::new(Self {
            config,
            store,
            pipeline,
            quota,
        })
    }
}
