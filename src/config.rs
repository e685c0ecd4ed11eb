use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::{info, warn};

/// Server configuration, loaded from `FOTOWAND_*` environment variables
/// with logged fallbacks to defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Exact origin allowed for CORS; unset means any origin
    pub cors_origin: Option<String>,
    /// Request body ceiling for uploads, in bytes
    pub max_upload_bytes: usize,
    /// Maximum number of image parts accepted in one upload request
    pub max_files_per_upload: usize,
    pub max_storage_gb: f64,
    pub storage_path: PathBuf,
    pub database_path: PathBuf,
    /// JPEG re-encode quality (1-100)
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub admin_token: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            host: try_load("FOTOWAND_HOST", "0.0.0.0"),
            port: try_load("FOTOWAND_PORT", "3000"),
            cors_origin: var("FOTOWAND_CORS_ORIGIN").ok(),
            max_upload_bytes: try_load("FOTOWAND_MAX_UPLOAD_BYTES", "52428800"),
            max_files_per_upload: try_load("FOTOWAND_MAX_FILES_PER_UPLOAD", "10"),
            max_storage_gb: try_load("FOTOWAND_MAX_STORAGE_GB", "10"),
            storage_path: PathBuf::from(try_load::<String>(
                "FOTOWAND_STORAGE_PATH",
                "./data/photos",
            )),
            database_path: PathBuf::from(try_load::<String>(
                "FOTOWAND_DATABASE_PATH",
                "./data/fotowand.db",
            )),
            quality: try_load("FOTOWAND_QUALITY", "82"),
            max_width: try_load("FOTOWAND_MAX_WIDTH", "4096"),
            max_height: try_load("FOTOWAND_MAX_HEIGHT", "4096"),
            admin_token: load_admin_token(),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| ())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn load_admin_token() -> String {
    var("FOTOWAND_ADMIN_TOKEN").unwrap_or_else(|_| {
        warn!("FOTOWAND_ADMIN_TOKEN not set, admin deletion uses an insecure default");
        "change-me".to_string()
    })
}
