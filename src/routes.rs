use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use photo_ingest::{NewPhoto, Photo};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{error::ApiError, state::AppState};

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 1000;
const LATEST_COUNT: i64 = 20;
const MAX_GUEST_NAME_LEN: usize = 100;
const MAX_CAPTION_LEN: usize = 500;

/// Photo record as exposed over the API
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiPhoto {
    id: i64,
    filename: String,
    original_name: String,
    guest_name: Option<String>,
    caption: Option<String>,
    mime_type: String,
    file_size: i64,
    width: u32,
    height: u32,
    uploaded_at: DateTime<Utc>,
}

impl From<Photo> for ApiPhoto {
    fn from(photo: Photo) -> Self {
        Self {
            id: photo.id,
            filename: photo.filename,
            original_name: photo.original_name,
            guest_name: photo.guest_name,
            caption: photo.caption,
            mime_type: photo.mime_type,
            file_size: photo.file_size,
            width: photo.width,
            height: photo.height,
            uploaded_at: photo.uploaded_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadedPhoto {
    id: i64,
    uploaded_at: DateTime<Utc>,
    filename: String,
    width: u32,
    height: u32,
}

/// POST /api/upload - ingest one or more images from a multipart form
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut guest_name: Option<String> = None;
    let mut caption: Option<String> = None;
    let mut files: Vec<(Vec<u8>, String)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        match field.name().unwrap_or("") {
            "guestName" => {
                let value = field.text().await.map_err(bad_multipart)?;
                if value.chars().count() > MAX_GUEST_NAME_LEN {
                    return Err(ApiError::InvalidInput(format!(
                        "guestName exceeds {} characters",
                        MAX_GUEST_NAME_LEN
                    )));
                }
                guest_name = non_empty(value);
            }
            "caption" => {
                let value = field.text().await.map_err(bad_multipart)?;
                if value.chars().count() > MAX_CAPTION_LEN {
                    return Err(ApiError::InvalidInput(format!(
                        "caption exceeds {} characters",
                        MAX_CAPTION_LEN
                    )));
                }
                caption = non_empty(value);
            }
            "image" | "images" => {
                if files.len() >= state.config.max_files_per_upload {
                    return Err(ApiError::InvalidInput(format!(
                        "At most {} images per upload",
                        state.config.max_files_per_upload
                    )));
                }
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                if bytes.is_empty() {
                    return Err(ApiError::InvalidInput("Empty image upload".to_string()));
                }
                files.push((bytes.to_vec(), original_name));
            }
            other => {
                debug!("Ignoring unknown multipart field: {}", other);
            }
        }
    }

    if files.is_empty() {
        return Err(ApiError::InvalidInput("No image provided".to_string()));
    }

    let mut uploaded = Vec::new();
    for (bytes, original_name) in files {
        // Quota pre-check against the current aggregate, before any
        // decoding or file write happens.
        let stats = state.store.stats()?;
        state.quota.admit(&stats, bytes.len() as i64)?;

        let processed = state.pipeline.process(bytes, original_name).await?;

        let inserted = state.store.insert(NewPhoto {
            filename: processed.filename.clone(),
            original_name: processed.original_name,
            guest_name: guest_name.clone(),
            caption: caption.clone(),
            mime_type: processed.mime_type,
            file_size: processed.file_size,
            width: processed.width,
            height: processed.height,
            uploader_ip: Some(addr.ip().to_string()),
        });

        let photo = match inserted {
            Ok(photo) => photo,
            Err(e) => {
                // The file was already written; remove it so the failed
                // insert does not leave an orphan behind.
                let path = state.pipeline.photo_path(&processed.filename);
                if let Err(unlink_err) = tokio::fs::remove_file(&path).await {
                    warn!("Could not remove {} after failed insert: {}", processed.filename, unlink_err);
                }
                return Err(e.into());
            }
        };

        uploaded.push(UploadedPhoto {
            id: photo.id,
            uploaded_at: photo.uploaded_at,
            filename: photo.filename,
            width: photo.width,
            height: photo.height,
        });
    }

    let body = Json(json!({ "status": "success", "photos": uploaded }));
    Ok((StatusCode::CREATED, body).into_response())
}

#[derive(Deserialize)]
pub struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

/// GET /api/photos - paginated listing, newest first
pub async fn photos_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = clamp_limit(query.limit);
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::InvalidInput(
            "offset must not be negative".to_string(),
        ));
    }

    let photos = state.store.list(limit, offset)?;
    let total = state.store.count()?;
    let returned = photos.len() as i64;

    let photos: Vec<ApiPhoto> = photos.into_iter().map(ApiPhoto::from).collect();
    Ok(Json(json!({
        "photos": photos,
        "pagination": {
            "total": total,
            "limit": limit,
            "offset": offset,
            "hasMore": has_more(offset, returned, total),
        },
    })))
}

/// GET /api/latest - the most recent uploads for the live wall
pub async fn latest_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let photos = state.store.list(LATEST_COUNT, 0)?;
    let photos: Vec<ApiPhoto> = photos.into_iter().map(ApiPhoto::from).collect();
    Ok(Json(json!({ "photos": photos })))
}

/// GET /api/photos/{id} - single record metadata
pub async fn photo_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiPhoto>, ApiError> {
    let photo = state
        .store
        .get(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Photo {} not found", id)))?;
    Ok(Json(photo.into()))
}

/// GET /api/photos/{id}/file - the stored image bytes
pub async fn file_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let photo = state
        .store
        .get(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Photo {} not found", id)))?;

    let path = state.pipeline.photo_path(&photo.filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Photo {} exists in the database but {} is gone", id, photo.filename);
            return Err(ApiError::FileMissing);
        }
        Err(e) => {
            return Err(ApiError::Internal(format!(
                "Reading {}: {}",
                photo.filename, e
            )));
        }
    };

    // Files are immutable once written, so clients may cache aggressively
    let headers = [
        (header::CONTENT_TYPE, photo.mime_type),
        (
            header::CACHE_CONTROL,
            "public, max-age=31536000, immutable".to_string(),
        ),
    ];
    Ok((headers, bytes).into_response())
}

/// GET /api/stats - storage usage summary
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state.store.stats()?;
    let max_gb = state.config.max_storage_gb;
    let percentage = if max_gb > 0.0 {
        (stats.total_size_gb() / max_gb) * 100.0
    } else {
        100.0
    };

    Ok(Json(json!({
        "totalPhotos": stats.total_files,
        "totalSizeBytes": stats.total_size_bytes,
        "totalSizeGB": round2(stats.total_size_gb()),
        "maxStorageGB": max_gb,
        "percentageUsed": round2(percentage),
    })))
}

/// DELETE /api/photos/{id} - admin-only removal of record and file
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if token != state.config.admin_token {
        return Err(ApiError::Unauthorized);
    }

    // Row first (transactional, decrements the aggregate), file second:
    // a failure here can only orphan a file, never keep a dangling record.
    let photo = state
        .store
        .delete(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Photo {} not found", id)))?;

    let path = state.pipeline.photo_path(&photo.filename);
    let file_removed = match tokio::fs::remove_file(&path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("File for photo {} was already missing", id);
            true
        }
        Err(e) => {
            warn!("Could not remove {}: {}", photo.filename, e);
            false
        }
    };

    Ok(Json(json!({
        "status": "success",
        "deleted": id,
        "fileRemoved": file_removed,
    })))
}

/// GET /health - liveness plus current usage
pub async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state.store.stats()?;
    Ok(Json(json!({
        "status": "ok",
        "totalPhotos": stats.total_files,
        "totalSizeBytes": stats.total_size_bytes,
    })))
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::InvalidInput(format!("Malformed multipart payload: {}", err))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

fn has_more(offset: i64, returned: i64, total: i64) -> bool {
    offset + returned < total
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 100);
        assert_eq!(clamp_limit(Some(50)), 50);
        assert_eq!(clamp_limit(Some(5000)), 1000);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-3)), 1);
    }

    #[test]
    fn test_has_more() {
        assert!(has_more(0, 100, 150));
        assert!(!has_more(100, 50, 150));
        assert!(!has_more(0, 0, 0));
        assert!(!has_more(200, 0, 150));
    }

    #[test]
    fn test_non_empty_trims_whitespace() {
        assert_eq!(non_empty("  Anna ".to_string()), Some("Anna".to_string()));
        assert_eq!(non_empty("   ".to_string()), None);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(33.333333), 33.33);
    }
}
