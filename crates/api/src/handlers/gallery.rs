//! Handlers for the `/gallery` resource.

use std::collections::HashSet;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use smartcam_core::device::ClientKind;
use smartcam_core::protocol::ServerMessage;
use smartcam_db::models::photo::Photo;
use smartcam_db::models::video::{CreateVideo, Video, DEFAULT_VIDEO_DURATION_SECS};
use smartcam_db::repositories::{LogRepo, PhotoRepo, VideoRepo};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::gallery;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::ws::text_frame;

const DEFAULT_PAGE_SIZE: i64 = 9;
const DEFAULT_VIDEO_PAGE_SIZE: i64 = 6;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct GalleryQuery {
    #[serde(default)]
    pub page: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PhotoEntry {
    #[serde(flatten)]
    pub photo: Photo,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct GalleryPage {
    pub photos: Vec<PhotoEntry>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct VideoEntry {
    #[serde(flatten)]
    pub video: Video,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct VideoPage {
    pub videos: Vec<VideoEntry>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub has_more: bool,
}

fn page_window(params: &GalleryQuery, default_limit: i64) -> (i64, i64, i64) {
    let page = params.page.max(0);
    let limit = params.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
    (page, limit, page * limit)
}

/// GET /api/v1/gallery?page=0&limit=9
pub async fn list(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<GalleryQuery>,
) -> AppResult<Json<DataResponse<GalleryPage>>> {
    let (page, limit, offset) = page_window(&params, DEFAULT_PAGE_SIZE);

    let photos = PhotoRepo::list(&state.pool, limit, offset).await?;
    let total = PhotoRepo::count(&state.pool).await?;
    let has_more = offset + (photos.len() as i64) < total;

    let photos = photos
        .into_iter()
        .map(|photo| PhotoEntry {
            url: gallery::photo_url(&photo.filename),
            photo,
        })
        .collect();

    Ok(Json(DataResponse {
        data: GalleryPage {
            photos,
            page,
            limit,
            total,
            has_more,
        },
    }))
}

/// GET /api/v1/gallery/count
pub async fn count(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<DataResponse<Value>>> {
    let total = PhotoRepo::count(&state.pool).await?;
    Ok(Json(DataResponse {
        data: json!({ "count": total }),
    }))
}

/// GET /api/v1/gallery/{filename}
pub async fn serve_photo(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    gallery::validate_filename(&filename)?;
    let path = gallery::photo_path(&state.config.gallery_dir, &filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("Photo {filename} not found")));
        }
        Err(e) => return Err(AppError::InternalError(format!("Failed to read photo: {e}"))),
    };
    Ok((
        [
            (header::CONTENT_TYPE, gallery::image_content_type(&filename, &bytes)),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        bytes,
    ))
}

/// DELETE /api/v1/gallery/{filename}
///
/// Removes the file and the row, then tells dashboards to drop the tile.
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(filename): Path<String>,
) -> AppResult<StatusCode> {
    gallery::validate_filename(&filename)?;
    PhotoRepo::find_by_filename(&state.pool, &filename)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Photo {filename} not found")))?;

    let removed = gallery::remove_file(&gallery::photo_path(&state.config.gallery_dir, &filename))
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to delete photo: {e}")))?;
    if !removed {
        tracing::warn!(%filename, "Photo file already missing, removing record only");
    }
    PhotoRepo::delete_by_filename(&state.pool, &filename).await?;

    state
        .ws_manager
        .broadcast(
            text_frame(&ServerMessage::PhotoDeleted {
                filename: filename.clone(),
            }),
            Some(ClientKind::Web),
            None,
        )
        .await;
    LogRepo::insert(
        &state.pool,
        &format!("Photo deleted by {}: {filename}", user.username),
        "info",
        Some("system"),
    )
    .await?;
    tracing::info!(%filename, user_id = user.user_id, "Photo deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Bring `security_videos` in line with the videos directory: index new
/// clips and forget rows whose file is gone.
async fn sync_video_index(state: &AppState) -> AppResult<()> {
    let files = gallery::scan_videos(&state.config.videos_dir)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to scan videos: {e}")))?;
    let on_disk: HashSet<&str> = files.iter().map(|f| f.filename.as_str()).collect();

    for stale in VideoRepo::filenames(&state.pool).await? {
        if !on_disk.contains(stale.as_str()) {
            VideoRepo::delete_by_filename(&state.pool, &stale).await?;
            tracing::debug!(filename = %stale, "Dropped index row for missing video");
        }
    }

    for file in &files {
        let input = CreateVideo {
            filename: file.filename.clone(),
            filepath: file.path.display().to_string(),
            hour_of_day: i32::from(gallery::video_hour(&file.filename)),
            duration: DEFAULT_VIDEO_DURATION_SECS,
            size_bytes: i64::try_from(file.size).unwrap_or(i64::MAX),
            created_at: file.modified,
        };
        if VideoRepo::insert(&state.pool, &input).await?.is_some() {
            tracing::info!(filename = %file.filename, "Indexed security video");
        }
    }
    Ok(())
}

/// GET /api/v1/gallery/videos?page=0&limit=6
pub async fn list_videos(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<GalleryQuery>,
) -> AppResult<Json<DataResponse<VideoPage>>> {
    sync_video_index(&state).await?;
    let (page, limit, offset) = page_window(&params, DEFAULT_VIDEO_PAGE_SIZE);

    let videos = VideoRepo::list(&state.pool, limit, offset).await?;
    let total = VideoRepo::count(&state.pool).await?;
    let has_more = offset + (videos.len() as i64) < total;

    let videos = videos
        .into_iter()
        .map(|video| VideoEntry {
            url: gallery::video_url(&video.filename),
            video,
        })
        .collect();

    Ok(Json(DataResponse {
        data: VideoPage {
            videos,
            page,
            limit,
            total,
            has_more,
        },
    }))
}

/// GET /api/v1/gallery/videos/{filename}
///
/// Streams the clip from disk.
pub async fn serve_video(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    gallery::validate_video_filename(&filename)?;
    let path = gallery::video_path(&state.config.videos_dir, &filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("Video {filename} not found")));
        }
        Err(e) => return Err(AppError::InternalError(format!("Failed to open video: {e}"))),
    };
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to read video: {e}")))?
        .len();

    Ok((
        [
            (header::CONTENT_TYPE, gallery::video_content_type(&filename).to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{filename}\"")),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}

/// DELETE /api/v1/gallery/videos/{filename}
pub async fn delete_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(filename): Path<String>,
) -> AppResult<StatusCode> {
    gallery::validate_video_filename(&filename)?;
    let removed = gallery::remove_file(&gallery::video_path(&state.config.videos_dir, &filename))
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to delete video: {e}")))?;
    let forgotten = VideoRepo::delete_by_filename(&state.pool, &filename).await?;
    if !removed && !forgotten {
        return Err(AppError::NotFound(format!("Video {filename} not found")));
    }

    state
        .ws_manager
        .broadcast(
            text_frame(&ServerMessage::VideoDeleted {
                filename: filename.clone(),
            }),
            Some(ClientKind::Web),
            None,
        )
        .await;
    LogRepo::insert(
        &state.pool,
        &format!("Security video deleted by {}: {filename}", user.username),
        "info",
        Some("system"),
    )
    .await?;
    tracing::info!(%filename, user_id = user.user_id, "Security video deleted");

    Ok(StatusCode::NO_CONTENT)
}
