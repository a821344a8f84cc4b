//! Photo and security-video files on disk.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use smartcam_core::error::CoreError;
use smartcam_core::frames::{validate_frame, FrameFormat};
use tokio::io::AsyncWriteExt;

/// Names tried for one manual photo before giving up.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Extensions the video gallery lists, serves and deletes.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];

/// Name for a photo requested from the dashboard, e.g.
/// `manual_photo_20240601_142530_123.jpg`. Attempts after the first get a
/// `_N` suffix.
pub fn manual_photo_filename(at: DateTime<Utc>, format: FrameFormat, attempt: u32) -> String {
    let stamp = at.format("%Y%m%d_%H%M%S_%3f");
    let ext = image_extension(format);
    if attempt == 0 {
        format!("manual_photo_{stamp}.{ext}")
    } else {
        format!("manual_photo_{stamp}_{attempt}.{ext}")
    }
}

pub fn image_extension(format: FrameFormat) -> &'static str {
    match format {
        FrameFormat::Jpeg => "jpg",
        FrameFormat::Png => "png",
    }
}

/// Reject anything that is not a plain file name inside the gallery.
pub fn validate_filename(filename: &str) -> Result<(), CoreError> {
    let valid = !filename.is_empty()
        && filename.len() <= 255
        && !filename.starts_with('.')
        && !filename.contains("..")
        && filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("Invalid filename: {filename}")))
    }
}

fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// A safe file name with one of [`VIDEO_EXTENSIONS`].
pub fn validate_video_filename(filename: &str) -> Result<(), CoreError> {
    validate_filename(filename)?;
    match extension(filename) {
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(CoreError::Validation(format!("Invalid file type: {filename}"))),
    }
}

/// Content type of a stored image, from its magic bytes, falling back to
/// the extension.
pub fn image_content_type(filename: &str, data: &[u8]) -> &'static str {
    match validate_frame(data, usize::MAX) {
        Ok(FrameFormat::Jpeg) => "image/jpeg",
        Ok(FrameFormat::Png) => "image/png",
        Err(_) => match extension(filename).as_deref() {
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            _ => "application/octet-stream",
        },
    }
}

pub fn video_content_type(filename: &str) -> &'static str {
    match extension(filename).as_deref() {
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Hour of day encoded in a recorder file name such as
/// `video_2025-05-25_23-57-00.mp4`; 0 when the name carries none.
pub fn video_hour(filename: &str) -> u8 {
    let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
    stem.split('_')
        .nth(2)
        .and_then(|time| time.split('-').next())
        .and_then(|hour| hour.parse::<u8>().ok())
        .filter(|hour| *hour < 24)
        .unwrap_or(0)
}

pub fn photo_path(gallery_dir: &Path, filename: &str) -> PathBuf {
    gallery_dir.join(filename)
}

/// Public URL the dashboard uses for a gallery photo.
pub fn photo_url(filename: &str) -> String {
    format!("/api/v1/gallery/{filename}")
}

pub fn video_path(videos_dir: &Path, filename: &str) -> PathBuf {
    videos_dir.join(filename)
}

pub fn video_url(filename: &str) -> String {
    format!("/api/v1/gallery/videos/{filename}")
}

/// Create `path` and write `data`, failing with `AlreadyExists` rather than
/// replacing another file.
async fn write_new(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

/// Write photo bytes into the gallery under `filename`, creating the
/// directory as needed. An existing file is never overwritten.
pub async fn save_photo(gallery_dir: &Path, filename: &str, data: &[u8]) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(gallery_dir).await?;
    let path = photo_path(gallery_dir, filename);
    write_new(&path, data).await?;
    Ok(path)
}

/// Store a manual photo under the first free name for `at`.
///
/// The extension follows the frame's format. Returns the chosen name and
/// its path.
pub async fn store_manual_photo(
    gallery_dir: &Path,
    at: DateTime<Utc>,
    data: &[u8],
) -> io::Result<(String, PathBuf)> {
    let format = validate_frame(data, usize::MAX).unwrap_or(FrameFormat::Jpeg);
    tokio::fs::create_dir_all(gallery_dir).await?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let filename = manual_photo_filename(at, format, attempt);
        let path = photo_path(gallery_dir, &filename);
        match write_new(&path, data).await {
            Ok(()) => return Ok((filename, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "no free manual photo name",
    ))
}

/// Remove a gallery file. A file that is already gone is not an error.
pub async fn remove_file(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// A video file found in the videos directory.
#[derive(Debug, Clone)]
pub struct VideoFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Video files in `videos_dir`, creating the directory when missing.
/// Entries with unsafe names or other extensions are skipped.
pub async fn scan_videos(videos_dir: &Path) -> io::Result<Vec<VideoFile>> {
    tokio::fs::create_dir_all(videos_dir).await?;
    let mut entries = tokio::fs::read_dir(videos_dir).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let Ok(filename) = entry.file_name().into_string() else {
            continue;
        };
        if validate_video_filename(&filename).is_err() {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        found.push(VideoFile {
            path: entry.path(),
            filename,
            size: meta.len(),
            modified,
        });
    }
    Ok(found)
}
