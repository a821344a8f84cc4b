//! Latest-frame store for the camera stream.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;

use crate::types::Timestamp;

const JPEG_SOI: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

/// Reasons a frame is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Empty frame")]
    Empty,

    #[error("Frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Unknown frame format")]
    UnknownFormat,
}

/// Image container recognised by [`validate_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    Jpeg,
    Png,
}

/// Check size bounds and the leading magic bytes.
pub fn validate_frame(bytes: &[u8], max_size: usize) -> Result<FrameFormat, FrameError> {
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }
    if bytes.len() > max_size {
        return Err(FrameError::TooLarge {
            size: bytes.len(),
            max: max_size,
        });
    }
    if bytes.starts_with(JPEG_SOI) {
        Ok(FrameFormat::Jpeg)
    } else if bytes.starts_with(PNG_SIGNATURE) {
        Ok(FrameFormat::Png)
    } else {
        Err(FrameError::UnknownFormat)
    }
}

/// Sizing and pacing knobs for [`FrameStore`].
#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub capacity: usize,
    pub max_frame_size: usize,
    pub drop_ratio: f64,
    pub min_interval: Duration,
    pub skip_threshold: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            max_frame_size: 2 * 1024 * 1024,
            drop_ratio: 0.1,
            min_interval: Duration::from_millis(33),
            skip_threshold: 3,
        }
    }
}

/// Counters reported by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct FrameStats {
    pub frame_count: u64,
    pub drop_count: u64,
    pub invalid_count: u64,
    pub skip_count: u64,
    pub buffered: usize,
    pub capacity: usize,
    pub drop_rate: f64,
    pub latest_size: Option<usize>,
    pub last_frame_at: Option<Timestamp>,
}

/// Latest frame plus a bounded history of recent frames.
#[derive(Debug)]
pub struct FrameStore {
    config: FrameConfig,
    latest: Option<Bytes>,
    buffer: VecDeque<(Bytes, Timestamp)>,
    frame_count: u64,
    drop_count: u64,
    invalid_count: u64,
    skip_count: u64,
    consecutive_skips: u32,
    last_accepted: Option<Instant>,
}

impl FrameStore {
    pub fn new(config: FrameConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            config: FrameConfig { capacity, ..config },
            latest: None,
            buffer: VecDeque::with_capacity(capacity),
            frame_count: 0,
            drop_count: 0,
            invalid_count: 0,
            skip_count: 0,
            consecutive_skips: 0,
            last_accepted: None,
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Validate and store a frame, counting oversized frames as drops and
    /// unrecognised ones as invalid.
    pub fn accept(&mut self, frame: Bytes) -> Result<FrameFormat, FrameError> {
        match validate_frame(&frame, self.config.max_frame_size) {
            Ok(format) => {
                self.push(frame);
                Ok(format)
            }
            Err(err) => {
                match err {
                    FrameError::TooLarge { .. } => self.drop_count += 1,
                    FrameError::UnknownFormat => self.invalid_count += 1,
                    FrameError::Empty => {}
                }
                Err(err)
            }
        }
    }

    /// Store an already validated frame as the latest one.
    ///
    /// A full buffer sheds `ceil(capacity * drop_ratio)` of its oldest frames
    /// (at least one) first.
    pub fn push(&mut self, frame: Bytes) {
        if self.buffer.len() >= self.config.capacity {
            let shed = ((self.config.capacity as f64 * self.config.drop_ratio).ceil() as usize)
                .clamp(1, self.buffer.len());
            self.buffer.drain(..shed);
            self.drop_count += shed as u64;
            tracing::debug!(shed, "Frame buffer full, dropped oldest frames");
        }
        self.buffer.push_back((frame.clone(), Utc::now()));
        self.latest = Some(frame);
        self.frame_count += 1;
    }

    /// Pacing gate for HTTP uploads.
    ///
    /// Frames arriving faster than `min_interval` are skipped, but never more
    /// than `skip_threshold` in a row.
    pub fn admit_upload_at(&mut self, now: Instant) -> bool {
        let too_soon = self
            .last_accepted
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.min_interval);

        if too_soon && self.consecutive_skips < self.config.skip_threshold {
            self.consecutive_skips += 1;
            self.skip_count += 1;
            return false;
        }

        self.consecutive_skips = 0;
        self.last_accepted = Some(now);
        true
    }

    pub fn admit_upload(&mut self) -> bool {
        self.admit_upload_at(Instant::now())
    }

    pub fn latest(&self) -> Option<Bytes> {
        self.latest.clone()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            frame_count: self.frame_count,
            drop_count: self.drop_count,
            invalid_count: self.invalid_count,
            skip_count: self.skip_count,
            buffered: self.buffer.len(),
            capacity: self.config.capacity,
            drop_rate: self.drop_count as f64 / self.frame_count.max(1) as f64,
            latest_size: self.latest.as_ref().map(Bytes::len),
            last_frame_at: self.buffer.back().map(|(_, at)| *at),
        }
    }
}
