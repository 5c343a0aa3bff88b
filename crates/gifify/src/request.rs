//! Conversion requests and their validation
//!
//! A [`ConversionRequest`] can only be built through [`ConversionRequest::validate`],
//! so everything downstream may assume positive sizes, widths and frame rates
//! and an accepted source host.

use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;
use url::Url;

use crate::encode::VideoFormat;

/// Error type for request validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Please provide a valid Instagram or TikTok URL.")]
    UnsupportedUrl,

    #[error("Target size must be greater than zero.")]
    InvalidTargetSize,

    #[error("Width must be greater than zero.")]
    InvalidWidth,

    #[error("Frame rate must be greater than zero.")]
    InvalidFps,

    #[error("Invalid start time '{0}'. Use seconds, MM:SS or HH:MM:SS.")]
    InvalidStartTime(String),

    #[error("Duration must be greater than zero.")]
    InvalidDuration,

    #[error("Start time {start:.3}s is beyond the end of the {length:.3}s video.")]
    StartBeyondEnd { start: f64, length: f64 },
}

/// Raw, unvalidated request fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDraft {
    pub url: String,
    pub target_size_mb: f64,
    pub width: u32,
    pub fps: u32,
    pub start_time: Option<String>,
    pub duration_secs: Option<f64>,
    pub remove_watermark: bool,
    pub mute: bool,
    pub formats: BTreeSet<VideoFormat>,
}

/// A validated conversion request; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRequest {
    source_url: String,
    target_size_bytes: u64,
    start_width: u32,
    start_fps: u32,
    start_secs: Option<f64>,
    duration_secs: Option<f64>,
    remove_watermark: bool,
    mute: bool,
    formats: BTreeSet<VideoFormat>,
}

impl ConversionRequest {
    /// Validate a draft against the accepted host fragments
    pub fn validate(
        draft: RequestDraft,
        allowed_hosts: &[String],
    ) -> Result<Self, ValidationError> {
        if !is_supported_link(&draft.url, allowed_hosts) {
            return Err(ValidationError::UnsupportedUrl);
        }

        let target_size_bytes = crate::size_target::mb_to_bytes(draft.target_size_mb);
        if target_size_bytes == 0 {
            return Err(ValidationError::InvalidTargetSize);
        }
        if draft.width == 0 {
            return Err(ValidationError::InvalidWidth);
        }
        if draft.fps == 0 {
            return Err(ValidationError::InvalidFps);
        }

        let start_secs = match draft.start_time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                parse_timestamp(raw)
                    .ok_or_else(|| ValidationError::InvalidStartTime(raw.to_string()))?,
            ),
        };

        let duration_secs = match draft.duration_secs {
            None => None,
            Some(d) if d.is_finite() && d > 0.0 => Some(d),
            Some(_) => return Err(ValidationError::InvalidDuration),
        };

        Ok(Self {
            source_url: draft.url.trim().to_string(),
            target_size_bytes,
            start_width: draft.width,
            start_fps: draft.fps,
            start_secs,
            duration_secs,
            remove_watermark: draft.remove_watermark,
            mute: draft.mute,
            formats: draft.formats,
        })
    }

    /// Check the start offset against the fetched source length, when known
    pub fn check_against_length(&self, length_secs: Option<f64>) -> Result<(), ValidationError> {
        match (self.start_secs, length_secs) {
            (Some(start), Some(length)) if length > 0.0 && start >= length => {
                Err(ValidationError::StartBeyondEnd { start, length })
            }
            _ => Ok(()),
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn target_size_bytes(&self) -> u64 {
        self.target_size_bytes
    }

    pub fn start_width(&self) -> u32 {
        self.start_width
    }

    pub fn start_fps(&self) -> u32 {
        self.start_fps
    }

    pub fn start_secs(&self) -> Option<f64> {
        self.start_secs
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    pub fn remove_watermark(&self) -> bool {
        self.remove_watermark
    }

    pub fn mute(&self) -> bool {
        self.mute
    }

    /// Requested secondary formats, in encode order (mp4 before webm)
    pub fn formats(&self) -> &BTreeSet<VideoFormat> {
        &self.formats
    }
}

/// A URL is supported when it parses and its host contains an allowed fragment
pub fn is_supported_link(raw: &str, allowed_hosts: &[String]) -> bool {
    let Ok(url) = Url::parse(raw.trim()) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    allowed_hosts
        .iter()
        .any(|fragment| !fragment.is_empty() && host.contains(&fragment.to_lowercase()))
}

/// Parse `SS[.fff]`, `MM:SS[.fff]` or `HH:MM:SS[.fff]` into seconds
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let (seconds_part, whole_parts) = parts.split_last()?;
    let seconds: f64 = seconds_part.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    // Minutes and seconds fields of a clock time stay below 60
    if !whole_parts.is_empty() && seconds >= 60.0 {
        return None;
    }

    let mut total = 0.0;
    for (i, part) in whole_parts.iter().enumerate() {
        let value: u32 = part.parse().ok()?;
        let is_minutes = whole_parts.len() - i == 1;
        if is_minutes && whole_parts.len() == 2 && value >= 60 {
            return None;
        }
        total = total * 60.0 + value as f64;
    }
    Some(total * 60.0 + seconds)
}
