//! Fixed-parameter video encoder
//!
//! Single ffmpeg pass at the caller's width and fps. No palette step and no
//! size seeking; the audio stream is always copied untouched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::encode::Trim;
use crate::filters::{build_filters, CropRegion};
use crate::runner::{CommandRunner, ToolError};

/// H.264 settings tuned for fast, widely playable output
const MP4_VIDEO_ARGS: &[&str] = &[
    "-c:v",
    "libx264",
    "-preset",
    "veryfast",
    "-crf",
    "28",
    "-pix_fmt",
    "yuv420p",
];

/// VP9 constant-quality settings with row-based multithreading
const WEBM_VIDEO_ARGS: &[&str] = &[
    "-c:v",
    "libvpx-vp9",
    "-b:v",
    "0",
    "-crf",
    "33",
    "-row-mt",
    "1",
];

/// Error type for video encoding
#[derive(Debug, Error)]
pub enum VideoError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{format} output not found: {}", .path.display())]
    MissingOutput { format: VideoFormat, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Secondary rendition profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// Broadly compatible H.264 in MP4
    Mp4,
    /// Royalty-free VP9 in WebM
    Webm,
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 2] = [VideoFormat::Mp4, VideoFormat::Webm];

    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
        }
    }

    fn codec_args(&self) -> &'static [&'static str] {
        match self {
            VideoFormat::Mp4 => MP4_VIDEO_ARGS,
            VideoFormat::Webm => WEBM_VIDEO_ARGS,
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp4" => Ok(VideoFormat::Mp4),
            "webm" => Ok(VideoFormat::Webm),
            other => Err(format!("unknown video format '{}'", other)),
        }
    }
}

/// Parameters for a single video encode
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncodeParams {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: VideoFormat,
    pub width: Option<u32>,
    pub fps: Option<u32>,
    pub trim: Trim,
    pub crop: Option<CropRegion>,
}

/// Build the ffmpeg argument list for a video encode
///
/// Identical parameters always produce identical arguments.
pub fn build_video_args(params: &VideoEncodeParams) -> Vec<String> {
    let pipeline = build_filters(params.crop, params.width, params.fps);

    let mut args = params.trim.input_args();
    args.push("-i".to_string());
    args.push(params.input.to_string_lossy().into_owned());

    if !pipeline.is_empty() {
        args.push("-vf".to_string());
        args.push(pipeline.to_filter_string());
    }

    args.extend(params.format.codec_args().iter().map(|a| a.to_string()));

    args.push("-c:a".to_string());
    args.push("copy".to_string());

    args.push("-y".to_string());
    args.push(params.output.to_string_lossy().into_owned());
    args
}

/// Runs fixed-parameter ffmpeg encodes
#[derive(Debug, Clone)]
pub struct VideoEncoder {
    ffmpeg: PathBuf,
    runner: CommandRunner,
}

impl VideoEncoder {
    pub fn new(ffmpeg: PathBuf, runner: CommandRunner) -> Self {
        Self { ffmpeg, runner }
    }

    /// Encode and return the size of the written file in bytes
    pub async fn encode(&self, params: &VideoEncodeParams) -> Result<u64, VideoError> {
        self.runner
            .run(&self.ffmpeg, build_video_args(params))
            .await?;

        match tokio::fs::metadata(&params.output).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(VideoError::MissingOutput {
                format: params.format,
                path: params.output.clone(),
            }),
            Err(e) => Err(VideoError::Io(e)),
        }
    }
}
