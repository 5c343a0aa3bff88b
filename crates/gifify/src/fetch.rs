//! Fetch adapter: downloads a social video with yt-dlp.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::runner::{CommandRunner, ToolError};

/// Error type for fetch operations
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// yt-dlp exited cleanly but the expected file is absent
    #[error("Failed to download video with yt-dlp.")]
    MissingOutput(PathBuf),

    #[error("Failed to prepare download directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Optional metadata reported by yt-dlp; every field may be absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// A downloaded source video
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub metadata: SourceMetadata,
}

/// Where a job's download lands: `<dir>/<id>.mp4`
pub fn download_path(dir: &Path, job_id: &str) -> PathBuf {
    dir.join(format!("{}.mp4", job_id))
}

/// Downloads source videos through yt-dlp
#[derive(Debug, Clone)]
pub struct Fetcher {
    yt_dlp: PathBuf,
    runner: CommandRunner,
}

impl Fetcher {
    pub fn new(yt_dlp: PathBuf, runner: CommandRunner) -> Self {
        Self { yt_dlp, runner }
    }

    /// Best MP4 rendition, single video only, metadata printed as JSON
    pub fn fetch_args(url: &str, output: &Path) -> Vec<String> {
        vec![
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--restrict-filenames".to_string(),
            "--print-json".to_string(),
            "-f".to_string(),
            "mp4/best".to_string(),
            url.to_string(),
        ]
    }

    /// Download `url` into `dir` as `<job_id>.mp4`
    ///
    /// `mute` is the caller's audio preference. It does not change the
    /// rendition picked here; renditions copy whatever audio the source has.
    pub async fn fetch(
        &self,
        url: &str,
        dir: &Path,
        job_id: &str,
        mute: bool,
    ) -> Result<FetchedMedia, FetchError> {
        tokio::fs::create_dir_all(dir).await?;
        let output = download_path(dir, job_id);

        debug!(job_id, url, mute, "fetching source video");
        let out = self
            .runner
            .run(&self.yt_dlp, Self::fetch_args(url, &output))
            .await?;

        let metadata = parse_metadata(&out.stdout);

        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(FetchError::MissingOutput(output));
        }

        info!(
            job_id,
            title = metadata.title.as_deref().unwrap_or(""),
            "source video fetched"
        );
        Ok(FetchedMedia {
            path: output,
            metadata,
        })
    }
}

/// Parse the last line of yt-dlp output as JSON metadata
///
/// Anything unparseable yields empty metadata.
pub fn parse_metadata(stdout: &str) -> SourceMetadata {
    stdout
        .trim()
        .lines()
        .last()
        .and_then(|line| serde_json::from_str::<SourceMetadata>(line.trim()).ok())
        .unwrap_or_default()
}
