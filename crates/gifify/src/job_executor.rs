//! Job executor module for GIFify
//!
//! Runs one conversion end to end: fetch, GIF encode, then each requested
//! video rendition. Concurrency is limited via semaphore.

use crate::config::Config;
use crate::encode::{
    DegradationPolicy, EncodeAttempt, GifEncodeParams, GifEncoder, GifError, Trim,
    VideoEncodeParams, VideoEncoder, VideoError, VideoFormat,
};
use crate::fetch::{download_path, FetchError, Fetcher, SourceMetadata};
use crate::filters::CropRegion;
use crate::metrics::{now_unix_ms, JobMetrics, SharedMetrics};
use crate::probe::MediaProber;
use crate::request::{ConversionRequest, ValidationError};
use crate::runner::{CommandRunner, ToolPaths};
use crate::ConcurrencyPlan;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

/// URL prefix under which output artifacts are served
pub const OUTPUT_URL_PREFIX: &str = "/output";

/// Error type for job execution operations
#[derive(Debug, Error)]
pub enum JobError {
    /// Request rejected once the source was known
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Gif(#[from] GifError),

    #[error(transparent)]
    Video(#[from] VideoError),

    /// Failed to create the output or temp directory
    #[error("Failed to prepare directories: {0}")]
    Io(#[from] std::io::Error),

    /// The executor is shutting down and accepts no more jobs
    #[error("Conversion service is shutting down")]
    Closed,
}

/// Job state representing the current stage in the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Job is waiting for a concurrency slot
    Queued,
    Fetching,
    EncodingGif,
    /// Encoding mp4/webm renditions
    EncodingVideo,
    Completed,
    Failed(String),
}

impl JobState {
    /// Convert state to string for metrics
    pub fn as_str(&self) -> &str {
        match self {
            JobState::Queued => "queued",
            JobState::Fetching => "fetching",
            JobState::EncodingGif => "encoding_gif",
            JobState::EncodingVideo => "encoding_video",
            JobState::Completed => "completed",
            JobState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed(_))
    }
}

/// One written artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendition {
    pub path: PathBuf,
    /// Public URL, `/output/<file>`
    pub url: String,
    pub bytes: u64,
    pub width: u32,
    pub fps: u32,
}

impl Rendition {
    fn new(path: PathBuf, bytes: u64, width: u32, fps: u32) -> Self {
        let url = output_url(&path);
        Self {
            path,
            url,
            bytes,
            width,
            fps,
        }
    }
}

/// Outcome of a successful conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    pub id: String,
    pub source_url: String,
    pub source: SourceMetadata,
    pub gif: Rendition,
    /// Only requested formats are present
    pub renditions: BTreeMap<VideoFormat, Rendition>,
    pub notes: Vec<String>,
    pub attempts: Vec<EncodeAttempt>,
}

/// Directories and encode settings for the executor
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub output_dir: PathBuf,
    pub tmp_dir: PathBuf,
    /// Crop applied when watermark removal is requested
    pub crop: CropRegion,
    pub policy: DegradationPolicy,
}

impl From<&Config> for ExecutorSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            output_dir: cfg.server.output_dir.clone(),
            tmp_dir: cfg.server.tmp_dir.clone(),
            crop: CropRegion::from(&cfg.watermark),
            policy: DegradationPolicy::from(&cfg.gif),
        }
    }
}

/// Deletes the downloaded source on every exit path of a job
///
/// Jobs call [`SourceGuard::remove`] once they finish. `Drop` only runs
/// when the job future is cancelled mid-flight, and then unlinks the two
/// files synchronously.
struct SourceGuard {
    path: PathBuf,
    armed: bool,
}

impl SourceGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn paths(&self) -> [PathBuf; 2] {
        [self.path.clone(), partial_download_path(&self.path)]
    }

    async fn remove(mut self) {
        self.armed = false;
        for path in self.paths() {
            report_removal(&path, tokio::fs::remove_file(&path).await);
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in self.paths() {
            report_removal(&path, std::fs::remove_file(&path));
        }
    }
}

fn report_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove source file"),
    }
}

/// yt-dlp writes `<file>.part` while downloading
fn partial_download_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn output_url(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", OUTPUT_URL_PREFIX, file)
}

/// Job executor that runs conversions with concurrency limiting
///
/// Uses a tokio Semaphore to limit the number of concurrent conversions
/// according to the concurrency plan.
pub struct ConversionExecutor {
    semaphore: Arc<Semaphore>,
    concurrency_plan: ConcurrencyPlan,
    metrics: SharedMetrics,
    fetcher: Fetcher,
    gif_encoder: GifEncoder,
    video_encoder: VideoEncoder,
    settings: ExecutorSettings,
}

impl ConversionExecutor {
    /// Create a new ConversionExecutor
    ///
    /// # Arguments
    /// * `plan` - Concurrency plan determining max concurrent jobs
    /// * `metrics` - Shared metrics state for updating job progress
    /// * `tools` - Paths of ffmpeg, ffprobe and yt-dlp
    /// * `runner` - Command runner carrying the per-call timeout
    /// * `settings` - Directories, crop and degradation policy
    pub fn new(
        plan: ConcurrencyPlan,
        metrics: SharedMetrics,
        tools: &ToolPaths,
        runner: CommandRunner,
        settings: ExecutorSettings,
    ) -> Self {
        let permits = plan.max_concurrent_jobs.max(1) as usize;
        let prober = MediaProber::new(tools.ffprobe.clone(), runner);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            concurrency_plan: plan,
            metrics,
            fetcher: Fetcher::new(tools.yt_dlp.clone(), runner),
            gif_encoder: GifEncoder::new(tools.ffmpeg.clone(), prober, runner)
                .with_policy(settings.policy),
            video_encoder: VideoEncoder::new(tools.ffmpeg.clone(), runner),
            settings,
        }
    }

    /// Create an executor from the loaded configuration
    pub fn from_config(cfg: &Config, metrics: SharedMetrics) -> Self {
        Self::new(
            ConcurrencyPlan::derive(cfg),
            metrics,
            &ToolPaths::from(&cfg.tools),
            CommandRunner::from_config(&cfg.tools),
            ExecutorSettings::from(cfg),
        )
    }

    /// Get the number of available permits (slots for concurrent jobs)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn concurrency_plan(&self) -> &ConcurrencyPlan {
        &self.concurrency_plan
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Acquire a permit for job execution
    ///
    /// Waits until a permit is available if all slots are in use.
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, JobError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| JobError::Closed)
    }

    /// Try to acquire a permit without waiting
    pub fn try_acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// Stop accepting jobs; waiting jobs fail with [`JobError::Closed`]
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Execute a conversion
    ///
    /// 1. Waits for a concurrency slot
    /// 2. Fetches the source into the temp directory
    /// 3. Checks the start offset against the source length
    /// 4. Encodes the GIF with size seeking
    /// 5. Encodes mp4 then webm, when requested
    ///
    /// The source is deleted on every exit path. On failure every output this
    /// job wrote is deleted too.
    pub async fn execute(&self, request: &ConversionRequest) -> Result<ConversionResult, JobError> {
        let id = Uuid::new_v4().simple().to_string();
        self.begin_job(&id, request.source_url()).await;

        let mut written = Vec::new();
        let source = SourceGuard::new(download_path(&self.settings.tmp_dir, &id));
        let outcome = match self.acquire_permit().await {
            Ok(_permit) => self.run_job(&id, request, &mut written).await,
            Err(e) => Err(e),
        };
        source.remove().await;

        match outcome {
            Ok(result) => {
                let total = result.gif.bytes
                    + result.renditions.values().map(|r| r.bytes).sum::<u64>();
                self.finish_job(&id, JobState::Completed, total).await;
                info!(
                    job_id = %id,
                    gif_bytes = result.gif.bytes,
                    width = result.gif.width,
                    fps = result.gif.fps,
                    renditions = result.renditions.len(),
                    "conversion completed"
                );
                Ok(result)
            }
            Err(e) => {
                for path in &written {
                    let _ = tokio::fs::remove_file(path).await;
                }
                warn!(job_id = %id, error = %e, "conversion failed");
                self.finish_job(&id, JobState::Failed(e.to_string()), 0).await;
                Err(e)
            }
        }
    }

    async fn run_job(
        &self,
        id: &str,
        request: &ConversionRequest,
        written: &mut Vec<PathBuf>,
    ) -> Result<ConversionResult, JobError> {
        let output_dir = &self.settings.output_dir;
        tokio::fs::create_dir_all(output_dir).await?;
        tokio::fs::create_dir_all(&self.settings.tmp_dir).await?;

        self.set_stage(id, JobState::Fetching).await;
        let media = self
            .fetcher
            .fetch(request.source_url(), &self.settings.tmp_dir, id, request.mute())
            .await?;

        request.check_against_length(media.metadata.duration)?;

        let trim = Trim::new(request.start_secs(), request.duration_secs());
        let crop = request.remove_watermark().then_some(self.settings.crop);

        self.set_stage(id, JobState::EncodingGif).await;
        let gif_path = output_dir.join(format!("{}.gif", id));
        written.push(gif_path.clone());
        let gif = self
            .gif_encoder
            .encode(&GifEncodeParams {
                input: media.path.clone(),
                output: gif_path.clone(),
                max_bytes: request.target_size_bytes(),
                start_width: request.start_width(),
                start_fps: request.start_fps(),
                trim,
                crop,
            })
            .await?;
        self.record_gif(id, gif.attempts.len() as u32, gif.width, gif.fps, gif.bytes)
            .await;

        let mut renditions = BTreeMap::new();
        if !request.formats().is_empty() {
            self.set_stage(id, JobState::EncodingVideo).await;
        }
        for &format in request.formats() {
            let path = output_dir.join(format!("{}.{}", id, format.extension()));
            written.push(path.clone());
            let bytes = self
                .video_encoder
                .encode(&VideoEncodeParams {
                    input: media.path.clone(),
                    output: path.clone(),
                    format,
                    width: Some(request.start_width()),
                    fps: Some(request.start_fps()),
                    trim,
                    crop,
                })
                .await?;
            self.record_rendition(id, bytes).await;
            renditions.insert(
                format,
                Rendition::new(path, bytes, request.start_width(), request.start_fps()),
            );
        }

        Ok(ConversionResult {
            id: id.to_string(),
            source_url: request.source_url().to_string(),
            source: media.metadata,
            gif: Rendition::new(gif_path, gif.bytes, gif.width, gif.fps),
            renditions,
            notes: gif.notes,
            attempts: gif.attempts,
        })
    }

    async fn begin_job(&self, id: &str, source_url: &str) {
        let mut metrics = self.metrics.write().await;
        metrics
            .jobs
            .push(JobMetrics::new(id, source_url, JobState::Queued.as_str()));
        metrics.refresh();
    }

    async fn set_stage(&self, id: &str, state: JobState) {
        let mut metrics = self.metrics.write().await;
        if let Some(job) = metrics.job_mut(id) {
            job.stage = state.as_str().to_string();
        }
        metrics.refresh();
    }

    async fn record_gif(&self, id: &str, attempts: u32, width: u32, fps: u32, bytes: u64) {
        let mut metrics = self.metrics.write().await;
        if let Some(job) = metrics.job_mut(id) {
            job.gif_attempts = attempts;
            job.gif_width = Some(width);
            job.gif_fps = Some(fps);
            job.gif_bytes = Some(bytes);
        }
    }

    async fn record_rendition(&self, id: &str, bytes: u64) {
        let mut metrics = self.metrics.write().await;
        if let Some(job) = metrics.job_mut(id) {
            job.rendition_bytes += bytes;
        }
    }

    async fn finish_job(&self, id: &str, state: JobState, bytes_produced: u64) {
        let mut metrics = self.metrics.write().await;
        if let Some(job) = metrics.job_mut(id) {
            job.stage = state.as_str().to_string();
            job.finished_unix_ms = Some(now_unix_ms());
            if let JobState::Failed(reason) = &state {
                job.error = Some(reason.clone());
            }
        }
        match state {
            JobState::Completed => {
                metrics.completed_jobs += 1;
                metrics.total_bytes_produced += bytes_produced;
            }
            JobState::Failed(_) => metrics.failed_jobs += 1,
            _ => {}
        }
        metrics.refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::new_shared_metrics;
    use std::time::Duration;

    fn create_test_plan(max_concurrent_jobs: u32) -> ConcurrencyPlan {
        ConcurrencyPlan {
            total_cores: 8,
            max_concurrent_jobs,
        }
    }

    fn test_settings(root: &Path) -> ExecutorSettings {
        ExecutorSettings {
            output_dir: root.join("output"),
            tmp_dir: root.join("tmp"),
            crop: CropRegion::WATERMARK,
            policy: DegradationPolicy::default(),
        }
    }

    fn create_test_executor(max_concurrent_jobs: u32, root: &Path) -> ConversionExecutor {
        ConversionExecutor::new(
            create_test_plan(max_concurrent_jobs),
            new_shared_metrics(),
            &ToolPaths::default(),
            CommandRunner::default(),
            test_settings(root),
        )
    }

    #[test]
    fn test_job_state_as_str() {
        assert_eq!(JobState::Queued.as_str(), "queued");
        assert_eq!(JobState::Fetching.as_str(), "fetching");
        assert_eq!(JobState::EncodingGif.as_str(), "encoding_gif");
        assert_eq!(JobState::EncodingVideo.as_str(), "encoding_video");
        assert_eq!(JobState::Completed.as_str(), "completed");
        assert_eq!(JobState::Failed("error".to_string()).as_str(), "failed");
        assert!(JobState::Completed.is_terminal());
        assert!(!JobState::Fetching.is_terminal());
    }

    #[test]
    fn test_output_url() {
        assert_eq!(output_url(Path::new("/srv/output/abc.gif")), "/output/abc.gif");
        assert_eq!(
            partial_download_path(Path::new("/tmp/abc.mp4")),
            PathBuf::from("/tmp/abc.mp4.part")
        );
    }

    #[tokio::test]
    async fn test_source_guard_remove_deletes_download_and_part() {
        let root = tempfile::TempDir::new().unwrap();
        let source = root.path().join("abc.mp4");
        std::fs::write(&source, b"x").unwrap();
        std::fs::write(partial_download_path(&source), b"x").unwrap();

        SourceGuard::new(source.clone()).remove().await;

        assert!(!source.exists());
        assert!(!partial_download_path(&source).exists());
    }

    #[test]
    fn test_source_guard_drop_cleans_up_cancelled_job() {
        let root = tempfile::TempDir::new().unwrap();
        let source = root.path().join("abc.mp4");
        std::fs::write(&source, b"x").unwrap();

        drop(SourceGuard::new(source.clone()));

        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_semaphore_permit_limiting() {
        let root = tempfile::TempDir::new().unwrap();
        let executor = create_test_executor(2, root.path());
        assert_eq!(executor.available_permits(), 2);

        let permit1 = executor.try_acquire_permit();
        assert!(permit1.is_some());
        let permit2 = executor.try_acquire_permit();
        assert!(permit2.is_some());
        assert!(executor.try_acquire_permit().is_none());

        drop(permit1);
        assert_eq!(executor.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_zero_limit_still_runs_one_job() {
        let root = tempfile::TempDir::new().unwrap();
        let executor = create_test_executor(0, root.path());
        assert_eq!(executor.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_permit_acquisition() {
        let root = tempfile::TempDir::new().unwrap();
        let executor = Arc::new(create_test_executor(1, root.path()));

        let first = executor.clone();
        let handle = tokio::spawn(async move {
            let _permit = first.acquire_permit().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let start = std::time::Instant::now();
        let _permit = executor.acquire_permit().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_executor_rejects_jobs() {
        let root = tempfile::TempDir::new().unwrap();
        let executor = create_test_executor(1, root.path());
        executor.close();
        assert!(matches!(executor.acquire_permit().await, Err(JobError::Closed)));
    }

    #[cfg(unix)]
    mod pipeline {
        use super::*;
        use crate::encode::VideoFormat;
        use crate::request::RequestDraft;
        use crate::runner::test_support::write_script;

        const FAKE_FFMPEG: &str = "for last; do :; done\nhead -c 4096 /dev/zero > \"$last\"";
        const FAKE_FFPROBE: &str = "echo 720x1280";

        struct Fixture {
            _tools: tempfile::TempDir,
            root: tempfile::TempDir,
            executor: ConversionExecutor,
        }

        fn fixture(yt_dlp_body: &str, ffmpeg_body: &str) -> Fixture {
            let tools = tempfile::TempDir::new().unwrap();
            let root = tempfile::TempDir::new().unwrap();
            let paths = ToolPaths {
                ffmpeg: write_script(tools.path(), "ffmpeg", ffmpeg_body),
                ffprobe: write_script(tools.path(), "ffprobe", FAKE_FFPROBE),
                yt_dlp: write_script(tools.path(), "yt-dlp", yt_dlp_body),
            };
            let executor = ConversionExecutor::new(
                create_test_plan(2),
                new_shared_metrics(),
                &paths,
                CommandRunner::new(Some(Duration::from_secs(30))),
                test_settings(root.path()),
            );
            Fixture {
                _tools: tools,
                root,
                executor,
            }
        }

        fn request(formats: &[VideoFormat], start: Option<&str>) -> ConversionRequest {
            let draft = RequestDraft {
                url: "https://www.tiktok.com/@user/video/42".to_string(),
                target_size_mb: 1.0,
                width: 480,
                fps: 12,
                start_time: start.map(str::to_string),
                duration_secs: None,
                remove_watermark: true,
                mute: true,
                formats: formats.iter().copied().collect(),
            };
            ConversionRequest::validate(draft, &crate::config::SourcesConfig::default().allowed_hosts)
                .unwrap()
        }

        fn fake_yt_dlp(duration: u32) -> String {
            format!(
                "head -c 100 /dev/zero > \"$2\"; echo '{{\"title\": \"clip\", \"uploader\": \"me\", \"duration\": {}}}'",
                duration
            )
        }

        fn dir_entries(dir: &Path) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(dir)
                .map(|rd| {
                    rd.filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            names.sort();
            names
        }

        #[tokio::test]
        async fn test_only_mp4_requested() {
            let fx = fixture(&fake_yt_dlp(20), FAKE_FFMPEG);
            let result = fx
                .executor
                .execute(&request(&[VideoFormat::Mp4], None))
                .await
                .unwrap();

            assert_eq!(result.gif.width, 480);
            assert_eq!(result.gif.fps, 12);
            assert_eq!(result.gif.bytes, 4096);
            assert!(result.notes.is_empty());
            assert!(result.renditions.contains_key(&VideoFormat::Mp4));
            assert!(!result.renditions.contains_key(&VideoFormat::Webm));
            assert_eq!(result.gif.url, format!("/output/{}.gif", result.id));
            assert_eq!(result.source.title.as_deref(), Some("clip"));

            let outputs = dir_entries(&fx.root.path().join("output"));
            assert_eq!(
                outputs,
                vec![format!("{}.gif", result.id), format!("{}.mp4", result.id)]
            );
            // Source download and palette are gone
            assert!(dir_entries(&fx.root.path().join("tmp")).is_empty());

            let snapshot = fx.executor.metrics().read().await;
            assert_eq!(snapshot.completed_jobs, 1);
            assert_eq!(snapshot.running_jobs, 0);
            assert_eq!(snapshot.jobs[0].stage, "completed");
            assert_eq!(snapshot.total_bytes_produced, 8192);
        }

        #[tokio::test]
        async fn test_gif_only_request() {
            let fx = fixture(&fake_yt_dlp(20), FAKE_FFMPEG);
            let result = fx.executor.execute(&request(&[], None)).await.unwrap();
            assert!(result.renditions.is_empty());
            assert_eq!(dir_entries(&fx.root.path().join("output")).len(), 1);
        }

        #[tokio::test]
        async fn test_start_beyond_source_end_is_rejected() {
            let fx = fixture(&fake_yt_dlp(5), FAKE_FFMPEG);
            let err = fx
                .executor
                .execute(&request(&VideoFormat::ALL, Some("00:10")))
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                JobError::Validation(ValidationError::StartBeyondEnd { .. })
            ));
            assert!(dir_entries(&fx.root.path().join("tmp")).is_empty());
            assert!(dir_entries(&fx.root.path().join("output")).is_empty());
        }

        #[tokio::test]
        async fn test_failed_encode_removes_partial_outputs() {
            // GIF passes succeed, the webm encode fails
            let ffmpeg = concat!(
                "for last; do :; done\n",
                "case \"$last\" in *.webm) echo 'Unknown encoder libvpx-vp9' >&2; exit 1;; esac\n",
                "head -c 4096 /dev/zero > \"$last\""
            );
            let fx = fixture(&fake_yt_dlp(20), ffmpeg);
            let err = fx
                .executor
                .execute(&request(&VideoFormat::ALL, None))
                .await
                .unwrap_err();

            assert_eq!(err.to_string(), "Unknown encoder libvpx-vp9");
            assert!(dir_entries(&fx.root.path().join("output")).is_empty());
            assert!(dir_entries(&fx.root.path().join("tmp")).is_empty());

            let snapshot = fx.executor.metrics().read().await;
            assert_eq!(snapshot.failed_jobs, 1);
            assert_eq!(snapshot.jobs[0].stage, "failed");
            assert_eq!(
                snapshot.jobs[0].error.as_deref(),
                Some("Unknown encoder libvpx-vp9")
            );
        }

        #[tokio::test]
        async fn test_fetch_failure_surfaces_tool_message() {
            let fx = fixture("echo 'ERROR: Unsupported URL' >&2; exit 1", FAKE_FFMPEG);
            let err = fx
                .executor
                .execute(&request(&[], None))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "ERROR: Unsupported URL");
            assert!(matches!(err, JobError::Fetch(_)));
        }
    }
}
