//! Adaptive GIF encoder
//!
//! Each attempt is a two-pass palette encode (palettegen, then paletteuse
//! with Bayer dithering). When the result is larger than the target, the
//! encoder degrades quality and tries again at the same output path:
//! first by shrinking the width while it is above the shrink threshold,
//! then by lowering the frame rate. Once both are at their floors it stops
//! and returns the oversized GIF with a note instead of failing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::GifConfig;
use crate::encode::Trim;
use crate::filters::{build_filters, CropRegion, FilterPipeline};
use crate::probe::MediaProber;
use crate::runner::{CommandRunner, ToolError};
use crate::size_target::{bytes_to_mb, check_size_target, SizeTargetResult};

const PALETTEGEN: &str = "palettegen=max_colors=256:stats_mode=diff";
const PALETTEUSE: &str = "paletteuse=dither=bayer:bayer_scale=5:diff_mode=rectangle";

/// Note appended when no further degradation is allowed
pub const FLOOR_REACHED_NOTE: &str = "Hit minimum quality thresholds; cannot reach target size.";

/// Error type for GIF encoding
#[derive(Debug, Error)]
pub enum GifError {
    /// ffmpeg or ffprobe failed
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// ffmpeg reported success but the GIF is not there
    #[error("GIF output not found: {}", .0.display())]
    MissingOutput(PathBuf),

    /// IO error creating the palette or reading the output size
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Quality degradation rules for the size-seeking loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationPolicy {
    pub min_width: u32,
    pub min_fps: u32,
    /// Width is shrunk while strictly above this; afterwards fps is lowered
    pub shrink_above_width: u32,
    pub width_factor: f64,
    pub fps_step: u32,
}

impl Default for DegradationPolicy {
    fn default() -> Self {
        Self {
            min_width: 240,
            min_fps: 6,
            shrink_above_width: 320,
            width_factor: 0.85,
            fps_step: 2,
        }
    }
}

impl From<&GifConfig> for DegradationPolicy {
    fn from(cfg: &GifConfig) -> Self {
        let defaults = Self::default();
        let width_factor = if cfg.width_factor > 0.0 && cfg.width_factor < 1.0 {
            cfg.width_factor
        } else {
            defaults.width_factor
        };
        Self {
            min_width: cfg.min_width.max(1),
            min_fps: cfg.min_fps.max(1),
            shrink_above_width: cfg.shrink_above_width,
            width_factor,
            fps_step: cfg.fps_step.max(1),
        }
    }
}

impl DegradationPolicy {
    /// The next `(width, fps)` to try after an oversized attempt, or `None`
    /// when both tiers are exhausted
    ///
    /// Every step strictly lowers width or fps, so the loop always ends.
    pub fn next_step(&self, width: u32, fps: u32) -> Option<(u32, u32)> {
        if width > self.shrink_above_width {
            let shrunk = ((width as f64) * self.width_factor).floor() as u32;
            let shrunk = shrunk.max(self.min_width);
            if shrunk < width {
                return Some((shrunk, fps));
            }
        }
        if fps > self.min_fps {
            let lowered = fps.saturating_sub(self.fps_step).max(self.min_fps);
            return Some((width, lowered));
        }
        None
    }
}

/// Never upscale: the requested width is capped by the source width when known
pub fn clamp_start_width(requested: u32, intrinsic: u32) -> u32 {
    if intrinsic > 0 {
        requested.min(intrinsic)
    } else {
        requested
    }
}

/// One encode attempt and the size it produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeAttempt {
    pub width: u32,
    pub fps: u32,
    pub bytes: u64,
}

/// Result of the size-seeking loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GifOutcome {
    pub width: u32,
    pub fps: u32,
    pub bytes: u64,
    /// Human-readable notes; empty when the first attempt fit
    pub notes: Vec<String>,
    pub attempts: Vec<EncodeAttempt>,
    /// The target could not be met at the quality floor
    pub floor_reached: bool,
}

/// Parameters for a GIF encode
#[derive(Debug, Clone, PartialEq)]
pub struct GifEncodeParams {
    pub input: PathBuf,
    pub output: PathBuf,
    pub max_bytes: u64,
    pub start_width: u32,
    pub start_fps: u32,
    pub trim: Trim,
    /// Crop applied on every pass (watermark removal)
    pub crop: Option<CropRegion>,
}

/// A single two-pass attempt at fixed width and fps
#[derive(Debug, Clone, Copy)]
pub struct GifPass<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub width: u32,
    pub fps: u32,
    pub trim: Trim,
    pub crop: Option<CropRegion>,
}

impl GifPass<'_> {
    pub fn pipeline(&self) -> FilterPipeline {
        build_filters(self.crop, Some(self.width), Some(self.fps))
    }
}

/// Runs one attempt and reports the size of the written GIF
#[async_trait]
pub trait GifPassRunner: Send + Sync {
    async fn run_pass(&self, pass: GifPass<'_>) -> Result<u64, GifError>;
}

/// Drive `runner` until the output fits `max_bytes` or the policy is exhausted
pub async fn seek_target_size<R: GifPassRunner + ?Sized>(
    runner: &R,
    params: &GifEncodeParams,
    start_width: u32,
    policy: &DegradationPolicy,
) -> Result<GifOutcome, GifError> {
    let mut width = start_width;
    let mut fps = params.start_fps;
    let mut notes = Vec::new();
    let mut attempts = Vec::new();

    loop {
        let pass = GifPass {
            input: &params.input,
            output: &params.output,
            width,
            fps,
            trim: params.trim,
            crop: params.crop,
        };
        let bytes = runner.run_pass(pass).await?;
        attempts.push(EncodeAttempt { width, fps, bytes });
        debug!(width, fps, bytes, "gif attempt finished");

        if let SizeTargetResult::Within = check_size_target(bytes, params.max_bytes) {
            return Ok(GifOutcome {
                width,
                fps,
                bytes,
                notes,
                attempts,
                floor_reached: false,
            });
        }

        notes.push(format!(
            "Generated {:.2}MB at {}px @ {}fps; reducing quality...",
            bytes_to_mb(bytes),
            width,
            fps
        ));

        match policy.next_step(width, fps) {
            Some((next_width, next_fps)) => {
                info!(
                    from_width = width,
                    from_fps = fps,
                    to_width = next_width,
                    to_fps = next_fps,
                    "gif over target size, degrading"
                );
                width = next_width;
                fps = next_fps;
            }
            None => {
                warn!(width, fps, bytes, max_bytes = params.max_bytes, "gif quality floor reached");
                notes.push(FLOOR_REACHED_NOTE.to_string());
                return Ok(GifOutcome {
                    width,
                    fps,
                    bytes,
                    notes,
                    attempts,
                    floor_reached: true,
                });
            }
        }
    }
}

/// ffmpeg-backed [`GifPassRunner`]
#[derive(Debug, Clone)]
pub struct FfmpegGifPass {
    ffmpeg: PathBuf,
    runner: CommandRunner,
}

impl FfmpegGifPass {
    pub fn new(ffmpeg: PathBuf, runner: CommandRunner) -> Self {
        Self { ffmpeg, runner }
    }

    /// Arguments for the palette generation pass
    pub fn palette_args(pass: &GifPass<'_>, palette: &Path) -> Vec<String> {
        let mut args = pass.trim.input_args();
        args.push("-i".to_string());
        args.push(pass.input.to_string_lossy().into_owned());
        args.push("-vf".to_string());
        args.push(pass.pipeline().then(PALETTEGEN));
        args.push("-y".to_string());
        args.push(palette.to_string_lossy().into_owned());
        args
    }

    /// Arguments for the palette application pass
    pub fn paletteuse_args(pass: &GifPass<'_>, palette: &Path) -> Vec<String> {
        let pipeline = pass.pipeline();
        let graph = if pipeline.is_empty() {
            format!("[0:v][1:v]{}", PALETTEUSE)
        } else {
            format!("{}[x];[x][1:v]{}", pipeline, PALETTEUSE)
        };

        let mut args = pass.trim.input_args();
        args.push("-i".to_string());
        args.push(pass.input.to_string_lossy().into_owned());
        args.push("-i".to_string());
        args.push(palette.to_string_lossy().into_owned());
        args.push("-filter_complex".to_string());
        args.push(graph);
        args.push("-loop".to_string());
        args.push("0".to_string());
        args.push("-y".to_string());
        args.push(pass.output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl GifPassRunner for FfmpegGifPass {
    async fn run_pass(&self, pass: GifPass<'_>) -> Result<u64, GifError> {
        // Deleted when dropped, whichever way this function returns
        let palette = palette_path(pass.output)?;

        self.runner
            .run(&self.ffmpeg, Self::palette_args(&pass, &palette))
            .await?;
        self.runner
            .run(&self.ffmpeg, Self::paletteuse_args(&pass, &palette))
            .await?;

        match tokio::fs::metadata(pass.output).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GifError::MissingOutput(pass.output.to_path_buf()))
            }
            Err(e) => Err(GifError::Io(e)),
        }
    }
}

/// Scoped palette image beside the output, e.g. `abc.XXXX.palette.png`
fn palette_path(output: &Path) -> Result<tempfile::TempPath, std::io::Error> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gif".to_string());

    Ok(tempfile::Builder::new()
        .prefix(&format!("{}.", stem))
        .suffix(".palette.png")
        .tempfile_in(dir)?
        .into_temp_path())
}

/// Probes the source, clamps the start width and runs the size-seeking loop
#[derive(Debug, Clone)]
pub struct GifEncoder<R = FfmpegGifPass> {
    pass_runner: R,
    prober: MediaProber,
    policy: DegradationPolicy,
}

impl GifEncoder<FfmpegGifPass> {
    pub fn new(ffmpeg: PathBuf, prober: MediaProber, runner: CommandRunner) -> Self {
        Self::with_pass_runner(FfmpegGifPass::new(ffmpeg, runner), prober)
    }
}

impl<R: GifPassRunner> GifEncoder<R> {
    pub fn with_pass_runner(pass_runner: R, prober: MediaProber) -> Self {
        Self {
            pass_runner,
            prober,
            policy: DegradationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DegradationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &DegradationPolicy {
        &self.policy
    }

    /// Encode `params.input` into a GIF at `params.output`
    ///
    /// # Returns
    /// * `Ok(GifOutcome)` - The last attempt, possibly over target with a floor note
    /// * `Err(GifError)` - A tool failure or missing output aborted the loop
    pub async fn encode(&self, params: &GifEncodeParams) -> Result<GifOutcome, GifError> {
        let dims = self.prober.probe_dimensions(&params.input).await?;
        let start_width = clamp_start_width(params.start_width, dims.width);
        if start_width != params.start_width {
            debug!(
                requested = params.start_width,
                intrinsic = dims.width,
                "start width clamped to source width"
            );
        }

        seek_target_size(&self.pass_runner, params, start_width, &self.policy).await
    }
}


#[cfg(all(test, unix))]
mod ffmpeg_tests {
    use super::*;
    use crate::runner::test_support::write_script;
    use std::fs;
    use tempfile::TempDir;

    /// Fake ffmpeg writing `size` bytes to its last argument
    fn fake_ffmpeg(dir: &Path, size: u64, fail_on_paletteuse: bool) -> PathBuf {
        let fail = if fail_on_paletteuse {
            r#"case "$*" in *paletteuse*) echo 'Conversion failed!' >&2; exit 1;; esac"#
        } else {
            ""
        };
        write_script(
            dir,
            "ffmpeg",
            &format!(
                "{}\nfor last; do :; done\nhead -c {} /dev/zero > \"$last\"",
                fail, size
            ),
        )
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_ffmpeg_pass_reports_size_and_removes_palette() {
        let tools = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(tools.path(), 4096, false);
        let runner = FfmpegGifPass::new(ffmpeg, CommandRunner::default());

        let output = out_dir.path().join("job1.gif");
        let bytes = runner
            .run_pass(GifPass {
                input: Path::new("/tmp/src.mp4"),
                output: &output,
                width: 320,
                fps: 10,
                trim: Trim::default(),
                crop: None,
            })
            .await
            .unwrap();

        assert_eq!(bytes, 4096);
        assert_eq!(files_in(out_dir.path()), vec!["job1.gif".to_string()]);
    }

    #[tokio::test]
    async fn test_ffmpeg_pass_failure_still_removes_palette() {
        let tools = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(tools.path(), 4096, true);
        let runner = FfmpegGifPass::new(ffmpeg, CommandRunner::default());

        let output = out_dir.path().join("job2.gif");
        let err = runner
            .run_pass(GifPass {
                input: Path::new("/tmp/src.mp4"),
                output: &output,
                width: 320,
                fps: 10,
                trim: Trim::default(),
                crop: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Conversion failed!");
        assert!(files_in(out_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_encoder_clamps_to_probed_width() {
        let tools = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(tools.path(), 1000, false);
        let ffprobe = write_script(tools.path(), "ffprobe", "echo 360x640");

        let runner = CommandRunner::default();
        let encoder = GifEncoder::new(ffmpeg, MediaProber::new(ffprobe, runner), runner);
        let params = GifEncodeParams {
            input: PathBuf::from("/tmp/src.mp4"),
            output: out_dir.path().join("job3.gif"),
            max_bytes: 50 * 1024 * 1024,
            start_width: 480,
            start_fps: 12,
            trim: Trim::default(),
            crop: None,
        };

        let outcome = encoder.encode(&params).await.unwrap();
        assert_eq!(outcome.width, 360);
        assert_eq!(outcome.fps, 12);
        assert_eq!(outcome.bytes, 1000);
        assert!(outcome.notes.is_empty());
    }
}
