//! Media prober: intrinsic dimensions of the first video stream via ffprobe.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::runner::{CommandRunner, ToolError};

/// Width and height of a video stream; `0` means unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Probes local media files with ffprobe
#[derive(Debug, Clone)]
pub struct MediaProber {
    ffprobe: PathBuf,
    runner: CommandRunner,
}

impl MediaProber {
    pub fn new(ffprobe: PathBuf, runner: CommandRunner) -> Self {
        Self { ffprobe, runner }
    }

    /// Arguments asking ffprobe for `WIDTHxHEIGHT` of stream `v:0`
    pub fn probe_args(path: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=width,height".to_string(),
            "-of".to_string(),
            "csv=s=x:p=0".to_string(),
            path.to_string_lossy().into_owned(),
        ]
    }

    /// Probe the dimensions of `path`
    ///
    /// A failing ffprobe is an error; output that cannot be parsed is not,
    /// it yields zero for the affected dimension.
    pub async fn probe_dimensions(&self, path: &Path) -> Result<Dimensions, ToolError> {
        let output = self.runner.run(&self.ffprobe, Self::probe_args(path)).await?;
        Ok(parse_dimensions(&output.stdout))
    }
}

/// Parse ffprobe's `csv=s=x:p=0` output (e.g. `720x1280`)
pub fn parse_dimensions(stdout: &str) -> Dimensions {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let mut parts = line.split('x');
    let mut next_dim = || {
        parts
            .next()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(0)
    };
    let width = next_dim();
    let height = next_dim();
    Dimensions { width, height }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_dimensions_typical() {
        assert_eq!(
            parse_dimensions("720x1280\n"),
            Dimensions { width: 720, height: 1280 }
        );
    }

    #[test]
    fn test_parse_dimensions_missing_fields_are_zero() {
        assert_eq!(parse_dimensions(""), Dimensions::default());
        assert_eq!(
            parse_dimensions("1080x"),
            Dimensions { width: 1080, height: 0 }
        );
        assert_eq!(
            parse_dimensions("N/Ax720"),
            Dimensions { width: 0, height: 720 }
        );
        assert_eq!(parse_dimensions("garbage"), Dimensions::default());
    }

    #[test]
    fn test_parse_dimensions_uses_first_stream_line() {
        assert_eq!(
            parse_dimensions("\n640x360\n1920x1080\n"),
            Dimensions { width: 640, height: 360 }
        );
    }

    #[test]
    fn test_probe_args_shape() {
        let args = MediaProber::probe_args(Path::new("/tmp/abc.mp4"));
        assert_eq!(
            args,
            vec![
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=s=x:p=0",
                "/tmp/abc.mp4"
            ]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_parse_dimensions_roundtrips_ffprobe_format(
            width in 0u32..10_000,
            height in 0u32..10_000,
        ) {
            let parsed = parse_dimensions(&format!("{}x{}\n", width, height));
            prop_assert_eq!(parsed, Dimensions { width, height });
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_dimensions_with_fake_ffprobe() {
        use crate::runner::test_support::write_script;

        let dir = tempfile::TempDir::new().unwrap();
        let ffprobe = write_script(dir.path(), "ffprobe", "echo 360x640");
        let prober = MediaProber::new(ffprobe, CommandRunner::default());

        let dims = prober
            .probe_dimensions(Path::new("/tmp/whatever.mp4"))
            .await
            .unwrap();
        assert_eq!(dims, Dimensions { width: 360, height: 640 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_dimensions_propagates_tool_failure() {
        use crate::runner::test_support::write_script;

        let dir = tempfile::TempDir::new().unwrap();
        let ffprobe = write_script(dir.path(), "ffprobe", "echo 'No such file' >&2; exit 1");
        let prober = MediaProber::new(ffprobe, CommandRunner::default());

        let err = prober
            .probe_dimensions(Path::new("/tmp/missing.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No such file");
    }
}
