//! Startup checks module for GIFify
//!
//! Preflight checks that the external tools can be launched before serving:
//! - ffmpeg (`-version`)
//! - ffprobe (`-version`)
//! - yt-dlp (`--version`)

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::runner::{CommandRunner, ToolError, ToolPaths};

/// Version probes should answer almost instantly
const CHECK_TIMEOUT: Duration = Duration::from_secs(15);

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available at '{}'; is it installed and in PATH? {source}", .program.display())]
    ToolUnavailable {
        tool: &'static str,
        program: PathBuf,
        #[source]
        source: ToolError,
    },
}

/// Result of a successful tool check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub tool: &'static str,
    pub program: PathBuf,
    /// Version string, when one could be parsed
    pub version: Option<String>,
}

/// The three tool checks, as `(name, program, version flag)`
pub fn tool_checks(tools: &ToolPaths) -> [(&'static str, &Path, &'static str); 3] {
    [
        ("ffmpeg", tools.ffmpeg.as_path(), "-version"),
        ("ffprobe", tools.ffprobe.as_path(), "-version"),
        ("yt-dlp", tools.yt_dlp.as_path(), "--version"),
    ]
}

/// Run `program version_arg` and return its parsed version
///
/// A launch failure or non-zero exit means the tool is unavailable.
pub async fn check_tool_available(
    runner: &CommandRunner,
    program: &Path,
    version_arg: &str,
) -> Result<Option<String>, ToolError> {
    let out = runner.run(program, [version_arg]).await?;
    Ok(parse_tool_version(&out.stdout))
}

/// Extract a version from `-version`/`--version` output
///
/// Handles:
/// - ffmpeg/ffprobe: "ffmpeg version n6.1.1-... Copyright ..."
/// - yt-dlp: a bare "2024.03.10" line
pub fn parse_tool_version(output: &str) -> Option<String> {
    let first = output.lines().map(str::trim).find(|l| !l.is_empty())?;

    let lower = first.to_lowercase();
    if let Some(idx) = lower.find(" version ") {
        return first
            .get(idx + " version ".len()..)?
            .split_whitespace()
            .next()
            .map(str::to_string);
    }

    let token = first.split_whitespace().next()?;
    token
        .chars()
        .next()
        .filter(|c| c.is_ascii_digit())
        .map(|_| token.to_string())
}

/// Run all startup checks, stopping at the first unavailable tool
pub async fn run_startup_checks(tools: &ToolPaths) -> Result<Vec<ToolReport>, StartupError> {
    let runner = CommandRunner::new(Some(CHECK_TIMEOUT));
    let mut reports = Vec::with_capacity(3);

    for (tool, program, version_arg) in tool_checks(tools) {
        let version = check_tool_available(&runner, program, version_arg)
            .await
            .map_err(|source| StartupError::ToolUnavailable {
                tool,
                program: program.to_path_buf(),
                source,
            })?;

        info!(
            tool,
            program = %program.display(),
            version = version.as_deref().unwrap_or("unknown"),
            "tool available"
        );
        reports.push(ToolReport {
            tool,
            program: program.to_path_buf(),
            version,
        });
    }

    Ok(reports)
}
