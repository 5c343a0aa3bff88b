//! Command runner for external tools (ffmpeg, ffprobe, yt-dlp)
//!
//! Every external invocation goes through [`CommandRunner::run`]: stdin is
//! closed, stdout and stderr are captured, and a non-zero exit, a launch
//! failure or a timeout all surface as a [`ToolError`].

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolsConfig;

/// Error type for external tool invocations
#[derive(Debug, Error)]
pub enum ToolError {
    /// The process could not be launched (e.g. executable not found)
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully; `detail` holds the captured output
    #[error("{detail}")]
    Failed {
        program: String,
        code: Option<i32>,
        detail: String,
    },

    /// The process did not finish within the configured timeout and was killed
    #[error("{program} timed out after {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },
}

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executable locations, injected into every component that shells out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub yt_dlp: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            yt_dlp: PathBuf::from("yt-dlp"),
        }
    }
}

impl From<&ToolsConfig> for ToolPaths {
    fn from(cfg: &ToolsConfig) -> Self {
        Self {
            ffmpeg: cfg.ffmpeg.clone(),
            ffprobe: cfg.ffprobe.clone(),
            yt_dlp: cfg.yt_dlp.clone(),
        }
    }
}

/// Runs external processes with an optional timeout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Create a runner; `None` waits for the child indefinitely
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Build a runner from `tools.timeout_secs` (0 disables the timeout)
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        let timeout = (cfg.timeout_secs > 0).then(|| Duration::from_secs(cfg.timeout_secs));
        Self::new(timeout)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `program` with `args` and wait for it to exit
    ///
    /// # Returns
    /// * `Ok(CommandOutput)` - The process exited with status 0
    /// * `Err(ToolError)` - Launch failure, non-zero exit or timeout
    pub async fn run<P, I, S>(&self, program: P, args: I) -> Result<CommandOutput, ToolError>
    where
        P: AsRef<OsStr>,
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let program_name = program.to_string_lossy().into_owned();
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect();

        debug!(program = %program_name, args = ?args, "running external tool");

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program_name.clone(),
                source,
            })?;

        // wait_with_output drains both pipes concurrently; dropping it on
        // timeout drops the child, which kills it
        let output = match self.timeout {
            Some(after) => match tokio::time::timeout(after, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ToolError::TimedOut {
                        program: program_name,
                        after,
                    })
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|source| ToolError::Spawn {
            program: program_name.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            debug!(program = %program_name, code = ?output.status.code(), "external tool failed");
            Err(ToolError::Failed {
                detail: failure_detail(&stdout, &stderr, &program_name, &args),
                program: program_name,
                code: output.status.code(),
            })
        }
    }
}

/// Pick the diagnostic text for a failed run: stderr, then stdout, then a
/// generic message naming the command
pub fn failure_detail(stdout: &str, stderr: &str, program: &str, args: &[String]) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    format!("Command failed: {} {}", program, args.join(" "))
}
