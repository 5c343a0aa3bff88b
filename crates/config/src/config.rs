//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; `*` allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Directory holding produced GIF/MP4/WebM files, served under `/output`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory for downloaded source videos
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// Optional front-end directory served at `/`
    #[serde(default)]
    pub public_dir: Option<PathBuf>,
    /// Downloads older than this are removed at startup and periodically (0 = disabled)
    #[serde(default = "default_stale_download_secs")]
    pub stale_download_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_stale_download_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            output_dir: default_output_dir(),
            tmp_dir: default_tmp_dir(),
            public_dir: None,
            stale_download_secs: default_stale_download_secs(),
        }
    }
}

/// Locations of the external executables and their timeout policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: PathBuf,
    /// Per-invocation timeout in seconds (0 = wait forever)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_yt_dlp() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            yt_dlp: default_yt_dlp(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Request defaults used when the caller leaves a field out
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    #[serde(default = "default_max_gif_mb")]
    pub max_gif_mb: f64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_max_gif_mb() -> f64 {
    50.0
}

fn default_width() -> u32 {
    480
}

fn default_fps() -> u32 {
    12
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_gif_mb: default_max_gif_mb(),
            width: default_width(),
            fps: default_fps(),
        }
    }
}

/// Degradation policy of the size-seeking GIF loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GifConfig {
    /// Width is never shrunk below this
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    /// Frame rate is never reduced below this
    #[serde(default = "default_min_fps")]
    pub min_fps: u32,
    /// Width shrinks while above this; afterwards fps is reduced instead
    #[serde(default = "default_shrink_above_width")]
    pub shrink_above_width: u32,
    #[serde(default = "default_width_factor")]
    pub width_factor: f64,
    #[serde(default = "default_fps_step")]
    pub fps_step: u32,
}

fn default_min_width() -> u32 {
    240
}

fn default_min_fps() -> u32 {
    6
}

fn default_shrink_above_width() -> u32 {
    320
}

fn default_width_factor() -> f64 {
    0.85
}

fn default_fps_step() -> u32 {
    2
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            min_width: default_min_width(),
            min_fps: default_min_fps(),
            shrink_above_width: default_shrink_above_width(),
            width_factor: default_width_factor(),
            fps_step: default_fps_step(),
        }
    }
}

/// Fixed crop applied when watermark removal is requested
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatermarkConfig {
    /// Share of the frame height kept
    #[serde(default = "default_height_fraction")]
    pub height_fraction: f64,
    /// Share of the frame height cut from the top
    #[serde(default = "default_y_offset_fraction")]
    pub y_offset_fraction: f64,
}

fn default_height_fraction() -> f64 {
    0.84
}

fn default_y_offset_fraction() -> f64 {
    0.08
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            height_fraction: default_height_fraction(),
            y_offset_fraction: default_y_offset_fraction(),
        }
    }
}

/// Job concurrency configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JobsConfig {
    /// Number of logical cores (auto-detected if None)
    pub logical_cores: Option<u32>,
    /// Maximum concurrent conversions (0 = auto-derive)
    #[serde(default)]
    pub max_concurrent_jobs: u32,
}

/// Accepted source hosts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourcesConfig {
    /// A URL is accepted when its host contains one of these fragments
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

fn default_allowed_hosts() -> Vec<String> {
    ["tiktok.com", "instagram.com", "cdninstagram", "cdn-"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub gif: GifConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Unparseable values are ignored and the existing value is kept.
    /// - HOST, PORT -> server.host, server.port
    /// - ALLOWED_ORIGINS (comma separated) -> server.allowed_origins
    /// - OUTPUT_DIR, TMP_DIR, PUBLIC_DIR -> server directories
    /// - FFMPEG_PATH, FFPROBE_PATH, YTDLP_PATH -> tools.*
    /// - TOOL_TIMEOUT_SECS -> tools.timeout_secs
    /// - MAX_GIF_MB, DEFAULT_WIDTH, DEFAULT_FPS -> defaults.*
    /// - MAX_CONCURRENT_JOBS -> jobs.max_concurrent_jobs
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("HOST") {
            self.server.host = val;
        }

        if let Some(port) = env_parse::<u16>("PORT") {
            self.server.port = port;
        }

        if let Ok(val) = env::var("ALLOWED_ORIGINS") {
            let origins: Vec<String> = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !origins.is_empty() {
                self.server.allowed_origins = origins;
            }
        }

        if let Ok(val) = env::var("OUTPUT_DIR") {
            self.server.output_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("TMP_DIR") {
            self.server.tmp_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("PUBLIC_DIR") {
            self.server.public_dir = Some(PathBuf::from(val));
        }

        if let Ok(val) = env::var("FFMPEG_PATH") {
            self.tools.ffmpeg = PathBuf::from(val);
        }
        if let Ok(val) = env::var("FFPROBE_PATH") {
            self.tools.ffprobe = PathBuf::from(val);
        }
        if let Ok(val) = env::var("YTDLP_PATH") {
            self.tools.yt_dlp = PathBuf::from(val);
        }
        if let Some(secs) = env_parse::<u64>("TOOL_TIMEOUT_SECS") {
            self.tools.timeout_secs = secs;
        }

        // Non-positive request defaults make no sense, keep the configured value
        if let Some(mb) = env_parse::<f64>("MAX_GIF_MB").filter(|mb| *mb > 0.0) {
            self.defaults.max_gif_mb = mb;
        }
        if let Some(width) = env_parse::<u32>("DEFAULT_WIDTH").filter(|w| *w > 0) {
            self.defaults.width = width;
        }
        if let Some(fps) = env_parse::<u32>("DEFAULT_FPS").filter(|f| *f > 0) {
            self.defaults.fps = fps;
        }

        if let Some(jobs) = env_parse::<u32>("MAX_CONCURRENT_JOBS") {
            self.jobs.max_concurrent_jobs = jobs;
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}
