//! CLI entry point for GIFify
//!
//! Serves the HTTP API, runs a single conversion, or checks the external tools.

use clap::{Parser, Subcommand};
use gifify::{
    run_startup_checks, Config, ConversionRequest, ConvertResponse, RequestDraft, Service,
    ToolPaths, VideoFormat,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// GIFify - Turn TikTok and Instagram links into size-bounded GIFs
#[derive(Parser, Debug)]
#[command(name = "gifify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file; defaults apply when it is missing
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Skip external tool checks
        #[arg(long)]
        skip_checks: bool,
    },

    /// Convert one link and print the result as JSON
    Convert {
        /// TikTok or Instagram URL
        url: String,

        /// Target GIF size in MB
        #[arg(long)]
        target_mb: Option<f64>,

        /// Starting GIF width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Starting frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Start offset: seconds, MM:SS or HH:MM:SS
        #[arg(long)]
        start: Option<String>,

        /// Clip length in seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Crop the bottom watermark band
        #[arg(long)]
        remove_watermark: bool,

        /// Ask for audio to be kept; downloads are muted by default
        #[arg(long)]
        keep_audio: bool,

        /// Video renditions to produce besides the GIF (default: mp4 and webm)
        #[arg(long = "format", value_delimiter = ',')]
        formats: Vec<VideoFormat>,

        /// Produce only the GIF
        #[arg(long, conflicts_with = "formats")]
        gif_only: bool,

        /// Skip external tool checks
        #[arg(long)]
        skip_checks: bool,
    },

    /// Check that ffmpeg, ffprobe and yt-dlp can be launched
    CheckTools,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "gifify=debug,tower_http=debug"
    } else {
        "gifify=info,tower_http=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr so `convert` output stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<Config, String> {
    Config::load_or_default(path).map_err(|e| format!("Failed to load {}: {}", path.display(), e))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            skip_checks,
        } => serve(&cli.config, host, port, skip_checks).await,
        Commands::Convert {
            url,
            target_mb,
            width,
            fps,
            start,
            duration,
            remove_watermark,
            keep_audio,
            formats,
            gif_only,
            skip_checks,
        } => {
            let options = ConvertOptions {
                url,
                target_mb,
                width,
                fps,
                start,
                duration,
                remove_watermark,
                mute: !keep_audio,
                formats,
                gif_only,
            };
            convert(&cli.config, options, skip_checks).await
        }
        Commands::CheckTools => check_tools(&cli.config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn serve(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    skip_checks: bool,
) -> Result<(), String> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let service = Service::with_config(config, skip_checks)
        .await
        .map_err(|e| e.to_string())?;
    service.run().await.map_err(|e| e.to_string())
}

struct ConvertOptions {
    url: String,
    target_mb: Option<f64>,
    width: Option<u32>,
    fps: Option<u32>,
    start: Option<String>,
    duration: Option<f64>,
    remove_watermark: bool,
    mute: bool,
    formats: Vec<VideoFormat>,
    gif_only: bool,
}

async fn convert(
    config_path: &Path,
    options: ConvertOptions,
    skip_checks: bool,
) -> Result<(), String> {
    let config = load_config(config_path)?;

    let formats = if options.gif_only {
        Default::default()
    } else if options.formats.is_empty() {
        VideoFormat::ALL.into_iter().collect()
    } else {
        options.formats.into_iter().collect()
    };

    let draft = RequestDraft {
        url: options.url,
        target_size_mb: options.target_mb.unwrap_or(config.defaults.max_gif_mb),
        width: options.width.unwrap_or(config.defaults.width),
        fps: options.fps.unwrap_or(config.defaults.fps),
        start_time: options.start,
        duration_secs: options.duration,
        remove_watermark: options.remove_watermark,
        mute: options.mute,
        formats,
    };
    let request = ConversionRequest::validate(draft, &config.sources.allowed_hosts)
        .map_err(|e| e.to_string())?;

    let service = Service::with_config(config, skip_checks)
        .await
        .map_err(|e| e.to_string())?;
    let result = service.convert(&request).await.map_err(|e| e.to_string())?;

    let json = serde_json::to_string_pretty(&ConvertResponse::from(&result))
        .map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

async fn check_tools(config_path: &Path) -> Result<(), String> {
    let config = load_config(config_path)?;
    let reports = run_startup_checks(&ToolPaths::from(&config.tools))
        .await
        .map_err(|e| e.to_string())?;

    for report in reports {
        println!(
            "{:<8} {} ({})",
            report.tool,
            report.version.as_deref().unwrap_or("unknown version"),
            report.program.display()
        );
    }
    Ok(())
}
