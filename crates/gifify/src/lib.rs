//! GIFify
//!
//! Turns a TikTok or Instagram link into a GIF bounded by a target size,
//! with optional MP4 and WebM renditions, behind a small JSON HTTP API.

pub mod concurrency;
pub mod encode;
pub mod fetch;
pub mod filters;
pub mod job_executor;
pub mod metrics;
pub mod probe;
pub mod request;
pub mod runner;
pub mod server;
pub mod service;
pub mod size_target;
pub mod startup;
pub mod sweep;

pub use gifify_config as config;
pub use gifify_config::Config;
pub use concurrency::ConcurrencyPlan;
pub use encode::{
    DegradationPolicy, GifEncoder, GifError, GifOutcome, VideoEncoder, VideoError, VideoFormat,
};
pub use fetch::{FetchError, Fetcher, SourceMetadata};
pub use filters::{build_filters, CropRegion, FilterPipeline, FilterStage};
pub use job_executor::{
    ConversionExecutor, ConversionResult, ExecutorSettings, JobError, JobState, Rendition,
};
pub use metrics::{new_shared_metrics, JobMetrics, MetricsSnapshot, SharedMetrics};
pub use probe::{Dimensions, MediaProber};
pub use request::{ConversionRequest, RequestDraft, ValidationError};
pub use runner::{CommandOutput, CommandRunner, ToolError, ToolPaths};
pub use server::{create_router, run_server, AppState, ConvertBody, ConvertResponse, ServerError};
pub use service::{Service, ServiceError};
pub use startup::{check_tool_available, run_startup_checks, StartupError, ToolReport};
pub use sweep::sweep_stale_downloads;
