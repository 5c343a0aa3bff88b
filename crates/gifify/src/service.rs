//! Service startup and wiring for GIFify
//!
//! Builds the executor, router and background tasks from a loaded config.

use crate::concurrency::ConcurrencyPlan;
use crate::config::{Config, ConfigError};
use crate::job_executor::{ConversionExecutor, ConversionResult, JobError};
use crate::metrics::{new_shared_metrics, SharedMetrics};
use crate::request::ConversionRequest;
use crate::runner::ToolPaths;
use crate::server::{create_router, run_server, AppState, ServerError};
use crate::startup::{run_startup_checks, StartupError};
use crate::sweep::sweep_stale_downloads;
use axum::Router;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Shortest interval between temp directory sweeps
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Error type for service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    #[error("Failed to create directory: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Service state containing all runtime components
pub struct Service {
    pub config: Config,
    pub concurrency_plan: ConcurrencyPlan,
    pub metrics: SharedMetrics,
    pub executor: Arc<ConversionExecutor>,
}

impl Service {
    /// Initialize the service with configuration from file
    ///
    /// 1. Load config from file (defaults when absent)
    /// 2. Apply environment overrides
    /// 3. Run tool checks unless `skip_checks`
    /// 4. Create directories and sweep stale downloads
    pub async fn new<P: AsRef<Path>>(config_path: P, skip_checks: bool) -> Result<Self, ServiceError> {
        let config = Config::load_or_default(config_path)?;
        Self::with_config(config, skip_checks).await
    }

    /// Initialize the service with an existing configuration
    pub async fn with_config(config: Config, skip_checks: bool) -> Result<Self, ServiceError> {
        if skip_checks {
            warn!("skipping external tool checks");
        } else {
            run_startup_checks(&ToolPaths::from(&config.tools)).await?;
        }
        Self::new_without_checks(config)
    }

    /// Initialize the service without running tool checks
    pub fn new_without_checks(config: Config) -> Result<Self, ServiceError> {
        std::fs::create_dir_all(&config.server.output_dir)?;
        std::fs::create_dir_all(&config.server.tmp_dir)?;

        // No job has started yet, so every download in tmp_dir is orphaned
        let removed =
            sweep_stale_downloads(&config.server.tmp_dir, stale_age(&config), &HashSet::new());
        if removed > 0 {
            info!(removed, "removed stale downloads");
        }

        let concurrency_plan = ConcurrencyPlan::derive(&config);
        info!(
            cores = concurrency_plan.total_cores,
            max_concurrent_jobs = concurrency_plan.max_concurrent_jobs,
            "concurrency plan"
        );

        let metrics = new_shared_metrics();
        let executor = Arc::new(ConversionExecutor::from_config(&config, metrics.clone()));

        Ok(Self {
            config,
            concurrency_plan,
            metrics,
            executor,
        })
    }

    /// Get the shared metrics
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// Build the HTTP router for this service
    pub fn router(&self) -> Router {
        create_router(
            AppState::new(self.executor.clone(), &self.config),
            &self.config.server,
        )
    }

    /// Run one conversion outside the HTTP server
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult, ServiceError> {
        Ok(self.executor.execute(request).await?)
    }

    /// Periodically remove downloads orphaned by a previous process
    ///
    /// Returns `None` when `stale_download_secs` is 0. Downloads of jobs
    /// still in progress are skipped.
    pub fn start_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        let max_age = stale_age(&self.config);
        if max_age.is_zero() {
            info!("stale download sweep disabled");
            return None;
        }
        let tmp_dir = self.config.server.tmp_dir.clone();
        let metrics = self.metrics.clone();
        let interval = (max_age / 2).max(MIN_SWEEP_INTERVAL);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; startup already swept
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let live_jobs = metrics.read().await.active_job_ids();
                let dir = tmp_dir.clone();
                let sweep =
                    tokio::task::spawn_blocking(move || sweep_stale_downloads(&dir, max_age, &live_jobs));
                match sweep.await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "removed stale downloads"),
                    Err(e) => warn!(error = %e, "stale download sweep panicked"),
                }
            }
        }))
    }

    /// Serve HTTP until the server fails or the process is stopped
    pub async fn run(&self) -> Result<(), ServiceError> {
        let sweeper = self.start_sweeper();
        let result = run_server(self.router(), &self.config.server.host, self.config.server.port).await;
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        self.executor.close();
        Ok(result?)
    }
}

fn stale_age(config: &Config) -> Duration {
    Duration::from_secs(config.server.stale_download_secs)
}
