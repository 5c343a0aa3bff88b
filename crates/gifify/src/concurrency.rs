//! Concurrency planning for conversion jobs
//!
//! Derives how many conversions may run at once from the CPU core count and
//! configuration.

use crate::config::Config;

/// Upper bound for an auto-derived job limit
const MAX_DERIVED_JOBS: u32 = 4;

/// Cores reserved per concurrent conversion when deriving the limit
const CORES_PER_JOB: u32 = 4;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Maximum number of conversions running at once
    pub max_concurrent_jobs: u32,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// - Detects CPU cores via num_cpus if not specified in config
    /// - An explicit non-zero `max_concurrent_jobs` is used unchanged
    /// - Otherwise one job per four cores, between 1 and 4
    pub fn derive(cfg: &Config) -> Self {
        let total_cores = cfg
            .jobs
            .logical_cores
            .filter(|&c| c > 0)
            .unwrap_or_else(|| num_cpus::get() as u32);

        let max_concurrent_jobs = if cfg.jobs.max_concurrent_jobs > 0 {
            cfg.jobs.max_concurrent_jobs
        } else {
            derive_max_jobs(total_cores)
        };

        Self {
            total_cores,
            max_concurrent_jobs,
        }
    }
}

/// Every ffmpeg pass is multithreaded, so jobs get a share of cores each
fn derive_max_jobs(cores: u32) -> u32 {
    (cores / CORES_PER_JOB).clamp(1, MAX_DERIVED_JOBS)
}
