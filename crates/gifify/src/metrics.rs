//! Metrics module for GIFify
//!
//! Per-job progress and aggregate counters, shared between the executor and
//! the `/api/metrics` endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Finished jobs kept in the snapshot; older ones are dropped first
pub const MAX_RETAINED_JOBS: usize = 100;

/// Per-job metrics tracking conversion progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetrics {
    pub id: String,
    pub source_url: String,
    pub stage: String,
    pub started_unix_ms: i64,
    pub finished_unix_ms: Option<i64>,
    /// GIF attempts so far
    pub gif_attempts: u32,
    pub gif_width: Option<u32>,
    pub gif_fps: Option<u32>,
    pub gif_bytes: Option<u64>,
    /// Bytes written across mp4/webm renditions
    pub rendition_bytes: u64,
    pub error: Option<String>,
}

impl JobMetrics {
    pub fn new(id: &str, source_url: &str, stage: &str) -> Self {
        Self {
            id: id.to_string(),
            source_url: source_url.to_string(),
            stage: stage.to_string(),
            started_unix_ms: now_unix_ms(),
            finished_unix_ms: None,
            gif_attempts: 0,
            gif_width: None,
            gif_fps: None,
            gif_bytes: None,
            rendition_bytes: 0,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_unix_ms.is_some()
    }
}

/// Complete metrics snapshot including jobs and aggregate stats
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub timestamp_unix_ms: i64,
    pub jobs: Vec<JobMetrics>,
    /// Jobs waiting for a concurrency slot
    pub queue_len: usize,
    pub running_jobs: usize,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub total_bytes_produced: u64,
}

impl MetricsSnapshot {
    /// Recount queued and running jobs and drop the oldest finished ones
    pub fn refresh(&mut self) {
        self.timestamp_unix_ms = now_unix_ms();
        self.queue_len = self.jobs.iter().filter(|j| j.stage == "queued").count();
        self.running_jobs = self
            .jobs
            .iter()
            .filter(|j| !j.is_finished() && j.stage != "queued")
            .count();

        let finished = self.jobs.iter().filter(|j| j.is_finished()).count();
        let mut excess = finished.saturating_sub(MAX_RETAINED_JOBS);
        if excess > 0 {
            self.jobs.retain(|j| {
                if excess > 0 && j.is_finished() {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut JobMetrics> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Ids of jobs that have not finished yet, queued ones included
    pub fn active_job_ids(&self) -> HashSet<String> {
        self.jobs
            .iter()
            .filter(|j| !j.is_finished())
            .map(|j| j.id.clone())
            .collect()
    }
}

/// Shared metrics state for concurrent access across service components
pub type SharedMetrics = Arc<RwLock<MetricsSnapshot>>;

/// Creates a new SharedMetrics instance with default values
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(RwLock::new(MetricsSnapshot::default()))
}

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn finished(id: usize) -> JobMetrics {
        let mut job = JobMetrics::new(&format!("job-{}", id), "https://www.tiktok.com/v/1", "completed");
        job.finished_unix_ms = Some(1);
        job
    }

    #[test]
    fn test_refresh_counts_stages() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.jobs.push(JobMetrics::new("a", "u", "queued"));
        snapshot.jobs.push(JobMetrics::new("b", "u", "fetching"));
        snapshot.jobs.push(JobMetrics::new("c", "u", "encoding_gif"));
        snapshot.jobs.push(finished(0));

        snapshot.refresh();

        assert_eq!(snapshot.queue_len, 1);
        assert_eq!(snapshot.running_jobs, 2);
        assert!(snapshot.timestamp_unix_ms > 0);
    }

    #[test]
    fn test_refresh_keeps_running_jobs_when_pruning() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.jobs.push(JobMetrics::new("live", "u", "encoding_video"));
        for i in 0..MAX_RETAINED_JOBS + 5 {
            snapshot.jobs.push(finished(i));
        }

        snapshot.refresh();

        assert_eq!(snapshot.jobs.len(), MAX_RETAINED_JOBS + 1);
        assert!(snapshot.job_mut("live").is_some());
        // Oldest finished entries go first
        assert!(snapshot.job_mut("job-0").is_none());
        assert!(snapshot.job_mut(&format!("job-{}", MAX_RETAINED_JOBS + 4)).is_some());
    }

    #[test]
    fn test_active_job_ids_skip_finished() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.jobs.push(JobMetrics::new("waiting", "u", "queued"));
        snapshot.jobs.push(JobMetrics::new("busy", "u", "encoding_gif"));
        snapshot.jobs.push(finished(0));

        let ids = snapshot.active_job_ids();

        assert_eq!(ids.len(), 2);
        assert!(ids.contains("waiting"));
        assert!(ids.contains("busy"));
        assert!(!ids.contains("job-0"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]
        #[test]
        fn prop_metrics_snapshot_serializes(
            completed_jobs in any::<u64>(),
            failed_jobs in any::<u64>(),
            total_bytes_produced in any::<u64>(),
            job_count in 0usize..5,
        ) {
            let jobs: Vec<JobMetrics> = (0..job_count).map(|i| {
                let mut job = JobMetrics::new(&format!("job{}", i), "https://www.instagram.com/reel/x/", "encoding_gif");
                job.gif_attempts = i as u32;
                job.gif_width = Some(408);
                job
            }).collect();

            let snapshot = MetricsSnapshot {
                timestamp_unix_ms: 0,
                jobs,
                queue_len: 0,
                running_jobs: job_count,
                completed_jobs,
                failed_jobs,
                total_bytes_produced,
            };

            let json = serde_json::to_string(&snapshot).expect("serialization should succeed");
            let back: MetricsSnapshot = serde_json::from_str(&json)
                .expect("deserialization should succeed");
            prop_assert_eq!(snapshot, back);
        }
    }
}
