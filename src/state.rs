//! # Application State Management
//!
//! State shared by every HTTP request handler.
//!
//! ## What lives here:
//! - The loaded configuration (read-only after startup)
//! - The [`JobManager`], which owns the job pipeline and its worker thread
//! - Request metrics updated by the metrics middleware
//! - The server start time, for uptime reporting
//!
//! ## Arc<RwLock<T>> Pattern
//! Metrics are written on every request and read by `/metrics`, so they sit
//! behind a reader-writer lock. The job manager does its own locking and is
//! shared as a plain `Arc`.

use crate::config::AppConfig;
use crate::jobs::JobManager;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
///
/// Cloning is cheap: every field is either `Arc`-wrapped or `Copy`.
#[derive(Clone)]
pub struct AppState {
    /// Configuration loaded at startup
    pub config: Arc<AppConfig>,

    /// The job pipeline. Handlers create and query jobs through it.
    pub jobs: Arc<JobManager>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP requests.
///
/// ## Why these metrics matter:
/// - **request_count**: Total requests processed (for load monitoring)
/// - **error_count**: Total 4xx/5xx responses (for reliability monitoring)
/// - **active_uploads**: Uploads currently streaming to disk
/// - **endpoint_metrics**: Per-endpoint statistics
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub active_uploads: u32,
    /// Key: endpoint name (e.g., "GET /health")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    /// Cumulative time spent processing requests, in milliseconds
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, jobs: Arc<JobManager>) -> Self {
        Self {
            config: Arc::new(config),
            jobs,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    fn metrics_mut(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_ref(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        self.metrics_mut().request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        self.metrics_mut().error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// The first time we see an endpoint, a zeroed [`EndpointMetric`] is created.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_mut();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark an upload as streaming. The returned guard unmarks it when dropped.
    pub fn track_upload(&self) -> UploadGuard {
        self.metrics_mut().active_uploads += 1;
        UploadGuard {
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_ref().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Keeps `active_uploads` accurate even when an upload handler bails early.
pub struct UploadGuard {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.active_uploads = metrics.active_uploads.saturating_sub(1);
    }
}

impl EndpointMetric {
    /// Average = Total Duration ÷ Number of Requests
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error Rate = Number of Errors ÷ Total Requests, from 0.0 to 1.0
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::AudioExtractor;
    use crate::jobs::files::StoragePaths;
    use crate::jobs::manager::ManagerSettings;
    use crate::jobs::worker::tests::{CopyExtractor, FixedTranscriber};
    use std::time::Duration;

    /// State backed by a scratch directory and fake collaborators.
    pub(crate) fn test_state(root: &std::path::Path, max_jobs: usize) -> AppState {
        test_state_with(root, |config| config.jobs.max_jobs_in_memory = max_jobs)
    }

    pub(crate) fn test_state_with(
        root: &std::path::Path,
        configure: impl FnOnce(&mut AppConfig),
    ) -> AppState {
        let mut config = AppConfig::default();
        config.storage.upload_dir = root.join("uploads");
        config.storage.temp_dir = root.join("tmp");
        config.storage.result_dir = root.join("results");
        configure(&mut config);

        let paths = StoragePaths::from_config(&config.storage);
        paths.ensure_dirs().unwrap();

        let settings = ManagerSettings {
            poll_interval: Duration::from_millis(10),
            ..ManagerSettings::from_config(&config.jobs)
        };
        let extractor: Arc<dyn AudioExtractor> = Arc::new(CopyExtractor);
        let jobs = JobManager::new(
            settings,
            paths,
            extractor,
            Arc::new(FixedTranscriber::scenario_a()),
        );
        AppState::new(config, Arc::new(jobs))
    }

    #[test]
    fn test_endpoint_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), 5);

        state.record_endpoint_request("GET /jobs", 10, false);
        state.record_endpoint_request("GET /jobs", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /jobs"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_upload_guard_decrements_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), 5);

        let guard = state.track_upload();
        assert_eq!(state.get_metrics_snapshot().active_uploads, 1);
        drop(guard);
        assert_eq!(state.get_metrics_snapshot().active_uploads, 0);
    }
}
