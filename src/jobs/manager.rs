//! # Job Manager
//!
//! Composition root for the job pipeline. Owns the registry, the work queue
//! and the worker thread, and is the only thing request handlers talk to.
//!
//! ## Locking:
//! Registry, queue, the "currently processing" marker and the counters sit
//! behind one `Mutex`. Critical sections only touch that bookkeeping; file
//! deletion, extraction and transcription all happen with the lock released.
//! A `Condvar` wakes the worker when work arrives or shutdown is requested.
//!
//! ## Lifecycle:
//! `start()` spawns the worker thread; `stop()` raises the shutdown flag and
//! waits (bounded) for the thread to exit. Both are idempotent. The wait runs
//! with the handle lock released, so status queries never block on it. While
//! a stop is in progress, or a worker is still finishing a job after `stop()`
//! timed out, `start()` fails, so two workers never run at once.

use crate::audio::{AudioExtractor, FfmpegExtractor};
use crate::config::{AppConfig, JobsConfig};
use crate::jobs::files::{remove_if_exists, remove_job_files, StoragePaths};
use crate::jobs::model::{
    Job, JobId, JobOutcome, JobStatus, JobStatusView, JobTicket, NewJob, QueueStats,
};
use crate::jobs::queue::WorkQueue;
use crate::jobs::registry::JobRegistry;
use crate::jobs::worker::{run_loop, JobWorker};
use crate::transcription::{CommandTranscriber, Transcriber};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often `stop()` re-checks whether the worker thread has exited.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(20);

/// Ages beyond a century are treated as a century.
const MAX_AGE_HOURS: u64 = 24 * 365 * 100;

fn hours(value: u64) -> chrono::Duration {
    chrono::Duration::hours(value.min(MAX_AGE_HOURS) as i64)
}

/// Limits and timings for a [`JobManager`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub max_jobs_in_memory: usize,
    pub max_job_age: chrono::Duration,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl ManagerSettings {
    pub fn from_config(config: &JobsConfig) -> Self {
        Self {
            max_jobs_in_memory: config.max_jobs_in_memory,
            max_job_age: hours(config.max_job_age_hours),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
        }
    }
}

/// Bookkeeping guarded by the manager's mutex.
#[derive(Debug)]
pub(crate) struct JobBook {
    registry: JobRegistry,
    queue: WorkQueue,
    current: Option<JobId>,
    completed_total: u64,
    failed_total: u64,
    evicted_total: u64,
}

impl JobBook {
    fn queue_position(&self, job: &Job) -> i64 {
        match job.status {
            JobStatus::Processing => 0,
            JobStatus::Waiting => self.queue.position(&job.id).map_or(-1, |pos| pos as i64),
            JobStatus::Completed | JobStatus::Error => -1,
        }
    }

    /// Forget evicted jobs entirely: queued ids go too, so positions stay exact.
    fn account_evictions(&mut self, evicted: &[Job]) {
        if evicted.is_empty() {
            return;
        }
        self.queue.discard(evicted.iter().map(|job| &job.id));
        self.evicted_total += evicted.len() as u64;
    }
}

/// State shared between the manager and its worker thread.
pub(crate) struct Shared {
    book: Mutex<JobBook>,
    work_ready: Condvar,
    shutdown: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, JobBook> {
        // Nothing panics while holding the lock, but a poisoned book is still consistent.
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for work, then take the next job that still exists.
    ///
    /// Dequeue and the `waiting → processing` transition happen under one lock
    /// so an eviction can't slip in between them.
    pub(crate) fn next_job(&self, timeout: Duration) -> Option<Job> {
        let mut book = self.lock();
        if book.queue.is_empty() && !self.is_shutting_down() {
            let (guard, _) = self
                .work_ready
                .wait_timeout(book, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            book = guard;
        }

        if self.is_shutting_down() {
            return None;
        }

        let book = &mut *book;
        while let Some(id) = book.queue.pop() {
            match book.registry.get_mut(&id) {
                Some(job) if job.status == JobStatus::Waiting => {
                    job.mark_processing(Utc::now());
                    book.current = Some(id);
                    return Some(job.clone());
                }
                _ => debug!(job_id = %id, "Skipping queued job that no longer exists"),
            }
        }
        None
    }

    /// Record a job's outcome and clear the processing marker.
    pub(crate) fn finish(&self, id: &JobId, outcome: JobOutcome) {
        let orphaned_result = {
            let mut book = self.lock();
            book.current = None;
            match &outcome {
                JobOutcome::Completed(_) => book.completed_total += 1,
                JobOutcome::Failed { .. } => book.failed_total += 1,
            }

            match book.registry.get_mut(id) {
                Some(job) => {
                    job.finish(outcome, Utc::now());
                    None
                }
                None => match outcome {
                    JobOutcome::Completed(done) => Some(done.result_path),
                    JobOutcome::Failed { .. } => None,
                },
            }
        };

        if let Some(path) = orphaned_result {
            warn!(job_id = %id, "Job vanished while processing; discarding its captions");
            if let Err(err) = remove_if_exists(&path) {
                warn!(job_id = %id, error = %err, "Failed to remove orphaned captions");
            }
        }
    }
}

/// Accepts jobs, answers status queries and drives the single worker.
pub struct JobManager {
    shared: Arc<Shared>,
    worker: Arc<JobWorker>,
    paths: StoragePaths,
    settings: ManagerSettings,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Set while a `stop()` call waits for the worker.
    stopping: AtomicBool,
}

impl JobManager {
    pub fn new(
        settings: ManagerSettings,
        paths: StoragePaths,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        let book = JobBook {
            registry: JobRegistry::new(settings.max_jobs_in_memory, settings.max_job_age),
            queue: WorkQueue::new(),
            current: None,
            completed_total: 0,
            failed_total: 0,
            evicted_total: 0,
        };

        Self {
            shared: Arc::new(Shared {
                book: Mutex::new(book),
                work_ready: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            worker: Arc::new(JobWorker::new(extractor, transcriber, paths.clone())),
            paths,
            settings,
            handle: Mutex::new(None),
            stopping: AtomicBool::new(false),
        }
    }

    /// Build a manager with the ffmpeg extractor and the command-line transcriber.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ManagerSettings::from_config(&config.jobs),
            StoragePaths::from_config(&config.storage),
            Arc::new(FfmpegExtractor::from_config(&config.extraction)),
            Arc::new(CommandTranscriber::from_config(&config.transcription)),
        )
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Register a job and queue it. Never blocks on processing.
    ///
    /// The source file at `new_job.source_path` belongs to the job from here on.
    pub fn create_job(&self, new_job: NewJob) -> JobTicket {
        let job = Job::new(new_job, Utc::now());
        let id = job.id.clone();

        let (evicted, queue_position) = {
            let mut book = self.shared.lock();
            let evicted = book.registry.insert(job, Utc::now());
            book.account_evictions(&evicted);
            book.queue.push(id.clone());
            let position = book.queue.len() as i64;
            (evicted, position)
        };
        self.shared.work_ready.notify_one();

        info!(job_id = %id, queue_position, evicted = evicted.len(), "Job queued");
        for job in &evicted {
            debug!(job_id = %job.id, status = job.status.as_str(), "Evicted job to make room");
            remove_job_files(job);
        }

        JobTicket {
            job_id: id,
            status: JobStatus::Waiting,
            queue_position,
        }
    }

    pub fn get_status(&self, id: &JobId) -> Option<JobStatusView> {
        let book = self.shared.lock();
        let job = book.registry.get(id)?;
        Some(JobStatusView::new(job, book.queue_position(job)))
    }

    /// Full record snapshot, used for downloads.
    pub fn get_job(&self, id: &JobId) -> Option<Job> {
        self.shared.lock().registry.get(id).cloned()
    }

    /// Every resident job, oldest first.
    pub fn list_jobs(&self) -> Vec<JobStatusView> {
        let book = self.shared.lock();
        let waiting: HashMap<&JobId, i64> = book
            .registry
            .all()
            .filter(|job| job.status == JobStatus::Waiting)
            .filter_map(|job| book.queue.position(&job.id).map(|pos| (&job.id, pos as i64)))
            .collect();

        book.registry
            .all()
            .map(|job| {
                let position = match job.status {
                    JobStatus::Waiting => waiting.get(&job.id).copied().unwrap_or(-1),
                    JobStatus::Processing => 0,
                    _ => -1,
                };
                JobStatusView::new(job, position)
            })
            .collect()
    }

    /// Evict every job at least `hours` old, except the one being processed.
    ///
    /// Returns how many jobs were removed. Their files are deleted before this returns.
    pub fn cleanup_older_than(&self, older_than_hours: u64) -> usize {
        let age = hours(older_than_hours);
        let evicted = {
            let mut book = self.shared.lock();
            let evicted = book.registry.evict_older_than(age, Utc::now());
            book.account_evictions(&evicted);
            evicted
        };

        for job in &evicted {
            remove_job_files(job);
        }
        if !evicted.is_empty() {
            info!(removed = evicted.len(), older_than_hours, "Cleaned up jobs");
        }
        evicted.len()
    }

    fn handle_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the worker thread if it isn't running.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.handle_slot();

        if self.stopping.load(Ordering::SeqCst) {
            return Err(anyhow!("job worker is being stopped"));
        }
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                if self.shared.is_shutting_down() {
                    return Err(anyhow!("job worker is still finishing its last job"));
                }
                return Ok(());
            }
        }
        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                warn!("Previous job worker exited with a panic");
            }
        }

        self.shared.shutdown.store(false, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let worker = Arc::clone(&self.worker);
        let poll_interval = self.settings.poll_interval;
        let handle = thread::Builder::new()
            .name("job-worker".to_string())
            .spawn(move || run_loop(shared, worker, poll_interval))
            .context("failed to spawn job worker thread")?;

        *slot = Some(handle);
        Ok(())
    }

    /// Ask the worker to stop and wait up to `stop_timeout` for it to exit.
    ///
    /// Returns `true` if no worker is left running. A call made while another
    /// `stop()` is still waiting returns `false` right away.
    pub fn stop(&self) -> bool {
        let handle = {
            let mut slot = self.handle_slot();
            match slot.take() {
                Some(handle) => {
                    self.stopping.store(true, Ordering::SeqCst);
                    handle
                }
                None => return !self.stopping.load(Ordering::SeqCst),
            }
        };

        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.work_ready.notify_all();

        let deadline = Instant::now() + self.settings.stop_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(STOP_CHECK_INTERVAL);
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("Job worker exited with a panic");
            }
            self.stopping.store(false, Ordering::SeqCst);
            info!("Job manager stopped");
            true
        } else {
            warn!(
                timeout_ms = self.settings.stop_timeout.as_millis() as u64,
                "Job worker did not stop in time; it will exit after the current job"
            );
            let mut slot = self.handle_slot();
            *slot = Some(handle);
            self.stopping.store(false, Ordering::SeqCst);
            false
        }
    }

    pub fn is_running(&self) -> bool {
        let slot = self.handle_slot();
        slot.as_ref().is_some_and(|handle| !handle.is_finished()) && !self.shared.is_shutting_down()
    }

    pub fn stats(&self) -> QueueStats {
        let worker_running = self.is_running();
        let book = self.shared.lock();
        QueueStats {
            queue_depth: book.queue.len(),
            processing: book.current.is_some(),
            current_job: book.current.clone(),
            resident_jobs: book.registry.len(),
            max_jobs_in_memory: book.registry.max_jobs(),
            completed_total: book.completed_total,
            failed_total: book.failed_total,
            evicted_total: book.evicted_total,
            worker_running,
        }
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        // Don't wait here; just make sure a detached worker winds down.
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.work_ready.notify_all();
    }
}

/// Periodically evict jobs older than `max_age_hours` until the runtime shuts down.
pub fn spawn_retention_sweep(
    manager: Arc<JobManager>,
    every: Duration,
    max_age_hours: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let manager = Arc::clone(&manager);
            match tokio::task::spawn_blocking(move || manager.cleanup_older_than(max_age_hours)).await {
                Ok(removed) => debug!(removed, "Retention sweep finished"),
                Err(err) => warn!(error = %err, "Retention sweep failed"),
            }
        }
    })
}
