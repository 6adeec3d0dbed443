//! Job records and the views handed out to callers.

use crate::captions::CaptionFormat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Opaque job identifier, unique for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// A fresh random (v4 UUID) id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a job.
///
/// ## State Transitions:
/// Waiting → Processing → Completed | Error
///
/// There is no way out of Completed or Error other than removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub result_path: PathBuf,
    pub file_size_mb: f64,
    pub word_count: usize,
    pub language: String,
}

/// Terminal result of processing a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(CompletedJob),
    Failed { message: String },
}

/// Everything a caller supplies to create a job.
///
/// The id is chosen up front so the upload can be written to a path that
/// already carries it.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub filename: String,
    pub source_path: PathBuf,
    pub output_format: CaptionFormat,
    pub use_vad: bool,
    pub language: Option<String>,
}

/// One transcription request, tracked from upload to download.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub filename: String,
    pub filepath: PathBuf,
    pub output_format: CaptionFormat,
    pub use_vad: bool,
    pub language_hint: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<JobOutcome>,
}

impl Job {
    pub fn new(request: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: request.id,
            filename: request.filename,
            filepath: request.source_path,
            output_format: request.output_format,
            use_vad: request.use_vad,
            language_hint: request.language,
            status: JobStatus::Waiting,
            created_at: now,
            started_at: None,
            completed_at: None,
            outcome: None,
        }
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        debug_assert_eq!(self.status, JobStatus::Waiting);
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
    }

    /// Record the terminal outcome. Ignored unless the job is processing.
    pub fn finish(&mut self, outcome: JobOutcome, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.status = match outcome {
            JobOutcome::Completed(_) => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Error,
        };
        self.completed_at = Some(now);
        self.outcome = Some(outcome);
        true
    }

    pub fn result_path(&self) -> Option<&PathBuf> {
        match &self.outcome {
            Some(JobOutcome::Completed(done)) => Some(&done.result_path),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Some(JobOutcome::Failed { message }) => Some(message),
            _ => None,
        }
    }

    /// Time since creation, never negative.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.created_at).max(chrono::Duration::zero())
    }
}

/// Read-only snapshot of a job as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: JobId,
    pub filename: String,
    pub status: JobStatus,
    pub output_format: CaptionFormat,
    pub use_vad: bool,
    /// 1-based rank among waiting jobs, 0 while processing, -1 otherwise.
    pub queue_position: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl JobStatusView {
    pub fn new(job: &Job, queue_position: i64) -> Self {
        let completed = match &job.outcome {
            Some(JobOutcome::Completed(done)) => Some(done),
            _ => None,
        };

        Self {
            job_id: job.id.clone(),
            filename: job.filename.clone(),
            status: job.status,
            output_format: job.output_format,
            use_vad: job.use_vad,
            queue_position,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message: job.error_message().map(str::to_string),
            file_size_mb: completed.map(|done| done.file_size_mb),
            word_count: completed.map(|done| done.word_count),
            language: completed.map(|done| done.language.clone()),
            download_url: completed.map(|_| format!("/download/{}", job.id)),
        }
    }
}

/// Returned from job creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTicket {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_position: i64,
}

/// Queue and worker counters for `/health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queue_depth: usize,
    pub processing: bool,
    pub current_job: Option<JobId>,
    pub resident_jobs: usize,
    pub max_jobs_in_memory: usize,
    pub completed_total: u64,
    pub failed_total: u64,
    pub evicted_total: u64,
    pub worker_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> Job {
        Job::new(
            NewJob {
                id: JobId::generate(),
                filename: "talk.mp4".into(),
                source_path: PathBuf::from("/tmp/talk.mp4"),
                output_format: CaptionFormat::Srt,
                use_vad: true,
                language: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut job = new_job();
        assert_eq!(job.status, JobStatus::Waiting);

        job.mark_processing(Utc::now());
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        let finished = job.finish(
            JobOutcome::Failed { message: "boom".into() },
            Utc::now(),
        );
        assert!(finished);
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_message(), Some("boom"));

        // Terminal states are final.
        let again = job.finish(
            JobOutcome::Failed { message: "second".into() },
            Utc::now(),
        );
        assert!(!again);
        assert_eq!(job.error_message(), Some("boom"));
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let mut job = new_job();
        job.mark_processing(Utc::now());
        job.finish(
            JobOutcome::Completed(CompletedJob {
                result_path: PathBuf::from("/tmp/talk.srt"),
                file_size_mb: 1.5,
                word_count: 3,
                language: "en".into(),
            }),
            Utc::now(),
        );

        let json = serde_json::to_value(JobStatusView::new(&job, -1)).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["queuePosition"], -1);
        assert_eq!(json["wordCount"], 3);
        assert_eq!(json["outputFormat"], "srt");
        assert!(json.get("errorMessage").is_none());
        assert_eq!(json["downloadUrl"], format!("/download/{}", job.id));
    }
}
