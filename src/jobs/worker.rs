//! # Worker Loop
//!
//! The single background consumer of the work queue. It runs on a dedicated OS
//! thread because every step it performs blocks: ffmpeg, the speech model and
//! file writes.
//!
//! ## Per-job steps:
//! 1. Extract audio from the source into `{temp_dir}/{job_id}.wav`
//! 2. Transcribe the audio
//! 3. Render captions in the requested format
//! 4. Write the caption file into the result directory
//!
//! Any failure (or panic) in those steps becomes [`JobOutcome::Failed`] on the
//! job record; the loop itself keeps going. The temporary audio file is removed
//! after every job regardless of outcome.

use crate::audio::AudioExtractor;
use crate::captions;
use crate::jobs::files::{remove_if_exists, StoragePaths};
use crate::jobs::manager::Shared;
use crate::jobs::model::{CompletedJob, Job, JobOutcome};
use crate::transcription::{TranscribeOptions, Transcriber};
use anyhow::{Context, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Runs one job at a time against the injected collaborators.
pub struct JobWorker {
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    paths: StoragePaths,
}

impl JobWorker {
    pub fn new(
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
        paths: StoragePaths,
    ) -> Self {
        Self {
            extractor,
            transcriber,
            paths,
        }
    }

    /// Process a job end to end. Never panics and never leaves temp audio behind.
    pub fn process(&self, job: &Job) -> JobOutcome {
        let started = Instant::now();
        let temp_audio = self.paths.temp_audio_path(&job.id);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_steps(job, &temp_audio)));

        match remove_if_exists(&temp_audio) {
            Ok(true) => debug!(job_id = %job.id, "Removed temporary audio"),
            Ok(false) => {}
            Err(err) => warn!(job_id = %job.id, error = %err, "Failed to remove temporary audio"),
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(Ok(done)) => {
                info!(
                    job_id = %job.id,
                    words = done.word_count,
                    language = %done.language,
                    elapsed_ms,
                    "Job completed"
                );
                JobOutcome::Completed(done)
            }
            Ok(Err(err)) => {
                let message = format!("{:#}", err);
                warn!(job_id = %job.id, error = %message, elapsed_ms, "Job failed");
                JobOutcome::Failed { message }
            }
            Err(payload) => {
                let message = format!("processing panicked: {}", panic_message(payload.as_ref()));
                error!(job_id = %job.id, error = %message, "Job panicked");
                JobOutcome::Failed { message }
            }
        }
    }

    fn run_steps(&self, job: &Job, temp_audio: &Path) -> Result<CompletedJob> {
        info!(job_id = %job.id, filename = %job.filename, format = %job.output_format, "Processing job");

        let audio = self
            .extractor
            .extract(&job.filepath, temp_audio)
            .context("audio extraction failed")?;

        let source_bytes = std::fs::metadata(&job.filepath)
            .map(|meta| meta.len())
            .context("source media disappeared during processing")?;

        let options = TranscribeOptions {
            use_vad: job.use_vad,
            language: job.language_hint.clone(),
        };
        debug!(job_id = %job.id, engine = self.transcriber.name(), use_vad = options.use_vad, "Transcribing");
        let transcript = self
            .transcriber
            .transcribe(&audio, &options)
            .context("transcription failed")?
            .normalized();

        let rendered = captions::render(job.output_format, &transcript.words);
        let result_path = self
            .paths
            .result_path(&job.filename, &job.id, job.output_format);

        if let Err(err) = std::fs::write(&result_path, rendered) {
            let _ = remove_if_exists(&result_path);
            return Err(err).context("failed to write caption file");
        }

        Ok(CompletedJob {
            result_path,
            file_size_mb: (source_bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0,
            word_count: transcript.words.len(),
            language: transcript.language,
        })
    }
}

/// Body of the worker thread. Returns once shutdown is requested.
///
/// Shutdown is checked between jobs and on every dequeue timeout, so a stop
/// request is observed within `poll_interval` when idle.
pub(crate) fn run_loop(shared: Arc<Shared>, worker: Arc<JobWorker>, poll_interval: Duration) {
    info!(poll_ms = poll_interval.as_millis() as u64, "Job worker started");

    while !shared.is_shutting_down() {
        let Some(job) = shared.next_job(poll_interval) else {
            continue;
        };
        let outcome = worker.process(&job);
        shared.finish(&job.id, outcome);
    }

    info!("Job worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::captions::CaptionFormat;
    use crate::jobs::model::{JobId, NewJob};
    use crate::transcription::{Transcript, Word};
    use anyhow::anyhow;
    use chrono::Utc;
    use std::path::PathBuf;

    /// Copies the source to the output path; fails when the source is gone.
    pub(crate) struct CopyExtractor;

    impl AudioExtractor for CopyExtractor {
        fn extract(&self, input: &Path, output: &Path) -> Result<PathBuf> {
            if !input.is_file() {
                return Err(anyhow!("source media is missing"));
            }
            std::fs::copy(input, output)?;
            Ok(output.to_path_buf())
        }
    }

    /// Returns a fixed transcript, or fails when `fail` is set.
    pub(crate) struct FixedTranscriber {
        pub words: Vec<Word>,
        pub fail: bool,
    }

    impl FixedTranscriber {
        pub(crate) fn scenario_a() -> Self {
            Self {
                words: scenario_a_words(),
                fail: false,
            }
        }
    }

    impl Transcriber for FixedTranscriber {
        fn name(&self) -> &str {
            "fixed"
        }

        fn transcribe(&self, audio: &Path, _options: &TranscribeOptions) -> Result<Transcript> {
            assert!(audio.is_file(), "temp audio should exist while transcribing");
            if self.fail {
                return Err(anyhow!("model ran out of memory"));
            }
            Ok(Transcript {
                words: self.words.clone(),
                language: "en".to_string(),
                duration: 1.0,
            })
        }
    }

    struct PanickingTranscriber;

    impl Transcriber for PanickingTranscriber {
        fn name(&self) -> &str {
            "panics"
        }

        fn transcribe(&self, _audio: &Path, _options: &TranscribeOptions) -> Result<Transcript> {
            panic!("tensor shape mismatch");
        }
    }

    pub(crate) fn scenario_a_words() -> Vec<Word> {
        [("hi", 0.0, 0.4), ("there", 0.4, 0.9), ("!", 0.9, 1.0)]
            .into_iter()
            .map(|(text, start, end)| Word {
                text: text.to_string(),
                start,
                end,
                probability: None,
            })
            .collect()
    }

    fn setup(transcriber: Arc<dyn Transcriber>) -> (tempfile::TempDir, JobWorker, Job) {
        let dir = tempfile::tempdir().unwrap();
        let paths = StoragePaths::under(dir.path());
        paths.ensure_dirs().unwrap();

        let id = JobId::generate();
        let source = paths.upload_path(&id, "talk.mp4");
        std::fs::write(&source, vec![0u8; 2048]).unwrap();

        let mut job = Job::new(
            NewJob {
                id,
                filename: "talk.mp4".into(),
                source_path: source,
                output_format: CaptionFormat::Srt,
                use_vad: true,
                language: None,
            },
            Utc::now(),
        );
        job.mark_processing(Utc::now());

        let worker = JobWorker::new(Arc::new(CopyExtractor), transcriber, paths);
        (dir, worker, job)
    }

    #[test]
    fn test_successful_job_writes_captions() {
        let (_dir, worker, job) = setup(Arc::new(FixedTranscriber::scenario_a()));

        let JobOutcome::Completed(done) = worker.process(&job) else {
            panic!("expected completion");
        };
        assert_eq!(done.word_count, 3);
        assert_eq!(done.language, "en");
        assert!(done.result_path.ends_with(format!("talk_{}.srt", job.id)));

        let srt = std::fs::read_to_string(&done.result_path).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:00,400\nhi\n\n"));
        assert!(!worker.paths.temp_audio_path(&job.id).exists());
    }

    #[test]
    fn test_transcription_failure_removes_temp_audio() {
        let transcriber = FixedTranscriber {
            words: Vec::new(),
            fail: true,
        };
        let (_dir, worker, job) = setup(Arc::new(transcriber));

        let outcome = worker.process(&job);
        let JobOutcome::Failed { message } = outcome else {
            panic!("expected failure");
        };
        assert!(message.contains("transcription failed"));
        assert!(message.contains("out of memory"));
        assert!(!worker.paths.temp_audio_path(&job.id).exists());
    }

    #[test]
    fn test_panic_becomes_failure() {
        let (_dir, worker, job) = setup(Arc::new(PanickingTranscriber));

        let JobOutcome::Failed { message } = worker.process(&job) else {
            panic!("expected failure");
        };
        assert!(message.contains("tensor shape mismatch"));
        assert!(!worker.paths.temp_audio_path(&job.id).exists());
    }

    #[test]
    fn test_missing_source_fails_cleanly() {
        let (_dir, worker, job) = setup(Arc::new(FixedTranscriber::scenario_a()));
        std::fs::remove_file(&job.filepath).unwrap();

        let JobOutcome::Failed { message } = worker.process(&job) else {
            panic!("expected failure");
        };
        assert!(message.starts_with("audio extraction failed"));
    }
}
