//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_JOBS__MAX_JOBS_IN_MEMORY`, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys are separated by a double underscore because several field
//! names contain single underscores.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each group maps to one concern (HTTP server, disk layout, job queue
/// limits, audio extraction, speech model) so it can be overridden on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub jobs: JobsConfig,
    pub upload: UploadConfig,
    pub extraction: ExtractionConfig,
    pub transcription: TranscriptionConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where uploads, extracted audio and rendered captions live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Uploaded source media, named `{job_id}_{filename}`
    pub upload_dir: PathBuf,
    /// Extracted audio; files here never outlive their job's processing
    pub temp_dir: PathBuf,
    /// Rendered caption files
    pub result_dir: PathBuf,
}

/// Job queue limits.
///
/// ## Fields:
/// - `max_jobs_in_memory`: Resident job records before the oldest are evicted
/// - `max_job_age_hours`: Retention horizon; older jobs are evicted with their files
/// - `poll_interval_ms`: How long the worker waits for work before re-checking shutdown
/// - `stop_timeout_secs`: How long shutdown waits for the in-flight job
/// - `cleanup_interval_minutes`: Period of the background retention sweep (0 disables it)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub max_jobs_in_memory: usize,
    pub max_job_age_hours: u64,
    pub poll_interval_ms: u64,
    pub stop_timeout_secs: u64,
    pub cleanup_interval_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted upload, in megabytes
    pub max_upload_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub ffmpeg_path: String,
    pub sample_rate: u32,
}

/// External speech model invocation.
///
/// ## Fields:
/// - `command`: Program that prints a JSON word-level transcript on stdout
/// - `args`: Extra arguments placed before the generated flags
/// - `model`: Model name passed as `--model`
/// - `default_language`: Language hint used when a job doesn't give one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub model: String,
    #[serde(default)]
    pub default_language: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("data/uploads"),
                temp_dir: PathBuf::from("data/tmp"),
                result_dir: PathBuf::from("data/results"),
            },
            jobs: JobsConfig {
                max_jobs_in_memory: 50,
                max_job_age_hours: 24,
                poll_interval_ms: 500,
                stop_timeout_secs: 30,
                cleanup_interval_minutes: 30,
            },
            upload: UploadConfig {
                max_upload_mb: 4096,
            },
            extraction: ExtractionConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                sample_rate: 16000,
            },
            transcription: TranscriptionConfig {
                command: "whisper-transcribe".to_string(),
                args: Vec::new(),
                model: "large-v3".to_string(),
                default_language: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_JOBS__MAX_JOBS_IN_MEMORY=20`: Override the registry bound
    /// - `APP_TRANSCRIPTION__MODEL=medium`: Override the speech model
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        // One slot is always held by the job being processed, which is never evicted.
        if self.jobs.max_jobs_in_memory < 2 {
            return Err(anyhow::anyhow!("max_jobs_in_memory must be at least 2"));
        }

        if self.jobs.poll_interval_ms == 0 || self.jobs.poll_interval_ms > 1000 {
            return Err(anyhow::anyhow!("poll_interval_ms must be between 1 and 1000"));
        }

        if self.upload.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("max_upload_mb must be greater than 0"));
        }

        if self.extraction.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rate must be greater than 0"));
        }

        if self.transcription.command.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcription command cannot be empty"));
        }

        let storage = &self.storage;
        for (name, dir) in [
            ("upload_dir", &storage.upload_dir),
            ("temp_dir", &storage.temp_dir),
            ("result_dir", &storage.result_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(anyhow::anyhow!("storage.{} cannot be empty", name));
            }
        }

        Ok(())
    }

    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.upload.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
