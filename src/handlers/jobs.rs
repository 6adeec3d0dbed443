//! HTTP handlers for the caption job API.
//!
//! These are thin: they parse and validate the request, stream uploads to disk,
//! and call into [`JobManager`](crate::jobs::JobManager). All job state lives
//! in the manager.

use crate::captions::CaptionFormat;
use crate::error::{AppError, AppResult};
use crate::jobs::files::{download_name, sanitize_filename};
use crate::jobs::{JobId, JobStatus, NewJob};
use crate::state::AppState;
use actix_multipart::{Field, Multipart};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Longest accepted value for a non-file form field.
const MAX_FIELD_BYTES: usize = 1024;

/// Form options that accompany an upload.
#[derive(Debug, Clone, PartialEq)]
struct UploadOptions {
    format: CaptionFormat,
    use_vad: bool,
    language: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            format: CaptionFormat::Srt,
            use_vad: true,
            language: None,
        }
    }
}

impl UploadOptions {
    fn apply(&mut self, name: &str, value: &str) -> AppResult<()> {
        match name {
            "format" => {
                self.format = value.parse().map_err(|_| {
                    AppError::ValidationError(format!(
                        "Unsupported format '{}'; expected 'srt' or 'ass'",
                        value.trim()
                    ))
                })?;
            }
            "use_vad" => self.use_vad = parse_bool(value)?,
            "language" => self.language = parse_language(value)?,
            _ => {}
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(AppError::ValidationError(format!(
            "use_vad must be a boolean, got '{}'",
            other
        ))),
    }
}

/// Language hints look like `en` or `pt-BR`. Blank means "detect".
fn parse_language(value: &str) -> AppResult<Option<String>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let valid = value.len() <= 16 && value.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
    if !valid {
        return Err(AppError::ValidationError(format!(
            "'{}' is not a valid language code",
            value
        )));
    }
    Ok(Some(value.to_string()))
}

/// An upload being written to disk. Deleted on drop unless kept.
struct PartialUpload {
    path: PathBuf,
    armed: bool,
}

impl PartialUpload {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Hand the file over; it will no longer be deleted.
    fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialUpload {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = std::fs::remove_file(&self.path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %err, "Failed to remove partial upload");
                }
            }
        }
    }
}

/// Stream a multipart field into `path`, failing once it exceeds `max_bytes`.
async fn stream_to_disk(field: &mut Field, path: &Path, max_bytes: u64) -> AppResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Upload exceeds the {} MB limit",
                max_bytes / (1024 * 1024)
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn read_text_field(field: &mut Field, name: &str) -> AppResult<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if bytes.len() + chunk.len() > MAX_FIELD_BYTES {
            return Err(AppError::ValidationError(format!("Field '{}' is too long", name)));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes)
        .map_err(|_| AppError::ValidationError(format!("Field '{}' is not valid UTF-8", name)))
}

/// Accept a media upload and queue a caption job for it.
///
/// ## Endpoint: `POST /upload`
///
/// ## Request:
/// Multipart form data:
/// - `file`: the media file (required)
/// - `format`: `srt` or `ass` (default `srt`)
/// - `use_vad`: boolean (default `true`)
/// - `language`: optional language hint, e.g. `en`
///
/// ## Response:
/// ```json
/// { "jobId": "5f0c...", "status": "waiting", "queuePosition": 3 }
/// ```
///
/// The file is streamed to disk chunk by chunk. On any input error the
/// partial file is removed and no job is created.
pub async fn upload(state: web::Data<AppState>, mut payload: Multipart) -> AppResult<HttpResponse> {
    let _tracking = state.track_upload();
    let job_id = JobId::generate();
    let max_bytes = state.config.max_upload_bytes();

    let mut options = UploadOptions::default();
    let mut stored: Option<(String, PartialUpload, u64)> = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let (name, raw_filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().unwrap_or_default().to_string(),
                cd.get_filename().map(str::to_string),
            ),
            None => (String::new(), None),
        };

        match name.as_str() {
            "file" => {
                if stored.is_some() {
                    return Err(AppError::BadRequest(
                        "Only one file may be uploaded per request".to_string(),
                    ));
                }
                let raw_filename = raw_filename.unwrap_or_default();
                if raw_filename.trim().is_empty() {
                    return Err(AppError::BadRequest("No selected file".to_string()));
                }
                let filename = sanitize_filename(&raw_filename).ok_or_else(|| {
                    AppError::BadRequest("Filename has no usable characters".to_string())
                })?;

                let upload = PartialUpload::new(state.jobs.paths().upload_path(&job_id, &filename));
                let size = stream_to_disk(&mut field, upload.path(), max_bytes).await?;
                if size == 0 {
                    return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
                }
                debug!(job_id = %job_id, filename = %filename, size_bytes = size, "Upload stored");
                stored = Some((filename, upload, size));
            }
            "format" | "use_vad" | "language" => {
                let value = read_text_field(&mut field, &name).await?;
                options.apply(&name, &value)?;
            }
            _ => {
                // Unknown fields are drained and ignored.
                while let Some(chunk) = field.next().await {
                    chunk?;
                }
            }
        }
    }

    let (filename, upload, size) =
        stored.ok_or_else(|| AppError::BadRequest("No file part in the request".to_string()))?;

    let new_job = NewJob {
        id: job_id,
        filename,
        source_path: upload.keep(),
        output_format: options.format,
        use_vad: options.use_vad,
        language: options.language,
    };
    let jobs = state.jobs.clone();
    let ticket = web::block(move || jobs.create_job(new_job)).await?;

    info!(
        job_id = %ticket.job_id,
        size_bytes = size,
        queue_position = ticket.queue_position,
        "Upload accepted"
    );
    Ok(HttpResponse::Ok().json(ticket))
}

/// ## Endpoint: `GET /status/{job_id}`
pub async fn job_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = JobId::from(path.into_inner());
    let view = state
        .jobs
        .get_status(&id)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
    Ok(HttpResponse::Ok().json(view))
}

/// ## Endpoint: `GET /jobs`
///
/// All resident jobs, oldest first.
pub async fn list_jobs(state: web::Data<AppState>) -> HttpResponse {
    let jobs = state.jobs.list_jobs();
    HttpResponse::Ok().json(json!({
        "count": jobs.len(),
        "jobs": jobs
    }))
}

/// Send a completed job's captions as an attachment.
///
/// ## Endpoint: `GET /download/{job_id}`
///
/// - 404 if the job is unknown or its caption file is gone
/// - 400 if the job hasn't completed
pub async fn download(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = JobId::from(path.into_inner());
    let job = state
        .jobs
        .get_job(&id)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

    if job.status != JobStatus::Completed {
        return Err(AppError::BadRequest(format!(
            "Job {} is not completed (status: {})",
            id,
            job.status.as_str()
        )));
    }

    let result_path = job
        .result_path()
        .cloned()
        .ok_or_else(|| AppError::NotFound("Caption file not found".to_string()))?;
    let body = match tokio::fs::read(&result_path).await {
        Ok(body) => body,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("Caption file not found".to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    let disposition = ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(download_name(
            &job.filename,
            job.output_format,
        ))],
    };

    Ok(HttpResponse::Ok()
        .content_type(job.output_format.content_type())
        .insert_header(disposition)
        .body(body))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub older_than_hours: Option<u64>,
}

/// Evict old jobs now.
///
/// ## Endpoint: `POST /cleanup`
///
/// Optional JSON body `{ "olderThanHours": 0 }`; without it the configured
/// retention horizon is used. `0` removes every job that isn't processing.
pub async fn cleanup(
    state: web::Data<AppState>,
    body: Option<web::Json<CleanupRequest>>,
) -> AppResult<HttpResponse> {
    let older_than_hours = body
        .and_then(|body| body.into_inner().older_than_hours)
        .unwrap_or(state.config.jobs.max_job_age_hours);

    let jobs = state.jobs.clone();
    let removed = web::block(move || jobs.cleanup_older_than(older_than_hours)).await?;

    Ok(HttpResponse::Ok().json(json!({
        "removed": removed,
        "olderThanHours": older_than_hours
    })))
}
