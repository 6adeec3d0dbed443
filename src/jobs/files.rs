//! # File Lifecycle
//!
//! Every job owns up to three files: the uploaded source, a temporary WAV
//! produced during processing, and the rendered caption. This module decides
//! where they live and removes them. Removal is idempotent: a file that is
//! already gone counts as removed.

use crate::captions::CaptionFormat;
use crate::config::StorageConfig;
use crate::jobs::model::{Job, JobId};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Longest sanitized filename we keep, in bytes.
const MAX_FILENAME_LEN: usize = 120;

/// Directory layout for job files.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub upload_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub result_dir: PathBuf,
}

impl StoragePaths {
    pub fn new(upload_dir: PathBuf, temp_dir: PathBuf, result_dir: PathBuf) -> Self {
        Self {
            upload_dir,
            temp_dir,
            result_dir,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            config.upload_dir.clone(),
            config.temp_dir.clone(),
            config.result_dir.clone(),
        )
    }

    /// Layout rooted in one directory.
    #[cfg(test)]
    pub fn under(root: &Path) -> Self {
        Self::new(root.join("uploads"), root.join("tmp"), root.join("results"))
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [&self.upload_dir, &self.temp_dir, &self.result_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Delete files left in the temp and upload directories by an earlier run.
    ///
    /// Job records live only in memory, so after a restart nothing can claim
    /// them. Rendered captions are left alone. Returns how many files were removed.
    pub fn purge_leftovers(&self) -> io::Result<usize> {
        let mut removed = 0;
        for dir in [&self.temp_dir, &self.upload_dir] {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() && remove_if_exists(&entry.path())? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// `{upload_dir}/{job_id}_{filename}`. `filename` must already be sanitized.
    pub fn upload_path(&self, id: &JobId, filename: &str) -> PathBuf {
        self.upload_dir.join(format!("{}_{}", id, filename))
    }

    /// `{temp_dir}/{job_id}.wav`
    pub fn temp_audio_path(&self, id: &JobId) -> PathBuf {
        self.temp_dir.join(format!("{}.wav", id))
    }

    /// `{result_dir}/{stem}_{job_id}.{ext}`
    pub fn result_path(&self, filename: &str, id: &JobId, format: CaptionFormat) -> PathBuf {
        self.result_dir
            .join(format!("{}_{}.{}", file_stem(filename), id, format.extension()))
    }
}

/// Name offered to the client when downloading a job's captions.
pub fn download_name(filename: &str, format: CaptionFormat) -> String {
    format!("{}.{}", file_stem(filename), format.extension())
}

/// Filename without its last extension; falls back to "captions".
pub fn file_stem(filename: &str) -> &str {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    if stem.is_empty() {
        "captions"
    } else {
        stem
    }
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_`, and anything outside
/// `[A-Za-z0-9._-]` is removed. Leading dots are stripped so the result can't
/// be hidden or refer to a parent directory. Returns `None` when nothing is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let mut cleaned: String = base
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.len() > MAX_FILENAME_LEN {
        // Keep the extension when truncating.
        let ext = cleaned
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .filter(|ext| ext.len() < 16);
        let keep = MAX_FILENAME_LEN - ext.as_ref().map_or(0, |e| e.len() + 1);
        cleaned.truncate(keep);
        if let Some(ext) = ext {
            cleaned.push('.');
            cleaned.push_str(&ext);
        }
    }

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.' || c == '_') {
        None
    } else {
        Some(cleaned)
    }
}

/// Delete `path` if it exists. Returns whether a file was removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Remove a job's source and result files, logging rather than failing.
pub fn remove_job_files(job: &Job) {
    let result = job.result_path().cloned();
    for path in std::iter::once(job.filepath.clone()).chain(result) {
        match remove_if_exists(&path) {
            Ok(true) => debug!(job_id = %job.id, path = %path.display(), "Removed job file"),
            Ok(false) => debug!(job_id = %job.id, path = %path.display(), "Job file already gone"),
            Err(err) => warn!(job_id = %job.id, path = %path.display(), error = %err, "Failed to remove job file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::NewJob;
    use chrono::Utc;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Talk.mp4").as_deref(), Some("My_Talk.mp4"));
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("C:\\videos\\clip.mov").as_deref(), Some("clip.mov"));
        assert_eq!(sanitize_filename(".hidden.wav").as_deref(), Some("hidden.wav"));
        assert_eq!(sanitize_filename("ビデオ.mp4").as_deref(), Some("mp4"));
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename("/"), None);
    }

    #[test]
    fn test_sanitize_truncates_keeping_extension() {
        let long = format!("{}.mp4", "a".repeat(300));
        let cleaned = sanitize_filename(&long).unwrap();
        assert_eq!(cleaned.len(), MAX_FILENAME_LEN);
        assert!(cleaned.ends_with(".mp4"));
    }

    #[test]
    fn test_paths_carry_job_id() {
        let paths = StoragePaths::new("up".into(), "tmp".into(), "res".into());
        let id = JobId::from("abc");

        assert_eq!(paths.upload_path(&id, "talk.mp4"), PathBuf::from("up/abc_talk.mp4"));
        assert_eq!(paths.temp_audio_path(&id), PathBuf::from("tmp/abc.wav"));
        assert_eq!(
            paths.result_path("talk.final.mp4", &id, CaptionFormat::Ass),
            PathBuf::from("res/talk.final_abc.ass")
        );
        assert_eq!(download_name("noext", CaptionFormat::Srt), "noext.srt");
        assert_eq!(download_name(".mp4", CaptionFormat::Srt), ".mp4.srt");
    }

    #[test]
    fn test_purge_leftovers_spares_results() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StoragePaths::under(dir.path());
        paths.ensure_dirs().unwrap();

        let id = JobId::from("stale");
        std::fs::write(paths.temp_audio_path(&id), b"wav").unwrap();
        std::fs::write(paths.upload_path(&id, "talk.mp4"), b"media").unwrap();
        std::fs::create_dir(paths.upload_dir.join("nested")).unwrap();
        let result = paths.result_path("talk.mp4", &id, CaptionFormat::Srt);
        std::fs::write(&result, b"1\n").unwrap();

        assert_eq!(paths.purge_leftovers().unwrap(), 2);
        assert_eq!(std::fs::read_dir(&paths.temp_dir).unwrap().count(), 0);
        assert!(paths.upload_dir.join("nested").is_dir());
        assert!(result.exists());
        assert_eq!(paths.purge_leftovers().unwrap(), 0);
    }

    #[test]
    fn test_remove_if_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }

    #[test]
    fn test_remove_job_files_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.mp4");
        std::fs::write(&source, b"media").unwrap();

        let job = Job::new(
            NewJob {
                id: JobId::generate(),
                filename: "src.mp4".into(),
                source_path: source.clone(),
                output_format: CaptionFormat::Srt,
                use_vad: false,
                language: None,
            },
            Utc::now(),
        );

        remove_job_files(&job);
        assert!(!source.exists());
        remove_job_files(&job);
    }
}
