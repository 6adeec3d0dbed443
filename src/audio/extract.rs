//! Audio extraction from uploaded media.

use crate::audio::probe::{display_name, probe_wav};
use crate::config::ExtractionConfig;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Turns an uploaded media file into a WAV file the transcriber can read.
///
/// Implementations block until the output file is complete.
pub trait AudioExtractor: Send + Sync {
    fn extract(&self, input: &Path, output: &Path) -> Result<PathBuf>;
}

/// Runs `ffmpeg` to produce 16-bit mono PCM at the configured sample rate.
pub struct FfmpegExtractor {
    ffmpeg_path: String,
    sample_rate: u32,
}

impl FfmpegExtractor {
    pub fn new(ffmpeg_path: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            sample_rate,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(&config.ffmpeg_path, config.sample_rate)
    }
}

impl AudioExtractor for FfmpegExtractor {
    fn extract(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        if !input.is_file() {
            return Err(anyhow!("source media {} is missing", display_name(input)));
        }

        debug!(input = %input.display(), output = %output.display(), "Extracting audio");
        let result = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-ac", "1", "-ar"])
            .arg(self.sample_rate.to_string())
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to launch '{}'", self.ffmpeg_path))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let reason = stderr.lines().last().unwrap_or("no diagnostic output").trim();
            return Err(anyhow!("ffmpeg exited with {}: {}", result.status, reason));
        }

        let info = probe_wav(output).context("ffmpeg produced unreadable audio")?;
        info.validate_for_transcription(self.sample_rate)?;
        debug!(seconds = info.duration_secs(), "Audio extracted");

        Ok(output.to_path_buf())
    }
}
