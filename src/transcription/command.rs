//! External-process transcriber.
//!
//! Runs the configured inference program once per job:
//!
//! ```text
//! <command> [args...] --model <model> [--language <code>] --vad <true|false> <audio.wav>
//! ```
//!
//! The program must print a JSON transcript on stdout:
//! `{"words":[{"text","start","end","probability"}],"language","duration"}`.
//! A non-zero exit status is a transcription failure; the tail of stderr is
//! kept in the error message.

use crate::config::TranscriptionConfig;
use crate::transcription::engine::{TranscribeOptions, Transcriber, Transcript};
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, info};

/// How much of stderr ends up in a job's error message.
const STDERR_TAIL_CHARS: usize = 400;

pub struct CommandTranscriber {
    command: String,
    args: Vec<String>,
    model: String,
    default_language: Option<String>,
}

impl CommandTranscriber {
    pub fn new(command: impl Into<String>, args: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args,
            model: model.into(),
            default_language: None,
        }
    }

    pub fn from_config(config: &TranscriptionConfig) -> Self {
        let mut transcriber = Self::new(&config.command, config.args.clone(), &config.model);
        transcriber.default_language = config
            .default_language
            .as_deref()
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .map(str::to_string);
        transcriber
    }

    fn build_command(&self, audio: &Path, options: &TranscribeOptions) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args).arg("--model").arg(&self.model);

        if let Some(language) = options.language.as_ref().or(self.default_language.as_ref()) {
            cmd.arg("--language").arg(language);
        }

        cmd.arg("--vad")
            .arg(if options.use_vad { "true" } else { "false" })
            .arg(audio)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Transcriber for CommandTranscriber {
    fn name(&self) -> &str {
        &self.model
    }

    fn transcribe(&self, audio: &Path, options: &TranscribeOptions) -> Result<Transcript> {
        let started = Instant::now();
        debug!(command = %self.command, model = %self.model, use_vad = options.use_vad, "Running transcriber");

        let output = self
            .build_command(audio, options)
            .output()
            .with_context(|| format!("failed to launch transcriber '{}'", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "transcriber exited with {}: {}",
                output.status,
                tail(stderr.trim(), STDERR_TAIL_CHARS)
            ));
        }

        let mut transcript: Transcript = serde_json::from_slice(&output.stdout)
            .context("transcriber produced invalid JSON")?;
        transcript = transcript.normalized();

        if transcript.language.trim().is_empty() {
            transcript.language = options
                .language
                .clone()
                .or_else(|| self.default_language.clone())
                .unwrap_or_else(|| "unknown".to_string());
        }

        info!(
            words = transcript.words.len(),
            language = %transcript.language,
            audio_seconds = transcript.duration,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcription finished"
        );
        Ok(transcript)
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let start = text.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &text[start..]
}
