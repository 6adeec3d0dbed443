//! # Transcription Engine Interface
//!
//! The speech model is an external collaborator. The job worker only needs one
//! blocking call: give it an audio file, get back recognised words with
//! timestamps. Anything that can do that implements [`Transcriber`].
//!
//! ## Contract:
//! - The call may take minutes and use a lot of memory; callers must run it
//!   off the async runtime and never hold locks across it.
//! - Word timestamps are seconds from the start of the audio.
//! - Errors are returned, never panicked; the worker still guards against
//!   panics from misbehaving implementations.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single recognised word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Model confidence for this word, when the engine reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f32>,
}

/// Result of transcribing one audio file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub words: Vec<Word>,
    /// Detected (or forced) language code, e.g. "en".
    #[serde(default)]
    pub language: String,
    /// Audio duration in seconds.
    #[serde(default)]
    pub duration: f64,
}

impl Transcript {
    /// Trim whitespace around words and drop entries that end up empty.
    ///
    /// Engines commonly emit words with a leading space (" hello").
    pub fn normalized(mut self) -> Self {
        self.words = self
            .words
            .into_iter()
            .filter_map(|mut word| {
                let trimmed = word.text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                if trimmed.len() != word.text.len() {
                    word.text = trimmed.to_string();
                }
                Some(word)
            })
            .collect();
        self
    }
}

/// Per-job options forwarded to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscribeOptions {
    /// Voice activity detection preference. Its effect is up to the engine.
    pub use_vad: bool,
    /// Language hint (ISO 639-1). `None` lets the engine detect it.
    pub language: Option<String>,
}

/// Blocking speech-to-text backend.
pub trait Transcriber: Send + Sync {
    /// Short name used in logs and `/health`.
    fn name(&self) -> &str;

    /// Transcribe the audio file at `audio` into word-level timestamps.
    fn transcribe(&self, audio: &Path, options: &TranscribeOptions) -> Result<Transcript>;
}
