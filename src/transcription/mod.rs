//! # Transcription Module
//!
//! Speech-to-text is delegated to an external inference program. This module
//! defines the narrow interface the job worker depends on and the default
//! implementation that drives the program as a subprocess.
//!
//! ## Key Components:
//! - **engine**: the [`Transcriber`] trait and transcript types
//! - **command**: [`CommandTranscriber`], which runs the configured program and
//!   reads a JSON transcript from its stdout

pub mod command;
pub mod engine;

pub use command::CommandTranscriber;
pub use engine::{TranscribeOptions, Transcriber, Transcript, Word};
