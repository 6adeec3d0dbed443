//! # Audio Module
//!
//! Gets speech audio out of arbitrary uploaded media.
//!
//! ## Key Components:
//! - **extract**: [`AudioExtractor`] interface and the ffmpeg-backed default
//! - **probe**: WAV header reader used to verify extractor output
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 16kHz (16,000 Hz) unless configured otherwise
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)

pub mod extract;
pub mod probe;

pub use extract::{AudioExtractor, FfmpegExtractor};
