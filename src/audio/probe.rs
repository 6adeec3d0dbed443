//! # WAV Header Probing
//!
//! Reads just enough of a RIFF/WAVE file to tell whether the extractor produced
//! audio the speech model can consume. Only the header chunks are read, so
//! probing a multi-gigabyte file costs a few hundred bytes of I/O.
//!
//! ## Expected format:
//! - **Sample Rate**: configured rate (16kHz by default)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono

use anyhow::{anyhow, bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Format information from a WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Size of the `data` chunk in bytes.
    pub data_bytes: u64,
}

impl WavInfo {
    /// Audio duration in seconds derived from the data chunk size.
    pub fn duration_secs(&self) -> f64 {
        let bytes_per_second =
            self.sample_rate as u64 * self.channels as u64 * (self.bits_per_sample as u64 / 8);
        if bytes_per_second == 0 {
            return 0.0;
        }
        self.data_bytes as f64 / bytes_per_second as f64
    }

    /// Check that the audio is 16-bit mono PCM at `expected_rate`.
    pub fn validate_for_transcription(&self, expected_rate: u32) -> Result<()> {
        if self.format_tag != WAVE_FORMAT_PCM && self.format_tag != WAVE_FORMAT_EXTENSIBLE {
            bail!("unsupported WAV encoding (format tag {:#06x})", self.format_tag);
        }
        if self.sample_rate != expected_rate {
            bail!("sample rate mismatch: expected {}, got {}", expected_rate, self.sample_rate);
        }
        if self.channels != 1 {
            bail!("channel count mismatch: expected 1, got {}", self.channels);
        }
        if self.bits_per_sample != 16 {
            bail!("bit depth mismatch: expected 16, got {}", self.bits_per_sample);
        }
        if self.data_bytes == 0 {
            bail!("extracted audio contains no samples");
        }
        Ok(())
    }
}

/// Read the `fmt ` and `data` chunk headers of the WAV file at `path`.
pub fn probe_wav(path: &Path) -> Result<WavInfo> {
    let file = File::open(path).with_context(|| format!("cannot open {}", display_name(path)))?;
    read_wav_header(BufReader::new(file))
}

fn read_wav_header<R: Read + Seek>(mut reader: R) -> Result<WavInfo> {
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag).context("file too short for a RIFF header")?;
    if &tag != b"RIFF" {
        bail!("not a RIFF file");
    }
    let _riff_size = reader.read_u32::<LittleEndian>()?;
    reader.read_exact(&mut tag)?;
    if &tag != b"WAVE" {
        bail!("RIFF file is not WAVE audio");
    }

    let mut format: Option<(u16, u16, u32, u16)> = None;
    loop {
        if reader.read_exact(&mut tag).is_err() {
            break;
        }
        let chunk_size = reader.read_u32::<LittleEndian>()? as u64;
        match &tag {
            b"fmt " => {
                if chunk_size < 16 {
                    bail!("fmt chunk too small ({} bytes)", chunk_size);
                }
                let format_tag = reader.read_u16::<LittleEndian>()?;
                let channels = reader.read_u16::<LittleEndian>()?;
                let sample_rate = reader.read_u32::<LittleEndian>()?;
                let _byte_rate = reader.read_u32::<LittleEndian>()?;
                let _block_align = reader.read_u16::<LittleEndian>()?;
                let bits_per_sample = reader.read_u16::<LittleEndian>()?;
                format = Some((format_tag, channels, sample_rate, bits_per_sample));
                skip(&mut reader, padded(chunk_size) - 16)?;
            }
            b"data" => {
                let (format_tag, channels, sample_rate, bits_per_sample) =
                    format.ok_or_else(|| anyhow!("data chunk appears before fmt chunk"))?;
                return Ok(WavInfo {
                    format_tag,
                    channels,
                    sample_rate,
                    bits_per_sample,
                    data_bytes: chunk_size,
                });
            }
            _ => skip(&mut reader, padded(chunk_size))?,
        }
    }

    Err(anyhow!("WAV file has no data chunk"))
}

/// RIFF chunks are word aligned.
fn padded(size: u64) -> u64 {
    size + (size & 1)
}

fn skip<R: Seek>(reader: &mut R, bytes: u64) -> Result<()> {
    if bytes > 0 {
        reader.seek(SeekFrom::Current(bytes as i64))?;
    }
    Ok(())
}

/// File name only, so errors stored on jobs don't expose server paths.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<unnamed>".to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build a minimal PCM WAV file with `samples` zeroed 16-bit samples.
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, samples: u32) -> Vec<u8> {
        let data_bytes = samples * channels as u32 * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_bytes).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_bytes.to_le_bytes());
        out.resize(out.len() + data_bytes as usize, 0);
        out
    }

    #[test]
    fn test_reads_pcm_header() {
        let info = read_wav_header(Cursor::new(wav_bytes(16000, 1, 32000))).unwrap();
        assert_eq!(info.sample_rate, 16000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.data_bytes, 64000);
        assert!((info.duration_secs() - 2.0).abs() < f64::EPSILON);
        assert!(info.validate_for_transcription(16000).is_ok());
    }

    #[test]
    fn test_skips_unknown_chunks() {
        let mut bytes = wav_bytes(16000, 1, 10);
        // Insert an odd-sized LIST chunk between fmt and data.
        let list = [b"LIST".as_slice(), &3u32.to_le_bytes(), b"abc\0"].concat();
        bytes.splice(36..36, list);
        let info = read_wav_header(Cursor::new(bytes)).unwrap();
        assert_eq!(info.data_bytes, 20);
    }

    #[test]
    fn test_rejects_stereo_and_wrong_rate() {
        let stereo = read_wav_header(Cursor::new(wav_bytes(16000, 2, 10))).unwrap();
        assert!(stereo.validate_for_transcription(16000).is_err());

        let fast = read_wav_header(Cursor::new(wav_bytes(44100, 1, 10))).unwrap();
        assert!(fast.validate_for_transcription(16000).is_err());
    }

    #[test]
    fn test_rejects_non_wav_input() {
        assert!(read_wav_header(Cursor::new(b"ID3\x03 not audio".to_vec())).is_err());
        assert!(read_wav_header(Cursor::new(Vec::new())).is_err());
    }
}
