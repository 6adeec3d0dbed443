//! # Caption Rendering
//!
//! Turns a word-level transcript into subtitle text. Every recognised word
//! becomes its own caption entry, so the output tracks speech word by word
//! instead of by sentence.
//!
//! ## Supported Formats:
//! - **SRT**: numbered entries, `HH:MM:SS,mmm` timestamps
//! - **ASS**: fixed script header plus one `Dialogue` line per word,
//!   `H:MM:SS.cc` timestamps
//!
//! Rendering is pure: the same word list always produces byte-identical output.

use crate::transcription::Word;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Header written at the top of every ASS file.
const ASS_HEADER: &str = "[Script Info]
ScriptType: v4.00+
PlayResX: 384
PlayResY: 288
ScaledBorderAndShadow: yes

[V4+ Styles]
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding
Style: Default,Arial,20,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,0,0,0,0,100,100,0,0,1,2,0,2,10,10,10,1

[Events]
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text
";

/// Subtitle format requested for a job. Fixed when the job is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionFormat {
    #[default]
    Srt,
    Ass,
}

impl CaptionFormat {
    /// File extension used for rendered artifacts (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            CaptionFormat::Srt => "srt",
            CaptionFormat::Ass => "ass",
        }
    }

    /// MIME type sent with downloads.
    pub fn content_type(&self) -> &'static str {
        match self {
            CaptionFormat::Srt => "application/x-subrip",
            CaptionFormat::Ass => "text/x-ssa",
        }
    }
}

impl std::str::FromStr for CaptionFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "srt" => Ok(CaptionFormat::Srt),
            "ass" => Ok(CaptionFormat::Ass),
            other => Err(anyhow::anyhow!("Unknown caption format: {}", other)),
        }
    }
}

impl fmt::Display for CaptionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Render `words` in the requested format.
pub fn render(format: CaptionFormat, words: &[Word]) -> String {
    match format {
        CaptionFormat::Srt => render_srt(words),
        CaptionFormat::Ass => render_ass(words),
    }
}

/// Render one SRT entry per word.
///
/// Each entry is `index\nstart --> end\ntext\n` followed by a blank line,
/// with indices starting at 1.
pub fn render_srt(words: &[Word]) -> String {
    let mut out = String::with_capacity(words.len() * 48);
    for (index, word) in words.iter().enumerate() {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            srt_timestamp(word.start),
            srt_timestamp(word.end),
            word.text
        );
    }
    out
}

/// Render the ASS header followed by one `Dialogue` line per word.
pub fn render_ass(words: &[Word]) -> String {
    let mut out = String::with_capacity(ASS_HEADER.len() + words.len() * 64);
    out.push_str(ASS_HEADER);
    for word in words {
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}",
            ass_timestamp(word.start),
            ass_timestamp(word.end),
            ass_escape(&word.text)
        );
    }
    out
}

/// `HH:MM:SS,mmm`. Negative or non-finite input clamps to zero.
fn srt_timestamp(seconds: f64) -> String {
    let total_ms = to_units(seconds, 1000.0);
    let (hours, minutes, secs) = split_hms(total_ms / 1000);
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, total_ms % 1000)
}

/// `H:MM:SS.cc` (centiseconds).
fn ass_timestamp(seconds: f64) -> String {
    let total_cs = to_units(seconds, 100.0);
    let (hours, minutes, secs) = split_hms(total_cs / 100);
    format!("{}:{:02}:{:02}.{:02}", hours, minutes, secs, total_cs % 100)
}

/// Nearest whole unit. Truncating would render 1.001 s as `00:00:01,000`.
fn to_units(seconds: f64, per_second: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * per_second).round() as u64
}

fn split_hms(total_secs: u64) -> (u64, u64, u64) {
    (total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60)
}

/// ASS treats `{` as an override block and a raw newline ends the event line.
fn ass_escape(text: &str) -> String {
    text.replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> Word {
        Word {
            text: text.to_string(),
            start,
            end,
            probability: None,
        }
    }

    fn sample() -> Vec<Word> {
        vec![
            word("hi", 0.0, 0.4),
            word("there", 0.4, 0.9),
            word("!", 0.9, 1.0),
        ]
    }

    #[test]
    fn test_srt_three_word_transcript() {
        let srt = render_srt(&sample());
        let expected = "1\n00:00:00,000 --> 00:00:00,400\nhi\n\n\
                        2\n00:00:00,400 --> 00:00:00,900\nthere\n\n\
                        3\n00:00:00,900 --> 00:00:01,000\n!\n\n";
        assert_eq!(srt, expected);
    }

    #[test]
    fn test_ass_dialogue_lines() {
        let ass = render_ass(&sample());
        assert!(ass.starts_with("[Script Info]\n"));
        assert!(ass.contains("Style: Default,Arial,20"));

        let dialogues: Vec<&str> = ass.lines().filter(|l| l.starts_with("Dialogue:")).collect();
        assert_eq!(dialogues.len(), 3);
        assert_eq!(dialogues[0], "Dialogue: 0,0:00:00.00,0:00:00.40,Default,,0,0,0,,hi");
        assert_eq!(dialogues[2], "Dialogue: 0,0:00:00.90,0:00:01.00,Default,,0,0,0,,!");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let words = sample();
        assert_eq!(render_srt(&words), render_srt(&words));
        assert_eq!(render_ass(&words), render_ass(&words));
    }

    #[test]
    fn test_timestamps_past_one_hour() {
        assert_eq!(srt_timestamp(3723.456), "01:02:03,456");
        assert_eq!(srt_timestamp(-1.0), "00:00:00,000");
    }

    #[test]
    fn test_timestamps_round_to_nearest_unit() {
        assert_eq!(srt_timestamp(1.001), "00:00:01,001");
        assert_eq!(srt_timestamp(59.9996), "00:01:00,000");
        assert_eq!(ass_timestamp(3723.456), "1:02:03.46");
        assert_eq!(ass_timestamp(0.004), "0:00:00.00");
    }

    #[test]
    fn test_empty_transcript() {
        assert_eq!(render_srt(&[]), "");
        assert_eq!(render_ass(&[]), ASS_HEADER);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("SRT".parse::<CaptionFormat>().unwrap(), CaptionFormat::Srt);
        assert_eq!(" ass ".parse::<CaptionFormat>().unwrap(), CaptionFormat::Ass);
        assert!("vtt".parse::<CaptionFormat>().is_err());
        assert_eq!(CaptionFormat::Ass.extension(), "ass");
    }
}
