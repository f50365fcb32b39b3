//! Two-host dialogue model: speakers, tones, and utterances.
//!
//! An utterance is one sentence bound to one speaker and one tone; it is the
//! unit of speech synthesis. Tone tags outside the closed set but inside the
//! historical synonym set are preserved verbatim on the utterance and ignored
//! by synthesis.

use crate::text;
use serde::{Deserialize, Serialize};

/// The documented closed tone set.
pub const CLOSED_TONES: &[&str] = &[
    "upbeat",
    "calm",
    "excited",
    "reflective",
    "suspenseful",
    "skeptical",
    "humorous",
    "serious",
    "curious",
    "confident",
];

/// Historical synonyms the parser accepts but never normalises.
pub const TONE_SYNONYMS: &[&str] = &["sad", "hopeful", "empathetic", "angry"];

/// Whether a lowercase tag is an acceptable tone.
pub fn is_known_tone(tone: &str) -> bool {
    CLOSED_TONES.contains(&tone) || TONE_SYNONYMS.contains(&tone)
}

/// One of the two episode hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Host1,
    Host2,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Host1 => "Host 1",
            Self::Host2 => "Host 2",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Host1 => Self::Host2,
            Self::Host2 => Self::Host1,
        }
    }
}

/// A single sentence bound to a speaker and a tone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    /// Position in the episode-wide sequence
    pub index: usize,
    pub speaker: Speaker,
    pub tone: String,
    pub text: String,
    /// Spoken words in `text`
    pub word_count: usize,
    /// Estimated seconds of speech at 150 wpm
    pub estimated_seconds: f64,
}

impl Utterance {
    pub fn new(index: usize, speaker: Speaker, tone: impl Into<String>, text: String) -> Self {
        let word_count = text::count_words(&text);
        Self {
            index,
            speaker,
            tone: tone.into(),
            text,
            word_count,
            // 150 words per minute = 2.5 words per second
            estimated_seconds: word_count as f64 / 2.5,
        }
    }
}

/// Split a `**Host N:** rest` dialogue line into its speaker and remainder.
pub fn split_host_line(line: &str) -> Option<(Speaker, &str)> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix("**Host ")?;
    let speaker = match rest.chars().next()? {
        '1' => Speaker::Host1,
        '2' => Speaker::Host2,
        _ => return None,
    };
    let rest = rest[1..].strip_prefix(":**")?;
    Some((speaker, rest.trim_start()))
}

/// The spoken portion of a line, if it is a dialogue line: the text after the
/// host label with all bracketed content removed.
pub fn spoken_text(line: &str) -> Option<String> {
    let (_, rest) = split_host_line(line)?;
    Some(text::strip_bracketed(rest))
}

/// Count spoken words across a dialogue document. Only `**Host N:**` lines
/// contribute; tone tags, labels, and punctuation do not.
pub fn count_spoken_words(script: &str) -> usize {
    script
        .lines()
        .filter_map(spoken_text)
        .map(|spoken| text::count_words(&spoken))
        .sum()
}
