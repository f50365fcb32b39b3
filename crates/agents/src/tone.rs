//! Tone annotation stage: per-utterance emotion labels and the sentence
//! split that defines the unit of speech synthesis.
//!
//! The annotated script is parsed with a ladder of strategies, strict first:
//!
//! 1. `**Host N:** [tone] text`, the documented format.
//! 2. `**[tone]** text`, a legacy shape where speakers alternate.
//! 3. Line-oriented host match with the tone inferred from content.
//!
//! Whichever strategy binds speaker and tone to a block of text, the block is
//! then split into sentences so each utterance is exactly one sentence. No
//! strategy silently drops a dialogue line.

use std::sync::Arc;
use std::sync::LazyLock;

use podsmith_common::{
    dialogue::{self, is_known_tone, Speaker, Utterance},
    text, Mood, PodsmithError, Result, Style,
};
use regex::Regex;
use tracing::{debug, info};

use crate::runtime::{AgentRole, AgentRuntime, Sampling};
use crate::scripter::ChapterScript;

const TONE_SYSTEM_PROMPT: &str = r#"You are a podcast tone annotator. You receive a two-host dialogue script and must add an emotional tone tag to every dialogue line.

Format contract, exactly:

**Host N:** [tone] spoken text

The tone tag sits between the colon and the text, never at the end. Choose
each tone from this set only:

upbeat, calm, excited, reflective, suspenseful, skeptical, humorous,
serious, curious, confident

Keep every chapter heading, every dialogue line, and the spoken text itself
unchanged. Add nothing else.
"#;

/// Utterances for one chapter, in parse order.
#[derive(Debug, Clone)]
pub struct ChapterUtterances {
    pub chapter: u32,
    pub utterances: Vec<Utterance>,
}

/// Dominant tone per third of the episode. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionalArc {
    pub opening: String,
    pub middle: String,
    pub closing: String,
}

/// The tone annotator's output.
#[derive(Debug, Clone)]
pub struct ToneScript {
    pub markdown: String,
    pub utterances: Vec<Utterance>,
    pub arc: Option<EmotionalArc>,
}

pub struct ToneAnnotator {
    runtime: Arc<AgentRuntime>,
}

impl ToneAnnotator {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn run(
        &self,
        scripts: &[ChapterScript],
        mood: Mood,
        style: Style,
    ) -> Result<ToneScript> {
        let combined = combine_scripts(scripts);
        info!(
            chapters = scripts.len(),
            spoken_words = dialogue::count_spoken_words(&combined),
            "Annotating tone"
        );

        let prompt = format!(
            "Episode mood: {}\nEpisode style: {}\n\nAnnotate every dialogue line:\n\n{}",
            mood.as_str(),
            style.as_str(),
            combined,
        );
        let annotated = self
            .runtime
            .execute(
                AgentRole::ToneAnnotator,
                TONE_SYSTEM_PROMPT,
                &prompt,
                Sampling::new(8192, 0.4),
            )
            .await?;

        let utterances = parse_utterances(&annotated);
        if utterances.is_empty() {
            return Err(PodsmithError::agent(
                AgentRole::ToneAnnotator.stage_name(),
                "no utterances could be parsed from the annotated script",
            ));
        }

        let arc = analyze_arc(&utterances);
        debug!(utterances = utterances.len(), arc = ?arc, "Tone annotation parsed");

        Ok(ToneScript {
            markdown: annotated,
            utterances,
            arc,
        })
    }
}

/// Concatenate chapter scripts under `## Chapter N` headings, dropping the
/// per-chapter speaking-notes blocks.
pub fn combine_scripts(scripts: &[ChapterScript]) -> String {
    scripts
        .iter()
        .map(|script| {
            format!(
                "## Chapter {}\n\n{}",
                script.chapter,
                strip_speaking_notes(&script.markdown)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn strip_speaking_notes(script: &str) -> String {
    let mut kept = Vec::new();
    let mut in_notes = false;
    for line in script.lines() {
        let lowered = line.trim_start().trim_start_matches('#').trim().to_lowercase();
        if lowered.starts_with("speaking notes") {
            in_notes = true;
            continue;
        }
        if in_notes {
            // Notes run to the next dialogue line or heading
            if dialogue::split_host_line(line).is_some() || line.trim_start().starts_with('#') {
                in_notes = false;
            } else {
                continue;
            }
        }
        kept.push(line);
    }
    kept.join("\n").trim().to_string()
}

/// A block of text bound to one speaker and one tone, before the sentence
/// split.
#[derive(Debug, Clone)]
struct TonedBlock {
    speaker: Speaker,
    tone: String,
    text: String,
}

/// Parse utterances out of an annotated script using the strategy ladder.
pub fn parse_utterances(markdown: &str) -> Vec<Utterance> {
    let host_lines = markdown
        .lines()
        .filter(|line| dialogue::split_host_line(line).is_some())
        .count();

    let strict = parse_strict(markdown);
    if host_lines > 0 && strict.len() == host_lines {
        return explode(strict);
    }

    if host_lines == 0 {
        let legacy = parse_legacy(markdown);
        if !legacy.is_empty() {
            return explode(legacy);
        }
    }

    explode(parse_line_oriented(markdown))
}

/// Parse chapter-grouped utterances for synthesis. Splits on `## Chapter N`
/// headings; a script without chapter headings is one chapter. Utterance
/// indices run across the whole episode.
pub fn parse_chapter_utterances(markdown: &str) -> Vec<ChapterUtterances> {
    static CHAPTER_SPLIT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^##\s*Chapter\s+(\d+)\b.*$").expect("valid regex"));

    let headings: Vec<_> = CHAPTER_SPLIT.captures_iter(markdown).collect();
    if headings.is_empty() {
        let utterances = parse_utterances(markdown);
        if utterances.is_empty() {
            return Vec::new();
        }
        return vec![ChapterUtterances {
            chapter: 1,
            utterances,
        }];
    }

    let mut chapters = Vec::new();
    let mut next_index = 0usize;
    for (i, caps) in headings.iter().enumerate() {
        let number: u32 = caps[1].parse().unwrap_or(i as u32 + 1);
        let block_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let block_end = headings
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(markdown.len());

        let mut utterances = parse_utterances(&markdown[block_start..block_end]);
        for utterance in &mut utterances {
            utterance.index = next_index;
            next_index += 1;
        }
        if !utterances.is_empty() {
            chapters.push(ChapterUtterances {
                chapter: number,
                utterances,
            });
        }
    }
    chapters
}

/// Re-emit utterances as `**Host N:** [tone] text` lines.
pub fn serialize_utterances(utterances: &[Utterance]) -> String {
    utterances
        .iter()
        .map(|u| format!("**{}:** [{}] {}", u.speaker.label(), u.tone, u.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strategy 1: tone tag in the documented position on every host line.
fn parse_strict(markdown: &str) -> Vec<TonedBlock> {
    let mut blocks = Vec::new();
    for line in markdown.lines() {
        let Some((speaker, rest)) = dialogue::split_host_line(line) else {
            continue;
        };
        let Some((tone, text)) = leading_tone_tag(rest) else {
            continue;
        };
        blocks.push(TonedBlock {
            speaker,
            tone,
            text,
        });
    }
    blocks
}

static LEGACY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*\[([A-Za-z]+)\]\*\*\s*(.+)$").expect("valid regex"));

/// Strategy 2: legacy `**[tone]** text` lines with alternating speakers.
fn parse_legacy(markdown: &str) -> Vec<TonedBlock> {
    let mut blocks = Vec::new();
    let mut speaker = Speaker::Host1;
    for line in markdown.lines() {
        let Some(caps) = LEGACY_LINE.captures(line.trim()) else {
            continue;
        };
        let tone = caps[1].to_lowercase();
        let text = caps[2].trim().to_string();
        let tone = if is_known_tone(&tone) {
            tone
        } else {
            infer_tone(&text).to_string()
        };
        blocks.push(TonedBlock {
            speaker,
            tone,
            text,
        });
        speaker = speaker.other();
    }
    blocks
}

/// Strategy 3: host lines taken verbatim, tone taken from a leading tag when
/// one exists and inferred from content otherwise.
fn parse_line_oriented(markdown: &str) -> Vec<TonedBlock> {
    let mut blocks = Vec::new();
    for line in markdown.lines() {
        let Some((speaker, rest)) = dialogue::split_host_line(line) else {
            continue;
        };
        let (tone, text) = match leading_tone_tag(rest) {
            Some((tone, text)) => (tone, text),
            None => {
                let text = rest.trim().to_string();
                (infer_tone(&text).to_string(), text)
            }
        };
        if text.is_empty() {
            continue;
        }
        blocks.push(TonedBlock {
            speaker,
            tone,
            text,
        });
    }
    blocks
}

/// A `[tone]` tag at the start of a dialogue remainder, if the tag is a
/// known tone. Synonyms are accepted and preserved verbatim.
fn leading_tone_tag(rest: &str) -> Option<(String, String)> {
    let rest = rest.trim_start();
    let inner_end = rest.strip_prefix('[')?.find(']')?;
    let tag = rest[1..=inner_end].trim().to_lowercase();
    if !is_known_tone(&tag) {
        return None;
    }
    let text = rest[inner_end + 2..].trim().to_string();
    if text.is_empty() {
        return None;
    }
    Some((tag, text))
}

/// Content-based tone inference for untagged lines.
fn infer_tone(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    let has_word =
        |words: &[&str]| words.iter().any(|w| lowered.split_whitespace().any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == *w));

    if text.contains('!') || has_word(&["amazing", "incredible", "fantastic", "awesome"]) {
        "excited"
    } else if text.contains('?') || has_word(&["wonder", "wondering", "curious"]) {
        "curious"
    } else if has_word(&["however", "consider", "reflect"]) {
        "reflective"
    } else if has_word(&["doubt", "really", "sure"]) {
        "skeptical"
    } else if has_word(&["serious", "critical", "important"]) {
        "serious"
    } else {
        "calm"
    }
}

/// Split each toned block into sentence-level utterances with episode-wide
/// indices.
fn explode(blocks: Vec<TonedBlock>) -> Vec<Utterance> {
    let mut utterances = Vec::new();
    for block in blocks {
        let clean = text::strip_bracketed(&block.text);
        for sentence in text::split_sentences(&clean) {
            let index = utterances.len();
            utterances.push(Utterance::new(
                index,
                block.speaker,
                block.tone.clone(),
                sentence,
            ));
        }
    }
    utterances
}

/// Dominant tone per third of the utterance sequence.
fn analyze_arc(utterances: &[Utterance]) -> Option<EmotionalArc> {
    if utterances.len() < 3 {
        return None;
    }
    let third = utterances.len() / 3;
    let dominant = |slice: &[Utterance]| -> String {
        let mut counts = std::collections::HashMap::new();
        for utterance in slice {
            *counts.entry(utterance.tone.clone()).or_insert(0usize) += 1;
        }
        counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(tone, _)| tone)
            .unwrap_or_else(|| "calm".to_string())
    };

    Some(EmotionalArc {
        opening: dominant(&utterances[..third]),
        middle: dominant(&utterances[third..2 * third]),
        closing: dominant(&utterances[2 * third..]),
    })
}
