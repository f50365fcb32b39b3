//! Scripter stage: per-chapter two-host dialogue with word-count
//! convergence.
//!
//! Each chapter script targets its share of the episode budget within ±2%.
//! Up to three attempts are made; after each miss the measured deviation is
//! fed back into the prompt as an expand-or-condense directive. A script
//! that never converges is accepted with its deviation recorded.

use std::sync::Arc;

use podsmith_common::{dialogue, Result, Style, WordBudget};
use tracing::{debug, info, warn};

use crate::outliner::OutlineSection;
use crate::runtime::{AgentRole, AgentRuntime, Sampling};

const SCRIPTER_SYSTEM_PROMPT: &str = r#"You are a podcast script writer producing natural two-host dialogue. Rules:

- Every dialogue line starts with **Host 1:** or **Host 2:** followed by the spoken text.
- The hosts alternate naturally and react to each other; no monologues longer than three consecutive lines.
- No stage directions, no sound-effect notes, no markdown besides the host labels.
- End with a one-line "Speaking notes:" block summarizing delivery guidance.

{STYLE_GUIDANCE}

Hit the requested spoken word count closely; it drives the episode length.
"#;

/// Attempts per chapter before accepting the closest miss.
const MAX_ATTEMPTS: u32 = 3;

/// Generation-time tolerance on the chapter word count, percent.
const CHAPTER_TOLERANCE_PERCENT: f64 = 2.0;

/// One chapter's finished dialogue.
#[derive(Debug, Clone)]
pub struct ChapterScript {
    pub chapter: u32,
    pub markdown: String,
    pub spoken_words: usize,
    /// Signed deviation from the chapter target, percent, as generated
    pub deviation_percent: f64,
    pub attempts: u32,
}

pub struct Scripter {
    runtime: Arc<AgentRuntime>,
}

impl Scripter {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    /// Script one chapter, converging on `target_words`.
    pub async fn run(
        &self,
        section: &OutlineSection,
        chapter_number: u32,
        target_words: u32,
        style: Style,
        outline_context: &str,
    ) -> Result<ChapterScript> {
        let system_prompt =
            SCRIPTER_SYSTEM_PROMPT.replace("{STYLE_GUIDANCE}", style_guidance(style));
        let base_prompt = build_prompt(section, chapter_number, target_words, outline_context);

        let mut prompt = base_prompt.clone();
        let mut best: Option<ChapterScript> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let markdown = self
                .runtime
                .execute(
                    AgentRole::Scripter,
                    &system_prompt,
                    &prompt,
                    Sampling::new(4096, 0.8),
                )
                .await?;

            let spoken_words = dialogue::count_spoken_words(&markdown);
            let deviation = WordBudget::deviation_percent(target_words, spoken_words as u32);
            debug!(
                chapter = chapter_number,
                attempt,
                spoken_words,
                deviation_pct = format!("{deviation:+.1}"),
                "Chapter script attempt"
            );

            let candidate = ChapterScript {
                chapter: chapter_number,
                markdown,
                spoken_words,
                deviation_percent: deviation,
                attempts: attempt,
            };

            if deviation.abs() <= CHAPTER_TOLERANCE_PERCENT {
                info!(
                    chapter = chapter_number,
                    attempt, spoken_words, "Chapter script converged"
                );
                return Ok(candidate);
            }

            let closer = best
                .as_ref()
                .map(|b| deviation.abs() < b.deviation_percent.abs())
                .unwrap_or(true);
            if closer {
                best = Some(candidate);
            }

            if attempt < MAX_ATTEMPTS {
                prompt = format!(
                    "{base_prompt}\n\n{}",
                    corrective_directive(spoken_words, target_words)
                );
            }
        }

        let script = best.ok_or_else(|| {
            podsmith_common::PodsmithError::Internal("no scripter attempt was recorded".into())
        })?;
        warn!(
            chapter = chapter_number,
            spoken_words = script.spoken_words,
            deviation_pct = format!("{:+.1}", script.deviation_percent),
            "Chapter script did not converge; accepting closest attempt"
        );
        Ok(script)
    }
}

fn build_prompt(
    section: &OutlineSection,
    chapter_number: u32,
    target_words: u32,
    outline_context: &str,
) -> String {
    let mut prompt = format!(
        "Write the dialogue for Chapter {chapter_number}: {}\n\
Target spoken words: {target_words} (tolerance ±2%)\n\n\
# Chapter Outline\n\n{}\n",
        section.title, section.markdown,
    );
    if !section.discussion_points.is_empty() {
        prompt.push_str("\nCover every discussion point:\n");
        for point in &section.discussion_points {
            prompt.push_str(&format!("- {point}\n"));
        }
    }
    prompt.push_str(&format!(
        "\n# Full Episode Outline (context only)\n\n{outline_context}\n"
    ));
    prompt
}

/// The expand-or-condense feedback appended after a missed attempt.
fn corrective_directive(produced: usize, required: u32) -> String {
    let direction = if (produced as u32) < required {
        "expand the dialogue with more depth on the discussion points"
    } else {
        "condense the dialogue by tightening exchanges"
    };
    format!(
        "IMPORTANT: your previous draft contained {produced} spoken words but \
{required} are required. Rewrite the chapter and {direction} until the \
spoken word count is within 2% of {required}."
    )
}

/// Style-conditioned guidance block. `narrative` shares the storytelling
/// guidance.
fn style_guidance(style: Style) -> &'static str {
    match style {
        Style::Conversational => {
            "Keep the tone relaxed and chatty: short exchanges, genuine reactions, \
the occasional light joke. The hosts are friends thinking out loud together."
        }
        Style::Storytelling | Style::Narrative => {
            "Structure the dialogue as a story: scene-setting, rising tension, \
payoff. One host tends to narrate while the other reacts and asks for detail."
        }
        Style::Interview => {
            "Host 1 interviews Host 2 as the subject-matter expert: pointed \
questions, substantive answers, follow-ups that dig into specifics."
        }
        Style::Educational => {
            "Teach the listener: define terms on first use, build concepts in \
order, and have the hosts check understanding before moving on."
        }
    }
}
