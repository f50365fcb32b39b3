//! Editor stage: final convergence pass on the episode word count.

use std::sync::Arc;
use std::sync::LazyLock;

use podsmith_common::{dialogue, Mood, PodsmithError, Result, Style, WordBudget};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::runtime::{AgentRole, AgentRuntime, Sampling};

const EDITOR_SYSTEM_PROMPT: &str = r#"You are a podcast script editor. You receive a complete tone-annotated two-host script and a word-count adjustment to make. Rules:

- Preserve every **Host N:** label and every [tone] tag exactly where they are.
- Preserve the chapter headings.
- Expand or condense the spoken text to reach the requested word count.
- Smooth transitions between chapters while you are in there.
- Never insert placeholders; the script must be ready to read aloud.

Return the full edited script as markdown, nothing else.
"#;

/// Attempts before accepting the closest result.
const MAX_ATTEMPTS: u32 = 3;

/// Final lenient gate on the episode deviation, percent. Exceeding it is a
/// warning, not a failure.
const FINAL_GATE_PERCENT: f64 = 15.0;

/// Scripts shorter than this many characters are structurally broken.
const MIN_SCRIPT_CHARS: usize = 100;

const PLACEHOLDER_MARKERS: &[&str] = &["TODO", "[INSERT"];

/// The editor's output.
#[derive(Debug, Clone)]
pub struct FinalScript {
    pub markdown: String,
    pub spoken_words: usize,
    /// Signed deviation from the episode target, percent
    pub deviation_percent: f64,
    pub attempts: u32,
}

pub struct Editor {
    runtime: Arc<AgentRuntime>,
}

impl Editor {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    /// Converge the full script on the episode word budget.
    pub async fn run(
        &self,
        tone_script: &str,
        budget: &WordBudget,
        style: Style,
        mood: Mood,
    ) -> Result<FinalScript> {
        let target = budget.total_words;
        let starting_words = dialogue::count_spoken_words(tone_script);
        info!(
            starting_words,
            target, "Editing final script toward word budget"
        );

        let mut current = tone_script.to_string();
        let mut result: Option<FinalScript> = None;

        // One editing pass always runs, even inside the band, so the editor
        // can smooth chapter transitions.
        for attempt in 1..=MAX_ATTEMPTS {
            let words = dialogue::count_spoken_words(&current);
            let prompt = build_prompt(&current, words, target, style, mood);
            let edited = self
                .runtime
                .execute(
                    AgentRole::Editor,
                    EDITOR_SYSTEM_PROMPT,
                    &prompt,
                    Sampling::new(8192, 0.4),
                )
                .await?;

            let edited_words = dialogue::count_spoken_words(&edited);
            let edited_deviation = WordBudget::deviation_percent(target, edited_words as u32);
            debug!(
                attempt,
                words = edited_words,
                deviation_pct = format!("{edited_deviation:+.1}"),
                "Editor attempt"
            );

            let candidate = FinalScript {
                markdown: edited.clone(),
                spoken_words: edited_words,
                deviation_percent: edited_deviation,
                attempts: attempt,
            };

            let closer = result
                .as_ref()
                .map(|r| edited_deviation.abs() < r.deviation_percent.abs())
                .unwrap_or(true);
            if closer {
                result = Some(candidate);
            }

            if edited_deviation.abs() <= budget.tolerance_percent {
                break;
            }
            current = edited;
        }

        let script = result.ok_or_else(|| {
            PodsmithError::Internal("no editor attempt was recorded".into())
        })?;

        validate(&script)?;
        info!(
            spoken_words = script.spoken_words,
            deviation_pct = format!("{:+.1}", script.deviation_percent),
            attempts = script.attempts,
            "Final script ready"
        );
        Ok(script)
    }
}

fn build_prompt(script: &str, words: usize, target: u32, style: Style, mood: Mood) -> String {
    let delta = target as i64 - words as i64;
    let directive = if delta >= 0 {
        format!("Expand the spoken text by about {delta} words")
    } else {
        format!("Condense the spoken text by about {} words", -delta)
    };
    format!(
        "Episode style: {}\nEpisode mood: {}\nCurrent spoken words: {words}\nTarget spoken words: {target}\n\n\
{directive}, spread across the whole episode, while preserving every host \
label and tone tag.\n\n# Script\n\n{script}",
        style.as_str(),
        mood.as_str(),
    )
}

static TONE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\*\*Host [12]:\*\*\s*\[[A-Za-z]+\]|\*\*\[[A-Za-z]+\]\*\*)").expect("valid regex")
});

/// Post-validation: structural sanity is hard, word deviation and tone-tag
/// presence are lenient.
fn validate(script: &FinalScript) -> Result<()> {
    if script.markdown.len() < MIN_SCRIPT_CHARS {
        return Err(PodsmithError::agent(
            AgentRole::Editor.stage_name(),
            format!("final script is only {} characters", script.markdown.len()),
        ));
    }
    for marker in PLACEHOLDER_MARKERS {
        if script.markdown.contains(marker) {
            return Err(PodsmithError::agent(
                AgentRole::Editor.stage_name(),
                format!("final script contains placeholder marker {marker:?}"),
            ));
        }
    }

    if script.deviation_percent.abs() > FINAL_GATE_PERCENT {
        warn!(
            deviation_pct = format!("{:+.1}", script.deviation_percent),
            "Final script exceeds the lenient word gate; proceeding"
        );
    }
    if TONE_TAG.find(&script.markdown).is_none() {
        warn!("Final script contains no tone tags; synthesis will infer tones");
    }
    Ok(())
}
