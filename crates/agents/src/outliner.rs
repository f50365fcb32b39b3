//! Outline stage: expand the plan and research into section-level talking
//! points.

use std::sync::Arc;
use std::sync::LazyLock;

use podsmith_common::{text, Accuracy, Brief, PodsmithError, Result, WordBudget};
use regex::Regex;
use tracing::{info, warn};

use crate::planner::Plan;
use crate::runtime::{AgentRole, AgentRuntime, Sampling};

const OUTLINER_SYSTEM_PROMPT: &str = r#"You are a podcast outliner. Expand an episode plan and research notes into a detailed outline as markdown with these sections:

## Episode Overview
## Opening Hook
## Chapter Outlines
## Closing Segment
## Pacing Notes

Under "Chapter Outlines", emit one subsection per chapter:

### Chapter N: <title>
- Word Target: <words> words
- Narrative Purpose: <one sentence>
- Discussion Points:
  - <point>
  - <point>
  - <point>

Discussion points must be concrete enough to script from. Output markdown
only.
"#;

/// Which part of the episode a section belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Opening,
    Chapter(u32),
    Closing,
}

/// One outlined section of the episode.
#[derive(Debug, Clone)]
pub struct OutlineSection {
    pub kind: SectionKind,
    pub title: String,
    pub word_estimate: u32,
    pub purpose: String,
    pub discussion_points: Vec<String>,
    /// The section's raw markdown, handed to the scripter as context
    pub markdown: String,
}

/// The outliner's output.
#[derive(Debug, Clone)]
pub struct Outline {
    pub markdown: String,
    pub sections: Vec<OutlineSection>,
    /// How well the section word estimates balance against the budget
    pub balance: Accuracy,
}

impl Outline {
    /// The chapter sections in order, without opening/closing.
    pub fn chapter_sections(&self) -> Vec<&OutlineSection> {
        self.sections
            .iter()
            .filter(|section| matches!(section.kind, SectionKind::Chapter(_)))
            .collect()
    }
}

pub struct Outliner {
    runtime: Arc<AgentRuntime>,
}

impl Outliner {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn run(
        &self,
        brief: &Brief,
        budget: &WordBudget,
        plan: &Plan,
        research: &str,
    ) -> Result<Outline> {
        info!(chapters = brief.chapters, "Outlining episode");

        let prompt = build_prompt(brief, budget, plan, research);
        let markdown = self
            .runtime
            .execute(
                AgentRole::Outliner,
                OUTLINER_SYSTEM_PROMPT,
                &prompt,
                Sampling::new(4096, 0.6),
            )
            .await?;

        let outline = parse_outline(markdown, budget);
        validate(&outline, brief.chapters)?;

        info!(
            sections = outline.sections.len(),
            balance = ?outline.balance,
            "Outline complete"
        );
        Ok(outline)
    }
}

fn build_prompt(brief: &Brief, budget: &WordBudget, plan: &Plan, research: &str) -> String {
    format!(
        "Style: {}\nChapters: {}\nTarget spoken words: {} total, about {} per chapter\n\n\
# Episode Plan\n\n{}\n\n# Research Notes\n\n{}\n\nProduce the outline.",
        brief.style.as_str(),
        brief.chapters,
        budget.total_words,
        budget.per_chapter,
        plan.markdown,
        research,
    )
}

static OUTLINE_CHAPTER_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^###\s*Chapter\s+(\d+)\s*[:.\-]?\s*(.*)$").expect("valid regex")
});

static WORD_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*words").expect("valid regex"));

/// Parse the outline into its ordered sections: one opening, the chapter
/// outlines, one closing.
pub fn parse_outline(markdown: String, budget: &WordBudget) -> Outline {
    let mut sections = Vec::new();

    if let Some(opening) = text::extract_section(&markdown, "Opening Hook") {
        sections.push(OutlineSection {
            kind: SectionKind::Opening,
            title: "Opening Hook".to_string(),
            word_estimate: opening_words(budget),
            purpose: "Hook the listener and frame the episode".to_string(),
            discussion_points: text::bullet_items(&opening),
            markdown: opening,
        });
    }

    let headings: Vec<_> = OUTLINE_CHAPTER_HEADING.captures_iter(&markdown).collect();
    for (i, caps) in headings.iter().enumerate() {
        let number: u32 = caps[1].parse().unwrap_or(i as u32 + 1);
        let title = caps[2].trim().to_string();

        let block_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let block_end = headings
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(markdown.len());
        let block = &markdown[block_start..block_end];
        let block = block.split("\n## ").next().unwrap_or(block);

        let word_estimate = WORD_TARGET
            .captures(block)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(budget.per_chapter);

        let purpose = block
            .lines()
            .find_map(|line| {
                let trimmed = line.trim_start().trim_start_matches("- ");
                trimmed
                    .strip_prefix("Narrative Purpose:")
                    .map(|value| value.trim().to_string())
            })
            .unwrap_or_default();

        sections.push(OutlineSection {
            kind: SectionKind::Chapter(number),
            title: if title.is_empty() {
                format!("Chapter {number}")
            } else {
                title
            },
            word_estimate,
            purpose,
            discussion_points: discussion_points(block),
            markdown: block.trim().to_string(),
        });
    }

    if let Some(closing) = text::extract_section(&markdown, "Closing Segment") {
        sections.push(OutlineSection {
            kind: SectionKind::Closing,
            title: "Closing Segment".to_string(),
            word_estimate: opening_words(budget),
            purpose: "Wrap up and leave a takeaway".to_string(),
            discussion_points: text::bullet_items(&closing),
            markdown: closing,
        });
    }

    let estimated_total: u32 = sections
        .iter()
        .filter(|section| matches!(section.kind, SectionKind::Chapter(_)))
        .map(|section| section.word_estimate)
        .sum();
    let balance = Accuracy::classify(budget.total_words, estimated_total);

    Outline {
        markdown,
        sections,
        balance,
    }
}

/// Openings and closings are short; budget them as a fraction of a chapter.
fn opening_words(budget: &WordBudget) -> u32 {
    (budget.per_chapter / 4).max(25)
}

/// Bullet items nested under a "Discussion Points" marker, or any bullets in
/// the block when the marker is absent.
fn discussion_points(block: &str) -> Vec<String> {
    let after_marker = block
        .split("Discussion Points")
        .nth(1)
        .map(|rest| rest.trim_start_matches([':', ' ']));
    let scope = after_marker.unwrap_or(block);
    text::bullet_items(scope)
        .into_iter()
        .filter(|item| !item.contains("Word Target:") && !item.contains("Narrative Purpose:"))
        .collect()
}

/// Structural validation: opening and closing must exist, and the chapter
/// count may drift by at most one from the brief.
fn validate(outline: &Outline, expected_chapters: u32) -> Result<()> {
    let has_opening = outline
        .sections
        .iter()
        .any(|section| section.kind == SectionKind::Opening);
    let has_closing = outline
        .sections
        .iter()
        .any(|section| section.kind == SectionKind::Closing);
    let chapter_count = outline.chapter_sections().len() as i64;

    if !has_opening || !has_closing {
        return Err(PodsmithError::agent(
            AgentRole::Outliner.stage_name(),
            "outline is missing its opening or closing section",
        ));
    }

    let drift = (chapter_count - expected_chapters as i64).abs();
    if drift > 1 {
        return Err(PodsmithError::agent(
            AgentRole::Outliner.stage_name(),
            format!("outline has {chapter_count} chapters, expected {expected_chapters}"),
        ));
    }
    if drift == 1 {
        warn!(
            expected = expected_chapters,
            found = chapter_count,
            "Outline chapter count drifted by one; proceeding"
        );
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample_outline_markdown() -> String {
    "\
## Episode Overview
A two-chapter tour of bicycle history.

## Opening Hook
- Start with the 1817 'running machine'
- Tease the modern racing bike

## Chapter Outlines

### Chapter 1: The Draisine
- Word Target: 250 words
- Narrative Purpose: Establish the origin story.
- Discussion Points:
  - Karl von Drais and the 1817 patent
  - Why it had no pedals
  - Public reaction

### Chapter 2: Safety Bicycles
- Word Target: 250 words
- Narrative Purpose: Show the modern form emerging.
- Discussion Points:
  - The chain drive breakthrough
  - Equal-sized wheels
  - The 1880s boom

## Closing Segment
- Recap the arc from toy to transport
- Takeaway: design converged a century ago

## Pacing Notes
Keep transitions brisk.
"
    .to_string()
}
