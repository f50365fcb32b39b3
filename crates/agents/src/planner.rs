//! Planner stage: derive the chapter skeleton and tone plan from the brief.

use std::sync::Arc;
use std::sync::LazyLock;

use podsmith_common::{text, Brief, PodsmithError, Result, WordBudget};
use regex::Regex;
use tracing::{info, warn};

use crate::runtime::{AgentRole, AgentRuntime, Sampling};

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a podcast episode planner. Given a topic brief, produce a complete episode plan as markdown with exactly these sections:

## Overview
## Target Audience
## Narrative Structure
## Chapter Breakdown
## Research Priorities
## Style Guidelines
## Success Metrics

Under "Chapter Breakdown", emit one subsection per chapter:

### Chapter N: <title>
- Duration: <minutes> minutes (~<words> words)
- Key Points: <point>; <point>; <point>
- Narrative Purpose: <one sentence>
- Research Focus: <one sentence>

The per-chapter word counts must sum to the episode target. Do not add
sections beyond the ones listed. Output markdown only.
"#;

/// Sections whose absence is tolerated up to the lenient threshold.
const REQUIRED_SECTIONS: &[&str] = &[
    "Overview",
    "Chapter Breakdown",
    "Research Priorities",
    "Style Guidelines",
];

/// One planned chapter.
#[derive(Debug, Clone)]
pub struct PlanChapter {
    pub number: u32,
    pub title: String,
    pub word_estimate: u32,
    pub key_points: Vec<String>,
    pub purpose: String,
    pub research_focus: String,
}

/// The planner's output: the raw markdown plus the parsed chapter skeleton.
#[derive(Debug, Clone)]
pub struct Plan {
    pub markdown: String,
    pub overview: Option<String>,
    pub chapters: Vec<PlanChapter>,
}

pub struct Planner {
    runtime: Arc<AgentRuntime>,
}

impl Planner {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn run(&self, brief: &Brief, budget: &WordBudget) -> Result<Plan> {
        info!(
            topic = %brief.topic,
            chapters = brief.chapters,
            target_words = budget.total_words,
            "Planning episode"
        );

        let prompt = build_prompt(brief, budget);
        let markdown = self
            .runtime
            .execute(
                AgentRole::Planner,
                PLANNER_SYSTEM_PROMPT,
                &prompt,
                Sampling::new(4096, 0.7),
            )
            .await?;

        validate(&markdown)?;
        let plan = parse_plan(markdown, budget);

        if plan.chapters.len() != brief.chapters as usize {
            warn!(
                expected = brief.chapters,
                found = plan.chapters.len(),
                "Plan chapter count differs from brief; downstream stages adapt"
            );
        }
        let estimate_sum: u32 = plan.chapters.iter().map(|c| c.word_estimate).sum();
        if WordBudget::deviation_percent(budget.total_words, estimate_sum).abs() > 10.0 {
            warn!(
                estimate_sum,
                target = budget.total_words,
                "Plan word estimates drift from the episode target"
            );
        }

        Ok(plan)
    }
}

fn build_prompt(brief: &Brief, budget: &WordBudget) -> String {
    let mut prompt = format!(
        "Topic: {}\nMood: {}\nStyle: {}\nChapters: {}\nEpisode length: {} minutes\nTarget spoken words: {} total, about {} per chapter\n",
        brief.topic,
        brief.mood.as_str(),
        brief.style.as_str(),
        brief.chapters,
        brief.duration_min,
        budget.total_words,
        budget.per_chapter,
    );
    if let Some(ref focus) = brief.focus {
        prompt.push_str(&format!("Focus: {focus}\n"));
    }
    prompt.push_str("\nProduce the episode plan.");
    prompt
}

/// Lenient structural validation: two missing named sections are tolerated
/// with a warning each; more than two fail the stage.
fn validate(markdown: &str) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|section| !text::has_section(markdown, section))
        .collect();

    if missing.len() > 2 {
        return Err(PodsmithError::agent(
            AgentRole::Planner.stage_name(),
            format!("plan is missing sections: {}", missing.join(", ")),
        ));
    }
    for section in missing {
        warn!(section, "Plan section missing; proceeding");
    }
    Ok(())
}

static CHAPTER_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^###\s*Chapter\s+(\d+)\s*[:.\-]?\s*(.*)$").expect("valid regex")
});

static WORD_ESTIMATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*words").expect("valid regex"));

/// Parse the chapter breakdown out of plan markdown. Tolerant: chapters
/// missing fields fall back to budget defaults rather than failing.
pub fn parse_plan(markdown: String, budget: &WordBudget) -> Plan {
    let overview = text::extract_section(&markdown, "Overview");

    let mut chapters = Vec::new();
    let headings: Vec<_> = CHAPTER_HEADING.captures_iter(&markdown).collect();
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
        // Stop at the next ## section if one interrupts the breakdown
        let block = block.split("\n## ").next().unwrap_or(block);

        let duration_line = field_value(block, "Duration").unwrap_or_default();
        let word_estimate = WORD_ESTIMATE
            .captures(&duration_line)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(budget.per_chapter);

        let key_points = field_value(block, "Key Points")
            .map(|value| {
                value
                    .split(';')
                    .map(|point| point.trim().to_string())
                    .filter(|point| !point.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        chapters.push(PlanChapter {
            number,
            title: if title.is_empty() {
                format!("Chapter {number}")
            } else {
                title
            },
            word_estimate,
            key_points,
            purpose: field_value(block, "Narrative Purpose").unwrap_or_default(),
            research_focus: field_value(block, "Research Focus").unwrap_or_default(),
        });
    }

    Plan {
        markdown,
        overview,
        chapters,
    }
}

/// Value of a `- Field: value` bullet inside a chapter block.
fn field_value(block: &str, field: &str) -> Option<String> {
    for line in block.lines() {
        let trimmed = line.trim_start();
        let item = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .unwrap_or(trimmed);
        if let Some(rest) = item.strip_prefix(field) {
            if let Some(value) = rest.trim_start().strip_prefix(':') {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}
