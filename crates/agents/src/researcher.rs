//! Research stage: factual notes, either model-generated or wrapped from a
//! supplied source document.

use std::sync::Arc;

use podsmith_common::{text, Brief, PodsmithError, Result};
use tracing::{info, warn};

use crate::fetch::{ContentFetcher, FetchedContent};
use crate::planner::Plan;
use crate::runtime::{AgentRole, AgentRuntime, Sampling};

const RESEARCHER_SYSTEM_PROMPT: &str = r#"You are a podcast researcher. Produce factual research notes as markdown with these sections:

## Executive Summary
## Key Facts & Statistics
## Main Themes & Perspectives
## Notable Quotes & Anecdotes
## Chapter Research

Prioritize verifiable facts with dates and numbers. Flag anything
uncertain. Output markdown only.
"#;

/// A supplied source below this many words is ignored and research falls
/// back to the model.
const MIN_SOURCE_WORDS: usize = 50;

/// Sections checked leniently; at least one must be present.
const EXPECTED_SECTIONS: &[&str] = &["Executive Summary", "Key Facts", "Themes"];

pub struct Researcher {
    runtime: Arc<AgentRuntime>,
    fetcher: ContentFetcher,
}

impl Researcher {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self {
            runtime,
            fetcher: ContentFetcher::new(),
        }
    }

    /// Produce research notes. A fetchable source of at least 50 words is
    /// wrapped deterministically with no model call.
    pub async fn run(&self, brief: &Brief, plan: &Plan) -> Result<String> {
        if let Some(ref source) = brief.source {
            match self.fetcher.fetch(source).await {
                Ok(fetched) if fetched.word_count >= MIN_SOURCE_WORDS => {
                    info!(
                        source = %fetched.source,
                        words = fetched.word_count,
                        "Using supplied source; skipping model research"
                    );
                    return Ok(wrap_source(&fetched));
                }
                Ok(fetched) => {
                    warn!(
                        source = %fetched.source,
                        words = fetched.word_count,
                        "Source too short, falling back to model research"
                    );
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Source fetch failed, falling back to model research");
                }
            }
        }

        info!(topic = %brief.topic, "Researching episode");
        let prompt = build_prompt(brief, plan);
        let markdown = self
            .runtime
            .execute(
                AgentRole::Researcher,
                RESEARCHER_SYSTEM_PROMPT,
                &prompt,
                Sampling::new(4096, 0.5),
            )
            .await?;

        validate(&markdown)?;
        Ok(markdown)
    }
}

fn build_prompt(brief: &Brief, plan: &Plan) -> String {
    let mut prompt = format!("Research the topic: {}\n", brief.topic);
    if let Some(ref focus) = brief.focus {
        prompt.push_str(&format!("With particular focus on: {focus}\n"));
    }
    if !plan.chapters.is_empty() {
        prompt.push_str("\nCover the research focus of every planned chapter:\n");
        for chapter in &plan.chapters {
            prompt.push_str(&format!(
                "- Chapter {} ({}): {}\n",
                chapter.number, chapter.title, chapter.research_focus
            ));
        }
    }
    prompt.push_str("\nProduce the research notes.");
    prompt
}

/// Deterministic wrapper around a fetched source: a fixed preamble, then the
/// title and body verbatim.
fn wrap_source(fetched: &FetchedContent) -> String {
    format!(
        "## Executive Summary\n\nResearch notes derived from the supplied source document \
({} words). The source text is reproduced below and is the factual basis \
for this episode.\n\n## Source Document\n\n### {}\n\n{}\n",
        fetched.word_count, fetched.title, fetched.content
    )
}

/// Lenient validation: research is usable if any expected section survives.
fn validate(markdown: &str) -> Result<()> {
    let missing: Vec<&str> = EXPECTED_SECTIONS
        .iter()
        .copied()
        .filter(|section| !text::has_section(markdown, section))
        .collect();

    if missing.len() > 2 {
        return Err(PodsmithError::agent(
            AgentRole::Researcher.stage_name(),
            format!("research notes missing sections: {}", missing.join(", ")),
        ));
    }
    for section in missing {
        warn!(section, "Research section missing; proceeding");
    }
    Ok(())
}
