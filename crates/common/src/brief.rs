//! The user brief and the word budget derived from it.

use crate::{PodsmithError, Result};
use serde::{Deserialize, Serialize};

/// Natural speech rate of the synthesis voices, in words per minute.
pub const WORDS_PER_MINUTE: u32 = 150;

/// Overall mood requested for the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Neutral,
    Excited,
    Calm,
    Reflective,
    Enthusiastic,
}

impl Default for Mood {
    fn default() -> Self {
        Self::Neutral
    }
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Excited => "excited",
            Self::Calm => "calm",
            Self::Reflective => "reflective",
            Self::Enthusiastic => "enthusiastic",
        }
    }
}

/// Presentation style of the two-host dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Storytelling,
    Conversational,
    Interview,
    Educational,
    Narrative,
}

impl Default for Style {
    fn default() -> Self {
        Self::Conversational
    }
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storytelling => "storytelling",
            Self::Conversational => "conversational",
            Self::Interview => "interview",
            Self::Educational => "educational",
            Self::Narrative => "narrative",
        }
    }
}

/// A user brief. Immutable once a job has been accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    /// Episode topic
    pub topic: String,

    /// Optional angle or emphasis within the topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,

    #[serde(default)]
    pub mood: Mood,

    #[serde(default)]
    pub style: Style,

    #[serde(default = "default_chapters")]
    pub chapters: u32,

    /// Desired episode length in minutes
    #[serde(default = "default_duration_min")]
    pub duration_min: u32,

    /// Optional URL or file path used to ground the research stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn default_chapters() -> u32 {
    3
}

fn default_duration_min() -> u32 {
    5
}

impl Brief {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            focus: None,
            mood: Mood::default(),
            style: Style::default(),
            chapters: default_chapters(),
            duration_min: default_duration_min(),
            source: None,
        }
    }
}

/// Bounds a brief must satisfy before a job is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefConstraints {
    #[serde(default = "default_min_chapters")]
    pub min_chapters: u32,
    #[serde(default = "default_max_chapters")]
    pub max_chapters: u32,
    #[serde(default = "default_min_duration_min")]
    pub min_duration_min: u32,
    #[serde(default = "default_max_duration_min")]
    pub max_duration_min: u32,
    #[serde(default = "default_max_topic_length")]
    pub max_topic_length: usize,
    #[serde(default = "default_max_focus_length")]
    pub max_focus_length: usize,
}

fn default_min_chapters() -> u32 {
    1
}

fn default_max_chapters() -> u32 {
    10
}

fn default_min_duration_min() -> u32 {
    1
}

fn default_max_duration_min() -> u32 {
    120
}

fn default_max_topic_length() -> usize {
    500
}

fn default_max_focus_length() -> usize {
    1000
}

impl Default for BriefConstraints {
    fn default() -> Self {
        Self {
            min_chapters: default_min_chapters(),
            max_chapters: default_max_chapters(),
            min_duration_min: default_min_duration_min(),
            max_duration_min: default_max_duration_min(),
            max_topic_length: default_max_topic_length(),
            max_focus_length: default_max_focus_length(),
        }
    }
}

impl BriefConstraints {
    /// Reject a brief that falls outside the enumerated bounds.
    ///
    /// Returns a `validation` error; no job is created for a rejected brief.
    pub fn check(&self, brief: &Brief) -> Result<()> {
        if brief.topic.trim().is_empty() {
            return Err(PodsmithError::Validation("topic must not be empty".into()));
        }
        if brief.topic.chars().count() > self.max_topic_length {
            return Err(PodsmithError::Validation(format!(
                "topic exceeds {} characters",
                self.max_topic_length
            )));
        }
        if let Some(ref focus) = brief.focus {
            if focus.chars().count() > self.max_focus_length {
                return Err(PodsmithError::Validation(format!(
                    "focus exceeds {} characters",
                    self.max_focus_length
                )));
            }
        }
        if brief.chapters < self.min_chapters || brief.chapters > self.max_chapters {
            return Err(PodsmithError::Validation(format!(
                "chapters must be between {} and {}",
                self.min_chapters, self.max_chapters
            )));
        }
        if brief.duration_min < self.min_duration_min || brief.duration_min > self.max_duration_min
        {
            return Err(PodsmithError::Validation(format!(
                "duration must be between {} and {} minutes",
                self.min_duration_min, self.max_duration_min
            )));
        }
        Ok(())
    }
}

/// Spoken-word targets derived from the brief, fixed for the job's lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WordBudget {
    /// Target spoken words for the whole episode
    pub total_words: u32,
    /// Target spoken words per chapter (rounded)
    pub per_chapter: u32,
    /// Episode-level tolerance band, percent
    pub tolerance_percent: f64,
}

impl WordBudget {
    pub fn new(duration_min: u32, chapters: u32, tolerance_percent: f64) -> Self {
        let total_words = duration_min * WORDS_PER_MINUTE;
        let per_chapter = ((total_words as f64) / (chapters.max(1) as f64)).round() as u32;
        Self {
            total_words,
            per_chapter,
            tolerance_percent,
        }
    }

    pub fn for_brief(brief: &Brief) -> Self {
        Self::new(brief.duration_min, brief.chapters, 5.0)
    }

    /// Signed deviation of `actual` from `target`, in percent.
    pub fn deviation_percent(target: u32, actual: u32) -> f64 {
        if target == 0 {
            return 0.0;
        }
        (actual as f64 - target as f64) / target as f64 * 100.0
    }

    /// Whether an episode-level spoken-word count sits inside the band.
    pub fn within_tolerance(&self, actual: u32) -> bool {
        Self::deviation_percent(self.total_words, actual).abs() <= self.tolerance_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_derivation() {
        let budget = WordBudget::new(5, 3, 5.0);
        assert_eq!(budget.total_words, 750);
        assert_eq!(budget.per_chapter, 250);

        let budget = WordBudget::new(1, 1, 5.0);
        assert_eq!(budget.total_words, 150);
        assert_eq!(budget.per_chapter, 150);
    }

    #[test]
    fn per_chapter_rounds() {
        // 750 / 4 = 187.5 rounds up
        let budget = WordBudget::new(5, 4, 5.0);
        assert_eq!(budget.per_chapter, 188);
    }

    #[test]
    fn tolerance_band() {
        let budget = WordBudget::new(5, 3, 5.0);
        assert!(budget.within_tolerance(750));
        assert!(budget.within_tolerance(713));
        assert!(budget.within_tolerance(787));
        assert!(!budget.within_tolerance(700));
        assert!(!budget.within_tolerance(800));
    }

    #[test]
    fn deviation_sign() {
        assert!(WordBudget::deviation_percent(100, 60) < 0.0);
        assert!(WordBudget::deviation_percent(100, 140) > 0.0);
        assert_eq!(WordBudget::deviation_percent(0, 50), 0.0);
    }

    #[test]
    fn constraints_accept_valid_brief() {
        let constraints = BriefConstraints::default();
        assert!(constraints.check(&Brief::new("The history of the bicycle")).is_ok());
    }

    #[test]
    fn constraints_reject_empty_topic() {
        let constraints = BriefConstraints::default();
        let err = constraints.check(&Brief::new("   ")).unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[test]
    fn constraints_reject_out_of_range() {
        let constraints = BriefConstraints::default();

        let mut brief = Brief::new("topic");
        brief.chapters = 11;
        assert!(constraints.check(&brief).is_err());

        let mut brief = Brief::new("topic");
        brief.duration_min = 121;
        assert!(constraints.check(&brief).is_err());

        let mut brief = Brief::new("topic");
        brief.duration_min = 0;
        assert!(constraints.check(&brief).is_err());

        let brief = Brief::new("x".repeat(501));
        assert!(constraints.check(&brief).is_err());
    }

    #[test]
    fn mood_and_style_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Mood::Reflective).unwrap(), "\"reflective\"");
        assert_eq!(
            serde_json::to_string(&Style::Storytelling).unwrap(),
            "\"storytelling\""
        );
    }

    #[test]
    fn brief_defaults_from_minimal_json() {
        let brief: Brief = serde_json::from_str(r#"{"topic": "Bees"}"#).unwrap();
        assert_eq!(brief.chapters, 3);
        assert_eq!(brief.duration_min, 5);
        assert_eq!(brief.mood, Mood::Neutral);
        assert_eq!(brief.style, Style::Conversational);
        assert!(brief.source.is_none());
    }
}
