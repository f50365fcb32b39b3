//! Job lifecycle types.
//!
//! A job is created on brief acceptance and driven through a closed state
//! machine. Terminal states are absorbing: the registry rejects every write
//! to a terminal job except artifact attachment at the completion instant.

use crate::{Brief, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Number of progress steps reported per job.
pub const TOTAL_STEPS: u32 = 7;

/// Closed job state machine.
///
/// ```text
/// queued ─► processing ─► completed
///    │           │
///    │           ├─► failed
///    │           └─► cancelled
///    └─► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (Self::Queued, Self::Processing) => true,
            (Self::Queued, Self::Cancelled) => true,
            (Self::Processing, Self::Completed) => true,
            (Self::Processing, Self::Failed) => true,
            (Self::Processing, Self::Cancelled) => true,
            _ => false,
        }
    }
}

/// How close a spoken-word count landed to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Accuracy {
    /// Classify `actual` against `target`: excellent within 5%, good within
    /// 10%, fair within 20%, poor beyond.
    pub fn classify(target: u32, actual: u32) -> Self {
        if target == 0 {
            return Self::Poor;
        }
        let deviation = (actual as f64 - target as f64).abs() / target as f64 * 100.0;
        if deviation <= 5.0 {
            Self::Excellent
        } else if deviation <= 10.0 {
            Self::Good
        } else if deviation <= 20.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// The documents produced by the pipeline, attached to a completed job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeArtifacts {
    pub plan: String,
    pub research: String,
    pub outline: String,
    /// One script per chapter, in chapter order
    pub scripts: Vec<String>,
    pub tone_script: String,
    pub final_script: String,
}

/// Metadata computed when a job completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Probed duration of the final MP3
    pub duration_secs: f64,
    /// Spoken words in the final script
    pub word_count: u32,
    pub chapters: u32,
    pub actual_words_per_minute: f64,
    pub accuracy: Accuracy,
    pub generation_time_ms: u64,
    /// Wall-clock per stage, keyed by stage name
    #[serde(default)]
    pub stage_timings_ms: BTreeMap<String, u64>,
}

/// Terminal error recorded on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

/// One generation job, exclusively owned by the job registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub brief: Brief,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub steps_completed: u32,
    pub total_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<EpisodeArtifacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JobMetadata>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl Job {
    pub fn new(brief: Brief) -> Self {
        Self {
            id: Uuid::new_v4(),
            brief,
            state: JobState::Queued,
            current_step: None,
            steps_completed: 0,
            total_steps: TOTAL_STEPS,
            artifacts: None,
            audio_path: None,
            metadata: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// A progress event for a single job. Delivered in non-decreasing
/// `completed` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub step: String,
    pub completed: u32,
    pub total: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_absorbing() {
        for terminal in [JobState::Completed, JobState::Failed, JobState::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                JobState::Queued,
                JobState::Processing,
                JobState::Completed,
                JobState::Failed,
                JobState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn legal_transitions() {
        assert!(JobState::Queued.can_transition_to(JobState::Processing));
        assert!(JobState::Queued.can_transition_to(JobState::Cancelled));
        assert!(JobState::Processing.can_transition_to(JobState::Completed));
        assert!(JobState::Processing.can_transition_to(JobState::Failed));
        assert!(JobState::Processing.can_transition_to(JobState::Cancelled));
        assert!(!JobState::Queued.can_transition_to(JobState::Completed));
        assert!(!JobState::Completed.can_transition_to(JobState::Processing));
    }

    #[test]
    fn accuracy_buckets() {
        assert_eq!(Accuracy::classify(750, 750), Accuracy::Excellent);
        assert_eq!(Accuracy::classify(750, 713), Accuracy::Excellent);
        assert_eq!(Accuracy::classify(750, 690), Accuracy::Good);
        assert_eq!(Accuracy::classify(750, 640), Accuracy::Fair);
        assert_eq!(Accuracy::classify(750, 500), Accuracy::Poor);
        assert_eq!(Accuracy::classify(0, 100), Accuracy::Poor);
    }

    #[test]
    fn accuracy_classification_is_idempotent() {
        // Classifying the same pair twice yields the same bucket.
        for (target, actual) in [(750u32, 700u32), (150, 150), (300, 400)] {
            assert_eq!(
                Accuracy::classify(target, actual),
                Accuracy::classify(target, actual)
            );
        }
    }

    #[test]
    fn new_job_is_queued() {
        let job = Job::new(Brief::new("Topic"));
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.steps_completed, 0);
        assert_eq!(job.total_steps, 7);
        assert!(job.error.is_none());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn job_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobState::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(serde_json::to_string(&JobState::Queued).unwrap(), "\"queued\"");
    }
}
