//! In-memory job registry.
//!
//! The registry exclusively owns every [`Job`]; the orchestrator and the
//! service mutate through it. Terminal states are absorbing: `update`
//! rejects writes to terminal jobs, and artifact attachment happens only
//! inside [`JobRegistry::complete`] at the completion instant.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use podsmith_common::{
    Brief, EpisodeArtifacts, ErrorKind, Job, JobError, JobMetadata, JobState, PodsmithError,
    Result,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// One row of a job listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub topic: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub duration_min: u32,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a brief: assigns an id, state `queued`.
    pub async fn create(&self, brief: Brief) -> Job {
        let job = Job::new(brief);
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        info!(job_id = %job.id, topic = %job.brief.topic, "Job created");
        job
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn state(&self, id: Uuid) -> Option<JobState> {
        self.jobs.read().await.get(&id).map(|job| job.state)
    }

    /// Most recent first, by creation time.
    pub async fn list(&self, limit: usize, offset: usize) -> Vec<JobSummary> {
        let jobs = self.jobs.read().await;
        let mut summaries: Vec<JobSummary> = jobs
            .values()
            .map(|job| JobSummary {
                id: job.id,
                topic: job.brief.topic.clone(),
                state: job.state,
                created_at: job.created_at,
                duration_min: job.brief.duration_min,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.into_iter().skip(offset).take(limit).collect()
    }

    /// Jobs not yet terminal.
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| !job.state.is_terminal())
            .count()
    }

    /// Mutate a non-terminal job atomically.
    pub async fn update(&self, id: Uuid, mutator: impl FnOnce(&mut Job)) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| PodsmithError::Internal(format!("unknown job {id}")))?;
        if job.state.is_terminal() {
            return Err(PodsmithError::Internal(format!(
                "rejected write to terminal job {id}"
            )));
        }
        mutator(job);
        Ok(job.clone())
    }

    /// Move a queued job into `processing`.
    pub async fn start(&self, id: Uuid) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| PodsmithError::Internal(format!("unknown job {id}")))?;
        if !job.state.can_transition_to(JobState::Processing) {
            return Err(PodsmithError::Internal(format!(
                "job {id} cannot start from {:?}",
                job.state
            )));
        }
        job.state = JobState::Processing;
        job.started_at = Some(Utc::now());
        Ok(job.clone())
    }

    /// Complete a processing job, attaching its artifacts in the same write.
    pub async fn complete(
        &self,
        id: Uuid,
        artifacts: EpisodeArtifacts,
        audio_path: PathBuf,
        metadata: JobMetadata,
    ) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| PodsmithError::Internal(format!("unknown job {id}")))?;
        if !job.state.can_transition_to(JobState::Completed) {
            return Err(PodsmithError::Internal(format!(
                "job {id} cannot complete from {:?}",
                job.state
            )));
        }
        job.state = JobState::Completed;
        job.artifacts = Some(artifacts);
        job.audio_path = Some(audio_path);
        job.metadata = Some(metadata);
        job.steps_completed = job.total_steps;
        job.current_step = None;
        job.completed_at = Some(Utc::now());
        info!(job_id = %id, "Job completed");
        Ok(job.clone())
    }

    /// Record a failure. A job that is already terminal (e.g. cancelled
    /// while the pipeline was unwinding) is left untouched.
    pub async fn fail(&self, id: Uuid, kind: ErrorKind, message: impl Into<String>) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            warn!(job_id = %id, "Failure reported for unknown job");
            return;
        };
        if job.state.is_terminal() {
            return;
        }
        job.state = JobState::Failed;
        job.error = Some(JobError {
            kind,
            message: message.into(),
        });
        job.completed_at = Some(Utc::now());
        warn!(job_id = %id, kind = kind.as_str(), "Job failed");
    }

    /// Cancel a job. Valid from `queued` and `processing`; idempotent on
    /// terminal jobs (the existing state is reported back). `None` means the
    /// id is unknown.
    pub async fn cancel(&self, id: Uuid) -> Option<JobState> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id)?;
        if job.state.is_terminal() {
            return Some(job.state);
        }
        job.state = JobState::Cancelled;
        job.completed_at = Some(Utc::now());
        info!(job_id = %id, "Job cancelled");
        Some(JobState::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podsmith_common::Accuracy;

    fn metadata() -> JobMetadata {
        JobMetadata {
            title: None,
            description: None,
            duration_secs: 300.0,
            word_count: 750,
            chapters: 3,
            actual_words_per_minute: 150.0,
            accuracy: Accuracy::Excellent,
            generation_time_ms: 1000,
            stage_timings_ms: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_and_get() {
        let registry = JobRegistry::new();
        let job = registry.create(Brief::new("Topic")).await;
        let fetched = registry.get(job.id).await.unwrap();
        assert_eq!(fetched.state, JobState::Queued);
        assert!(registry.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn lifecycle_to_completed() {
        let registry = JobRegistry::new();
        let job = registry.create(Brief::new("Topic")).await;

        registry.start(job.id).await.unwrap();
        assert_eq!(registry.state(job.id).await, Some(JobState::Processing));

        let completed = registry
            .complete(
                job.id,
                EpisodeArtifacts::default(),
                PathBuf::from("/out/x.mp3"),
                metadata(),
            )
            .await
            .unwrap();
        assert_eq!(completed.state, JobState::Completed);
        assert_eq!(completed.steps_completed, completed.total_steps);
        assert!(completed.artifacts.is_some());
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn update_rejects_terminal_jobs() {
        let registry = JobRegistry::new();
        let job = registry.create(Brief::new("Topic")).await;
        registry.cancel(job.id).await.unwrap();

        let err = registry
            .update(job.id, |job| job.steps_completed = 3)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("terminal"));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let registry = JobRegistry::new();
        let job = registry.create(Brief::new("Topic")).await;

        assert_eq!(registry.cancel(job.id).await, Some(JobState::Cancelled));
        // A second cancel reports the existing state without change
        assert_eq!(registry.cancel(job.id).await, Some(JobState::Cancelled));
        assert_eq!(registry.cancel(Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn cancel_reports_existing_terminal_state() {
        let registry = JobRegistry::new();
        let job = registry.create(Brief::new("Topic")).await;
        registry.start(job.id).await.unwrap();
        registry
            .complete(
                job.id,
                EpisodeArtifacts::default(),
                PathBuf::from("/out/x.mp3"),
                metadata(),
            )
            .await
            .unwrap();

        assert_eq!(registry.cancel(job.id).await, Some(JobState::Completed));
    }

    #[tokio::test]
    async fn fail_leaves_cancelled_jobs_untouched() {
        let registry = JobRegistry::new();
        let job = registry.create(Brief::new("Topic")).await;
        registry.cancel(job.id).await;
        registry.fail(job.id, ErrorKind::Agent, "too late").await;
        assert_eq!(registry.state(job.id).await, Some(JobState::Cancelled));
    }

    #[tokio::test]
    async fn completed_job_cannot_restart() {
        let registry = JobRegistry::new();
        let job = registry.create(Brief::new("Topic")).await;
        registry.start(job.id).await.unwrap();
        registry
            .complete(
                job.id,
                EpisodeArtifacts::default(),
                PathBuf::from("/out/x.mp3"),
                metadata(),
            )
            .await
            .unwrap();

        assert!(registry.start(job.id).await.is_err());
    }

    #[tokio::test]
    async fn list_is_newest_first_with_pagination() {
        let registry = JobRegistry::new();
        for i in 0..5 {
            registry.create(Brief::new(format!("Topic {i}"))).await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let page = registry.list(2, 0).await;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].topic, "Topic 4");
        assert_eq!(page[1].topic, "Topic 3");

        let page = registry.list(2, 4).await;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].topic, "Topic 0");
    }

    #[tokio::test]
    async fn active_count_excludes_terminal() {
        let registry = JobRegistry::new();
        let a = registry.create(Brief::new("A")).await;
        let _b = registry.create(Brief::new("B")).await;
        registry.cancel(a.id).await;
        assert_eq!(registry.active_count().await, 1);
    }
}
