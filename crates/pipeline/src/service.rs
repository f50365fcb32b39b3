//! The transport-agnostic job service.
//!
//! Submission is synchronous (validate, create, return the id); execution is
//! asynchronous, bounded by a cross-job semaphore. Everything the HTTP
//! gateway exposes goes through here.

use std::sync::Arc;

use podsmith_agents::AgentRuntime;
use podsmith_audio::{FfmpegAssembler, SpeechSynthesizer};
use podsmith_common::{Brief, BriefConstraints, EpisodeArtifacts, Job, JobState, Result, WordBudget};
use podsmith_llm::{build_assistant_client, build_chat_client, build_speech_client};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::orchestrator::{Orchestrator, StageSettings};
use crate::registry::{JobRegistry, JobSummary};

/// Derived numbers returned by `validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefEstimates {
    pub target_words: u32,
    pub words_per_chapter: u32,
    /// Episode length, minutes
    pub estimated_duration_min: u32,
    /// Soft wall-clock budget for generation, seconds
    pub processing_time_secs: u32,
}

/// Synchronous pre-flight result for a brief.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefValidation {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub estimates: BriefEstimates,
}

/// Outcome of an artifacts query for a known job.
#[derive(Debug, Clone)]
pub enum ArtifactsOutcome {
    Ready(EpisodeArtifacts),
    /// The job exists but has not completed
    NotReady(JobState),
}

pub struct PodcastService {
    registry: Arc<JobRegistry>,
    orchestrator: Arc<Orchestrator>,
    constraints: BriefConstraints,
    job_slots: Arc<Semaphore>,
}

impl PodcastService {
    /// Wire the full production stack from configuration.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let chat = build_chat_client(&config.backend);
        let assistant = build_assistant_client(&config.backend);
        let runtime = Arc::new(AgentRuntime::new(
            chat,
            assistant,
            config.assistants.to_remote_ids(),
        ));

        let speech = build_speech_client(&config.backend);
        let synthesizer = Arc::new(SpeechSynthesizer::new(speech, config.tts.clone()));

        let assembler = Arc::new(FfmpegAssembler::new());
        if let Err(e) = assembler.check_available().await {
            warn!(error = %e, "Audio tool unavailable; jobs will fail at the audio stage");
        }

        tokio::fs::create_dir_all(&config.output_dir).await?;
        tokio::fs::create_dir_all(&config.temp_dir).await?;
        sweep_scratch(&config.temp_dir).await;

        let settings = StageSettings {
            max_concurrent_scripters: config.performance.max_concurrent_scripters,
            temp_dir: config.temp_dir.clone(),
            output_dir: config.output_dir.clone(),
            jingle_path: config.jingle_path.clone(),
            tolerance_percent: config.performance.tolerance_percent,
        };

        let registry = Arc::new(JobRegistry::new());
        let orchestrator = Arc::new(Orchestrator::new(
            runtime,
            synthesizer,
            assembler,
            Arc::clone(&registry),
            settings,
        ));

        Ok(Self::with_components(
            orchestrator,
            registry,
            config.constraints,
            config.performance.max_concurrent_jobs,
        ))
    }

    /// Assemble a service from pre-built components. Test seam.
    pub fn with_components(
        orchestrator: Arc<Orchestrator>,
        registry: Arc<JobRegistry>,
        constraints: BriefConstraints,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            constraints,
            job_slots: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    /// Accept a brief and start generation in the background.
    ///
    /// A brief outside the enumerated constraints is rejected synchronously
    /// with a `validation` error and no job is created.
    pub async fn submit(&self, brief: Brief) -> Result<Uuid> {
        self.constraints.check(&brief)?;
        let job = self.registry.create(brief).await;
        let job_id = job.id;

        let orchestrator = Arc::clone(&self.orchestrator);
        let slots = Arc::clone(&self.job_slots);
        tokio::spawn(async move {
            // The job stays queued until a slot frees up.
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };
            orchestrator.run_job(job_id).await;
        });

        info!(job_id = %job_id, "Job submitted");
        Ok(job_id)
    }

    pub async fn status(&self, id: Uuid) -> Option<Job> {
        self.registry.get(id).await
    }

    /// Artifacts are only served for completed jobs.
    pub async fn artifacts(&self, id: Uuid) -> Option<ArtifactsOutcome> {
        let job = self.registry.get(id).await?;
        match (job.state, job.artifacts) {
            (JobState::Completed, Some(artifacts)) => Some(ArtifactsOutcome::Ready(artifacts)),
            (state, _) => Some(ArtifactsOutcome::NotReady(state)),
        }
    }

    /// Cancel a job; idempotent. `None` means the id is unknown.
    pub async fn cancel(&self, id: Uuid) -> Option<JobState> {
        self.registry.cancel(id).await
    }

    pub async fn list(&self, limit: usize, offset: usize) -> Vec<JobSummary> {
        self.registry.list(limit, offset).await
    }

    pub async fn active_jobs(&self) -> usize {
        self.registry.active_count().await
    }

    /// Synchronous pre-flight: constraint check plus advisory warnings,
    /// recommendations, and derived estimates. Never creates a job.
    pub fn validate(&self, brief: &Brief) -> BriefValidation {
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        let valid = match self.constraints.check(brief) {
            Ok(()) => true,
            Err(e) => {
                warnings.push(e.to_string());
                false
            }
        };

        if brief.chapters > brief.duration_min.saturating_mul(2) {
            warnings.push(format!(
                "{} chapters in {} minutes leaves under 30 seconds per chapter",
                brief.chapters, brief.duration_min
            ));
        }
        if brief.duration_min >= 60 {
            warnings.push("episodes over an hour take proportionally long to generate".into());
        }

        if brief.chapters > 1 && brief.duration_min / brief.chapters.max(1) < 2 {
            recommendations
                .push("allow at least two minutes per chapter for developed dialogue".into());
        }
        if brief.focus.is_none() {
            recommendations.push("adding a focus narrows research and tightens the script".into());
        }

        let budget = WordBudget::for_brief(brief);
        BriefValidation {
            valid,
            warnings,
            recommendations,
            estimates: BriefEstimates {
                target_words: budget.total_words,
                words_per_chapter: budget.per_chapter,
                estimated_duration_min: brief.duration_min,
                processing_time_secs: brief.duration_min * 12,
            },
        }
    }
}

/// Remove scratch directories left behind by a crashed predecessor.
async fn sweep_scratch(temp_dir: &std::path::Path) {
    let Ok(mut entries) = tokio::fs::read_dir(temp_dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.is_dir() {
            warn!(dir = %path.display(), "Removing stale scratch directory");
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!(dir = %path.display(), error = %e, "Stale scratch removal failed");
            }
        }
    }
}
