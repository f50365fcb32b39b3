//! The pipeline orchestrator.
//!
//! Drives one job through the seven stages, owns the per-job scratch
//! directory, fans out chapter scripting with bounded concurrency, and
//! persists artifacts next to the final MP3. Cancellation is observed at
//! stage boundaries; in-flight calls finish but their outputs are discarded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use podsmith_agents::{
    tone, AgentRuntime, ChapterScript, Editor, FinalScript, Outline, OutlineSection, Outliner,
    Plan, Planner, Researcher, Scripter, SectionKind, ToneAnnotator,
};
use podsmith_audio::{chapter_filename, AudioProbe, EpisodeAssembler, SpeechSynthesizer};
use podsmith_common::{
    Accuracy, Brief, EpisodeArtifacts, JobMetadata, JobState, PodsmithError, ProgressUpdate,
    Result, WordBudget, TOTAL_STEPS,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::registry::JobRegistry;

/// Observer for per-job progress events.
pub type ProgressCallback = Arc<dyn Fn(Uuid, ProgressUpdate) + Send + Sync>;

/// Knobs the orchestrator needs from the application configuration.
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub max_concurrent_scripters: usize,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub jingle_path: Option<PathBuf>,
    /// Episode-level word tolerance, percent
    pub tolerance_percent: f64,
}

/// Everything a finished pipeline hands back for the completion write.
struct CompletedEpisode {
    artifacts: EpisodeArtifacts,
    audio_path: PathBuf,
    metadata: JobMetadata,
}

pub struct Orchestrator {
    planner: Planner,
    researcher: Researcher,
    outliner: Outliner,
    scripter: Arc<Scripter>,
    tone: ToneAnnotator,
    editor: Editor,
    synthesizer: Arc<SpeechSynthesizer>,
    assembler: Arc<dyn EpisodeAssembler>,
    registry: Arc<JobRegistry>,
    settings: StageSettings,
    on_progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        synthesizer: Arc<SpeechSynthesizer>,
        assembler: Arc<dyn EpisodeAssembler>,
        registry: Arc<JobRegistry>,
        settings: StageSettings,
    ) -> Self {
        Self {
            planner: Planner::new(Arc::clone(&runtime)),
            researcher: Researcher::new(Arc::clone(&runtime)),
            outliner: Outliner::new(Arc::clone(&runtime)),
            scripter: Arc::new(Scripter::new(Arc::clone(&runtime))),
            tone: ToneAnnotator::new(Arc::clone(&runtime)),
            editor: Editor::new(runtime),
            synthesizer,
            assembler,
            registry,
            settings,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Run one job to a terminal state. Owns all cleanup: the scratch
    /// directory goes away on every exit path, and partial outputs are
    /// removed on failure or cancellation.
    pub async fn run_job(&self, job_id: Uuid) {
        let Some(job) = self.registry.get(job_id).await else {
            warn!(job_id = %job_id, "Asked to run an unknown job");
            return;
        };
        let brief = job.brief;

        // A cancel that landed before the pipeline started wins here.
        if let Err(e) = self.registry.start(job_id).await {
            debug!(job_id = %job_id, reason = %e, "Job did not start");
            return;
        }

        let scratch_dir = self.settings.temp_dir.join(job_id.to_string());
        if let Err(e) = tokio::fs::create_dir_all(&scratch_dir).await {
            self.registry
                .fail(
                    job_id,
                    podsmith_common::ErrorKind::Internal,
                    format!("could not create scratch directory: {e}"),
                )
                .await;
            return;
        }

        let started = Instant::now();
        let result = self.run_pipeline(job_id, &brief, &scratch_dir, started).await;

        self.cleanup_scratch(&scratch_dir).await;

        match result {
            Ok(episode) => {
                let audio_path = episode.audio_path.clone();
                if self
                    .registry
                    .complete(job_id, episode.artifacts, audio_path, episode.metadata)
                    .await
                    .is_err()
                {
                    // Cancelled at the completion instant: outputs are discarded.
                    info!(job_id = %job_id, "Job ended before completion write; discarding outputs");
                    self.remove_outputs(job_id).await;
                }
            }
            Err(PodsmithError::Cancelled) => {
                info!(job_id = %job_id, "Pipeline stopped at a stage boundary after cancellation");
                self.remove_outputs(job_id).await;
            }
            Err(e) => {
                self.remove_outputs(job_id).await;
                self.registry.fail(job_id, e.kind(), e.to_string()).await;
            }
        }
    }

    async fn run_pipeline(
        &self,
        job_id: Uuid,
        brief: &Brief,
        scratch_dir: &Path,
        started: Instant,
    ) -> Result<CompletedEpisode> {
        let budget = WordBudget::new(
            brief.duration_min,
            brief.chapters,
            self.settings.tolerance_percent,
        );
        let mut timings: BTreeMap<String, u64> = BTreeMap::new();

        self.enter_stage(job_id, "plan", 1).await?;
        let stage_start = Instant::now();
        let plan = self.planner.run(brief, &budget).await?;
        timings.insert("plan".into(), stage_start.elapsed().as_millis() as u64);

        self.enter_stage(job_id, "research", 2).await?;
        let stage_start = Instant::now();
        let research = self.researcher.run(brief, &plan).await?;
        timings.insert("research".into(), stage_start.elapsed().as_millis() as u64);

        self.enter_stage(job_id, "outline", 3).await?;
        let stage_start = Instant::now();
        let outline = self.outliner.run(brief, &budget, &plan, &research).await?;
        timings.insert("outline".into(), stage_start.elapsed().as_millis() as u64);

        self.enter_stage(job_id, "scripts", 4).await?;
        let stage_start = Instant::now();
        let scripts = self.script_chapters(brief, &budget, &outline).await?;
        timings.insert("scripts".into(), stage_start.elapsed().as_millis() as u64);

        self.enter_stage(job_id, "tone", 5).await?;
        let stage_start = Instant::now();
        let tone_script = self.tone.run(&scripts, brief.mood, brief.style).await?;
        timings.insert("tone".into(), stage_start.elapsed().as_millis() as u64);

        self.enter_stage(job_id, "edit", 6).await?;
        let stage_start = Instant::now();
        let final_script = self
            .editor
            .run(&tone_script.markdown, &budget, brief.style, brief.mood)
            .await?;
        timings.insert("edit".into(), stage_start.elapsed().as_millis() as u64);

        self.enter_stage(job_id, "audio", 7).await?;
        let stage_start = Instant::now();
        let (audio_path, probe, chapter_count) = self
            .produce_audio(job_id, &final_script, scratch_dir)
            .await?;
        timings.insert("audio".into(), stage_start.elapsed().as_millis() as u64);

        let artifacts = EpisodeArtifacts {
            plan: plan.markdown.clone(),
            research,
            outline: outline.markdown.clone(),
            scripts: scripts.iter().map(|s| s.markdown.clone()).collect(),
            tone_script: tone_script.markdown.clone(),
            final_script: final_script.markdown.clone(),
        };
        self.persist_artifacts(job_id, &artifacts).await?;

        let metadata = build_metadata(
            brief,
            &plan,
            &budget,
            &final_script,
            &probe,
            chapter_count,
            timings,
            started,
        );

        info!(
            job_id = %job_id,
            duration_secs = probe.duration_secs,
            word_count = metadata.word_count,
            accuracy = ?metadata.accuracy,
            "Episode produced"
        );

        Ok(CompletedEpisode {
            artifacts,
            audio_path,
            metadata,
        })
    }

    /// Stage boundary: observe cancellation, then record progress. Progress
    /// events for one job are monotone in `completed`.
    async fn enter_stage(&self, job_id: Uuid, step_name: &str, step: u32) -> Result<()> {
        match self.registry.state(job_id).await {
            Some(JobState::Cancelled) => return Err(PodsmithError::Cancelled),
            Some(JobState::Processing) => {}
            other => {
                return Err(PodsmithError::Internal(format!(
                    "job {job_id} in unexpected state {other:?} at stage {step_name}"
                )))
            }
        }

        let completed = step - 1;
        if let Err(e) = self
            .registry
            .update(job_id, |job| {
                job.current_step = Some(step_name.to_string());
                job.steps_completed = completed;
            })
            .await
        {
            // Lost a race with cancel between the state read and the write
            if self.registry.state(job_id).await == Some(JobState::Cancelled) {
                return Err(PodsmithError::Cancelled);
            }
            return Err(e);
        }

        if let Some(ref callback) = self.on_progress {
            callback(
                job_id,
                ProgressUpdate {
                    step: step_name.to_string(),
                    completed,
                    total: TOTAL_STEPS,
                },
            );
        }
        debug!(job_id = %job_id, step = step_name, completed, "Stage entered");
        Ok(())
    }

    /// Bounded fan-out over chapters. Batches of `max_concurrent_scripters`
    /// run concurrently; a batch joins fully before the next is issued, and
    /// results land in chapter index order regardless of completion order.
    async fn script_chapters(
        &self,
        brief: &Brief,
        budget: &WordBudget,
        outline: &Outline,
    ) -> Result<Vec<ChapterScript>> {
        let sections: Vec<OutlineSection> = outline
            .chapter_sections()
            .into_iter()
            .cloned()
            .collect();
        if sections.is_empty() {
            return Err(PodsmithError::agent(
                "scripter",
                "outline contains no chapter sections",
            ));
        }

        let mut scripts: Vec<Option<ChapterScript>> = Vec::new();
        scripts.resize_with(sections.len(), || None);

        let indices: Vec<usize> = (0..sections.len()).collect();
        for batch in indices.chunks(self.settings.max_concurrent_scripters.max(1)) {
            let mut handles = Vec::with_capacity(batch.len());
            for &idx in batch {
                let scripter = Arc::clone(&self.scripter);
                let section = sections[idx].clone();
                let outline_md = outline.markdown.clone();
                let style = brief.style;
                let target = budget.per_chapter;
                let chapter_number = match section.kind {
                    SectionKind::Chapter(n) => n,
                    _ => idx as u32 + 1,
                };
                handles.push((
                    idx,
                    tokio::spawn(async move {
                        scripter
                            .run(&section, chapter_number, target, style, &outline_md)
                            .await
                    }),
                ));
            }
            for (idx, handle) in handles {
                let script = handle.await.map_err(|e| {
                    PodsmithError::Internal(format!("scripter task failed: {e}"))
                })??;
                scripts[idx] = Some(script);
            }
        }

        scripts
            .into_iter()
            .map(|script| {
                script.ok_or_else(|| PodsmithError::Internal("missing chapter script".into()))
            })
            .collect()
    }

    /// Synthesize and assemble: utterance MP3s per chapter, chapter files,
    /// then the final episode with the optional jingle first.
    async fn produce_audio(
        &self,
        job_id: Uuid,
        final_script: &FinalScript,
        scratch_dir: &Path,
    ) -> Result<(PathBuf, AudioProbe, u32)> {
        let chapters = tone::parse_chapter_utterances(&final_script.markdown);
        if chapters.is_empty() {
            return Err(PodsmithError::agent(
                "editor",
                "final script contains no synthesizable utterances",
            ));
        }

        let mut chapter_files = Vec::with_capacity(chapters.len());
        for chapter in &chapters {
            let utterance_files = self
                .synthesizer
                .synthesize_chapter(chapter.chapter, &chapter.utterances, scratch_dir)
                .await?;
            let combined = scratch_dir.join(chapter_filename(chapter.chapter));
            self.assembler.concat(&utterance_files, &combined).await?;
            chapter_files.push(combined);
        }

        let mut inputs = Vec::new();
        if let Some(ref jingle) = self.settings.jingle_path {
            if tokio::fs::try_exists(jingle).await.unwrap_or(false) {
                inputs.push(jingle.clone());
            } else {
                warn!(jingle = %jingle.display(), "Configured jingle missing; skipping");
            }
        }
        inputs.extend(chapter_files);

        tokio::fs::create_dir_all(&self.settings.output_dir).await?;
        let audio_path = self.settings.output_dir.join(format!("{job_id}.mp3"));
        self.assembler.concat(&inputs, &audio_path).await?;
        let probe = self.assembler.probe(&audio_path).await?;

        Ok((audio_path, probe, chapters.len() as u32))
    }

    async fn persist_artifacts(&self, job_id: Uuid, artifacts: &EpisodeArtifacts) -> Result<()> {
        #[derive(Serialize)]
        struct ArtifactDocument<'a> {
            id: Uuid,
            timestamp: DateTime<Utc>,
            artifacts: &'a EpisodeArtifacts,
        }

        let document = ArtifactDocument {
            id: job_id,
            timestamp: Utc::now(),
            artifacts,
        };
        let path = self.artifact_path(job_id);
        let json = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(&path, json).await?;
        debug!(path = %path.display(), "Artifacts persisted");
        Ok(())
    }

    fn artifact_path(&self, job_id: Uuid) -> PathBuf {
        self.settings
            .output_dir
            .join(format!("{job_id}-artifacts.json"))
    }

    async fn cleanup_scratch(&self, scratch_dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(scratch_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %scratch_dir.display(), error = %e, "Scratch cleanup failed");
            }
        }
    }

    /// Remove the final MP3 and artifact document of a job that did not
    /// complete.
    async fn remove_outputs(&self, job_id: Uuid) {
        for path in [
            self.settings.output_dir.join(format!("{job_id}.mp3")),
            self.artifact_path(job_id),
        ] {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Partial output removal failed");
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_metadata(
    brief: &Brief,
    plan: &Plan,
    budget: &WordBudget,
    final_script: &FinalScript,
    probe: &AudioProbe,
    chapters: u32,
    stage_timings_ms: BTreeMap<String, u64>,
    started: Instant,
) -> JobMetadata {
    let word_count = final_script.spoken_words as u32;
    let actual_words_per_minute = if probe.duration_secs > 0.0 {
        word_count as f64 * 60.0 / probe.duration_secs
    } else {
        0.0
    };

    JobMetadata {
        title: Some(brief.topic.clone()),
        description: plan.overview.clone(),
        duration_secs: probe.duration_secs,
        word_count,
        chapters,
        actual_words_per_minute,
        accuracy: Accuracy::classify(budget.total_words, word_count),
        generation_time_ms: started.elapsed().as_millis() as u64,
        stage_timings_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_derivation() {
        let brief = Brief::new("Bicycles");
        let budget = WordBudget::new(5, 3, 5.0);
        let plan = podsmith_agents::planner::parse_plan(
            "## Overview\nA bicycle episode.\n".to_string(),
            &budget,
        );
        let final_script = FinalScript {
            markdown: String::new(),
            spoken_words: 750,
            deviation_percent: 0.0,
            attempts: 1,
        };
        let probe = AudioProbe {
            duration_secs: 300.0,
            bitrate_kbps: Some(128),
            codec: Some("mp3".into()),
            sample_rate: Some(44100),
        };

        let metadata = build_metadata(
            &brief,
            &plan,
            &budget,
            &final_script,
            &probe,
            3,
            BTreeMap::new(),
            Instant::now(),
        );

        assert_eq!(metadata.word_count, 750);
        assert_eq!(metadata.chapters, 3);
        assert_eq!(metadata.accuracy, Accuracy::Excellent);
        assert!((metadata.actual_words_per_minute - 150.0).abs() < 0.01);
        assert_eq!(metadata.description.as_deref(), Some("A bicycle episode."));
    }

    #[test]
    fn words_per_minute_handles_zero_duration() {
        let brief = Brief::new("x");
        let budget = WordBudget::new(1, 1, 5.0);
        let plan = podsmith_agents::planner::parse_plan(String::new(), &budget);
        let final_script = FinalScript {
            markdown: String::new(),
            spoken_words: 150,
            deviation_percent: 0.0,
            attempts: 1,
        };
        let probe = AudioProbe {
            duration_secs: 0.0,
            bitrate_kbps: None,
            codec: None,
            sample_rate: None,
        };
        let metadata = build_metadata(
            &brief,
            &plan,
            &budget,
            &final_script,
            &probe,
            1,
            BTreeMap::new(),
            Instant::now(),
        );
        assert_eq!(metadata.actual_words_per_minute, 0.0);
    }
}
