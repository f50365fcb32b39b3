//! End-to-end pipeline tests with mocked model, speech, and audio backends.
//!
//! The mock speech client emits one byte per spoken word and the mock
//! assembler concatenates bytes and reports duration as `bytes / 2.5`, so a
//! perfectly budgeted episode probes at exactly `duration_min * 60` seconds.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use podsmith_agents::AgentRuntime;
use podsmith_audio::{AudioProbe, EpisodeAssembler, SpeechSynthesizer, SynthesizerConfig};
use podsmith_common::{
    Brief, BriefConstraints, JobState, PodsmithError, ProgressUpdate, Result,
};
use podsmith_llm::{LlmClient, LlmRequest, LlmResponse, SpeechClient, SpeechRequest};
use podsmith_pipeline::{
    ArtifactsOutcome, JobRegistry, Orchestrator, PodcastService, StageSettings,
};
use uuid::Uuid;

// --- Mock model backend ---

#[derive(Default)]
struct MockLlm {
    researcher_calls: AtomicUsize,
    scripter_concurrent: AtomicU32,
    scripter_max_concurrent: AtomicU32,
    scripter_delay_ms: u64,
    tone_legacy: bool,
}

fn num_after(text: &str, prefix: &str) -> Option<u32> {
    let idx = text.find(prefix)?;
    let rest = text[idx + prefix.len()..].trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Dialogue containing exactly `words` spoken words, opening with a chapter
/// marker line.
fn dialogue_with_words(chapter: u32, words: u32) -> String {
    let mut lines = vec![format!("**Host 1:** Chapter {chapter} begins now.")];
    let mut remaining = words.saturating_sub(4) as usize;
    let mut host = 2;
    while remaining > 0 {
        let take = remaining.min(10);
        let text = vec!["word"; take].join(" ");
        lines.push(format!("**Host {host}:** {text}."));
        host = 3 - host;
        remaining -= take;
    }
    lines.push("Speaking notes: steady pace.".to_string());
    lines.join("\n")
}

impl MockLlm {
    fn plan(&self, user: &str) -> String {
        let chapters = num_after(user, "Chapters:").unwrap_or(3);
        let per_chapter = num_after(user, "about").unwrap_or(250);
        let mut md = String::from(
            "## Overview\nA guided tour of the topic.\n\n## Target Audience\nCurious listeners.\n\n## Narrative Structure\nChronological.\n\n## Chapter Breakdown\n",
        );
        for i in 1..=chapters {
            md.push_str(&format!(
                "\n### Chapter {i}: Part {i}\n- Duration: 2 minutes (~{per_chapter} words)\n- Key Points: one; two; three\n- Narrative Purpose: Advance part {i}.\n- Research Focus: Facts for part {i}.\n",
            ));
        }
        md.push_str("\n## Research Priorities\nPrimary sources.\n\n## Style Guidelines\nKeep it light.\n\n## Success Metrics\nWord target met.\n");
        md
    }

    fn research(&self) -> String {
        "## Executive Summary\nSolid footing.\n\n## Key Facts & Statistics\n- fact one\n- fact two\n\n## Main Themes & Perspectives\n- theme\n".to_string()
    }

    fn outline(&self, user: &str) -> String {
        let chapters = num_after(user, "Chapters:").unwrap_or(3);
        let per_chapter = num_after(user, "about").unwrap_or(250);
        let mut md = String::from(
            "## Episode Overview\nThe arc of the episode.\n\n## Opening Hook\n- open with a surprise\n\n## Chapter Outlines\n",
        );
        for i in 1..=chapters {
            md.push_str(&format!(
                "\n### Chapter {i}: Part {i}\n- Word Target: {per_chapter} words\n- Narrative Purpose: Advance part {i}.\n- Discussion Points:\n  - first point\n  - second point\n",
            ));
        }
        md.push_str("\n## Closing Segment\n- recap\n\n## Pacing Notes\nBrisk.\n");
        md
    }

    async fn script(&self, user: &str) -> String {
        let current = self.scripter_concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.scripter_max_concurrent
            .fetch_max(current, Ordering::SeqCst);
        if self.scripter_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.scripter_delay_ms)).await;
        }
        self.scripter_concurrent.fetch_sub(1, Ordering::SeqCst);

        let chapter = num_after(user, "Chapter").unwrap_or(1);
        let target = num_after(user, "Target spoken words:").unwrap_or(250);
        dialogue_with_words(chapter, target)
    }

    fn annotate(&self, user: &str) -> String {
        let combined = user
            .split("Annotate every dialogue line:\n\n")
            .nth(1)
            .unwrap_or(user);
        combined
            .lines()
            .map(|line| {
                if line.trim_start().starts_with("**Host") {
                    if let Some(idx) = line.find(":** ") {
                        let rest = &line[idx + 4..];
                        return if self.tone_legacy {
                            format!("**[calm]** {rest}")
                        } else {
                            format!("{}:** [calm] {rest}", &line[..idx])
                        };
                    }
                }
                line.to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn edit(&self, user: &str) -> String {
        user.split("# Script\n\n").nth(1).unwrap_or(user).to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let system = request.system_prompt.clone().unwrap_or_default();
        let user = request
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let content = if system.contains("episode planner") {
            self.plan(&user)
        } else if system.contains("podcast researcher") {
            self.researcher_calls.fetch_add(1, Ordering::SeqCst);
            self.research()
        } else if system.contains("podcast outliner") {
            self.outline(&user)
        } else if system.contains("script writer") {
            self.script(&user).await
        } else if system.contains("tone annotator") {
            self.annotate(&user)
        } else if system.contains("script editor") {
            self.edit(&user)
        } else {
            return Err(PodsmithError::Internal(format!(
                "mock received unknown system prompt: {system}"
            )));
        };

        Ok(LlmResponse {
            content,
            model: "mock".to_string(),
            usage: None,
            finish_reason: None,
        })
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

// --- Mock speech backend: one byte per spoken word ---

struct MockSpeech;

#[async_trait]
impl SpeechClient for MockSpeech {
    async fn speak(&self, request: SpeechRequest) -> Result<Vec<u8>> {
        let words = request
            .input
            .split_whitespace()
            .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
            .count();
        Ok(vec![b'w'; words.max(1)])
    }
}

// --- Mock assembler: binary concat, duration = bytes / 2.5 ---

struct MockAssembler;

#[async_trait]
impl EpisodeAssembler for MockAssembler {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut bytes = Vec::new();
        for input in inputs {
            bytes.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn probe(&self, path: &Path) -> Result<AudioProbe> {
        let bytes = tokio::fs::read(path).await?;
        Ok(AudioProbe {
            duration_secs: bytes.len() as f64 / 2.5,
            bitrate_kbps: Some(128),
            codec: Some("mp3".to_string()),
            sample_rate: Some(44100),
        })
    }
}

// --- Harness ---

struct Harness {
    registry: Arc<JobRegistry>,
    orchestrator: Arc<Orchestrator>,
    mock: Arc<MockLlm>,
    output_dir: PathBuf,
    temp_dir: PathBuf,
    progress: Arc<Mutex<Vec<ProgressUpdate>>>,
    _root: tempfile::TempDir,
}

fn harness_with(mock: MockLlm, max_scripters: usize, jingle: Option<&[u8]>) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let output_dir = root.path().join("output");
    let temp_dir = root.path().join("tmp");
    std::fs::create_dir_all(&output_dir).unwrap();
    std::fs::create_dir_all(&temp_dir).unwrap();

    let jingle_path = jingle.map(|bytes| {
        let path = root.path().join("jingle.mp3");
        std::fs::write(&path, bytes).unwrap();
        path
    });

    let mock = Arc::new(mock);
    let runtime = Arc::new(AgentRuntime::chat_only(mock.clone() as Arc<dyn LlmClient>));
    let synthesizer = Arc::new(SpeechSynthesizer::new(
        Arc::new(MockSpeech),
        SynthesizerConfig::default(),
    ));
    let registry = Arc::new(JobRegistry::new());
    let progress: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let progress_sink = progress.clone();

    let orchestrator = Orchestrator::new(
        runtime,
        synthesizer,
        Arc::new(MockAssembler),
        Arc::clone(&registry),
        StageSettings {
            max_concurrent_scripters: max_scripters,
            temp_dir: temp_dir.clone(),
            output_dir: output_dir.clone(),
            jingle_path,
            tolerance_percent: 5.0,
        },
    )
    .with_progress(Arc::new(move |_id, update| {
        progress_sink.lock().unwrap().push(update);
    }));

    Harness {
        registry,
        orchestrator: Arc::new(orchestrator),
        mock,
        output_dir,
        temp_dir,
        progress,
        _root: root,
    }
}

fn harness() -> Harness {
    harness_with(MockLlm::default(), 5, None)
}

impl Harness {
    fn service(&self) -> PodcastService {
        PodcastService::with_components(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.registry),
            BriefConstraints::default(),
            4,
        )
    }

    async fn wait_for_terminal(&self, id: Uuid) -> JobState {
        for _ in 0..500 {
            if let Some(state) = self.registry.state(id).await {
                if state.is_terminal() {
                    // Give run_job a beat to finish cleanup after the state flips
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not reach a terminal state");
    }
}

fn brief(chapters: u32, duration_min: u32) -> Brief {
    let mut brief = Brief::new("The history of the bicycle");
    brief.chapters = chapters;
    brief.duration_min = duration_min;
    brief
}

// --- Scenarios ---

#[tokio::test]
async fn happy_path_produces_episode_and_artifacts() {
    let harness = harness();
    let service = harness.service();

    let id = service.submit(brief(3, 5)).await.unwrap();
    let state = harness.wait_for_terminal(id).await;
    assert_eq!(state, JobState::Completed);

    let job = service.status(id).await.unwrap();
    let metadata = job.metadata.unwrap();
    assert!((712..=788).contains(&metadata.word_count));
    assert_eq!(metadata.chapters, 3);
    assert!((270.0..=330.0).contains(&metadata.duration_secs));
    assert!((metadata.actual_words_per_minute - 150.0).abs() < 5.0);
    assert_eq!(job.steps_completed, 7);

    // Final MP3 exists and matches the audio path
    let audio_path = job.audio_path.unwrap();
    assert_eq!(audio_path, harness.output_dir.join(format!("{id}.mp3")));
    assert!(audio_path.exists());

    // Artifact document sits next to it with all six keys
    let artifact_json =
        std::fs::read_to_string(harness.output_dir.join(format!("{id}-artifacts.json"))).unwrap();
    let document: serde_json::Value = serde_json::from_str(&artifact_json).unwrap();
    assert_eq!(document["id"], serde_json::json!(id.to_string()));
    let artifacts = &document["artifacts"];
    for key in ["plan", "research", "outline", "scripts", "tone_script", "final_script"] {
        assert!(artifacts.get(key).is_some(), "missing artifact key {key}");
    }
    assert_eq!(artifacts["scripts"].as_array().unwrap().len(), 3);

    // Scratch directory is gone
    assert!(!harness.temp_dir.join(id.to_string()).exists());

    // Chapter scripts joined in plan order
    match service.artifacts(id).await.unwrap() {
        ArtifactsOutcome::Ready(artifacts) => {
            for (i, script) in artifacts.scripts.iter().enumerate() {
                assert!(script.contains(&format!("Chapter {} begins", i + 1)));
            }
        }
        ArtifactsOutcome::NotReady(state) => panic!("artifacts not ready in state {state:?}"),
    }
}

#[tokio::test]
async fn progress_is_monotone_and_covers_all_stages() {
    let harness = harness();
    let service = harness.service();

    let id = service.submit(brief(2, 2)).await.unwrap();
    assert_eq!(harness.wait_for_terminal(id).await, JobState::Completed);

    let updates = harness.progress.lock().unwrap().clone();
    assert_eq!(updates.len(), 7);
    let steps: Vec<&str> = updates.iter().map(|u| u.step.as_str()).collect();
    assert_eq!(
        steps,
        vec!["plan", "research", "outline", "scripts", "tone", "edit", "audio"]
    );
    for window in updates.windows(2) {
        assert!(window[0].completed <= window[1].completed);
    }
    assert!(updates.iter().all(|u| u.total == 7));
}

#[tokio::test]
async fn source_grounding_skips_research_model_calls() {
    let harness = harness();
    let service = harness.service();

    let source_dir = tempfile::tempdir().unwrap();
    let source_path = source_dir.path().join("bicycle-notes.md");
    let source_body = format!("The draisine story. {}", "bicycle facts ".repeat(600));
    std::fs::write(&source_path, &source_body).unwrap();

    let mut brief = brief(3, 5);
    brief.source = Some(source_path.to_string_lossy().to_string());

    let id = service.submit(brief).await.unwrap();
    assert_eq!(harness.wait_for_terminal(id).await, JobState::Completed);

    assert_eq!(harness.mock.researcher_calls.load(Ordering::SeqCst), 0);

    match service.artifacts(id).await.unwrap() {
        ArtifactsOutcome::Ready(artifacts) => {
            assert!(artifacts.research.contains("bicycle notes"));
            assert!(artifacts.research.contains("The draisine story."));
        }
        ArtifactsOutcome::NotReady(state) => panic!("artifacts not ready in state {state:?}"),
    }
}

#[tokio::test]
async fn single_chapter_minute_episode() {
    let harness = harness();
    let service = harness.service();

    let id = service.submit(brief(1, 1)).await.unwrap();
    assert_eq!(harness.wait_for_terminal(id).await, JobState::Completed);

    let job = service.status(id).await.unwrap();
    let metadata = job.metadata.unwrap();
    assert_eq!(metadata.chapters, 1);
    assert_eq!(metadata.word_count, 150);
    assert!((45.0..=75.0).contains(&metadata.duration_secs));
}

#[tokio::test]
async fn jingle_is_prepended_when_present() {
    let jingle_bytes: &[u8] = b"JINGLEBYTES";
    let harness = harness_with(MockLlm::default(), 5, Some(jingle_bytes));
    let service = harness.service();

    let id = service.submit(brief(1, 1)).await.unwrap();
    assert_eq!(harness.wait_for_terminal(id).await, JobState::Completed);

    let audio = std::fs::read(harness.output_dir.join(format!("{id}.mp3"))).unwrap();
    assert!(audio.starts_with(jingle_bytes));
    // 150 spoken words follow the jingle
    assert_eq!(audio.len(), jingle_bytes.len() + 150);
}

#[tokio::test]
async fn legacy_tone_format_still_completes() {
    let mock = MockLlm {
        tone_legacy: true,
        ..Default::default()
    };
    let harness = harness_with(mock, 5, None);
    let service = harness.service();

    let id = service.submit(brief(2, 2)).await.unwrap();
    assert_eq!(harness.wait_for_terminal(id).await, JobState::Completed);

    let job = service.status(id).await.unwrap();
    assert!(job.audio_path.unwrap().exists());
    match service.artifacts(id).await.unwrap() {
        ArtifactsOutcome::Ready(artifacts) => {
            assert!(artifacts.tone_script.contains("**[calm]**"));
        }
        ArtifactsOutcome::NotReady(state) => panic!("artifacts not ready in state {state:?}"),
    }
}

#[tokio::test]
async fn fan_out_respects_concurrency_cap() {
    let mock = MockLlm {
        scripter_delay_ms: 50,
        ..Default::default()
    };
    let harness = harness_with(mock, 5, None);
    let service = harness.service();

    let id = service.submit(brief(10, 120)).await.unwrap();
    assert_eq!(harness.wait_for_terminal(id).await, JobState::Completed);

    assert!(harness.mock.scripter_max_concurrent.load(Ordering::SeqCst) <= 5);

    let job = service.status(id).await.unwrap();
    assert_eq!(job.metadata.unwrap().chapters, 10);
}

#[tokio::test]
async fn cancellation_during_scripting_discards_everything() {
    let mock = MockLlm {
        scripter_delay_ms: 300,
        ..Default::default()
    };
    let harness = harness_with(mock, 5, None);

    let job = harness.registry.create(brief(3, 5)).await;
    let id = job.id;
    let orchestrator = Arc::clone(&harness.orchestrator);
    let handle = tokio::spawn(async move { orchestrator.run_job(id).await });

    // Wait until the scripter fan-out is in flight, then cancel
    for _ in 0..500 {
        let current = harness
            .registry
            .get(id)
            .await
            .and_then(|job| job.current_step);
        if current.as_deref() == Some("scripts") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        harness.registry.cancel(id).await,
        Some(JobState::Cancelled)
    );

    handle.await.unwrap();

    assert_eq!(harness.registry.state(id).await, Some(JobState::Cancelled));
    assert!(!harness.output_dir.join(format!("{id}.mp3")).exists());
    assert!(!harness
        .output_dir
        .join(format!("{id}-artifacts.json"))
        .exists());
    assert!(!harness.temp_dir.join(id.to_string()).exists());
}

#[tokio::test]
async fn cancel_before_start_never_runs_the_pipeline() {
    let harness = harness();

    let job = harness.registry.create(brief(2, 2)).await;
    harness.registry.cancel(job.id).await;

    harness.orchestrator.run_job(job.id).await;

    assert_eq!(
        harness.registry.state(job.id).await,
        Some(JobState::Cancelled)
    );
    assert!(harness.progress.lock().unwrap().is_empty());
    assert!(!harness.temp_dir.join(job.id.to_string()).exists());
}

#[tokio::test]
async fn cancellation_is_idempotent_via_service() {
    let harness = harness();
    let service = harness.service();

    let id = service.submit(brief(2, 2)).await.unwrap();
    assert_eq!(harness.wait_for_terminal(id).await, JobState::Completed);

    // Cancel on a completed job reports the existing state
    assert_eq!(service.cancel(id).await, Some(JobState::Completed));
    assert_eq!(service.cancel(Uuid::new_v4()).await, None);
}
