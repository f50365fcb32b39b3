//! Per-utterance speech synthesis.
//!
//! The unit of synthesis is always a single sentence. Voices are keyed on
//! the speaker; tone is not forwarded to the speech backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use podsmith_common::{PodsmithError, Result, Speaker, Utterance};
use podsmith_llm::{SpeechClient, SpeechRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Voice assignment per host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceMap {
    #[serde(default = "default_host1_voice")]
    pub host1: String,
    #[serde(default = "default_host2_voice")]
    pub host2: String,
}

fn default_host1_voice() -> String {
    "alloy".to_string()
}

fn default_host2_voice() -> String {
    "echo".to_string()
}

impl Default for VoiceMap {
    fn default() -> Self {
        Self {
            host1: default_host1_voice(),
            host2: default_host2_voice(),
        }
    }
}

impl VoiceMap {
    pub fn voice_for(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::Host1 => &self.host1,
            Speaker::Host2 => &self.host2,
        }
    }
}

/// Speech synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub voices: VoiceMap,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_model() -> String {
    "tts-1".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_format() -> String {
    "mp3".to_string()
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            voices: VoiceMap::default(),
            speed: default_speed(),
            format: default_format(),
        }
    }
}

pub struct SpeechSynthesizer {
    client: Arc<dyn SpeechClient>,
    config: SynthesizerConfig,
}

impl SpeechSynthesizer {
    pub fn new(client: Arc<dyn SpeechClient>, config: SynthesizerConfig) -> Self {
        Self { client, config }
    }

    /// Synthesize one chapter's utterances into per-utterance MP3 files in
    /// the job's scratch directory. Files are returned in utterance order.
    ///
    /// Any single failure is fatal: the error propagates and the caller
    /// cleans the scratch directory.
    pub async fn synthesize_chapter(
        &self,
        chapter: u32,
        utterances: &[Utterance],
        scratch_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        info!(
            chapter,
            utterances = utterances.len(),
            "Synthesizing chapter audio"
        );

        let mut paths = Vec::with_capacity(utterances.len());
        for utterance in utterances {
            let voice = self.config.voices.voice_for(utterance.speaker);
            debug!(
                chapter,
                index = utterance.index,
                voice,
                words = utterance.word_count,
                "Synthesizing utterance"
            );

            let bytes = self
                .client
                .speak(SpeechRequest {
                    model: self.config.model.clone(),
                    voice: voice.to_string(),
                    input: utterance.text.clone(),
                    speed: self.config.speed,
                    format: self.config.format.clone(),
                })
                .await?;

            let filename = utterance_filename(chapter, utterance.index);
            let path = scratch_dir.join(filename);
            write_atomic(&path, &bytes).await?;
            paths.push(path);
        }
        Ok(paths)
    }
}

fn utterance_filename(chapter: u32, index: usize) -> String {
    format!(
        "chapter-{chapter}-utterance-{index}-{}.mp3",
        chrono::Utc::now().timestamp_millis()
    )
}

/// Write bytes via a temp file and rename, so a crash never leaves a partial
/// MP3 with the final name.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("mp3.part");
    tokio::fs::write(&temp_path, bytes).await?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| PodsmithError::Audio(format!("failed to place {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingSpeechClient {
        calls: Arc<AtomicUsize>,
        voices: Arc<Mutex<Vec<String>>>,
        fail_at: Option<usize>,
    }

    impl RecordingSpeechClient {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                voices: Arc::new(Mutex::new(Vec::new())),
                fail_at,
            }
        }
    }

    #[async_trait]
    impl SpeechClient for RecordingSpeechClient {
        async fn speak(&self, request: SpeechRequest) -> Result<Vec<u8>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(call) {
                return Err(PodsmithError::Backend("speech backend down".into()));
            }
            self.voices.lock().unwrap().push(request.voice);
            Ok(format!("mp3:{}", request.input).into_bytes())
        }
    }

    fn utterances() -> Vec<Utterance> {
        vec![
            Utterance::new(0, Speaker::Host1, "calm", "First sentence.".to_string()),
            Utterance::new(1, Speaker::Host2, "excited", "Second sentence!".to_string()),
            Utterance::new(2, Speaker::Host1, "calm", "Third sentence.".to_string()),
        ]
    }

    #[tokio::test]
    async fn synthesizes_in_order_with_speaker_voices() {
        let client = Arc::new(RecordingSpeechClient::new(None));
        let voices = client.voices.clone();
        let synthesizer = SpeechSynthesizer::new(client, SynthesizerConfig::default());
        let scratch = tempfile::tempdir().unwrap();

        let paths = synthesizer
            .synthesize_chapter(1, &utterances(), scratch.path())
            .await
            .unwrap();

        assert_eq!(paths.len(), 3);
        for (i, path) in paths.iter().enumerate() {
            assert!(path.exists());
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with(&format!("chapter-1-utterance-{i}-")));
            assert!(name.ends_with(".mp3"));
        }

        assert_eq!(
            voices.lock().unwrap().as_slice(),
            &["alloy".to_string(), "echo".to_string(), "alloy".to_string()]
        );
    }

    #[tokio::test]
    async fn utterance_failure_is_fatal() {
        let client = Arc::new(RecordingSpeechClient::new(Some(1)));
        let synthesizer = SpeechSynthesizer::new(client, SynthesizerConfig::default());
        let scratch = tempfile::tempdir().unwrap();

        let err = synthesizer
            .synthesize_chapter(1, &utterances(), scratch.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "backend");
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_partial_file() {
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join("utterance.mp3");
        write_atomic(&path, b"bytes").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");
        assert!(!scratch.path().join("utterance.mp3.part").exists());
    }

    #[test]
    fn voice_map_defaults() {
        let voices = VoiceMap::default();
        assert_eq!(voices.voice_for(Speaker::Host1), "alloy");
        assert_eq!(voices.voice_for(Speaker::Host2), "echo");
    }

    #[test]
    fn config_defaults() {
        let config = SynthesizerConfig::default();
        assert_eq!(config.model, "tts-1");
        assert_eq!(config.speed, 1.0);
        assert_eq!(config.format, "mp3");
    }
}
