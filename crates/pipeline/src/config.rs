//! Application configuration.

use std::path::{Path, PathBuf};

use podsmith_agents::RemoteAgentIds;
use podsmith_audio::SynthesizerConfig;
use podsmith_common::{BriefConstraints, PodsmithError, Result};
use podsmith_llm::BackendConfig;
use serde::{Deserialize, Serialize};

/// Optional remote assistant ids, one per pipeline role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub researcher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outliner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
}

impl AssistantIds {
    pub fn to_remote_ids(&self) -> RemoteAgentIds {
        RemoteAgentIds {
            planner: self.planner.clone(),
            researcher: self.researcher.clone(),
            outliner: self.outliner.clone(),
            scripter: self.scripter.clone(),
            tone: self.tone.clone(),
            editor: self.editor.clone(),
        }
    }
}

/// Throughput and budget knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSettings {
    /// Speech rate the word budget is derived from
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
    /// Episode-level word tolerance, percent
    #[serde(default = "default_tolerance_percent")]
    pub tolerance_percent: f64,
    /// Bounded fan-out cap for chapter scripting
    #[serde(default = "default_max_concurrent_scripters")]
    pub max_concurrent_scripters: usize,
    /// Jobs processed concurrently across the service
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_words_per_minute() -> u32 {
    podsmith_common::WORDS_PER_MINUTE
}

fn default_tolerance_percent() -> f64 {
    5.0
}

fn default_max_concurrent_scripters() -> usize {
    5
}

fn default_max_concurrent_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            words_per_minute: default_words_per_minute(),
            tolerance_percent: default_tolerance_percent(),
            max_concurrent_scripters: default_max_concurrent_scripters(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Final MP3s and artifact documents land here, keyed by job id
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Per-job scratch directories live under here
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Optional intro jingle, prepended when the file exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jingle_path: Option<PathBuf>,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub tts: SynthesizerConfig,
    #[serde(default)]
    pub performance: PerformanceSettings,
    #[serde(default)]
    pub assistants: AssistantIds,
    #[serde(default)]
    pub constraints: BriefConstraints,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("podsmith")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            temp_dir: default_temp_dir(),
            jingle_path: None,
            backend: BackendConfig::default(),
            tts: SynthesizerConfig::default(),
            performance: PerformanceSettings::default(),
            assistants: AssistantIds::default(),
            constraints: BriefConstraints::default(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            PodsmithError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_CONFIG: &str = r#"
output_dir = "/srv/podsmith/out"
jingle_path = "/srv/podsmith/jingle.mp3"

[backend]
chat_model = "gpt-4o-mini"

[tts]
model = "tts-1-hd"
speed = 1.1

[tts.voices]
host1 = "nova"
host2 = "onyx"

[performance]
tolerance_percent = 4.0
max_concurrent_scripters = 3
max_concurrent_jobs = 2

[assistants]
planner = "asst_plan"
editor = "asst_edit"

[constraints]
max_chapters = 8
"#;

    #[test]
    fn full_config_from_toml() {
        let config: AppConfig = toml::from_str(TOML_CONFIG).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/podsmith/out"));
        assert_eq!(
            config.jingle_path.as_deref(),
            Some(Path::new("/srv/podsmith/jingle.mp3"))
        );
        assert_eq!(config.backend.chat_model, "gpt-4o-mini");
        assert_eq!(config.tts.model, "tts-1-hd");
        assert_eq!(config.tts.voices.host1, "nova");
        assert_eq!(config.performance.tolerance_percent, 4.0);
        assert_eq!(config.performance.max_concurrent_scripters, 3);
        assert_eq!(config.assistants.planner.as_deref(), Some("asst_plan"));
        assert!(config.assistants.scripter.is_none());
        assert_eq!(config.constraints.max_chapters, 8);
        // Untouched sections keep their defaults
        assert_eq!(config.constraints.max_duration_min, 120);
        assert_eq!(config.performance.words_per_minute, 150);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.output_dir, PathBuf::from("./output"));
        assert_eq!(config.performance.max_concurrent_scripters, 5);
        assert_eq!(config.performance.tolerance_percent, 5.0);
        assert!(config.performance.max_concurrent_jobs >= 1);
        assert_eq!(config.tts.voices.host1, "alloy");
        assert_eq!(config.tts.voices.host2, "echo");
    }

    #[test]
    fn assistant_ids_convert() {
        let ids = AssistantIds {
            tone: Some("asst_tone".to_string()),
            ..Default::default()
        };
        let remote = ids.to_remote_ids();
        assert_eq!(remote.tone.as_deref(), Some("asst_tone"));
        assert!(remote.planner.is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(AppConfig::from_file("/nonexistent/podsmith.toml").is_err());
    }
}
