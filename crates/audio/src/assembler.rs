//! Episode assembly: concatenating utterance MP3s into chapter files and
//! chapter files into the final episode, plus the metadata probe.
//!
//! The concrete implementation shells out to ffmpeg/ffprobe. The trait seam
//! exists so the pipeline can be exercised without the external tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use podsmith_common::{PodsmithError, Result};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

/// Probed properties of a finished audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioProbe {
    pub duration_secs: f64,
    pub bitrate_kbps: Option<u32>,
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
}

#[async_trait]
pub trait EpisodeAssembler: Send + Sync {
    /// Concatenate `inputs` into `output`, in order.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Probe a finished file for duration and stream properties.
    async fn probe(&self, path: &Path) -> Result<AudioProbe>;
}

/// ffmpeg-backed assembler.
pub struct FfmpegAssembler {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegAssembler {
    pub fn new() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }

    pub fn with_binaries(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Verify ffmpeg is runnable in this environment.
    pub async fn check_available(&self) -> Result<()> {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|_| {
                PodsmithError::Audio(format!(
                    "{} not found; install ffmpeg to enable audio assembly",
                    self.ffmpeg
                ))
            })?;
        Ok(())
    }

    /// Arguments for the concat invocation: every input as `-i`, the concat
    /// audio filter, libmp3lame encoding, overwrite.
    fn concat_args(inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let mut args = Vec::new();
        for input in inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().into_owned());
        }
        let filter: String = (0..inputs.len())
            .map(|i| format!("[{i}:a]"))
            .collect::<String>()
            + &format!("concat=n={}:a=1:v=0[out]", inputs.len());
        args.extend([
            "-filter_complex".to_string(),
            filter,
            "-map".to_string(),
            "[out]".to_string(),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-q:a".to_string(),
            "2".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ]);
        args
    }
}

#[async_trait]
impl EpisodeAssembler for FfmpegAssembler {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(PodsmithError::Audio("nothing to concatenate".into()));
        }
        debug!(
            inputs = inputs.len(),
            output = %output.display(),
            "Concatenating audio"
        );

        let result = Command::new(&self.ffmpeg)
            .args(Self::concat_args(inputs, output))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PodsmithError::Audio(format!("ffmpeg failed to start: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PodsmithError::Audio(format!(
                "ffmpeg concat failed for {}: {}",
                output.display(),
                stderr.trim().lines().last().unwrap_or("unknown error")
            )));
        }

        info!(output = %output.display(), "Concatenation complete");
        Ok(())
    }

    async fn probe(&self, path: &Path) -> Result<AudioProbe> {
        let result = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a:0",
                "-show_entries",
                "format=duration,bit_rate:stream=codec_name,sample_rate",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PodsmithError::Audio(format!("ffprobe failed to start: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PodsmithError::Audio(format!(
                "ffprobe failed for {}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        parse_probe_output(&result.stdout)
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
    sample_rate: Option<String>,
}

fn parse_probe_output(stdout: &[u8]) -> Result<AudioProbe> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| PodsmithError::Audio(format!("unreadable ffprobe output: {e}")))?;

    let format = parsed
        .format
        .ok_or_else(|| PodsmithError::Audio("ffprobe output has no format block".into()))?;
    let duration_secs = format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| PodsmithError::Audio("ffprobe output has no duration".into()))?;

    let stream = parsed.streams.into_iter().next();
    Ok(AudioProbe {
        duration_secs,
        bitrate_kbps: format
            .bit_rate
            .as_deref()
            .and_then(|b| b.parse::<u32>().ok())
            .map(|bps| bps / 1000),
        codec: stream.as_ref().and_then(|s| s.codec_name.clone()),
        sample_rate: stream
            .as_ref()
            .and_then(|s| s.sample_rate.as_deref())
            .and_then(|r| r.parse().ok()),
    })
}

/// Scratch-file name for a combined chapter.
pub fn chapter_filename(chapter: u32) -> String {
    format!(
        "chapter-{chapter}-combined-{}.mp3",
        chrono::Utc::now().timestamp_millis()
    )
}
