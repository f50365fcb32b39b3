//! Speech synthesis and audio assembly for podsmith.
//!
//! Synthesis turns sentence-level utterances into per-utterance MP3s in the
//! job's scratch directory; assembly stitches them into chapter files and
//! the final episode with ffmpeg, then probes the result.

pub mod assembler;
pub mod synth;

pub use assembler::{chapter_filename, AudioProbe, EpisodeAssembler, FfmpegAssembler};
pub use synth::{SpeechSynthesizer, SynthesizerConfig, VoiceMap};
