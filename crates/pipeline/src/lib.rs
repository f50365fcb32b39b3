//! Orchestration and job management for podsmith.
//!
//! [`PodcastService`] is the transport-agnostic surface: submit a brief, poll
//! status, fetch artifacts, cancel, list, validate. Behind it, the
//! [`Orchestrator`] drives each job through the seven pipeline stages and the
//! [`JobRegistry`] owns all job state.

pub mod config;
pub mod orchestrator;
pub mod registry;
pub mod service;

pub use config::{AppConfig, AssistantIds, PerformanceSettings};
pub use orchestrator::{Orchestrator, ProgressCallback, StageSettings};
pub use registry::{JobRegistry, JobSummary};
pub use service::{ArtifactsOutcome, BriefEstimates, BriefValidation, PodcastService};
