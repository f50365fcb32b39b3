//! The podsmith pipeline agents.
//!
//! Seven model-backed stages share one execute contract ([`AgentRuntime`]):
//! planner, researcher, outliner, scripter (fanned out per chapter), tone
//! annotator, and editor. Each stage emits markdown the next stage parses
//! tolerantly; the parsers live beside their stages.

pub mod editor;
pub mod fetch;
pub mod outliner;
pub mod planner;
pub mod researcher;
pub mod runtime;
pub mod scripter;
pub mod tone;

pub use editor::{Editor, FinalScript};
pub use fetch::{ContentFetcher, FetchedContent};
pub use outliner::{Outline, OutlineSection, Outliner, SectionKind};
pub use planner::{Plan, PlanChapter, Planner};
pub use researcher::Researcher;
pub use runtime::{AgentRole, AgentRuntime, RemoteAgentIds, Sampling};
pub use scripter::{ChapterScript, Scripter};
pub use tone::{ChapterUtterances, EmotionalArc, ToneAnnotator, ToneScript};
