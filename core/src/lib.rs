//! Query orchestration for natural-language agents bound to third-party APIs.
//!
//! A request flows through the [`registry`] (agent lookup), the
//! [`generator`] (free text to structured query), the [`executor`] (the
//! third-party call) and the [`synthesizer`] (result to answer), sequenced
//! by [`pipeline::Pipeline`].

pub mod agent;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod generator;
pub mod llm;
pub mod pipeline;
pub mod registry;
pub mod shape;
pub mod store;
pub mod synthesizer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{AgentConfig, AgentRecord, AgentSummary, AgentUpdate, Completion, QueryRequest};
pub use error::{CompletionFailure, PartialCompletion, PipelineError, Stage};
pub use pipeline::Pipeline;
