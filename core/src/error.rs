use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::shape::ShapeReport;

/// The pipeline step an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Request,
    Directory,
    Generation,
    Execution,
    Synthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Request => "request",
            Stage::Directory => "directory",
            Stage::Generation => "generation",
            Stage::Execution => "execution",
            Stage::Synthesis => "synthesis",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("completion provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion provider request failed: {0}")]
    Request(String),
    #[error("completion provider returned no choices")]
    NoChoices,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("query generation failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("provider returned no parseable JSON after {attempts} attempts")]
    Unparseable { attempts: u32 },
    #[error("generated query does not match the example shape: {0}")]
    ShapeMismatch(ShapeReport),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("endpoint responded with HTTP {status}")]
    Status { status: u16, body: Value },
    #[error("endpoint did not respond within {0:?}")]
    Timeout(Duration),
    #[error("endpoint request failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("response synthesis failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("completion provider returned an empty answer")]
    EmptyCompletion,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("agent '{0}' not found")]
    NotFound(String),
    #[error("agent with name '{0}' already exists")]
    Conflict(String),
    #[error("invalid agent: {0}")]
    Invalid(String),
    #[error("agent storage failure: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("malformed agent data: {err}"))
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("agent '{0}' not found")]
    AgentNotFound(String),
    #[error(transparent)]
    Directory(DirectoryError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

impl From<DirectoryError> for PipelineError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(name) => Self::AgentNotFound(name),
            other => Self::Directory(other),
        }
    }
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidRequest(_) => Stage::Request,
            Self::AgentNotFound(_) | Self::Directory(_) => Stage::Directory,
            Self::Generation(_) => Stage::Generation,
            Self::Execution(_) => Stage::Execution,
            Self::Synthesis(_) => Stage::Synthesis,
        }
    }

    /// Stable machine-readable error kind for API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::AgentNotFound(_) => "agent_not_found",
            Self::Directory(_) => "directory_error",
            Self::Generation(_) => "generation_error",
            Self::Execution(ExecutionError::Timeout(_)) => "endpoint_timeout",
            Self::Execution(_) => "endpoint_error",
            Self::Synthesis(_) => "synthesis_error",
        }
    }
}

/// Whatever the orchestrator had computed before a stage failed.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PartialCompletion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_query: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_results: Option<Value>,
}

#[derive(Debug, Error)]
#[error("pipeline failed during {stage}: {error}", stage = .error.stage())]
pub struct CompletionFailure {
    #[source]
    pub error: PipelineError,
    pub partial: PartialCompletion,
}

impl CompletionFailure {
    pub fn new(error: impl Into<PipelineError>, partial: PartialCompletion) -> Self {
        Self {
            error: error.into(),
            partial,
        }
    }
}
