use agentbridge_core::error::{
    DirectoryError, ExecutionError, GenerationError, ProviderError,
};
use agentbridge_core::{CompletionFailure, PartialCompletion, PipelineError, Stage};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error response for every route.
///
/// Serialises as `{ "success": false, "message": "...", "error": "<kind>", ... }`
/// plus the failed stage and any partial pipeline results.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub message: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_query: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_results: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                success: false,
                message: message.into(),
                error: code.into(),
                stage: None,
                upstream_status: None,
                upstream_body: None,
                generated_query: None,
                api_results: None,
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "agent_not_found", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn with_partial(mut self, partial: PartialCompletion) -> Self {
        self.body.generated_query = partial.generated_query;
        self.body.api_results = partial.api_results;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        let (status, code) = match &err {
            DirectoryError::NotFound(_) => (StatusCode::NOT_FOUND, "agent_not_found"),
            DirectoryError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            DirectoryError::Invalid(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            DirectoryError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "directory_error"),
        };
        Self::new(status, code, err.to_string())
    }
}

// Malformed or incomplete request bodies get the same JSON envelope as every other failure.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
    }
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        PipelineError::AgentNotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Generation(GenerationError::Provider(ProviderError::Timeout(_))) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        PipelineError::Generation(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Execution(ExecutionError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::Execution(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Synthesis(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let mut api = Self::new(status_for(&err), err.kind(), err.to_string());
        api.body.stage = Some(err.stage());
        if let PipelineError::Execution(ExecutionError::Status { status, body }) = err {
            api.body.upstream_status = Some(status);
            api.body.upstream_body = Some(body);
        }
        api
    }
}

impl From<CompletionFailure> for ApiError {
    fn from(failure: CompletionFailure) -> Self {
        Self::from(failure.error).with_partial(failure.partial)
    }
}
