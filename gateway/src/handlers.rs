use agentbridge_core::{AgentSummary, QueryRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use crate::api::{
    CompleteQueryResponse, ExecuteQueryRequest, ExecuteQueryResponse, GenerateQueryResponse,
    GetResponseRequest, GetResponseResponse, RootResponse,
};
use crate::app::AppState;
use crate::error::ApiError;

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Agent Gateway API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn health_check() -> &'static str {
    "Agent Gateway: Operational"
}

pub async fn list_agents(State(state): State<AppState>) -> Result<Json<Vec<AgentSummary>>, ApiError> {
    Ok(Json(state.pipeline.directory().list_agents().await?))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AgentSummary>, ApiError> {
    let record = state
        .pipeline
        .directory()
        .get_record(&name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Agent '{name}' not found")))?;
    Ok(Json(record.summary()))
}

// Stage 1 only
pub async fn generate_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<GenerateQueryResponse>, ApiError> {
    let Json(payload) = payload?;
    info!("Agent '{}' asked to generate a query", payload.agent_name);
    let generated_query = state.pipeline.generate_query(&payload).await?;

    Ok(Json(GenerateQueryResponse {
        generated_query,
        success: true,
        message: Some("Query generated successfully".to_string()),
    }))
}

// Stage 2 only
pub async fn execute_query(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteQueryRequest>, JsonRejection>,
) -> Result<Json<ExecuteQueryResponse>, ApiError> {
    let Json(payload) = payload?;
    info!("Agent '{}' asked to execute a query", payload.agent_name);
    let api_results = state
        .pipeline
        .execute_query(&payload.agent_name, &payload.query)
        .await?;

    Ok(Json(ExecuteQueryResponse {
        api_results,
        success: true,
    }))
}

// Stage 3 only
pub async fn get_response(
    State(state): State<AppState>,
    payload: Result<Json<GetResponseRequest>, JsonRejection>,
) -> Result<Json<GetResponseResponse>, ApiError> {
    let Json(payload) = payload?;
    let request = QueryRequest {
        agent_name: payload.agent_name,
        user_query: payload.user_query,
    };
    info!("Agent '{}' asked for a response", request.agent_name);
    let response = state.pipeline.respond(&request, &payload.api_results).await?;

    Ok(Json(GetResponseResponse {
        response,
        success: true,
        message: Some("Response generated successfully".to_string()),
    }))
}

// All three stages
pub async fn complete_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<CompleteQueryResponse>, ApiError> {
    let Json(payload) = payload?;
    info!("Agent '{}' received: {}", payload.agent_name, payload.user_query);
    let completion = state.pipeline.complete(&payload).await?;

    Ok(Json(CompleteQueryResponse {
        response: completion.response,
        generated_query: completion.generated_query,
        api_results: completion.api_results,
        success: true,
    }))
}
