use agentbridge_core::{AgentRecord, AgentUpdate};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::api::{AdminAgent, MessageResponse};
use crate::app::AppState;
use crate::error::ApiError;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<AdminAgent>>, ApiError> {
    let records = state.pipeline.directory().list_records().await?;
    Ok(Json(records.into_iter().map(AdminAgent::from).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AdminAgent>, ApiError> {
    let record = state
        .pipeline
        .directory()
        .get_record(&name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Agent with name '{name}' not found")))?;
    Ok(Json(record.into()))
}

pub async fn create(
    State(state): State<AppState>,
    record: Result<Json<AgentRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<AdminAgent>), ApiError> {
    let Json(mut record) = record?;
    // The directory stamps creation time.
    record.created_at = None;
    let created = state.pipeline.directory().create(record).await?;
    info!("Created agent '{}'", created.name);
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    update: Result<Json<AgentUpdate>, JsonRejection>,
) -> Result<Json<AdminAgent>, ApiError> {
    let Json(update) = update?;
    let updated = state.pipeline.directory().update(&name, update).await?;
    info!("Updated agent '{}'", updated.name);
    Ok(Json(updated.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.pipeline.directory().delete(&name).await?;
    info!("Deleted agent '{}'", name);
    Ok(Json(MessageResponse {
        message: format!("Agent '{name}' deleted successfully"),
    }))
}
