//! Disposable address and stored message management

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use rowdymail_core::{AddressStats, CreateAddress, DisposableAddress, InboundMessage, UserMessage};
use serde::{Deserialize, Serialize};

use super::SuccessResponse;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deactivated: u64,
}

fn user_id(query: Result<Query<UserQuery>, QueryRejection>) -> Result<String, ApiError> {
    let Query(UserQuery { user_id }) =
        query.map_err(|_| ApiError::InvalidRequest("user_id is required".to_string()))?;
    if user_id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("user_id is required".to_string()));
    }
    Ok(user_id)
}

/// `POST /api/addresses`
pub async fn create(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateAddress>, JsonRejection>,
) -> Result<(StatusCode, Json<DisposableAddress>), ApiError> {
    let Json(request) = body?;
    let address = state.addresses.create(request).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// `GET /api/addresses?user_id=`
pub async fn list(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Vec<DisposableAddress>>, ApiError> {
    let user_id = user_id(query)?;
    Ok(Json(state.addresses.list(&user_id).await?))
}

/// `DELETE /api/addresses/:id?user_id=`
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let user_id = user_id(query)?;
    state.addresses.deactivate(&id, &user_id).await?;
    Ok(SuccessResponse::ok())
}

/// `GET /api/addresses/stats?user_id=`
pub async fn stats(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<AddressStats>, ApiError> {
    let user_id = user_id(query)?;
    Ok(Json(state.addresses.stats(&user_id).await?))
}

/// `GET /api/addresses/:id/messages`
pub async fn address_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<InboundMessage>>, ApiError> {
    Ok(Json(state.addresses.messages(&id).await?))
}

/// `GET /api/messages?user_id=`
pub async fn user_messages(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Vec<UserMessage>>, ApiError> {
    let user_id = user_id(query)?;
    Ok(Json(state.addresses.messages_for_user(&user_id).await?))
}

/// `POST /api/messages/:id/read`
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.addresses.mark_read(&id).await?;
    Ok(SuccessResponse::ok())
}

/// `DELETE /api/messages/:id`
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.addresses.delete_message(&id).await?;
    Ok(SuccessResponse::ok())
}

/// `POST /api/maintenance/cleanup`
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let deactivated = state.addresses.cleanup_expired().await?;
    Ok(Json(CleanupResponse { deactivated }))
}
