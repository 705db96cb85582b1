//! Mailbox provider proxy (`/api/emails`)

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use rowdymail_core::proxy_client::GeneratedEmail;
use rowdymail_core::{is_valid_email, FetchError, MessageSummary};
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Loose body so each missing piece gets its own message
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyBody {
    pub action: Option<String>,
    pub email: Option<String>,
    pub message_id: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

fn require_email(email: Option<&str>, missing: &str) -> Result<String, ApiError> {
    let email = email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest(missing.to_string()))?;

    if !is_valid_email(email) {
        return Err(ApiError::InvalidRequest("Invalid email format".to_string()));
    }
    Ok(email.to_string())
}

/// Inbox listing; provider failures read as an empty inbox
async fn list_inbox(state: &AppState, email: &str) -> Result<Vec<MessageSummary>, ApiError> {
    match state.mailsac.list_messages(email).await {
        Ok(messages) => Ok(messages),
        Err(err @ FetchError::NotConfigured(_)) => Err(err.into()),
        Err(err) => {
            warn!(email, error = %err, "Inbox listing failed, returning empty inbox");
            Ok(Vec::new())
        }
    }
}

/// `POST /api/emails`
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ProxyBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;

    match body.action.as_deref() {
        Some("generateEmail") => {
            let email = state.mailsac.generate_address(body.prefix.as_deref())?;
            Ok(Json(GeneratedEmail { email }).into_response())
        }
        Some("getMessages") => {
            let email = require_email(
                body.email.as_deref(),
                "Email is required for getMessages action",
            )?;
            Ok(Json(list_inbox(&state, &email).await?).into_response())
        }
        Some("getMessage") => {
            let missing = "Email and messageId are required for getMessage action";
            let email = require_email(body.email.as_deref(), missing)?;
            let message_id = body
                .message_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ApiError::InvalidRequest("Valid messageId is required".into()))?;

            let content = state.mailsac.get_message_content(&email, message_id).await;
            Ok(Json(content).into_response())
        }
        _ => Err(ApiError::InvalidRequest(
            "Valid action is required (getMessages, getMessage, generateEmail)".to_string(),
        )),
    }
}

/// `GET /api/emails?email=`, shorthand for `getMessages`
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Vec<MessageSummary>>, ApiError> {
    let email = require_email(query.email.as_deref(), "Email parameter is required")?;
    Ok(Json(list_inbox(&state, &email).await?))
}
