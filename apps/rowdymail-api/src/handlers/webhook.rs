//! Inbound mail webhooks

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, rejection::BytesRejection, Multipart, State},
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use chrono::Utc;
use rowdymail_core::ingest::{FormFields, JsonWebhookPayload};
use rowdymail_core::IncomingMessage;
use serde::Serialize;
use tracing::{debug, info};

use super::SuccessResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Liveness response for the webhook GETs
#[derive(Debug, Serialize)]
pub struct WebhookStatus {
    pub message: &'static str,
    pub timestamp: String,
}

fn status(message: &'static str) -> Json<WebhookStatus> {
    Json(WebhookStatus {
        message,
        timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    })
}

pub async fn email_status() -> Json<WebhookStatus> {
    status("Email webhook endpoint is active")
}

pub async fn improvmx_status() -> Json<WebhookStatus> {
    status("ImprovMX webhook endpoint is active")
}

/// `Authorization: Bearer <secret>` when a secret is configured
fn check_bearer(headers: &HeaderMap, secret: Option<&str>) -> Result<(), ApiError> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(secret) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

async fn deliver(
    state: &AppState,
    source: &'static str,
    message: IncomingMessage,
) -> Result<Json<SuccessResponse>, ApiError> {
    info!(
        source,
        to = %message.to,
        attachments = message.attachments.as_ref().map_or(0, Vec::len),
        "Inbound message received"
    );
    state.gateway.deliver(message).await?;
    Ok(SuccessResponse::ok())
}

/// JSON webhook from the generic forwarder
pub async fn receive_json(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    check_bearer(&headers, state.webhook_secret.as_deref())?;

    let message = JsonWebhookPayload::from_slice(&body?)?.normalize()?;
    deliver(&state, "json", message).await
}

/// Multipart webhook from ImprovMX
pub async fn receive_improvmx(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let fields = read_form(multipart?).await?;
    debug!(fields = fields.len(), "Parsed multipart webhook");

    let message = fields.normalize()?;
    deliver(&state, "improvmx", message).await
}

/// Collect every part; parts with a filename are kept as bytes
async fn read_form(mut multipart: Multipart) -> Result<FormFields, ApiError> {
    let mut fields = FormFields::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if field.file_name().is_some() {
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await?;
            fields.insert_file(name, content_type, data.to_vec());
        } else {
            let text = field.text().await?;
            fields.insert_text(name, text);
        }
    }

    Ok(fields)
}
