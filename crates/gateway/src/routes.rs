//! Webhook and operator REST handlers.

use {
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::{debug, error, info},
};

use atendo_whatsapp::WebhookPayload;

use crate::{Error, server::AppState, service::IngestOutcome};

// ── Error mapping ────────────────────────────────────────────────────────────

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Chats(atendo_chats::Error::UnknownChat { .. }) => StatusCode::NOT_FOUND,
            Error::Chats(atendo_chats::Error::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            Error::Chats(atendo_chats::Error::Persistence { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

// ── Webhook ──────────────────────────────────────────────────────────────────

/// Provider webhook entry point.
///
/// Ingestion-boundary errors — unknown categories, textless messages, even a
/// body that does not parse — are acknowledged with a 200 so the provider
/// does not retry them forever. Only a persistence failure returns 500; the
/// provider retries and idempotency makes the retry safe.
pub async fn webhook_handler(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "undecodable webhook body; acknowledged and dropped");
            return (StatusCode::OK, Json(json!({"success": true})));
        },
    };

    match state.service.ingest(&payload).await {
        Ok(IngestOutcome::Applied { chat, message }) => {
            info!(chat_id = %chat.id, message_id = %message.id, "inbound message stored");
            (StatusCode::OK, Json(json!({"success": true})))
        },
        Ok(IngestOutcome::Duplicate { chat_id }) => {
            debug!(chat_id = %chat_id, "duplicate inbound acknowledged");
            (StatusCode::OK, Json(json!({"success": true})))
        },
        Ok(IngestOutcome::Ignored(reason)) => {
            debug!(?reason, "webhook event ignored");
            (StatusCode::OK, Json(json!({"success": true})))
        },
        Err(e) => {
            error!(error = %e, "webhook ingestion failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
        },
    }
}

// ── Operator REST ────────────────────────────────────────────────────────────

pub async fn list_chats_handler(
    State(state): State<AppState>,
) -> crate::Result<Json<serde_json::Value>> {
    let chats = state.service.store().list_chats().await?;
    Ok(Json(json!({"chats": chats})))
}

pub async fn list_messages_handler(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> crate::Result<Json<serde_json::Value>> {
    let store = state.service.store();
    store
        .get_chat(&chat_id)
        .await?
        .ok_or_else(|| atendo_chats::Error::unknown_chat(&chat_id))?;
    let messages = store.list_messages(&chat_id).await?;
    Ok(Json(json!({"messages": messages})))
}

pub async fn mark_read_handler(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> crate::Result<Json<serde_json::Value>> {
    let chat = state.service.store().mark_read(&chat_id).await?;
    Ok(Json(json!({"chat": chat})))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default, rename = "chatId")]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    pub text: String,
}

pub async fn send_message_handler(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> crate::Result<Json<serde_json::Value>> {
    if req.text.trim().is_empty() {
        return Err(atendo_chats::Error::invalid_input("empty message text").into());
    }

    let (chat, message) = match (&req.chat_id, &req.number) {
        (Some(chat_id), _) => state.service.send_to_chat(chat_id, &req.text).await?,
        (None, Some(number)) => state.service.send_to_number(number, &req.text).await?,
        (None, None) => {
            return Err(
                atendo_chats::Error::invalid_input("either chatId or number is required").into(),
            );
        },
    };
    Ok(Json(json!({"chat": chat, "message": message})))
}

pub async fn connection_handler(
    State(state): State<AppState>,
) -> crate::Result<Json<serde_json::Value>> {
    let overview = state.service.connection().await?;
    Ok(Json(serde_json::to_value(&overview).unwrap_or_default()))
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let subscribers = state.service.hub().subscriber_count().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "subscribers": subscribers,
    }))
}
