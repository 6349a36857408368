//! WebSocket connection lifecycle for inbox viewers.
//!
//! A viewer sends `subscribe`/`unsubscribe` request frames; the gateway
//! answers with a snapshot (current roster or chat history) and then streams
//! live events through the registration created in the fanout hub. The
//! registration is attached *before* the snapshot is read, so nothing is
//! lost in between — at worst the viewer sees an item twice and dedups by
//! id. All registrations are released deterministically when the socket
//! closes.

use std::collections::HashMap;

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    serde::Deserialize,
    serde_json::json,
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::{debug, info, warn},
};

use {
    atendo_common::new_id,
    atendo_fanout::Subscription,
    atendo_protocol::{
        ErrorShape, MAX_PAYLOAD_BYTES, ResponseFrame, SubscribeParams, ViewerFrame, error_codes,
    },
};

use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct UnsubscribeParams {
    #[serde(rename = "registrationId")]
    registration_id: String,
}

/// Handle a single viewer connection through its full lifecycle:
/// message loop → deterministic cleanup.
pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = new_id();
    info!(conn_id = %conn_id, "ws: viewer connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: forwards serialized frames to the socket.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "ws: write loop closed");
                break;
            }
        }
    });

    // Registration id → forwarder task, for cleanup and unsubscribe.
    let mut forwarders: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        };

        if text.len() > MAX_PAYLOAD_BYTES {
            warn!(conn_id = %conn_id, size = text.len(), "ws: payload too large");
            continue;
        }

        let frame: ViewerFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "ws: invalid frame");
                continue;
            },
        };

        let ViewerFrame::Request(req) = frame else {
            debug!(conn_id = %conn_id, "ws: ignoring non-request frame");
            continue;
        };

        let response = match req.method.as_str() {
            "subscribe" => {
                handle_subscribe(&state, &req.id, req.params, &client_tx, &mut forwarders).await
            },
            "unsubscribe" => {
                handle_unsubscribe(&state, &req.id, req.params, &mut forwarders).await
            },
            other => ResponseFrame::err(
                &req.id,
                ErrorShape::new(
                    error_codes::INVALID_REQUEST,
                    format!("unknown method '{other}'"),
                ),
            ),
        };
        send_frame(&client_tx, &response);
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    for (registration_id, handle) in forwarders {
        state.service.hub().unsubscribe(&registration_id).await;
        handle.abort();
    }
    info!(conn_id = %conn_id, "ws: viewer disconnected");

    drop(client_tx);
    write_handle.abort();
}

async fn handle_subscribe(
    state: &AppState,
    request_id: &str,
    params: Option<serde_json::Value>,
    client_tx: &mpsc::UnboundedSender<String>,
    forwarders: &mut HashMap<String, JoinHandle<()>>,
) -> ResponseFrame {
    let params: SubscribeParams =
        match serde_json::from_value(params.unwrap_or(serde_json::Value::Null)) {
            Ok(p) => p,
            Err(e) => {
                return ResponseFrame::err(
                    request_id,
                    ErrorShape::new(error_codes::INVALID_REQUEST, e.to_string()),
                );
            },
        };

    let store = state.service.store();
    let hub = state.service.hub();

    // Register first, snapshot second: events landing in between sit in the
    // registration's buffer and arrive after the snapshot.
    let (subscription, snapshot) = match &params {
        SubscribeParams::Roster => {
            let sub = hub.subscribe_roster().await;
            match store.list_chats().await {
                Ok(chats) => (sub, json!({"chats": chats})),
                Err(e) => {
                    hub.unsubscribe(&sub.id).await;
                    return ResponseFrame::err(
                        request_id,
                        ErrorShape::new(error_codes::UNAVAILABLE, e.to_string()),
                    );
                },
            }
        },
        SubscribeParams::Chat { chat_id } => {
            match store.get_chat(chat_id).await {
                Ok(Some(_)) => {},
                Ok(None) => {
                    return ResponseFrame::err(
                        request_id,
                        ErrorShape::new(error_codes::UNKNOWN_CHAT, format!("no chat '{chat_id}'")),
                    );
                },
                Err(e) => {
                    return ResponseFrame::err(
                        request_id,
                        ErrorShape::new(error_codes::UNAVAILABLE, e.to_string()),
                    );
                },
            }
            let sub = hub.subscribe_chat(chat_id).await;
            match store.list_messages(chat_id).await {
                Ok(messages) => (sub, json!({"messages": messages})),
                Err(e) => {
                    hub.unsubscribe(&sub.id).await;
                    return ResponseFrame::err(
                        request_id,
                        ErrorShape::new(error_codes::UNAVAILABLE, e.to_string()),
                    );
                },
            }
        },
    };

    let Subscription {
        id: registration_id,
        mut rx,
    } = subscription;

    let tx = client_tx.clone();
    let forward_registration = registration_id.clone();
    let handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if tx.send(json).is_err() {
                        break;
                    }
                },
                Err(e) => warn!(registration = %forward_registration, error = %e, "ws: frame serialize failed"),
            }
        }
    });
    forwarders.insert(registration_id.clone(), handle);

    ResponseFrame::ok(
        request_id,
        json!({"registrationId": registration_id, "snapshot": snapshot}),
    )
}

async fn handle_unsubscribe(
    state: &AppState,
    request_id: &str,
    params: Option<serde_json::Value>,
    forwarders: &mut HashMap<String, JoinHandle<()>>,
) -> ResponseFrame {
    let params: UnsubscribeParams =
        match serde_json::from_value(params.unwrap_or(serde_json::Value::Null)) {
            Ok(p) => p,
            Err(e) => {
                return ResponseFrame::err(
                    request_id,
                    ErrorShape::new(error_codes::INVALID_REQUEST, e.to_string()),
                );
            },
        };

    state.service.hub().unsubscribe(&params.registration_id).await;
    if let Some(handle) = forwarders.remove(&params.registration_id) {
        handle.abort();
    }
    ResponseFrame::ok(request_id, json!({"unsubscribed": params.registration_id}))
}

fn send_frame(client_tx: &mpsc::UnboundedSender<String>, frame: &ResponseFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            let _ = client_tx.send(json);
        },
        Err(e) => warn!(error = %e, "ws: response serialize failed"),
    }
}
