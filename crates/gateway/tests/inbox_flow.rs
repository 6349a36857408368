#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end inbox flow: webhook ingestion, operator REST, realtime WS.

use std::net::SocketAddr;

use {
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::net::TcpListener,
    tokio_tungstenite::{connect_async, tungstenite::Message},
};

use {
    atendo_config::AtendoConfig,
    atendo_gateway::server::{AppState, build_app, build_service},
};

/// Spin up a test gateway on an ephemeral port against the given provider
/// URL, return the bound address.
async fn start_test_server(provider_url: &str, check_connection: bool) -> SocketAddr {
    let mut config = AtendoConfig::default();
    config.database.path = ":memory:".into();
    config.provider.base_url = provider_url.into();
    config.provider.api_key = "test-key".into();
    config.provider.check_connection = check_connection;

    let service = build_service(&config).await.unwrap();
    let app = build_app(AppState { service });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn inbound_event(external_id: &str, text: &str) -> Value {
    json!({
        "event": "messages.upsert",
        "data": {
            "key": {
                "remoteJid": "5511999990000@s.whatsapp.net",
                "fromMe": false,
                "id": external_id
            },
            "message": {"conversation": text},
            "messageTimestamp": 1_700_000_000
        }
    })
}

async fn post_webhook(addr: SocketAddr, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/webhook/whatsapp"))
        .json(body)
        .send()
        .await
        .unwrap()
}

async fn roster(addr: SocketAddr) -> Vec<Value> {
    let body: Value = reqwest::get(format!("http://{addr}/api/chats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["chats"].as_array().cloned().unwrap_or_default()
}

async fn messages(addr: SocketAddr, chat_id: &str) -> Vec<Value> {
    let body: Value = reqwest::get(format!("http://{addr}/api/chats/{chat_id}/messages"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["messages"].as_array().cloned().unwrap_or_default()
}

#[tokio::test]
async fn duplicate_webhook_delivery_stores_one_message() {
    let addr = start_test_server("http://127.0.0.1:9", false).await;

    let event = inbound_event("ABC1", "Oi");
    let resp = post_webhook(addr, &event).await;
    assert_eq!(resp.status(), 200);
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["success"], true);

    // Provider retry storm: same event again.
    let resp = post_webhook(addr, &event).await;
    assert_eq!(resp.status(), 200);

    let chats = roster(addr).await;
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["unreadCount"], 1);
    assert_eq!(chats[0]["externalContactId"], "5511999990000");

    let chat_id = chats[0]["id"].as_str().unwrap();
    let msgs = messages(addr, chat_id).await;
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0]["externalId"], "ABC1");
}

#[tokio::test]
async fn unsupported_and_malformed_events_are_acknowledged() {
    let addr = start_test_server("http://127.0.0.1:9", false).await;

    let resp = post_webhook(addr, &json!({"event": "connection.update"})).await;
    assert_eq!(resp.status(), 200);
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["success"], true);

    // A body that is not even the webhook shape still gets a 200 so the
    // provider does not retry it forever.
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/webhook/whatsapp"))
        .body("not json at all")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    assert!(roster(addr).await.is_empty());
}

#[tokio::test]
async fn non_post_webhook_is_method_not_allowed() {
    let addr = start_test_server("http://127.0.0.1:9", false).await;
    let resp = reqwest::get(format!("http://{addr}/webhook/whatsapp"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn mark_read_resets_then_new_inbound_counts() {
    let addr = start_test_server("http://127.0.0.1:9", false).await;

    for i in 0..3 {
        post_webhook(addr, &inbound_event(&format!("m{i}"), "oi")).await;
    }
    let chats = roster(addr).await;
    assert_eq!(chats[0]["unreadCount"], 3);
    let chat_id = chats[0]["id"].as_str().unwrap().to_string();

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/chats/{chat_id}/read"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["chat"]["unreadCount"], 0);

    // Stamped safely after the read watermark.
    let fresh = json!({
        "event": "messages.upsert",
        "data": {
            "key": {
                "remoteJid": "5511999990000@s.whatsapp.net",
                "fromMe": false,
                "id": "m9"
            },
            "message": {"conversation": "de novo"},
            "messageTimestamp": 4_100_000_000_u64
        }
    });
    post_webhook(addr, &fresh).await;
    assert_eq!(roster(addr).await[0]["unreadCount"], 1);
}

#[tokio::test]
async fn provider_failure_surfaces_and_leaves_state_unchanged() {
    let mut provider = mockito::Server::new_async().await;
    provider
        .mock("POST", "/message/sendText/main")
        .with_status(500)
        .with_body(r#"{"error": "instance offline"}"#)
        .create_async()
        .await;
    let addr = start_test_server(&provider.url(), false).await;

    post_webhook(addr, &inbound_event("ABC1", "Oi")).await;
    let chats = roster(addr).await;
    let chat_id = chats[0]["id"].as_str().unwrap().to_string();

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/messages"))
        .json(&json!({"chatId": chat_id, "text": "Olá"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);

    // Byte-for-byte unchanged: one message, same unread count.
    let msgs = messages(addr, &chat_id).await;
    assert_eq!(msgs.len(), 1);
    assert_eq!(roster(addr).await[0]["unreadCount"], 1);
}

#[tokio::test]
async fn successful_send_appears_in_history() {
    let mut provider = mockito::Server::new_async().await;
    provider
        .mock("POST", "/message/sendText/main")
        .with_status(201)
        .with_body(r#"{"key": {"id": "SRV1"}}"#)
        .create_async()
        .await;
    let addr = start_test_server(&provider.url(), false).await;

    post_webhook(addr, &inbound_event("ABC1", "Oi")).await;
    let chat_id = roster(addr).await[0]["id"].as_str().unwrap().to_string();

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/messages"))
        .json(&json!({"chatId": chat_id, "text": "Olá"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"]["senderType"], "operator");
    assert_eq!(body["message"]["externalId"], "SRV1");

    let msgs = messages(addr, &chat_id).await;
    assert_eq!(msgs.len(), 2);
    // Unread is for contact messages only.
    assert_eq!(roster(addr).await[0]["unreadCount"], 1);
}

#[tokio::test]
async fn ws_viewer_gets_snapshot_then_live_events() {
    let addr = start_test_server("http://127.0.0.1:9", false).await;
    post_webhook(addr, &inbound_event("ABC1", "Oi")).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
        .send(Message::Text(
            json!({
                "type": "req",
                "id": "1",
                "method": "subscribe",
                "params": {"kind": "roster"}
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();

    // Snapshot response carries the existing chat.
    let resp: Value = match socket.next().await.unwrap().unwrap() {
        Message::Text(t) => serde_json::from_str(&t).unwrap(),
        other => panic!("unexpected frame {other:?}"),
    };
    assert_eq!(resp["ok"], true);
    let snapshot_chats = resp["payload"]["snapshot"]["chats"].as_array().unwrap();
    assert_eq!(snapshot_chats.len(), 1);
    let registration_id = resp["payload"]["registrationId"].as_str().unwrap().to_string();

    // A new inbound message pushes a live roster update.
    post_webhook(addr, &inbound_event("ABC2", "Tudo bem?")).await;
    let event: Value = match socket.next().await.unwrap().unwrap() {
        Message::Text(t) => serde_json::from_str(&t).unwrap(),
        other => panic!("unexpected frame {other:?}"),
    };
    assert_eq!(event["type"], "event");
    assert_eq!(event["event"], "roster.update");
    assert_eq!(event["payload"]["lastMessage"], "Tudo bem?");
    assert!(event["seq"].as_u64().is_some());

    // Explicit unsubscribe stops the stream.
    socket
        .send(Message::Text(
            json!({
                "type": "req",
                "id": "2",
                "method": "unsubscribe",
                "params": {"registrationId": registration_id}
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();
    let resp: Value = match socket.next().await.unwrap().unwrap() {
        Message::Text(t) => serde_json::from_str(&t).unwrap(),
        other => panic!("unexpected frame {other:?}"),
    };
    assert_eq!(resp["ok"], true);
}

#[tokio::test]
async fn ws_chat_subscription_rejects_unknown_chat() {
    let addr = start_test_server("http://127.0.0.1:9", false).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
        .send(Message::Text(
            json!({
                "type": "req",
                "id": "1",
                "method": "subscribe",
                "params": {"kind": "chat", "chatId": "nope"}
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();

    let resp: Value = match socket.next().await.unwrap().unwrap() {
        Message::Text(t) => serde_json::from_str(&t).unwrap(),
        other => panic!("unexpected frame {other:?}"),
    };
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "UNKNOWN_CHAT");
}
