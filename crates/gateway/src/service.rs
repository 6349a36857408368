//! The inbox service: ingestion entry point and outbound dispatcher.
//!
//! Both mutation paths — provider webhook and operator send — converge here
//! so every successful store mutation is published to realtime subscribers.

use std::sync::Arc;

use {serde::Serialize, tracing::warn};

use {
    atendo_chats::{Chat, ChatStore, InboundOutcome, Message},
    atendo_common::now_ms,
    atendo_fanout::FanoutHub,
    atendo_identity::normalize_phone,
    atendo_whatsapp::{
        ConnectionState, DropReason, Error as ProviderError, NormalizeOutcome, QrPayload,
        WebhookPayload, WhatsAppClient, normalize_event,
    },
};

use crate::Result;

/// Result of ingesting one webhook payload. Everything here acknowledges
/// with a 200; only a store failure surfaces as an error.
#[derive(Debug)]
pub enum IngestOutcome {
    Applied { chat: Chat, message: Message },
    Duplicate { chat_id: String },
    Ignored(DropReason),
}

/// Provider connection state plus the pairing QR when disconnected.
#[derive(Debug, Serialize)]
pub struct ConnectionOverview {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<QrPayload>,
}

pub struct InboxService {
    store: Arc<dyn ChatStore>,
    hub: Arc<FanoutHub>,
    provider: WhatsAppClient,
    check_connection: bool,
}

impl InboxService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        hub: Arc<FanoutHub>,
        provider: WhatsAppClient,
        check_connection: bool,
    ) -> Self {
        Self {
            store,
            hub,
            provider,
            check_connection,
        }
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }

    /// Ingest one webhook payload: normalize, apply to the store, fan out.
    ///
    /// Unsupported and textless events are acknowledged and dropped;
    /// duplicates are no-ops. Only a persistence failure returns `Err`.
    pub async fn ingest(&self, payload: &WebhookPayload) -> Result<IngestOutcome> {
        let delta = match normalize_event(payload, now_ms()) {
            NormalizeOutcome::Delta(delta) => delta,
            NormalizeOutcome::Ignored(reason) => return Ok(IngestOutcome::Ignored(reason)),
        };

        match self.store.upsert_from_inbound(delta).await? {
            InboundOutcome::Applied { chat, message } => {
                self.publish_mutation(&chat, &message).await;
                Ok(IngestOutcome::Applied { chat, message })
            },
            InboundOutcome::Duplicate { chat_id } => Ok(IngestOutcome::Duplicate { chat_id }),
        }
    }

    /// Dispatch an operator message to an existing chat.
    ///
    /// The provider send happens first; any delivery failure propagates with
    /// **no** local state change — there is never a ghost sent message. On
    /// success the message is recorded with the provider-confirmed id so the
    /// provider's echo dedups on the inbound path.
    pub async fn send_to_chat(&self, chat_id: &str, text: &str) -> Result<(Chat, Message)> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| atendo_chats::Error::unknown_chat(chat_id))?;

        if self.check_connection {
            // Advisory probe: a definitively closed session fails fast, but a
            // probe error never blocks the send attempt itself.
            match self.provider.connection_state().await {
                Ok(ConnectionState::Closed) => {
                    return Err(ProviderError::delivery("provider session closed").into());
                },
                Ok(_) => {},
                Err(e) => warn!(error = %e, "connection probe failed; attempting send anyway"),
            }
        }

        let receipt = self
            .provider
            .send_text(&chat.external_contact_id, text)
            .await?;

        let (chat, message) = self
            .store
            .record_outbound(&chat.id, text, receipt.message_id.as_deref())
            .await?;
        self.publish_mutation(&chat, &message).await;
        Ok((chat, message))
    }

    /// Dispatch to a destination contact identifier. The chat must already
    /// exist — chats are created by inbound traffic only.
    pub async fn send_to_number(&self, number: &str, text: &str) -> Result<(Chat, Message)> {
        let contact = normalize_phone(number);
        let chat = self
            .store
            .get_chat_by_contact(&contact)
            .await?
            .ok_or_else(|| atendo_chats::Error::unknown_chat(number))?;
        self.send_to_chat(&chat.id, text).await
    }

    /// Current provider connection state, with the pairing QR when the
    /// session is not open.
    pub async fn connection(&self) -> Result<ConnectionOverview> {
        let state = self.provider.connection_state().await?;
        let qr = if state == ConnectionState::Open {
            None
        } else {
            self.provider.connect_qr().await.ok()
        };
        Ok(ConnectionOverview { state, qr })
    }

    async fn publish_mutation(&self, chat: &Chat, message: &Message) {
        match serde_json::to_value(chat) {
            Ok(payload) => self.hub.publish_roster(payload).await,
            Err(e) => warn!(error = %e, "failed to serialize chat summary"),
        }
        match serde_json::to_value(message) {
            Ok(payload) => self.hub.publish_chat(&message.chat_id, payload).await,
            Err(e) => warn!(error = %e, "failed to serialize message"),
        }
    }
}
