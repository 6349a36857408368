//! Inbound event normalization.
//!
//! Turns a raw provider webhook payload into a canonical [`InboundDelta`]
//! for the chat store, or a [`DropReason`] for events that are acknowledged
//! and discarded without effect.

use tracing::debug;

use {
    atendo_chats::{Direction, InboundDelta},
    atendo_identity::normalize_phone,
};

use crate::types::WebhookPayload;

/// The only event category this core ingests.
pub const MESSAGE_UPSERT_EVENT: &str = "messages.upsert";

/// Why an event was acknowledged but dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Any category other than a message upsert (presence, acks,
    /// connection updates), or an upsert with no message data attached.
    UnsupportedEvent,
    /// A message with no extractable text — media and system messages land
    /// here until they are in scope.
    UnhandledContentType,
}

/// Result of normalizing one webhook payload. Dropped events are still
/// acknowledged with a 200 so the provider does not retry them.
#[derive(Debug, Clone)]
pub enum NormalizeOutcome {
    Delta(InboundDelta),
    Ignored(DropReason),
}

/// Normalize a provider webhook payload.
///
/// `received_at_ms` is the fallback timestamp when the payload carries none.
pub fn normalize_event(payload: &WebhookPayload, received_at_ms: i64) -> NormalizeOutcome {
    if payload.event != MESSAGE_UPSERT_EVENT {
        debug!(event = %payload.event, "ignoring non-upsert webhook event");
        return NormalizeOutcome::Ignored(DropReason::UnsupportedEvent);
    }

    let Some(data) = payload.data.as_ref() else {
        debug!("upsert event without data payload");
        return NormalizeOutcome::Ignored(DropReason::UnsupportedEvent);
    };

    let external_contact_id = normalize_phone(&data.key.remote_jid);
    if external_contact_id.is_empty() || data.key.id.is_empty() {
        debug!(remote_jid = %data.key.remote_jid, "upsert event without usable key");
        return NormalizeOutcome::Ignored(DropReason::UnsupportedEvent);
    }

    let text = data.message.as_ref().and_then(|m| m.text_body());
    let Some(content) = text else {
        debug!(
            external_id = %data.key.id,
            "no extractable text; dropping as unhandled content type"
        );
        return NormalizeOutcome::Ignored(DropReason::UnhandledContentType);
    };

    let direction = if data.key.from_me {
        Direction::FromMe
    } else {
        Direction::FromContact
    };

    NormalizeOutcome::Delta(InboundDelta {
        external_contact_id,
        direction,
        content: content.to_string(),
        external_id: data.key.id.clone(),
        occurred_at: data.occurred_at_ms().unwrap_or(received_at_ms),
    })
}
