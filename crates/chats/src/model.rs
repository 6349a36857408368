use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Operator,
    Contact,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Contact => "contact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "operator" => Some(Self::Operator),
            "contact" => Some(Self::Contact),
            _ => None,
        }
    }
}

/// Direction of an inbound provider event.
///
/// `FromMe` events are provider echoes of messages the operator side sent
/// (from this system or straight from the paired phone); they are recorded
/// as operator messages and never count as unread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FromContact,
    FromMe,
}

/// One conversation thread, bound to a single provider contact identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    /// Provider contact identifier; immutable once set.
    pub external_contact_id: String,
    /// Advisory link to a known client record; may be absent or corrected
    /// later outside this core.
    pub linked_client_id: Option<String>,
    pub status: String,
    /// Count of contact-origin messages newer than the read marker.
    pub unread_count: i64,
    /// Content of the message with the greatest `created_at` in this chat.
    pub last_message: Option<String>,
    pub last_message_at: i64,
    /// Read watermark (epoch millis); 0 = never read.
    pub last_read_at: i64,
    pub created_at: i64,
}

/// A single stored message. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub content: String,
    pub sender_type: SenderType,
    /// Only `"text"` is in scope; the column exists so media can be added
    /// without a schema change.
    pub message_type: String,
    pub created_at: i64,
    /// Provider-assigned message id: the inbound dedup key. Present for all
    /// contact-origin messages and for operator messages once the provider
    /// confirmed the send.
    pub external_id: Option<String>,
}

/// Canonical delta produced by the inbound normalizer.
#[derive(Debug, Clone)]
pub struct InboundDelta {
    pub external_contact_id: String,
    pub direction: Direction,
    pub content: String,
    pub external_id: String,
    /// Provider-reported occurrence time (epoch millis).
    pub occurred_at: i64,
}

/// Result of applying an inbound delta.
#[derive(Debug, Clone)]
pub enum InboundOutcome {
    /// First sighting of this provider message id: the message was stored
    /// and the chat summary updated.
    Applied { chat: Chat, message: Message },
    /// The provider re-delivered a message id already stored for this chat;
    /// nothing changed.
    Duplicate { chat_id: String },
}
