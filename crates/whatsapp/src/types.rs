//! Serde types for the provider webhook payload.

use serde::Deserialize;

/// Top-level webhook body. Only `event = "messages.upsert"` is handled; the
/// provider also posts presence, connection, and ack events on the same URL.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub data: Option<EventData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub key: MessageKey,
    #[serde(default)]
    pub message: Option<MessageContent>,
    /// Seconds or millis depending on provider version; sometimes a string.
    #[serde(rename = "messageTimestamp", default)]
    pub message_timestamp: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageKey {
    #[serde(rename = "remoteJid")]
    pub remote_jid: String,
    #[serde(rename = "fromMe", default)]
    pub from_me: bool,
    /// Provider-assigned message id — the inbound dedup key.
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(rename = "extendedTextMessage", default)]
    pub extended_text_message: Option<ExtendedTextMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedTextMessage {
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageContent {
    /// Extract the text body from either content shape.
    pub fn text_body(&self) -> Option<&str> {
        if let Some(text) = self.conversation.as_deref()
            && !text.is_empty()
        {
            return Some(text);
        }
        self.extended_text_message
            .as_ref()
            .and_then(|e| e.text.as_deref())
            .filter(|t| !t.is_empty())
    }
}

impl EventData {
    /// Provider-reported occurrence time in epoch millis, when present and
    /// intelligible.
    pub fn occurred_at_ms(&self) -> Option<i64> {
        let raw = self.message_timestamp.as_ref()?;
        let value = match raw {
            serde_json::Value::Number(n) => n.as_i64()?,
            serde_json::Value::String(s) => s.parse::<i64>().ok()?,
            _ => return None,
        };
        if value <= 0 {
            return None;
        }
        // Heuristically seconds below the year-2286 cutoff in millis.
        if value < 10_000_000_000 {
            Some(value * 1000)
        } else {
            Some(value)
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conversation_shape() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{
                "event": "messages.upsert",
                "instance": "main",
                "data": {
                    "key": {"remoteJid": "5511999990000@s.whatsapp.net", "fromMe": false, "id": "ABC1"},
                    "message": {"conversation": "Oi"},
                    "messageTimestamp": 1700000000
                }
            }"#,
        )
        .unwrap();
        let data = payload.data.unwrap();
        assert_eq!(data.key.remote_jid, "5511999990000@s.whatsapp.net");
        assert!(!data.key.from_me);
        assert_eq!(data.message.as_ref().unwrap().text_body(), Some("Oi"));
        assert_eq!(data.occurred_at_ms(), Some(1_700_000_000_000));
    }

    #[test]
    fn parses_extended_text_shape() {
        let content: MessageContent = serde_json::from_str(
            r#"{"extendedTextMessage": {"text": "quoted reply"}}"#,
        )
        .unwrap();
        assert_eq!(content.text_body(), Some("quoted reply"));
    }

    #[test]
    fn media_message_has_no_text_body() {
        let content: MessageContent =
            serde_json::from_str(r#"{"imageMessage": {"url": "..."}}"#).unwrap();
        assert_eq!(content.text_body(), None);
    }

    #[test]
    fn string_timestamp_and_millis_both_normalize() {
        let data: EventData = serde_json::from_str(
            r#"{"key": {"remoteJid": "1@x", "id": "a"}, "messageTimestamp": "1700000000"}"#,
        )
        .unwrap();
        assert_eq!(data.occurred_at_ms(), Some(1_700_000_000_000));

        let data: EventData = serde_json::from_str(
            r#"{"key": {"remoteJid": "1@x", "id": "a"}, "messageTimestamp": 1700000000123}"#,
        )
        .unwrap();
        assert_eq!(data.occurred_at_ms(), Some(1_700_000_000_123));
    }
}
