use async_trait::async_trait;

use crate::{
    Result,
    model::{Chat, InboundDelta, InboundOutcome, Message},
};

/// Authoritative chat-state storage. All mutations for a given chat are
/// applied atomically and serialized behind a single logical writer;
/// mutations for different chats proceed concurrently.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Apply an inbound provider delta: resolve or create the chat, then —
    /// only if the delta's `external_id` has not been seen for that chat —
    /// append the message and update the summary and unread counter.
    /// Replaying the same `external_id` is a guaranteed no-op.
    async fn upsert_from_inbound(&self, delta: InboundDelta) -> Result<InboundOutcome>;

    /// Append an operator-origin message after a confirmed provider send and
    /// update the summary. Never touches the unread counter. `external_id`
    /// is the provider-confirmed message id, stored so the provider's echo
    /// of this send dedups on the inbound path.
    async fn record_outbound(
        &self,
        chat_id: &str,
        content: &str,
        external_id: Option<&str>,
    ) -> Result<(Chat, Message)>;

    /// Reset the unread counter and advance the read watermark. Message
    /// history is untouched.
    async fn mark_read(&self, chat_id: &str) -> Result<Chat>;

    /// Roster: all chats ordered by last activity, most recent first.
    async fn list_chats(&self) -> Result<Vec<Chat>>;

    /// Full history of one chat, ordered by `created_at` ascending.
    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>>;

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>>;

    async fn get_chat_by_contact(&self, external_contact_id: &str) -> Result<Option<Chat>>;
}
