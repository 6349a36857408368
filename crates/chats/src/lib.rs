//! Authoritative per-conversation chat state.
//!
//! Every mutation — inbound ingestion, outbound recording, read markers —
//! passes through the [`ChatStore`] so that message history, unread counters,
//! and the last-message summary stay consistent under duplicated and
//! out-of-order deliveries. Mutations for one chat are serialized; different
//! chats proceed concurrently.

pub mod error;
pub mod link;
pub mod model;
pub mod sqlite;
pub mod store;

pub use {
    error::{Error, Result},
    link::IdentityLinker,
    model::{Chat, Direction, InboundDelta, InboundOutcome, Message, SenderType},
    sqlite::SqliteChatStore,
    store::ChatStore,
};
