//! WhatsApp provider integration.
//!
//! Inbound: webhook payload types and the normalizer that turns provider
//! events into canonical deltas for the chat store. Outbound: the HTTP send
//! client and the connection-state probe consumed by the pairing
//! collaborator.

pub mod connection;
pub mod error;
pub mod outbound;
pub mod types;
pub mod webhook;

pub use {
    connection::{ConnectionState, QrPayload},
    error::{Error, Result},
    outbound::{SendReceipt, WhatsAppClient},
    types::WebhookPayload,
    webhook::{DropReason, NormalizeOutcome, normalize_event},
};
