//! Realtime fanout of store mutations to subscribed viewers.
//!
//! Two subscription kinds: the roster (all chats) and a single chat's
//! message stream. Registrations are explicit objects owned by the hub and
//! released deterministically — by `unsubscribe` on disconnect, or forcibly
//! when a subscriber's bounded buffer overflows. A slow viewer never blocks
//! ingestion.
//!
//! Delivery is at-least-once: callers send a snapshot before attaching a
//! registration, so a reconnecting viewer may see items again and must
//! de-duplicate by id.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use {
    tokio::sync::{RwLock, mpsc},
    tracing::{debug, warn},
};

use {
    atendo_common::new_id,
    atendo_protocol::{EventFrame, events},
};

/// What a registration listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionKind {
    Roster,
    Chat(String),
}

struct RegistrationEntry {
    kind: SubscriptionKind,
    tx: mpsc::Sender<EventFrame>,
}

/// A live subscription handed to the caller: the registration id (for
/// explicit unsubscribe) and the frame receiver.
pub struct Subscription {
    pub id: String,
    pub rx: mpsc::Receiver<EventFrame>,
}

/// Hub owning all viewer registrations.
pub struct FanoutHub {
    seq: AtomicU64,
    buffer: usize,
    registrations: RwLock<HashMap<String, RegistrationEntry>>,
}

impl FanoutHub {
    /// `buffer` is the per-subscriber frame capacity; a subscriber that
    /// falls this far behind is disconnected.
    pub fn new(buffer: usize) -> Self {
        Self {
            seq: AtomicU64::new(0),
            buffer: buffer.max(1),
            registrations: RwLock::new(HashMap::new()),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn register(&self, kind: SubscriptionKind) -> Subscription {
        let id = new_id();
        let (tx, rx) = mpsc::channel(self.buffer);
        self.registrations
            .write()
            .await
            .insert(id.clone(), RegistrationEntry { kind, tx });
        debug!(registration = %id, "fanout: registered");
        Subscription { id, rx }
    }

    /// Subscribe to all chat summaries.
    pub async fn subscribe_roster(&self) -> Subscription {
        self.register(SubscriptionKind::Roster).await
    }

    /// Subscribe to one chat's message stream.
    pub async fn subscribe_chat(&self, chat_id: &str) -> Subscription {
        self.register(SubscriptionKind::Chat(chat_id.to_string()))
            .await
    }

    /// Release a registration. Idempotent.
    pub async fn unsubscribe(&self, registration_id: &str) {
        if self
            .registrations
            .write()
            .await
            .remove(registration_id)
            .is_some()
        {
            debug!(registration = %registration_id, "fanout: unregistered");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.registrations.read().await.len()
    }

    /// Push a chat summary to every roster subscriber.
    pub async fn publish_roster(&self, payload: serde_json::Value) {
        self.publish(events::ROSTER_UPDATE, payload, |kind| {
            *kind == SubscriptionKind::Roster
        })
        .await;
    }

    /// Push a message to subscribers of its chat.
    pub async fn publish_chat(&self, chat_id: &str, payload: serde_json::Value) {
        self.publish(events::CHAT_MESSAGE, payload, |kind| {
            matches!(kind, SubscriptionKind::Chat(id) if id == chat_id)
        })
        .await;
    }

    async fn publish(
        &self,
        event: &str,
        payload: serde_json::Value,
        matches: impl Fn(&SubscriptionKind) -> bool,
    ) {
        let frame = EventFrame::new(event, payload, self.next_seq());

        // Send under the read lock; overflowing or closed subscribers are
        // collected and removed afterwards so ingestion never waits on them.
        let mut dead = Vec::new();
        {
            let regs = self.registrations.read().await;
            for (id, entry) in regs.iter() {
                if !matches(&entry.kind) {
                    continue;
                }
                match entry.tx.try_send(frame.clone()) {
                    Ok(()) => {},
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(registration = %id, event, "fanout: subscriber overflowed, disconnecting");
                        dead.push(id.clone());
                    },
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(id.clone());
                    },
                }
            }
        }

        if !dead.is_empty() {
            let mut regs = self.registrations.write().await;
            for id in dead {
                regs.remove(&id);
            }
        }
    }
}
