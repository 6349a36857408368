use async_trait::async_trait;

/// Best-effort mapping from a provider contact identifier to a known client
/// record.
///
/// Linkage is advisory: it runs once when a chat is first created, must never
/// block chat creation, and a `None` (no match, low confidence, or lookup
/// failure) simply leaves the chat unlinked. The identity crate provides the
/// concrete implementation.
#[async_trait]
pub trait IdentityLinker: Send + Sync {
    async fn link(&self, external_contact_id: &str) -> Option<String>;
}

/// Linker that never links; used when no contact directory is configured.
pub struct NoLinker;

#[async_trait]
impl IdentityLinker for NoLinker {
    async fn link(&self, _external_contact_id: &str) -> Option<String> {
        None
    }
}
