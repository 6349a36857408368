/// Crate-wide result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway-level errors: the union of store and provider failures, mapped
/// to HTTP statuses at the route layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Chats(#[from] atendo_chats::Error),

    #[error(transparent)]
    Provider(#[from] atendo_whatsapp::Error),
}

impl Error {
    /// True when the failure is the provider refusing or missing a send —
    /// the caller's message was not delivered and nothing was recorded.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            Self::Provider(atendo_whatsapp::Error::Delivery { .. })
        )
    }
}
