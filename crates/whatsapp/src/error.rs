/// Crate-wide result type for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provider did not accept a send: non-2xx response, unreachable
    /// host, or timeout. The caller must not record any local state for the
    /// attempted message.
    #[error("message delivery failed: {detail}")]
    Delivery { detail: String },

    /// A non-send provider request (connection probe, logout) failed.
    #[error("provider request failed")]
    Http {
        #[from]
        source: reqwest::Error,
    },
}

impl Error {
    #[must_use]
    pub fn delivery(detail: impl std::fmt::Display) -> Self {
        Self::Delivery {
            detail: detail.to_string(),
        }
    }
}
