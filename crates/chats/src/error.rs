/// Crate-wide result type for chat-state operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed chat-state errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A requested chat id is not in the store.
    #[error("unknown chat: {chat_id}")]
    UnknownChat { chat_id: String },

    /// Input payload or parameter is invalid.
    #[error("invalid chat input: {message}")]
    InvalidInput { message: String },

    /// The underlying database rejected or failed the operation. The whole
    /// mutation is rolled back; no partial state is left behind.
    #[error("persistence failure: {source}")]
    Persistence {
        #[from]
        source: sqlx::Error,
    },
}

impl Error {
    #[must_use]
    pub fn unknown_chat(chat_id: impl std::fmt::Display) -> Self {
        Self::UnknownChat {
            chat_id: chat_id.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }
}
