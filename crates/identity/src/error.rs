/// Crate-wide result type for identity operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The contact directory could not be read.
    #[error("directory failure: {source}")]
    Directory {
        #[from]
        source: sqlx::Error,
    },
}
