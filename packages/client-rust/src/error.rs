use slquery_core::{FilterError, TransportError};

/// Errors returned by query execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// A transport failure already turned into a user-facing message.
    #[error("{message}")]
    Classified {
        status_code: Option<u16>,
        message: String,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid filter: {0}")]
    Filter(#[from] FilterError),
    #[error("pagination did not terminate after {pages} pages")]
    PaginationDidNotTerminate { pages: u32 },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}
