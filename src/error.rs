use std::{io, path::PathBuf};
use thiserror::Error;

/// Everything that can end a request early.
///
/// Every error is terminal: the only thing this crate ever retries is a 301/302 redirect.
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be built: missing or malformed URL, unsupported scheme or method.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The file given as request body could not be read. No connection was attempted.
    #[error("cannot read body file {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Name resolution, connection, TLS or socket I/O failed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The server sent something that is not a valid HTTP/1.x response.
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),

    /// More 301/302 responses were received than allowed.
    #[error("redirect count over {max}")]
    RedirectLimitExceeded { max: usize },
}

impl Error {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }
}
