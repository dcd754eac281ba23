use faststr::FastStr;
use flight::KeyError;
use std::sync::Arc;
use thiserror::Error;

/// Backend failure shared by every caller that was coalesced onto one fetch.
pub type SharedFetchError = Arc<common::error::Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("fetch failed: {0}")]
    Fetch(SharedFetchError),

    #[error("{0}")]
    InvalidKey(#[from] KeyError),

    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("request aborted")]
    Aborted,

    #[error("{0} not found")]
    NotFound(FastStr),
}

impl From<flight::Error<SharedFetchError>> for Error {
    fn from(value: flight::Error<SharedFetchError>) -> Self {
        match value {
            flight::Error::Factory(e) => Self::Fetch(e),
            flight::Error::InvalidKey(e) => Self::InvalidKey(e),
            flight::Error::NoRuntime => Self::NoRuntime,
            flight::Error::Aborted => Self::Aborted,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
