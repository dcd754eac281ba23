use faststr::FastStr;
use thiserror::Error;

/// Failure seen by a caller of [`SingleFlightCache::get`](crate::SingleFlightCache::get).
///
/// `E` is the factory's own error type and is handed back untouched.
#[derive(Debug, Clone, Error)]
pub enum Error<E> {
    #[error("{0}")]
    Factory(E),

    #[error("{0}")]
    InvalidKey(#[from] KeyError),

    #[error("no tokio runtime available to drive the request")]
    NoRuntime,

    #[error("request aborted before producing a result")]
    Aborted,
}

impl<E> Error<E> {
    pub fn factory(&self) -> Option<&E> {
        match self {
            Self::Factory(e) => Some(e),
            _ => None,
        }
    }
}

/// A request key that must not enter the cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid request key: {0}")]
pub struct KeyError(pub FastStr);

impl KeyError {
    pub fn new(reason: impl Into<FastStr>) -> Self {
        Self(reason.into())
    }
}

pub type Result<T, E> = std::result::Result<T, Error<E>>;
