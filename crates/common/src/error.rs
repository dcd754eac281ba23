use faststr::FastStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    MsgError(FastStr),
    #[error("Reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("API error ({code}): {message}")]
    ApiError { code: i64, message: FastStr },
    #[error("Invalid response data: {0} status: {1}")]
    InvalidResponseData(FastStr, u16),
    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("invalid config {0}: {1}")]
    ConfigError(&'static str, FastStr),
}

pub type Result<T> = std::result::Result<T, Error>;
