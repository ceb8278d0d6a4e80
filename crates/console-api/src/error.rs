//! Errors for console endpoint wrappers

use api_client::{ApiError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The backend call failed; see the category and status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Input rejected locally, or a response missing a field the caller needs.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Credential store error: {0}")]
    Credential(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::Credential(err.to_string())
    }
}

impl Error {
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
