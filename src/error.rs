use crate::file_store::StoreError;
use thiserror::Error;

/// Failure taxonomy shared by the portal client, the list store and the
/// installer. Every fallible operation in the crate degrades to one of these.
#[derive(Debug, Error)]
pub enum ModError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("portal request failed: {0}")]
    Transient(String),
    #[error("download requires portal credentials")]
    Unauthorized,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("could not write {0}")]
    Persistence(String),
    #[error("{0} is a built-in mod and cannot be changed")]
    Reserved(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ModError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModError::NotFound(_))
    }

    /// True for failures worth retrying on the next call.
    pub fn is_transient(&self) -> bool {
        matches!(self, ModError::Transient(_))
    }
}

pub type ModResult<T> = Result<T, ModError>;
