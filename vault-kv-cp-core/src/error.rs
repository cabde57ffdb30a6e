use crate::path::RelPath;
use thiserror::Error;

/// Result alias for migration operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Result alias for a single store request.
pub type StoreResult<T> = core::result::Result<T, StoreError>;

/// Failure reported by a store while answering one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Shape violations found in a listing's child-name collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingShapeError {
    #[error("listing carries no data object")]
    MissingData,
    #[error("listing data has no `keys` entry")]
    MissingKeys,
    #[error("listing `keys` is not an array")]
    KeysNotArray,
    #[error("listing key at index {index} is not a string: {value}")]
    NonStringKey { index: usize, value: String },
    #[error("listing key at index {index} is not a plain name: {value:?}")]
    InvalidKey { index: usize, value: String },
}

/// Fatal conditions. Any of these aborts the whole migration run.
///
/// Store failures are carried as the error source, so render with `{:#}`
/// (or walk the chain) to see the cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("error occurred while listing `{path}` in source")]
    List { path: RelPath, source: StoreError },
    #[error("malformed listing at `{path}` in source: {reason}")]
    MalformedListing {
        path: RelPath,
        reason: ListingShapeError,
    },
    #[error("error occurred while getting latest version of the secret at `{path}` in source")]
    Read { path: RelPath, source: StoreError },
    #[error("no secret found at `{path}` in source")]
    MissingSecret { path: RelPath },
    #[error("error occurred while writing the secret at `{path}` in destination")]
    Write { path: RelPath, source: StoreError },
    #[error("destination did not confirm the write of `{path}`")]
    Unconfirmed { path: RelPath },
}

impl Error {
    /// Relative path the failing operation was working on.
    pub fn path(&self) -> &RelPath {
        match self {
            Error::List { path, .. }
            | Error::MalformedListing { path, .. }
            | Error::Read { path, .. }
            | Error::MissingSecret { path }
            | Error::Write { path, .. }
            | Error::Unconfirmed { path } => path,
        }
    }
}
