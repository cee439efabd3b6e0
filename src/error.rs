//! Error types for bucketmeta

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No such bucket: {0}")]
    NoSuchBucket(String),

    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("No such object: {0}")]
    NoSuchObject(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Collapse every non-public variant into `Internal`, keeping the
    /// underlying message. The public kinds pass through untouched.
    pub fn into_public(self) -> Self {
        match self {
            e @ (Error::NoSuchBucket(_)
            | Error::BucketAlreadyExists(_)
            | Error::NoSuchObject(_)
            | Error::Internal(_)) => e,
            other => Error::Internal(other.to_string()),
        }
    }

    /// Whether this is one of the four public error kinds.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Error::NoSuchBucket(_)
                | Error::BucketAlreadyExists(_)
                | Error::NoSuchObject(_)
                | Error::Internal(_)
        )
    }
}
