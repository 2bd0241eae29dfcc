// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::path::PathBuf;

use thiserror::Error;

/// The error kinds a backend or composite store operation can fail with.
///
/// Recovery policy differs per kind (see the crate's design notes):
/// `Io` is the only kind `UserMediaResolver` retries on a lower-order medium;
/// every other kind is surfaced to the caller unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// Unsafe `extraDir`/`altName`, an empty write-weight pool, or a missing
    /// identity key.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// A read or metadata operation found nothing at the resolved path, or a
    /// dispatcher exhausted its children without a hit.
    #[error("object not found: {0}")]
    NotFound(String),

    /// `UserMediaResolver` exhausted all plugged media with no instance-level
    /// fallback available.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A caller-supplied `ObjectSession` was required (e.g. by
    /// `DistributedStore::create`) but none was configured.
    #[error("no object session configured")]
    NoSession,

    /// The configuration document named a backend category or type this
    /// crate does not recognize.
    #[error("unrecognized backend type: {0}")]
    Unrecognized(String),

    /// Underlying filesystem or network failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn invalid_object(msg: impl Into<String>) -> Self {
        Error::InvalidObject(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the one kind user-media resolution treats as retryable
    /// against a lower-order medium; every other kind propagates as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
