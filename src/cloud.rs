// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The cloud-backend contract: documentation only, no concrete adapter.
//!
//! A real S3/Azure/Swift/iRODS/Pithos implementation satisfies
//! [`crate::backend::Backend`] exactly like [`crate::disk::DiskBackend`],
//! with three differences this crate does not implement:
//!
//! - `get_object_url` may return a signed, time-limited URL instead of
//!   always returning `None`.
//! - It may keep a local staging directory (`cache_path`) whose contents are
//!   populated and evicted lazily; this crate has no opinion on that policy.
//! - Any local file naming within that staging directory must still go
//!   through [`crate::path_builder`] so the on-disk layout stays compatible
//!   with a plain [`crate::disk::DiskBackend`] pointed at the same root.
//!
//! Shipping a real adapter means linking an SDK per provider; that's left to
//! the embedding application. [`CloudBackendConfig`] only carries the
//! configuration fields the Factory recognizes for such a backend so that a
//! config document mentioning one doesn't fail to parse.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration recognized for a cloud-style backend entry. Present so the
/// Factory can parse a document that names one even though constructing a
/// working instance from it is the host's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudBackendConfig {
    pub id: String,
    pub provider: String,
    pub cache_path: Option<PathBuf>,
}
