// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A composable object-store abstraction for a scientific-workflow
//! platform: a uniform facade over heterogeneous storage backends (local
//! disks, cloud blob services, distributed filesystems) that a job host can
//! rely on to read and write datasets as ordinary files.
//!
//! The crate's job is the composition layer, not any one backend: how
//! several backends combine into a weighted [`distributed`] write pool or
//! an ordered [`hierarchical`] fallback chain, how a logical object identity
//! maps to an on-disk path ([`path_builder`]) without ever escaping its
//! root, and how a user's own "plugged media" ([`user_media`]) get a say
//! before the instance-level default does. Concrete cloud adapters
//! (S3/Azure/Swift/iRODS/Pithos) are specified only as the [`backend::Backend`]
//! contract they must satisfy — see [`cloud`].

pub mod backend;
pub mod capacity_monitor;
pub mod cloud;
pub mod config;
pub mod disk;
pub mod dispatcher;
pub mod distributed;
pub mod error;
pub mod factory;
pub mod hierarchical;
pub mod object;
pub mod path_builder;
pub mod session;
pub mod user_media;

#[cfg(test)]
mod integration_tests;

pub use backend::Backend;
pub use error::{Error, Result};
pub use object::{Identity, LogicalObject, MediaCategory, OperationOptions, PluggedMedium, StoreBy};
