// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The host-supplied persistence hook [`DistributedStore`](crate::distributed)
//! uses to remember which backend an object was placed on.

use async_trait::async_trait;

use crate::error::Result;
use crate::object::LogicalObject;

/// Bridges this crate to the host's own object lifecycle/database layer.
///
/// A distributed placement decision only matters if it outlives the call
/// that made it, so [`crate::distributed::DistributedStore::create`] refuses
/// to run without one configured rather than silently placing an object it
/// can never find again.
#[async_trait]
pub trait ObjectSession: Send + Sync {
    /// Register `object` (with its `object_store_id` already set) with the
    /// host's unit of work.
    async fn add(&self, object: &LogicalObject) -> Result<()>;

    /// Commit the unit of work.
    async fn flush(&self) -> Result<()>;
}
