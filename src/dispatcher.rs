// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Shared plumbing for multi-backend composites (spec C4 `NestedDispatcher`).
//!
//! [`DistributedStore`](crate::distributed::DistributedStore) and
//! [`HierarchicalStore`](crate::hierarchical::HierarchicalStore) both hold an
//! ordered set of children and both must check for user-media routing before
//! applying their own placement policy. That shared behavior lives here so
//! neither composite re-implements it.

use std::sync::Arc;

use crate::backend::Backend;
use crate::object::{LogicalObject, OperationOptions};
use crate::user_media::UserMediaResolver;

/// An ordered `childId -> backend` mapping. A plain `Vec` rather than a
/// hash map: spec §6 requires hierarchical child order to be a strict total
/// order, and insertion order on a `Vec` is the simplest way to guarantee
/// that without pulling in an ordered-map dependency the teacher doesn't use
/// elsewhere.
pub struct Children {
    entries: Vec<(String, Arc<dyn Backend>)>,
}

impl Children {
    pub fn new(entries: Vec<(String, Arc<dyn Backend>)>) -> Self {
        Children { entries }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Backend>> {
        self.entries.iter().find(|(cid, _)| cid == id).map(|(_, b)| b)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Arc<dyn Backend>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first child in map order, if any — the instance-level default a
    /// `UserMediaResolver` falls back on, and the sole write target of a
    /// `HierarchicalStore`.
    pub fn first(&self) -> Option<&Arc<dyn Backend>> {
        self.entries.first().map(|(_, b)| b)
    }

    /// Linear scan in map order, returning the first child whose `exists`
    /// check succeeds. Used by read-side operations on both composites.
    pub async fn first_hit(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Option<&Arc<dyn Backend>> {
        for (_, backend) in &self.entries {
            if backend.exists(object, options).await.unwrap_or(false) {
                return Some(backend);
            }
        }
        None
    }

    pub async fn shutdown_all(&self) {
        for (_, backend) in &self.entries {
            backend.shutdown().await;
        }
    }

    pub fn describe(&self) -> Vec<serde_json::Value> {
        self.entries.iter().map(|(_, b)| b.describe()).collect()
    }
}

/// The routing decision every composite operation starts with (spec §4.4):
/// objects carrying user media (and not job-context) always go through
/// [`UserMediaResolver`] first, bypassing the composite's own placement
/// policy entirely.
pub fn user_media_route<'a>(
    object: &LogicalObject,
    resolver: &'a Option<Arc<UserMediaResolver>>,
) -> Option<&'a Arc<UserMediaResolver>> {
    if object.wants_user_media_routing() {
        resolver.as_ref()
    } else {
        None
    }
}
