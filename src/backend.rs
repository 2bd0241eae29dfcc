// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The capability contract every store implementation satisfies, whether it
//! is a single disk-backed leaf or a composite dispatching across children.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::object::{LogicalObject, OperationOptions};

/// A store, leaf or composite, that can hold and serve [`LogicalObject`]
/// payloads.
///
/// Every method accepts a full [`OperationOptions`] even where a given
/// implementation ignores most of its fields — composites forward it
/// unchanged to whichever child ends up handling the call.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable identifier used in configuration, logging, and
    /// `object_store_id` bookkeeping.
    fn id(&self) -> &str;

    async fn exists(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool>;

    /// Idempotent: a second `create` on an object that already exists is a
    /// no-op, not an error.
    async fn create(&self, object: &LogicalObject, options: &OperationOptions) -> Result<()>;

    /// True if the object exists and is zero bytes (or absent).
    async fn empty(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool>;

    async fn size(&self, object: &LogicalObject, options: &OperationOptions) -> Result<u64>;

    /// Never propagates an underlying OS failure as an error: a delete that
    /// fails for any reason reports `false` rather than stopping the caller.
    async fn delete(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool>;

    /// `count < 0` reads to end of file.
    async fn get_data(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
        start: u64,
        count: i64,
    ) -> Result<Bytes>;

    /// A local filesystem path the caller may read directly, if the backend
    /// can offer one. Cloud-style backends may stage to a cache path first.
    async fn get_filename(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Result<std::path::PathBuf>;

    async fn update_from_file(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
        source: &std::path::Path,
    ) -> Result<()>;

    /// An opaque, possibly signed, direct-access URL, or `None` if the
    /// backend offers no such thing.
    async fn get_object_url(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Option<String>;

    /// Percentage (0-100) of this backend's capacity in use, or `None` if it
    /// doesn't track usage (e.g. an unbounded cloud bucket). Compared
    /// directly against `max_percent_full`/`global_max_percent_full` (spec
    /// §3: `float[0,100]`) by the capacity monitor.
    async fn get_store_usage_percent(&self) -> Option<f64>;

    /// Release any background resources (monitor threads, connections).
    /// Called once, in reverse construction order, during store teardown.
    async fn shutdown(&self);

    /// A JSON snapshot of this backend's configuration, for diagnostics.
    /// Composites override this to nest their children's descriptions.
    fn describe(&self) -> serde_json::Value {
        serde_json::json!({ "id": self.id() })
    }
}
