// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which field of a [`LogicalObject`] a store uses as its identity key.
/// Fixed per store at construction time and never varies per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBy {
    Id,
    Uuid,
}

/// An object's identity key, resolved according to a store's [`StoreBy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    Id(i64),
    Uuid(Uuid),
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Id(id) => write!(f, "{id}"),
            Identity::Uuid(uuid) => write!(f, "{uuid}"),
        }
    }
}

/// A user's single plugged-media entry.
///
/// `order > 0` means "prefer over instance storage", `order < 0` means
/// "fall back to after instance storage", `order == 0` is reserved for the
/// instance-level default and never appears in a user's media list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluggedMedium {
    pub id: String,
    pub category: MediaCategory,
    pub path: PathBuf,
    pub order: i32,
    pub quota: u64,
    pub usage: u64,
}

impl PluggedMedium {
    /// `usage + additional <= quota`, the check every selection step in
    /// `UserMediaResolver` performs before committing to a medium.
    pub fn has_room_for(&self, additional: u64) -> bool {
        self.usage.saturating_add(additional) <= self.quota
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaCategory {
    Local,
    S3,
    Azure,
    Swift,
    Irods,
    Pithos,
}

/// The input to every store operation.
///
/// `object_store_id` is the one field a `create` call mutates while the rest
/// of the object is only read (spec §3 invariant); it's a `Mutex` rather than
/// a plain field so [`crate::distributed::DistributedStore`] can record its
/// placement decision through a shared `&LogicalObject` the same way it's
/// threaded through every other read-only operation, without requiring every
/// caller in the dispatch chain to hold `&mut`.
#[derive(Debug, Default)]
pub struct LogicalObject {
    pub id: Option<i64>,
    pub uuid: Option<Uuid>,
    /// The id of a specific child backend where the object lives or should
    /// live. Only `create` is permitted to mutate this (spec §3 invariant).
    pub object_store_id: Mutex<Option<String>>,
    /// The user's plugged media, if any. `None` or a job-context object
    /// suppresses user-media routing.
    pub media: Option<Vec<PluggedMedium>>,
    /// Job working-directory objects always use instance storage, never
    /// user-plugged media.
    pub is_job_context: bool,
    /// Diagnostic-only; never read by behavior, only interpolated into log
    /// messages and error text.
    pub class_name: &'static str,
}

impl Clone for LogicalObject {
    fn clone(&self) -> Self {
        LogicalObject {
            id: self.id,
            uuid: self.uuid,
            object_store_id: Mutex::new(self.object_store_id()),
            media: self.media.clone(),
            is_job_context: self.is_job_context,
            class_name: self.class_name,
        }
    }
}

impl LogicalObject {
    pub fn with_id(id: i64) -> Self {
        LogicalObject {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn with_uuid(uuid: Uuid) -> Self {
        LogicalObject {
            uuid: Some(uuid),
            ..Default::default()
        }
    }

    pub fn object_store_id(&self) -> Option<String> {
        self.object_store_id.lock().unwrap().clone()
    }

    pub fn set_object_store_id(&self, id: impl Into<String>) {
        *self.object_store_id.lock().unwrap() = Some(id.into());
    }

    /// Resolve this object's identity key under `store_by`, falling back to
    /// `id` if the configured key is absent.
    pub fn identity(&self, store_by: StoreBy) -> Option<Identity> {
        match store_by {
            StoreBy::Uuid => self
                .uuid
                .map(Identity::Uuid)
                .or_else(|| self.id.map(Identity::Id)),
            StoreBy::Id => self.id.map(Identity::Id),
        }
    }

    /// Whether this object should be routed through user-media resolution
    /// before falling back to instance storage.
    pub fn wants_user_media_routing(&self) -> bool {
        !self.is_job_context && self.media.as_ref().is_some_and(|m| !m.is_empty())
    }
}

/// Per-operation flags accepted by every backend method. Unknown
/// keys are ignored by construction: this is a concrete struct, not an open
/// map, so callers can only set fields that mean something.
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    /// Key into the backend's `extraDirs` map selecting a root other than
    /// the default files root.
    pub base_dir: Option<String>,
    /// If true, operate on/return the containing directory, not the object
    /// file.
    pub dir_only: bool,
    /// Additional path component joined under the sharded path.
    pub extra_dir: Option<PathBuf>,
    /// If true, put `extra_dir` before the hash shards rather than after.
    pub extra_dir_at_root: bool,
    /// Override the default leaf filename.
    pub alt_name: Option<String>,
    /// If true, wrap the object inside a subdirectory named after its id.
    pub obj_dir: bool,
    /// `delete` only: recursively remove the directory. Refused unless
    /// combined with `extra_dir` or `obj_dir`.
    pub entire_dir: bool,
    /// `update_from_file` only: if the source is a symlink, replicate it
    /// rather than copy the target.
    pub preserve_symlinks: bool,
    /// `update_from_file` only: create the object first if absent.
    pub create: bool,
}
