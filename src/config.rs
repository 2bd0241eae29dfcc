// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Deserializable configuration documents consumed by [`crate::factory`], and
//! the host-environment contract the Factory reads alongside them.
//!
//! Parsing raw XML or YAML bytes into these structs is the embedding
//! application's job; this crate only deserializes the structured form
//! `serde` already understands (typically produced from JSON or from an XML
//! layer upstream).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::object::StoreBy;

/// One entry of a backend's `extraDirs` list: an additional named root
/// besides the default files directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraDirConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: PathBuf,
}

/// The top-level configuration document for one backend, recursively
/// nested for `distributed`/`hierarchical` composites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub max_percent_full: f64,
    #[serde(default)]
    pub global_max_percent_full: Option<f64>,
    #[serde(default)]
    pub files_dir: Option<PathBuf>,
    #[serde(default)]
    pub extra_dirs: Vec<ExtraDirConfig>,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

/// The whole configuration document handed to the Factory: a single root
/// backend (itself possibly a composite with nested `backends`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(flatten)]
    pub root: BackendConfig,
}

/// Host-supplied runtime context the Factory and `DiskBackend` read from,
/// kept as a trait rather than a concrete struct so the embedding
/// application's own settings object can implement it directly.
pub trait EnvironmentConfig: Send + Sync {
    /// Default files root when a backend config doesn't set `files_dir`.
    fn file_path(&self) -> &std::path::Path;
    /// Permission mask applied to every file this crate creates.
    fn umask(&self) -> u32;
    /// Source for the reserved `job_work` extra dir.
    fn jobs_directory(&self) -> &std::path::Path;
    /// Source for the reserved `temp` extra dir.
    fn new_file_path(&self) -> &std::path::Path;
    /// Whether `DiskBackend` should probe the legacy unsharded layout.
    fn check_old_style(&self) -> bool;
    /// Which field of a `LogicalObject` backends use as their identity key.
    fn store_by(&self) -> StoreBy;
    /// Optional group ownership applied to newly created files.
    fn gid(&self) -> Option<u32>;
    /// Default local staging directory for cloud-style backends.
    fn cache_path(&self) -> Option<&std::path::Path>;
}

/// Builds the `extraDirs` map every backend starts from: `job_work` and
/// `temp` populated from the environment, then merged with (never
/// overridden by) the backend's own configured extras.
pub fn reserved_extra_dirs(
    env: &dyn EnvironmentConfig,
    configured: &[ExtraDirConfig],
) -> std::collections::HashMap<String, PathBuf> {
    let mut extra_dirs = std::collections::HashMap::new();
    extra_dirs.insert("job_work".to_string(), env.jobs_directory().to_path_buf());
    extra_dirs.insert("temp".to_string(), env.new_file_path().to_path_buf());
    for entry in configured {
        extra_dirs
            .entry(entry.kind.clone())
            .or_insert_with(|| entry.path.clone());
    }
    extra_dirs
}
