// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Deterministic logical-ID -> filesystem path mapping (spec C1).
//!
//! This module is pure: no I/O, no shared state. Given the same inputs it
//! always produces the same output, and it never touches the filesystem to
//! decide what that output is.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::object::{Identity, LogicalObject, OperationOptions, StoreBy};

/// Inputs a [`super::disk::DiskBackend`] threads through to [`construct_path`]
/// on every call.
#[derive(Debug, Clone, Copy)]
pub struct PathContext<'a> {
    pub files_root: &'a Path,
    pub store_by: StoreBy,
    /// Probe the legacy unsharded layout first.
    pub old_style: bool,
}

/// Validate that `candidate` is already in normal form: reject an `extraDir`
/// whose normalized form differs from itself rather than silently rewriting
/// it.
fn require_already_normalized(candidate: &Path) -> Result<()> {
    let normalized = normalize_relative(candidate)?;
    if normalized.as_path() != candidate {
        return Err(Error::invalid_object(format!(
            "extra_dir is not normalized: {}",
            candidate.display()
        )));
    }
    Ok(())
}

/// The "safe relative path" check: normalize, then require the result
/// neither starts with nor contains a `..` that would escape the root.
///
/// Walks `Path::components()` to guarantee a relative path can never point
/// outside the directory it's joined under.
pub fn normalize_relative(candidate: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(Error::invalid_object(format!(
                    "path must be relative: {}",
                    candidate.display()
                )));
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                if !out.pop() {
                    return Err(Error::invalid_object(format!(
                        "path escapes its containing directory: {}",
                        candidate.display()
                    )));
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Ok(out)
}

/// The 3-character-group shard for an identity key. Ids under 1000 always
/// land in a single `"000"` bucket;
/// larger ids are left-padded to a multiple of 3 digits and split into
/// 3-character groups from the left, e.g. `1234 -> 001/234`,
/// `1234567 -> 001/234/567`.
pub fn shard_for(identity: Identity) -> PathBuf {
    let digits = match identity {
        Identity::Id(id) => id.max(0).to_string(),
        // No numeric sharding is defined for UUID identity; group the
        // UUID's hex digits with the same chunking rule so directories
        // still cap out at a few thousand siblings.
        Identity::Uuid(uuid) => uuid.simple().to_string(),
    };
    shard_digits(&digits)
}

fn shard_digits(digits: &str) -> PathBuf {
    if digits.len() < 4 {
        return PathBuf::from("000");
    }
    let padded_len = digits.len().div_ceil(3) * 3;
    let padded = format!("{digits:0>padded_len$}");
    let mut path = PathBuf::new();
    for chunk in padded.as_bytes().chunks(3) {
        path.push(std::str::from_utf8(chunk).expect("ascii digits"));
    }
    path
}

/// Default leaf filename for an identity key: `dataset_{id}.dat`.
pub fn default_leaf_name(identity: Identity) -> String {
    format!("dataset_{identity}.dat")
}

/// Resolves `root`, validates `extra_dir`/`alt_name`, extracts the identity
/// key, composes the relative portion, and appends the leaf unless
/// `dir_only`.
pub fn construct_path(
    object: &LogicalObject,
    options: &OperationOptions,
    extra_dirs: &std::collections::HashMap<String, PathBuf>,
    ctx: PathContext<'_>,
) -> Result<PathBuf> {
    // Step 1: resolve root.
    let root = match &options.base_dir {
        Some(key) => extra_dirs
            .get(key)
            .cloned()
            .unwrap_or_else(|| ctx.files_root.to_path_buf()),
        None => ctx.files_root.to_path_buf(),
    };

    // Step 2: validate extra_dir / alt_name.
    if let Some(extra_dir) = &options.extra_dir {
        require_already_normalized(extra_dir)?;
    }
    if let Some(alt_name) = &options.alt_name {
        // A joined alt_name must not escape the directory it's joined under.
        normalize_relative(Path::new(alt_name)).map_err(|_| {
            Error::invalid_object(format!("alt_name would escape its directory: {alt_name}"))
        })?;
    }

    // Step 3: extract identity key.
    let identity = object.identity(ctx.store_by);
    if identity.is_none() && !options.dir_only {
        return Err(Error::invalid_object(
            "the object's identity key must be set before a path can be constructed",
        ));
    }

    // Step 4: compose the relative portion.
    let mut relative = PathBuf::new();
    if ctx.old_style {
        if let Some(extra_dir) = &options.extra_dir {
            relative.push(extra_dir);
        }
    } else {
        let identity = identity.expect("checked above: absent only when dir_only, and this branch only runs otherwise");
        relative.push(shard_for(identity));
        if options.obj_dir {
            relative.push(identity.to_string());
        }
        if let Some(extra_dir) = &options.extra_dir {
            if options.extra_dir_at_root {
                let mut with_extra = PathBuf::from(extra_dir);
                with_extra.push(&relative);
                relative = with_extra;
            } else {
                relative.push(extra_dir);
            }
        }
    }

    let mut path = root.join(relative);

    // Step 5: append leaf.
    if !options.dir_only {
        let identity = identity.expect("validated above");
        let leaf = options
            .alt_name
            .clone()
            .unwrap_or_else(|| default_leaf_name(identity));
        path.push(leaf);
    }

    Ok(absolutize(&path))
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
