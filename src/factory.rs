// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Builds a store tree from an already-deserialized configuration document
//! (spec C9 `Factory`).
//!
//! Parsing raw XML or YAML bytes into [`BackendConfig`] is the embedding
//! application's job (spec §1); this module only walks the structured form.
//! Spec §6 requires the XML and structured-dict input forms to be
//! isomorphic — that isomorphism is a property of whatever upstream layer
//! produces a [`BackendConfig`] from either, not of this module, which sees
//! only the already-unified shape.

use std::sync::Arc;

use crate::backend::Backend;
use crate::config::{reserved_extra_dirs, BackendConfig, EnvironmentConfig};
use crate::disk::DiskBackend;
use crate::distributed::{DistributedChild, DistributedStore};
use crate::hierarchical::HierarchicalStore;
use crate::object::StoreBy;
use crate::session::ObjectSession;
use crate::user_media::UserMediaResolver;

const CLOUD_TYPES: &[&str] = &["s3", "cloud", "swift", "azure", "irods", "pithos"];

/// Constructs a concrete backend for a cloud-style config entry. Out of
/// scope for this crate (spec §1); supplying one bridges a config document
/// that names a cloud backend to the host's own adapter implementations.
pub trait CloudBackendBuilder: Send + Sync {
    fn build(&self, provider: &str, cfg: &BackendConfig) -> Option<Arc<dyn Backend>>;
}

/// Recursively builds the store tree rooted at `cfg`. Returns `None` (after
/// logging) for an unrecognized `type`, matching the original's
/// `type_to_object_store_class` returning `None` rather than raising —
/// callers building a composite's children treat a `None` child as "skip
/// it, not "abort the whole tree".
pub fn build(
    cfg: &BackendConfig,
    env: &dyn EnvironmentConfig,
    session: Option<Arc<dyn ObjectSession>>,
    cloud_builder: Option<&dyn CloudBackendBuilder>,
) -> Option<Arc<dyn Backend>> {
    match cfg.kind.as_str() {
        "disk" => Some(Arc::new(build_disk(cfg, env)) as Arc<dyn Backend>),
        "distributed" => build_distributed(cfg, env, session, cloud_builder),
        "hierarchical" => build_hierarchical(cfg, env, session, cloud_builder),
        kind if CLOUD_TYPES.contains(&kind) => match cloud_builder {
            Some(builder) => builder.build(kind, cfg),
            None => {
                log::error!("no cloud backend builder configured for backend type '{kind}'");
                None
            }
        },
        other => {
            log::error!("unrecognized backend type '{other}'");
            None
        }
    }
}

fn build_disk(cfg: &BackendConfig, env: &dyn EnvironmentConfig) -> DiskBackend {
    let files_root = cfg.files_dir.clone().unwrap_or_else(|| env.file_path().to_path_buf());
    let extra_dirs = reserved_extra_dirs(env, &cfg.extra_dirs);
    DiskBackend::new(
        cfg.id.clone().unwrap_or_else(|| "disk".to_string()),
        files_root,
        env.store_by(),
        env.check_old_style(),
        env.umask(),
        env.gid(),
        extra_dirs,
    )
}

fn build_distributed(
    cfg: &BackendConfig,
    env: &dyn EnvironmentConfig,
    session: Option<Arc<dyn ObjectSession>>,
    cloud_builder: Option<&dyn CloudBackendBuilder>,
) -> Option<Arc<dyn Backend>> {
    let mut children = Vec::new();
    for (index, child_cfg) in cfg.backends.iter().enumerate() {
        let Some(backend) = build(child_cfg, env, session.clone(), cloud_builder) else {
            log::error!("skipping unbuildable distributed child at index {index}");
            continue;
        };
        let id = child_cfg.id.clone().unwrap_or_else(|| format!("backend-{index}"));
        children.push(DistributedChild {
            id,
            backend,
            weight: child_cfg.weight,
            max_percent_full: child_cfg.max_percent_full,
        });
    }
    if children.is_empty() {
        log::error!("distributed store configured with no buildable children");
        return None;
    }
    Some(Arc::new(DistributedStore::new(
        cfg.id.clone().unwrap_or_else(|| "distributed".to_string()),
        children,
        None,
        session,
        cfg.global_max_percent_full,
        true,
    )))
}

fn build_hierarchical(
    cfg: &BackendConfig,
    env: &dyn EnvironmentConfig,
    session: Option<Arc<dyn ObjectSession>>,
    cloud_builder: Option<&dyn CloudBackendBuilder>,
) -> Option<Arc<dyn Backend>> {
    let mut ordered: Vec<(i32, BackendConfig)> =
        cfg.backends.iter().cloned().enumerate().map(|(i, c)| (c.order.unwrap_or(i as i32), c)).collect();
    ordered.sort_by_key(|(order, _)| *order);

    let mut children = Vec::new();
    for (order, child_cfg) in &ordered {
        let Some(backend) = build(child_cfg, env, session.clone(), cloud_builder) else {
            log::error!("skipping unbuildable hierarchical child at order {order}");
            continue;
        };
        let id = child_cfg.id.clone().unwrap_or_else(|| format!("backend-{order}"));
        children.push((id, backend));
    }
    if children.is_empty() {
        log::error!("hierarchical store configured with no buildable children");
        return None;
    }
    Some(Arc::new(HierarchicalStore::new(
        cfg.id.clone().unwrap_or_else(|| "hierarchical".to_string()),
        children,
        None,
    )))
}

/// Builds a [`UserMediaResolver`] for one user's plugged media, wiring in
/// the store's own default backend as the resolver's instance-level
/// fallback (ordinal 0 in the resolver's backend map, per spec §4.8).
pub fn build_user_media_resolver(
    media: Vec<crate::object::PluggedMedium>,
    instance_default: Arc<dyn Backend>,
    instance_quota: Arc<dyn crate::user_media::InstanceQuotaSource>,
    cloud_factory: Option<&dyn crate::user_media::MediumBackendFactory>,
) -> crate::error::Result<UserMediaResolver> {
    UserMediaResolver::new(media, instance_default, instance_quota, cloud_factory)
}
