// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Cross-module scenarios from spec §8 that don't fit naturally inside any
//! one module's own test block: a real `env_logger` initialization (the way
//! a consuming binary would set one up), factory-built trees, and
//! `UserMediaResolver` dispatch exercised against real `DiskBackend`s rather
//! than the pure selection function.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::backend::Backend;
use crate::config::{BackendConfig, EnvironmentConfig, ExtraDirConfig};
use crate::disk::DiskBackend;
use crate::error::Result;
use crate::factory::build;
use crate::object::{LogicalObject, MediaCategory, OperationOptions, PluggedMedium, StoreBy};
use crate::session::ObjectSession;
use crate::user_media::{InstanceQuotaSource, UserMediaResolver};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct TestEnv {
    files_root: PathBuf,
    jobs_dir: PathBuf,
    temp_dir: PathBuf,
}

impl EnvironmentConfig for TestEnv {
    fn file_path(&self) -> &std::path::Path {
        &self.files_root
    }
    fn umask(&self) -> u32 {
        0o022
    }
    fn jobs_directory(&self) -> &std::path::Path {
        &self.jobs_dir
    }
    fn new_file_path(&self) -> &std::path::Path {
        &self.temp_dir
    }
    fn check_old_style(&self) -> bool {
        false
    }
    fn store_by(&self) -> StoreBy {
        StoreBy::Id
    }
    fn gid(&self) -> Option<u32> {
        None
    }
    fn cache_path(&self) -> Option<&std::path::Path> {
        None
    }
}

struct NoopSession;

#[async_trait]
impl ObjectSession for NoopSession {
    async fn add(&self, _object: &LogicalObject) -> Result<()> {
        Ok(())
    }
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

struct AlwaysQuotaExhausted;

impl InstanceQuotaSource for AlwaysQuotaExhausted {
    fn has_instance_quota(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn disk_backend_legacy_path_is_found_when_old_style_is_enabled() {
    init_logging();
    let dir = TempDir::new().unwrap();

    // Simulate a pre-existing legacy-layout file, written before sharding
    // existed: no shard directory, just `dataset_{id}.dat` at the root.
    let legacy_path = dir.path().join("dataset_42.dat");
    tokio::fs::write(&legacy_path, b"legacy bytes").await.unwrap();

    let backend = DiskBackend::new(
        "legacy",
        dir.path().to_path_buf(),
        StoreBy::Id,
        true, // check_old_style
        0o022,
        None,
        Default::default(),
    );
    let obj = LogicalObject::with_id(42);
    let opts = OperationOptions::default();

    assert!(backend.exists(&obj, &opts).await.unwrap());
    let found = backend.get_filename(&obj, &opts).await.unwrap();
    assert_eq!(found, legacy_path);
    let data = backend.get_data(&obj, &opts, 0, -1).await.unwrap();
    assert_eq!(&data[..], b"legacy bytes");
}

#[tokio::test]
async fn factory_builds_a_hierarchical_tree_with_reserved_extra_dirs() {
    init_logging();
    let files_dir = TempDir::new().unwrap();
    let jobs_dir = TempDir::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let env = TestEnv {
        files_root: files_dir.path().to_path_buf(),
        jobs_dir: jobs_dir.path().to_path_buf(),
        temp_dir: temp_dir.path().to_path_buf(),
    };

    let primary_dir = TempDir::new().unwrap();
    let fallback_dir = TempDir::new().unwrap();
    let cfg = BackendConfig {
        kind: "hierarchical".into(),
        id: Some("tree".into()),
        order: None,
        weight: 0,
        max_percent_full: 0.0,
        global_max_percent_full: None,
        files_dir: None,
        extra_dirs: vec![],
        backends: vec![
            BackendConfig {
                kind: "disk".into(),
                id: Some("primary".into()),
                order: Some(0),
                weight: 0,
                max_percent_full: 0.0,
                global_max_percent_full: None,
                files_dir: Some(primary_dir.path().to_path_buf()),
                extra_dirs: vec![ExtraDirConfig { kind: "scratch".into(), path: "/unused".into() }],
                backends: vec![],
                cache_path: None,
            },
            BackendConfig {
                kind: "disk".into(),
                id: Some("fallback".into()),
                order: Some(1),
                weight: 0,
                max_percent_full: 0.0,
                global_max_percent_full: None,
                files_dir: Some(fallback_dir.path().to_path_buf()),
                extra_dirs: vec![],
                backends: vec![],
                cache_path: None,
            },
        ],
        cache_path: None,
    };

    let tree = build(&cfg, &env, None, None).expect("tree should build");
    let obj = LogicalObject::with_id(99);
    tree.create(&obj, &OperationOptions::default()).await.unwrap();

    // Writes go to the first (primary) child only.
    let primary = DiskBackend::new(
        "primary",
        primary_dir.path().to_path_buf(),
        StoreBy::Id,
        false,
        0o022,
        None,
        Default::default(),
    );
    assert!(primary.exists(&obj, &OperationOptions::default()).await.unwrap());
}

#[tokio::test]
async fn user_media_resolver_reroutes_to_a_lower_order_medium_on_io_failure() {
    init_logging();
    let good_dir = TempDir::new().unwrap();

    // A medium rooted under a *file* rather than a directory: any attempt
    // to create parent directories under it hits ENOTDIR, giving us a real
    // `Error::Io` from `DiskBackend::create` without mocking anything.
    let broken_root_parent = TempDir::new().unwrap();
    let broken_root_file = broken_root_parent.path().join("not_a_dir");
    tokio::fs::write(&broken_root_file, b"x").await.unwrap();
    let broken_root = broken_root_file.join("subdir");

    let media = vec![
        PluggedMedium {
            id: "primary".into(),
            category: MediaCategory::Local,
            path: broken_root,
            order: 1,
            quota: 1_000_000,
            usage: 0,
        },
        PluggedMedium {
            id: "secondary".into(),
            category: MediaCategory::Local,
            path: good_dir.path().to_path_buf(),
            order: -1,
            quota: 1_000_000,
            usage: 0,
        },
    ];

    let instance_default: Arc<dyn Backend> = Arc::new(DiskBackend::new(
        "instance",
        good_dir.path().to_path_buf(),
        StoreBy::Id,
        false,
        0o022,
        None,
        Default::default(),
    ));

    let resolver = UserMediaResolver::new(
        media,
        instance_default,
        Arc::new(AlwaysQuotaExhausted),
        None,
    )
    .unwrap();

    let obj = LogicalObject::with_id(5);
    let opts = OperationOptions::default();
    resolver
        .dispatch(0, |backend| Box::pin(backend.create(&obj, &opts)))
        .await
        .expect("should fall through to the secondary medium");

    let secondary = DiskBackend::new(
        "secondary",
        good_dir.path().to_path_buf(),
        StoreBy::Id,
        false,
        0o022,
        None,
        Default::default(),
    );
    assert!(secondary.exists(&obj, &opts).await.unwrap());
}

#[tokio::test]
async fn distributed_store_recovers_after_a_backend_is_reconfigured_away() {
    init_logging();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let backend_a: Arc<dyn Backend> = Arc::new(DiskBackend::new(
        "a",
        dir_a.path().to_path_buf(),
        StoreBy::Id,
        false,
        0o022,
        None,
        Default::default(),
    ));
    let backend_b: Arc<dyn Backend> = Arc::new(DiskBackend::new(
        "b",
        dir_b.path().to_path_buf(),
        StoreBy::Id,
        false,
        0o022,
        None,
        Default::default(),
    ));

    // Write the object directly under "b" without going through a store,
    // as if it had been placed there by a now-forgotten configuration.
    let obj = LogicalObject::with_id(11);
    backend_b.create(&obj, &OperationOptions::default()).await.unwrap();
    obj.set_object_store_id("retired-backend-id");

    let store = crate::distributed::DistributedStore::new(
        "dist",
        vec![
            crate::distributed::DistributedChild {
                id: "a".into(),
                backend: backend_a,
                weight: 1,
                max_percent_full: 0.0,
            },
            crate::distributed::DistributedChild {
                id: "b".into(),
                backend: backend_b,
                weight: 1,
                max_percent_full: 0.0,
            },
        ],
        None,
        Some(Arc::new(NoopSession)),
        None,
        false,
    );

    let filename = store.get_filename(&obj, &OperationOptions::default()).await.unwrap();
    assert!(filename.starts_with(dir_b.path()));
    assert_eq!(obj.object_store_id(), Some("b".to_string()));
}
