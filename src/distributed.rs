// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Weighted random-write placement across backends (spec C5
//! `DistributedStore`).
//!
//! New objects land on a uniformly-sampled backend from a weighted
//! multiset; once placed, the choice is durable — it's recorded on the
//! object via the host's [`ObjectSession`] and every later operation looks
//! the object up by that recorded id rather than re-sampling.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use rand::Rng;

use crate::backend::Backend;
use crate::capacity_monitor::{CapacityMonitor, MonitoredBackend};
use crate::dispatcher::{user_media_route, Children};
use crate::error::{Error, Result};
use crate::object::{LogicalObject, OperationOptions};
use crate::session::ObjectSession;
use crate::user_media::UserMediaResolver;

/// One child of a distributed store, as configured (spec §3 `BackendConfig`
/// — `weight` and `maxPercentFull` are the fields this composite cares
/// about; the rest live on the child backend itself).
pub struct DistributedChild {
    pub id: String,
    pub backend: Arc<dyn Backend>,
    pub weight: u32,
    pub max_percent_full: f64,
}

pub struct DistributedStore {
    id: String,
    children: Children,
    user_media: Option<Arc<UserMediaResolver>>,
    session: Option<Arc<dyn ObjectSession>>,
    /// Immutable post-construction (spec §5): the full multiset of ids,
    /// each repeated `weight` times.
    original_weighted_ids: Arc<Vec<String>>,
    /// Published by whole-reference replacement from the capacity monitor;
    /// read by every `create` without locking out other readers.
    live_weighted_ids: Arc<RwLock<Arc<Vec<String>>>>,
    monitor: Option<CapacityMonitor>,
}

impl DistributedStore {
    pub fn new(
        id: impl Into<String>,
        children: Vec<DistributedChild>,
        user_media: Option<Arc<UserMediaResolver>>,
        session: Option<Arc<dyn ObjectSession>>,
        global_max_percent_full: Option<f64>,
        run_capacity_monitor: bool,
    ) -> Self {
        let mut weighted_ids = Vec::new();
        let mut monitored = Vec::new();
        let mut entries = Vec::new();
        for child in children {
            for _ in 0..child.weight {
                weighted_ids.push(child.id.clone());
            }
            monitored.push(MonitoredBackend {
                id: child.id.clone(),
                backend: child.backend.clone(),
                max_percent_full: child.max_percent_full,
            });
            entries.push((child.id, child.backend));
        }

        let original_weighted_ids = Arc::new(weighted_ids);
        let live_weighted_ids = Arc::new(RwLock::new(original_weighted_ids.clone()));
        let monitor = if run_capacity_monitor {
            CapacityMonitor::spawn(
                monitored,
                original_weighted_ids.clone(),
                global_max_percent_full,
                live_weighted_ids.clone(),
            )
        } else {
            None
        };

        DistributedStore {
            id: id.into(),
            children: Children::new(entries),
            user_media,
            session,
            original_weighted_ids,
            live_weighted_ids,
            monitor,
        }
    }

    fn pick_weighted(&self) -> Option<String> {
        let seq = self.live_weighted_ids.read().clone();
        if seq.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..seq.len());
        Some(seq[idx].clone())
    }

    async fn persist_placement(&self, object: &LogicalObject, chosen_id: &str) -> Result<()> {
        object.set_object_store_id(chosen_id.to_string());
        let session = self.session.as_ref().ok_or(Error::NoSession)?;
        session.add(object).await?;
        session.flush().await
    }

    /// Resolves the backend currently holding (or about to hold) `object`,
    /// for every operation but `create`: look up by `object_store_id`; if
    /// that id is unknown (e.g. after reconfiguration) or absent, scan all
    /// children and adopt the first hit's id (spec §4.5 "Read/other
    /// operations").
    async fn resolve(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Result<&Arc<dyn Backend>> {
        if let Some(id) = object.object_store_id() {
            if let Some(backend) = self.children.get(&id) {
                return Ok(backend);
            }
        }
        if let Some(backend) = self.children.first_hit(object, options).await {
            self.persist_placement(object, backend.id()).await?;
            return Ok(backend);
        }
        Err(Error::not_found(format!(
            "{} not found in any backend of distributed store {}",
            object.class_name, self.id
        )))
    }

    /// `create` is the only method permitted to mutate `object_store_id`
    /// from scratch (spec §3 invariant).
    ///
    /// Mirrors the original's `create`: a valid existing id is used
    /// directly (delegating to a backend is idempotent, so it doesn't
    /// matter whether the object is already there); a *missing* id goes
    /// straight to a weighted pick with no search; an *invalid* id (one
    /// naming a backend that's no longer configured, e.g. after
    /// reconfiguration) is searched for across all children first — only
    /// falling back to a weighted pick if no child holds it.
    async fn ensure_placed(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Result<&Arc<dyn Backend>> {
        let current_id = object.object_store_id();
        let target_id = if let Some(id) = &current_id {
            if self.children.get(id).is_some() {
                id.clone()
            } else if let Some(backend) = self.children.first_hit(object, options).await {
                let found_id = backend.id().to_string();
                self.persist_placement(object, &found_id).await?;
                found_id
            } else {
                let chosen = self.pick_weighted().ok_or_else(|| {
                    Error::invalid_object("no backend available for write placement")
                })?;
                self.persist_placement(object, &chosen).await?;
                chosen
            }
        } else {
            let chosen = self
                .pick_weighted()
                .ok_or_else(|| Error::invalid_object("no backend available for write placement"))?;
            self.persist_placement(object, &chosen).await?;
            chosen
        };

        self.children
            .get(&target_id)
            .ok_or_else(|| Error::invalid_object(format!("unknown backend id {target_id}")))
    }
}

#[async_trait]
impl Backend for DistributedStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exists(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.exists(object, options)))
                .await;
        }
        match self.resolve(object, options).await {
            Ok(backend) => backend.exists(object, options).await,
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, object: &LogicalObject, options: &OperationOptions) -> Result<()> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.create(object, options)))
                .await;
        }
        let backend = self.ensure_placed(object, options).await?;
        backend.create(object, options).await
    }

    async fn empty(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.empty(object, options)))
                .await;
        }
        self.resolve(object, options).await?.empty(object, options).await
    }

    async fn size(&self, object: &LogicalObject, options: &OperationOptions) -> Result<u64> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.size(object, options)))
                .await;
        }
        self.resolve(object, options).await?.size(object, options).await
    }

    async fn delete(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.delete(object, options)))
                .await;
        }
        match self.resolve(object, options).await {
            Ok(backend) => backend.delete(object, options).await,
            Err(_) => Ok(false),
        }
    }

    async fn get_data(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
        start: u64,
        count: i64,
    ) -> Result<Bytes> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.get_data(object, options, start, count)))
                .await;
        }
        self.resolve(object, options)
            .await?
            .get_data(object, options, start, count)
            .await
    }

    async fn get_filename(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Result<std::path::PathBuf> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.get_filename(object, options)))
                .await;
        }
        self.resolve(object, options).await?.get_filename(object, options).await
    }

    async fn update_from_file(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
        source: &std::path::Path,
    ) -> Result<()> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.update_from_file(object, options, source)))
                .await;
        }
        let backend = if options.create {
            self.ensure_placed(object, options).await?
        } else {
            self.resolve(object, options).await?
        };
        backend.update_from_file(object, options, source).await
    }

    async fn get_object_url(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Option<String> {
        self.resolve(object, options).await.ok()?.get_object_url(object, options).await
    }

    async fn get_store_usage_percent(&self) -> Option<f64> {
        None
    }

    async fn shutdown(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.shutdown().await;
        }
        self.children.shutdown_all().await;
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "type": "distributed",
            "weighted_ids": *self.original_weighted_ids,
            "backends": self.children.describe(),
        })
    }
}
