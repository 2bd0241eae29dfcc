// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Ordered fallback reads, primary-only writes (spec C6 `HierarchicalStore`).
//!
//! Unlike [`crate::distributed::DistributedStore`], placement here is
//! static: the first child in configuration order is always the write
//! target, and nothing is ever recorded back onto the object.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::Backend;
use crate::dispatcher::{user_media_route, Children};
use crate::error::{Error, Result};
use crate::object::{LogicalObject, OperationOptions};
use crate::user_media::UserMediaResolver;

pub struct HierarchicalStore {
    id: String,
    children: Children,
    user_media: Option<Arc<UserMediaResolver>>,
}

impl HierarchicalStore {
    pub fn new(
        id: impl Into<String>,
        ordered_children: Vec<(String, Arc<dyn Backend>)>,
        user_media: Option<Arc<UserMediaResolver>>,
    ) -> Self {
        HierarchicalStore {
            id: id.into(),
            children: Children::new(ordered_children),
            user_media,
        }
    }

    fn primary(&self) -> Result<&Arc<dyn Backend>> {
        self.children
            .first()
            .ok_or_else(|| Error::invalid_object(format!("hierarchical store {} has no children", self.id)))
    }

    async fn first_hit(&self, object: &LogicalObject, options: &OperationOptions) -> Result<&Arc<dyn Backend>> {
        self.children.first_hit(object, options).await.ok_or_else(|| {
            Error::not_found(format!(
                "{} not found in any backend of hierarchical store {}",
                object.class_name, self.id
            ))
        })
    }
}

#[async_trait]
impl Backend for HierarchicalStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exists(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.exists(object, options)))
                .await;
        }
        Ok(self.first_hit(object, options).await.is_ok())
    }

    async fn create(&self, object: &LogicalObject, options: &OperationOptions) -> Result<()> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.create(object, options)))
                .await;
        }
        self.primary()?.create(object, options).await
    }

    async fn empty(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.empty(object, options)))
                .await;
        }
        self.first_hit(object, options).await?.empty(object, options).await
    }

    async fn size(&self, object: &LogicalObject, options: &OperationOptions) -> Result<u64> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.size(object, options)))
                .await;
        }
        self.first_hit(object, options).await?.size(object, options).await
    }

    async fn delete(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool> {
        if let Some(resolver) = user_media_route(object, &self.user_media) {
            return resolver
                .dispatch(0, |b| Box::pin(b.delete(object, options)))
                .await;
        }
        match self.first_hit(object, options).await {
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
        self.first_hit(object, options)
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
        self.first_hit(object, options).await?.get_filename(object, options).await
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
            self.primary()?
        } else {
            self.first_hit(object, options).await?
        };
        backend.update_from_file(object, options, source).await
    }

    async fn get_object_url(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Option<String> {
        self.first_hit(object, options).await.ok()?.get_object_url(object, options).await
    }

    async fn get_store_usage_percent(&self) -> Option<f64> {
        None
    }

    async fn shutdown(&self) {
        self.children.shutdown_all().await;
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "type": "hierarchical",
            "backends": self.children.describe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskBackend;
    use crate::object::{LogicalObject, StoreBy};
    use tempfile::TempDir;

    fn disk(id: &str, root: &std::path::Path) -> Arc<dyn Backend> {
        Arc::new(DiskBackend::new(
            id,
            root.to_path_buf(),
            StoreBy::Id,
            false,
            0o022,
            None,
            Default::default(),
        ))
    }

    #[tokio::test]
    async fn create_writes_only_to_the_first_child() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let store = HierarchicalStore::new(
            "hier",
            vec![("a".into(), disk("a", dir_a.path())), ("b".into(), disk("b", dir_b.path()))],
            None,
        );
        let obj = LogicalObject::with_id(1);
        store.create(&obj, &OperationOptions::default()).await.unwrap();

        let a = disk("a", dir_a.path());
        let b = disk("b", dir_b.path());
        assert!(a.exists(&obj, &OperationOptions::default()).await.unwrap());
        assert!(!b.exists(&obj, &OperationOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn read_falls_through_to_a_later_child() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let backend_b = disk("b", dir_b.path());
        let obj = LogicalObject::with_id(2);
        backend_b.create(&obj, &OperationOptions::default()).await.unwrap();

        let store = HierarchicalStore::new(
            "hier",
            vec![("a".into(), disk("a", dir_a.path())), ("b".into(), backend_b)],
            None,
        );
        let filename = store.get_filename(&obj, &OperationOptions::default()).await.unwrap();
        assert!(filename.starts_with(dir_b.path()));
    }

    #[tokio::test]
    async fn missing_in_all_children_is_not_found() {
        let dir_a = TempDir::new().unwrap();
        let store = HierarchicalStore::new("hier", vec![("a".into(), disk("a", dir_a.path()))], None);
        let obj = LogicalObject::with_id(3);
        let err = store.get_filename(&obj, &OperationOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
