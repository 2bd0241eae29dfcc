// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A single backend over a local directory tree, keyed by object identity
//! via [`crate::path_builder`] rather than content hash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::object::{LogicalObject, OperationOptions, StoreBy};
use crate::path_builder::{construct_path, PathContext};

/// How long to wait before a single retry when `size` observes a
/// freshly-created file reporting zero bytes — long enough for a networked
/// filesystem's metadata to settle, short enough not to matter elsewhere.
const SIZE_RETRY_DELAY: Duration = Duration::from_millis(10);

pub struct DiskBackend {
    id: String,
    files_root: PathBuf,
    store_by: StoreBy,
    check_old_style: bool,
    umask: u32,
    gid: Option<u32>,
    extra_dirs: HashMap<String, PathBuf>,
}

impl DiskBackend {
    pub fn new(
        id: impl Into<String>,
        files_root: PathBuf,
        store_by: StoreBy,
        check_old_style: bool,
        umask: u32,
        gid: Option<u32>,
        extra_dirs: HashMap<String, PathBuf>,
    ) -> Self {
        DiskBackend {
            id: id.into(),
            files_root,
            store_by,
            check_old_style,
            umask,
            gid,
            extra_dirs,
        }
    }

    fn context(&self, old_style: bool) -> PathContext<'_> {
        PathContext {
            files_root: &self.files_root,
            store_by: self.store_by,
            old_style,
        }
    }

    fn new_style_path(&self, object: &LogicalObject, options: &OperationOptions) -> Result<PathBuf> {
        construct_path(object, options, &self.extra_dirs, self.context(false))
    }

    fn old_style_path(&self, object: &LogicalObject, options: &OperationOptions) -> Result<PathBuf> {
        construct_path(object, options, &self.extra_dirs, self.context(true))
    }

    /// The dual-probe every read-side operation performs when old-style
    /// compatibility is enabled: legacy layout first, sharded layout second.
    async fn resolve_existing(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Result<PathBuf> {
        if self.check_old_style {
            let old = self.old_style_path(object, options)?;
            if tokio::fs::metadata(&old).await.is_ok() {
                return Ok(old);
            }
        }
        let new = self.new_style_path(object, options)?;
        if tokio::fs::metadata(&new).await.is_ok() {
            return Ok(new);
        }
        Err(Error::not_found(format!(
            "no object at {} (old_style checked: {})",
            new.display(),
            self.check_old_style
        )))
    }

    async fn apply_permissions(&self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = 0o666 & !self.umask;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| Error::io(path, e))?;
        }
        let _ = path;
        Ok(())
    }
}

#[async_trait]
impl Backend for DiskBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exists(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool> {
        Ok(self.resolve_existing(object, options).await.is_ok())
    }

    async fn create(&self, object: &LogicalObject, options: &OperationOptions) -> Result<()> {
        if self.exists(object, options).await? {
            return Ok(());
        }
        let path = self.new_style_path(object, options)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        if !options.dir_only {
            tokio::fs::File::create(&path)
                .await
                .map_err(|e| Error::io(&path, e))?;
            self.apply_permissions(&path).await?;
            self.apply_gid(&path).await?;
        }
        Ok(())
    }

    async fn empty(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool> {
        Ok(self.size(object, options).await? == 0)
    }

    async fn size(&self, object: &LogicalObject, options: &OperationOptions) -> Result<u64> {
        let path = match self.resolve_existing(object, options).await {
            Ok(path) => path,
            Err(_) => return Ok(0),
        };
        let len = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if len == 0 {
            tokio::time::sleep(SIZE_RETRY_DELAY).await;
            return Ok(tokio::fs::metadata(&path)
                .await
                .map(|m| m.len())
                .unwrap_or(0));
        }
        Ok(len)
    }

    async fn delete(&self, object: &LogicalObject, options: &OperationOptions) -> Result<bool> {
        let path = match self.resolve_existing(object, options).await {
            Ok(path) => path,
            Err(_) => return Ok(false),
        };
        let result = if options.entire_dir && (options.extra_dir.is_some() || options.obj_dir) {
            let dir = if options.dir_only {
                path
            } else {
                match path.parent() {
                    Some(parent) => parent.to_path_buf(),
                    None => return Ok(false),
                }
            };
            tokio::fs::remove_dir_all(&dir).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                log::warn!("delete failed for backend {}: {e}", self.id);
                Ok(false)
            }
        }
    }

    async fn get_data(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
        start: u64,
        count: i64,
    ) -> Result<Bytes> {
        let path = self.resolve_existing(object, options).await?;
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;
        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| Error::io(&path, e))?;
        let mut buf = Vec::new();
        if count < 0 {
            file.read_to_end(&mut buf)
                .await
                .map_err(|e| Error::io(&path, e))?;
        } else {
            let mut limited = file.take(count as u64);
            limited
                .read_to_end(&mut buf)
                .await
                .map_err(|e| Error::io(&path, e))?;
        }
        Ok(Bytes::from(buf))
    }

    async fn get_filename(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
    ) -> Result<PathBuf> {
        self.resolve_existing(object, options).await
    }

    async fn update_from_file(
        &self,
        object: &LogicalObject,
        options: &OperationOptions,
        source: &Path,
    ) -> Result<()> {
        if options.create {
            self.create(object, options).await?;
        }
        let dest = match self.resolve_existing(object, options).await {
            Ok(path) => path,
            Err(e) if !options.create => return Err(e),
            Err(_) => self.new_style_path(object, options)?,
        };

        if options.preserve_symlinks {
            if let Ok(target) = tokio::fs::read_link(source).await {
                let tmp = dest.with_extension("tmp-symlink");
                #[cfg(unix)]
                tokio::fs::symlink(&target, &tmp)
                    .await
                    .map_err(|e| Error::io(&tmp, e))?;
                tokio::fs::rename(&tmp, &dest)
                    .await
                    .map_err(|e| Error::io(&dest, e))?;
                return Ok(());
            }
        }

        tokio::fs::copy(source, &dest)
            .await
            .map_err(|e| Error::io(&dest, e))?;
        self.apply_permissions(&dest).await?;
        self.apply_gid(&dest).await?;
        Ok(())
    }

    async fn get_object_url(
        &self,
        _object: &LogicalObject,
        _options: &OperationOptions,
    ) -> Option<String> {
        None
    }

    async fn get_store_usage_percent(&self) -> Option<f64> {
        #[cfg(unix)]
        {
            let root = self.files_root.clone();
            let stat = tokio::task::spawn_blocking(move || nix::sys::statvfs::statvfs(&root))
                .await
                .ok()?
                .ok()?;
            let blocks = stat.blocks() as f64;
            if blocks == 0.0 {
                return None;
            }
            let available = stat.blocks_available() as f64;
            return Some(100.0 * (blocks - available) / blocks);
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    async fn shutdown(&self) {}

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "type": "disk",
            "files_root": self.files_root,
        })
    }
}

impl DiskBackend {
    async fn apply_gid(&self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        if let Some(gid) = self.gid {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || {
                nix::unistd::chown(&path, None, Some(nix::unistd::Gid::from_raw(gid)))
            })
            .await
            .map_err(|e| Error::io(Path::new("gid"), std::io::Error::other(e)))?
            .map_err(|e| Error::io(Path::new("gid"), std::io::Error::other(e)))?;
        }
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::LogicalObject;
    use tempfile::TempDir;

    fn backend(root: &Path) -> DiskBackend {
        DiskBackend::new(
            "disk1",
            root.to_path_buf(),
            StoreBy::Id,
            false,
            0o022,
            None,
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn create_then_exists_round_trips() {
        let dir = TempDir::new().unwrap();
        let backend = backend(dir.path());
        let obj = LogicalObject::with_id(1);
        let opts = OperationOptions::default();
        assert!(!backend.exists(&obj, &opts).await.unwrap());
        backend.create(&obj, &opts).await.unwrap();
        assert!(backend.exists(&obj, &opts).await.unwrap());
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = backend(dir.path());
        let obj = LogicalObject::with_id(1);
        let opts = OperationOptions::default();
        backend.create(&obj, &opts).await.unwrap();
        backend.create(&obj, &opts).await.unwrap();
        assert!(backend.exists(&obj, &opts).await.unwrap());
    }

    #[tokio::test]
    async fn empty_file_reports_zero_size() {
        let dir = TempDir::new().unwrap();
        let backend = backend(dir.path());
        let obj = LogicalObject::with_id(2);
        let opts = OperationOptions::default();
        backend.create(&obj, &opts).await.unwrap();
        assert!(backend.empty(&obj, &opts).await.unwrap());
    }

    #[tokio::test]
    async fn get_data_round_trips_written_bytes() {
        let dir = TempDir::new().unwrap();
        let backend = backend(dir.path());
        let obj = LogicalObject::with_id(3);
        let opts = OperationOptions::default();
        backend.create(&obj, &opts).await.unwrap();
        let path = backend.get_filename(&obj, &opts).await.unwrap();
        tokio::fs::write(&path, b"hello world").await.unwrap();
        let data = backend.get_data(&obj, &opts, 0, -1).await.unwrap();
        assert_eq!(&data[..], b"hello world");
        let partial = backend.get_data(&obj, &opts, 6, 5).await.unwrap();
        assert_eq!(&partial[..], b"world");
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let dir = TempDir::new().unwrap();
        let backend = backend(dir.path());
        let obj = LogicalObject::with_id(4);
        let opts = OperationOptions::default();
        backend.create(&obj, &opts).await.unwrap();
        assert!(backend.delete(&obj, &opts).await.unwrap());
        assert!(!backend.exists(&obj, &opts).await.unwrap());
    }

    #[tokio::test]
    async fn delete_of_missing_object_returns_false_not_error() {
        let dir = TempDir::new().unwrap();
        let backend = backend(dir.path());
        let obj = LogicalObject::with_id(5);
        let opts = OperationOptions::default();
        assert!(!backend.delete(&obj, &opts).await.unwrap());
    }

    #[tokio::test]
    async fn update_from_file_with_create_copies_contents() {
        let dir = TempDir::new().unwrap();
        let backend = backend(dir.path());
        let obj = LogicalObject::with_id(6);
        let opts = OperationOptions {
            create: true,
            ..Default::default()
        };
        let source = dir.path().join("source.dat");
        tokio::fs::write(&source, b"payload").await.unwrap();
        backend.update_from_file(&obj, &opts, &source).await.unwrap();
        let data = backend.get_data(&obj, &OperationOptions::default(), 0, -1).await.unwrap();
        assert_eq!(&data[..], b"payload");
    }

    #[tokio::test]
    async fn get_object_url_is_always_none() {
        let dir = TempDir::new().unwrap();
        let backend = backend(dir.path());
        let obj = LogicalObject::with_id(7);
        let opts = OperationOptions::default();
        backend.create(&obj, &opts).await.unwrap();
        assert!(backend.get_object_url(&obj, &opts).await.is_none());
    }
}
