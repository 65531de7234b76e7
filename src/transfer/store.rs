//! Object store backends for the bulk transfer layer.
//!
//! [`ObjectStore`] is the seam the sync functions operate through. The
//! production backend is [`S3Store`]; [`MemoryStore`] backs tests and dry
//! runs without network access.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tokio::fs;

use super::TransferError;

/// Minimal object-store surface needed by the bulk transfer layer.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all object keys under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, TransferError>;

    /// Download one object to a local file.
    async fn download(&self, key: &str, dest: &Path) -> Result<(), TransferError>;

    /// Upload one local file as an object.
    async fn upload(&self, src: &Path, key: &str) -> Result<(), TransferError>;

    /// Existence probe. "Not found" is `Ok(false)`; any other failure is an
    /// error the caller must treat as fatal.
    async fn exists(&self, key: &str) -> Result<bool, TransferError>;
}

/// S3-backed object store bound to one bucket.
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Connect using the ambient AWS configuration chain.
    pub async fn connect(region: &str, profile: Option<&str>, bucket: impl Into<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let shared = loader.load().await;
        Self {
            client: Client::new(&shared),
            bucket: bucket.into(),
        }
    }

    /// Wrap an existing client, for callers that manage their own config.
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, TransferError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| TransferError::ListFailed {
                prefix: prefix.to_string(),
                message: e.to_string(),
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<(), TransferError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| TransferError::ItemFailed {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| TransferError::ItemFailed {
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes();

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(dest, &data).await?;
        Ok(())
    }

    async fn upload(&self, src: &Path, key: &str) -> Result<(), TransferError> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| TransferError::ItemFailed {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| TransferError::ItemFailed {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TransferError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(TransferError::ProbeFailed {
                        key: key.to_string(),
                        message: service.to_string(),
                    })
                }
            }
        }
    }
}

/// In-memory object store for tests and local dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.lock().unwrap().insert(key.into(), data.into());
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Fetch an object's bytes, if present.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, TransferError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<(), TransferError> {
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| TransferError::ItemFailed {
                key: key.to_string(),
                message: "object not found".to_string(),
            })?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(dest, &data).await?;
        Ok(())
    }

    async fn upload(&self, src: &Path, key: &str) -> Result<(), TransferError> {
        let data = fs::read(src).await.map_err(|e| TransferError::ItemFailed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.insert(key, data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TransferError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let dir = tempdir().unwrap();
        let src = dir.path().join("main.tf");
        std::fs::write(&src, b"resource {}").unwrap();

        store.upload(&src, "res/main.tf").await.unwrap();
        assert!(store.exists("res/main.tf").await.unwrap());
        assert!(!store.exists("res/other.tf").await.unwrap());

        let dest = dir.path().join("out/main.tf");
        store.download("res/main.tf", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"resource {}");
    }

    #[tokio::test]
    async fn test_memory_store_list_by_prefix() {
        let store = MemoryStore::new();
        store.insert("a/1", b"".to_vec());
        store.insert("a/2", b"".to_vec());
        store.insert("b/1", b"".to_vec());

        assert_eq!(store.list("a/").await.unwrap().len(), 2);
        assert_eq!(store.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_memory_store_missing_object() {
        let store = MemoryStore::new();
        let dir = tempdir().unwrap();
        let result = store.download("missing", &dir.path().join("x")).await;
        assert!(matches!(result, Err(TransferError::ItemFailed { .. })));
    }
}
