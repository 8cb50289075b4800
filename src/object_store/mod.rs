//! Object store access
//!
//! Thin wrapper over the S3 SDK scoped to one bucket. The store holds the
//! run's manifests and schema dumps; the per-segment data blobs are written
//! and read by the external segment plugin, never by this process.
//!
//! Backup runs are laid out as `<folder>/backups/<D>/<T>/…` where `D` and
//! `T` are fixed-width digit strings, so prefix listing with a `/` delimiter
//! enumerates them in replay order.

mod errors;

pub use errors::{ObjectStoreError, ObjectStoreResult};

use std::path::Path;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::cli::S3Params;

/// Handle on one bucket of an S3-compatible store.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    /// Build a client for the configured endpoint with static credentials.
    ///
    /// The endpoint is `host:port` without a scheme; plain HTTP matches what
    /// the segment plugin is configured with. Path-style addressing is
    /// required for MinIO-class stores.
    pub fn connect(params: &S3Params) -> Self {
        let credentials = Credentials::new(&params.id, &params.key, None, None, "gpdbbr");

        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(format!("http://{}", params.endpoint))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: params.bucket.clone(),
        }
    }

    /// Probe for the configured bucket.
    pub async fn bucket_exists(&self) -> ObjectStoreResult<bool> {
        match self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()) == Some(true) {
                    Ok(false)
                } else {
                    Err(ObjectStoreError::request("head bucket", e))
                }
            }
        }
    }

    /// Upload a local file under `key`.
    pub async fn put_file(&self, local: &Path, key: &str) -> ObjectStoreResult<()> {
        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| ObjectStoreError::LocalFile(local.display().to_string(), e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| ObjectStoreError::request(key, e))?;

        Ok(())
    }

    /// Download the object at `key` into memory.
    ///
    /// A missing key is reported as [`ObjectStoreError::NoSuchKey`] so
    /// callers can treat an absent object as an ordinary outcome.
    pub async fn get_bytes(&self, key: &str) -> ObjectStoreResult<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                    ObjectStoreError::NoSuchKey(key.to_string())
                } else {
                    ObjectStoreError::request(key, e)
                }
            })?;

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Read(key.to_string(), e.to_string()))?;

        Ok(bytes.into_bytes().to_vec())
    }

    /// Whether an object exists at `key`.
    pub async fn exists(&self, key: &str) -> ObjectStoreResult<bool> {
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
                if e.as_service_error().map(|se| se.is_not_found()) == Some(true) {
                    Ok(false)
                } else {
                    Err(ObjectStoreError::request(key, e))
                }
            }
        }
    }

    /// List the immediate children of a `…/`-terminated prefix.
    ///
    /// Returns bare child names: subdirectory-style common prefixes without
    /// the trailing slash, plus any plain objects sitting directly under the
    /// prefix. Callers decide what counts as an unexpected entry.
    pub async fn list_dir(&self, prefix: &str) -> ObjectStoreResult<Vec<String>> {
        let mut names = Vec::new();

        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .delimiter("/")
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| ObjectStoreError::request(prefix, e))?;

            for common in page.common_prefixes() {
                if let Some(p) = common.prefix() {
                    let name = p
                        .strip_prefix(prefix)
                        .unwrap_or(p)
                        .trim_end_matches('/');
                    if !name.is_empty() {
                        names.push(name.to_string());
                    }
                }
            }

            for object in page.contents() {
                if let Some(k) = object.key() {
                    let name = k.strip_prefix(prefix).unwrap_or(k);
                    if !name.is_empty() {
                        names.push(name.to_string());
                    }
                }
            }
        }

        Ok(names)
    }
}
