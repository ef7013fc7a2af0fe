// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Content-addressable store for fetched worker code, using cacache.

use bytes::Bytes;
use ifc_lite_viewer_core::{ServiceError, WorkerEndpoint};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Scheme prefix of local worker URIs.
pub const LOCAL_URI_PREFIX: &str = "blob:sha256-";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache error: {0}")]
    Cache(#[from] cacache::Error),

    #[error("no worker stored under {0}")]
    NotFound(String),

    #[error("not a local worker URI: {0}")]
    InvalidUri(String),

    #[error("stored worker {0} failed its integrity check")]
    Corrupt(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Unavailable(e.to_string())
    }
}

/// Disk store turning fetched worker scripts into local endpoints.
#[derive(Debug, Clone)]
pub struct WorkerStore {
    cache_dir: PathBuf,
}

impl WorkerStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// SHA-256 of `data`, hex encoded.
    pub fn generate_key(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Store worker code fetched from `source_url`.
    pub async fn put(&self, source_url: &str, code: &[u8]) -> Result<WorkerEndpoint, StoreError> {
        let local_uri = format!("{LOCAL_URI_PREFIX}{}", Self::generate_key(code));
        if !self.contains(&local_uri).await {
            cacache::write(&self.cache_dir, &local_uri, code).await?;
            tracing::debug!(uri = %local_uri, source = %source_url, size = code.len(), "Stored worker code");
        }
        Ok(WorkerEndpoint {
            source_url: source_url.to_string(),
            local_uri,
            size: code.len(),
        })
    }

    /// Worker code behind `local_uri`, verified against its digest.
    pub async fn load(&self, local_uri: &str) -> Result<Bytes, StoreError> {
        let digest = local_uri
            .strip_prefix(LOCAL_URI_PREFIX)
            .ok_or_else(|| StoreError::InvalidUri(local_uri.to_string()))?;

        let data = match cacache::read(&self.cache_dir, local_uri).await {
            Ok(data) => data,
            Err(cacache::Error::EntryNotFound(_, _)) => {
                return Err(StoreError::NotFound(local_uri.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if Self::generate_key(&data) != digest {
            return Err(StoreError::Corrupt(local_uri.to_string()));
        }
        Ok(Bytes::from(data))
    }

    pub async fn contains(&self, local_uri: &str) -> bool {
        matches!(cacache::metadata(&self.cache_dir, local_uri).await, Ok(Some(_)))
    }
}
