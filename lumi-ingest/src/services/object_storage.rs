//! Object storage for scan images
//!
//! Objects live under a root directory keyed by a relative path. Readers
//! outside the process get a signed, expiring URL served by the
//! `/objects` route.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read access expired")]
    Expired,

    #[error("Read access signature invalid")]
    InvalidSignature,
}

/// Which photo of the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSide {
    Front,
    Side,
}

impl ImageSide {
    pub fn file_name(self) -> &'static str {
        match self {
            ImageSide::Front => "front.jpg",
            ImageSide::Side => "side.jpg",
        }
    }
}

/// Escape byte of [`owner_segment`]
const SEGMENT_ESCAPE: char = '~';

/// Encode `owner_id` as exactly one path segment.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte
/// (including `~` itself, `/` and `.`) becomes `~XX` in uppercase hex.
/// The mapping is injective, so two owners never share a namespace.
pub fn owner_segment(owner_id: &str) -> String {
    let mut segment = String::with_capacity(owner_id.len());
    for byte in owner_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            segment.push(char::from(byte));
        } else {
            segment.push(SEGMENT_ESCAPE);
            segment.push_str(&format!("{:02X}", byte));
        }
    }
    segment
}

/// `{owner}/{scan_id}/front.jpg` or `.../side.jpg`, owner encoded by
/// [`owner_segment`]
pub fn scan_object_path(owner_id: &str, scan_id: Uuid, side: ImageSide) -> String {
    format!("{}/{}/{}", owner_segment(owner_id), scan_id, side.file_name())
}

/// Short-lived reference to a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadAccess {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Write (or overwrite) the object at `path`
    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Issue a read reference valid for `ttl`
    async fn issue_read_access(&self, path: &str, ttl: Duration)
        -> Result<ReadAccess, StorageError>;
}

/// Reject absolute paths, `..` and characters unsafe in a URL path
fn validate_object_path(path: &str) -> Result<(), StorageError> {
    let invalid = || StorageError::InvalidPath(path.to_string());

    if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
        return Err(invalid());
    }
    if !path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | '@' | SEGMENT_ESCAPE))
    {
        return Err(invalid());
    }
    let all_normal = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !all_normal || path.split('/').any(|segment| segment.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}

fn sign(secret: &[u8], path: &str, expires: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(b"|");
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(expires.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Filesystem-backed storage with SHA-256 signed read URLs
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
    secret: Vec<u8>,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            secret: secret.into(),
        }
    }

    /// Secret for deployments that did not configure one. Read references
    /// do not survive a restart.
    pub fn ephemeral_secret() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_object_path(path)?;
        Ok(self.root.join(path))
    }

    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.full_path(path)?).await?)
    }

    pub async fn read_object(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full_path = self.full_path(path)?;
        match tokio::fs::read(&full_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check a signature produced by [`ObjectStorage::issue_read_access`]
    pub fn verify_read_access(
        &self,
        path: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), StorageError> {
        validate_object_path(path)?;
        let expected = sign(&self.secret, path, expires);
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(StorageError::InvalidSignature);
        }
        if Utc::now().timestamp() >= expires {
            return Err(StorageError::Expired);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let full_path = self.full_path(path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = full_path.with_extension("part");
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &full_path).await?;

        tracing::debug!(path = %path, size = bytes.len(), "Object stored");
        Ok(())
    }

    async fn issue_read_access(
        &self,
        path: &str,
        ttl: Duration,
    ) -> Result<ReadAccess, StorageError> {
        if !self.exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2);
        let expires = Utc::now().timestamp().saturating_add(ttl_secs);
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| StorageError::InvalidPath(format!("expiry out of range for {}", path)))?;

        let signature = sign(&self.secret, path, expires);
        Ok(ReadAccess {
            url: format!(
                "{}/objects/{}?expires={}&sig={}",
                self.public_base_url, path, expires, signature
            ),
            expires_at,
        })
    }
}
