//! Device-local staging of one guest capture
//!
//! A capture is written as three keys: both images first, then
//! `capture.meta` as the commit marker. A reader that finds the marker can
//! rely on both images being present with the recorded lengths; anything
//! else is corruption and is cleared.

pub mod kv;

use crate::models::GuestCapture;
use chrono::{DateTime, Utc};
use kv::{KeyValueStore, KvError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use kv::{FsKeyValueStore, MemoryKeyValueStore};

/// Namespace owned by the staging store; everything else may be evicted
pub const CAPTURE_PREFIX: &str = "capture.";
pub const KEY_FRONT: &str = "capture.front";
pub const KEY_SIDE: &str = "capture.side";
pub const KEY_META: &str = "capture.meta";

const META_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Staging capacity exceeded after eviction: {0}")]
    CapacityExceeded(String),

    #[error("Staging storage error: {0}")]
    Storage(#[from] KvError),

    #[error("Staging serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Staging task failed: {0}")]
    Task(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct StagedMeta {
    version: u32,
    answers: Map<String, Value>,
    created_at: DateTime<Utc>,
    front_len: usize,
    side_len: usize,
}

#[derive(Clone)]
pub struct StagingStore {
    backend: Arc<dyn KeyValueStore>,
}

impl StagingStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Stage `capture`, replacing any previous one.
    ///
    /// Returns `Ok(false)` without touching storage when either image is
    /// missing.
    pub fn save(&self, capture: &GuestCapture) -> Result<bool, StagingError> {
        if !capture.is_complete() {
            debug!("Refusing to stage incomplete capture");
            return Ok(false);
        }

        let meta = serde_json::to_string(&StagedMeta {
            version: META_VERSION,
            answers: capture.answers.clone(),
            created_at: capture.created_at,
            front_len: capture.front_image.len(),
            side_len: capture.side_image.len(),
        })?;

        match self.write_all(capture, &meta) {
            Ok(()) => {}
            Err(KvError::QuotaExceeded { .. }) => {
                let evicted = self.evict_unrelated()?;
                info!(evicted, "Staging quota exceeded, evicted unrelated keys");
                match self.write_all(capture, &meta) {
                    Ok(()) => {}
                    Err(KvError::QuotaExceeded { needed, available }) => {
                        self.discard_partial();
                        return Err(StagingError::CapacityExceeded(format!(
                            "need {} bytes, {} available",
                            needed, available
                        )));
                    }
                    Err(e) => {
                        self.discard_partial();
                        return Err(e.into());
                    }
                }
            }
            Err(e) => {
                self.discard_partial();
                return Err(e.into());
            }
        }

        debug!(
            front_len = capture.front_image.len(),
            side_len = capture.side_image.len(),
            "Capture staged"
        );
        Ok(true)
    }

    fn write_all(&self, capture: &GuestCapture, meta: &str) -> Result<(), KvError> {
        // Drop the marker first so a crash mid-write never pairs old meta
        // with new images.
        self.backend.remove(KEY_META)?;
        self.backend.set(KEY_FRONT, &capture.front_image)?;
        self.backend.set(KEY_SIDE, &capture.side_image)?;
        self.backend.set(KEY_META, meta)
    }

    fn discard_partial(&self) {
        if let Err(e) = self.clear() {
            warn!("Failed to discard partially staged capture: {}", e);
        }
    }

    /// The staged capture, if one is intact.
    ///
    /// Corrupted or partial state is cleared and reported as `None`.
    /// Backend read errors also yield `None` but leave storage alone.
    pub fn load(&self) -> Option<GuestCapture> {
        let meta_text = match self.backend.get(KEY_META) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read staged capture metadata: {}", e);
                return None;
            }
        };

        let (front, side) = match (self.backend.get(KEY_FRONT), self.backend.get(KEY_SIDE)) {
            (Ok(front), Ok(side)) => (front, side),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to read staged images: {}", e);
                return None;
            }
        };

        match Self::assemble(&meta_text, front, side) {
            Ok(capture) => Some(capture),
            Err(reason) => {
                warn!(reason = %reason, "Staged capture corrupted, clearing");
                self.discard_partial();
                None
            }
        }
    }

    fn assemble(
        meta_text: &str,
        front: Option<String>,
        side: Option<String>,
    ) -> Result<GuestCapture, String> {
        let meta: StagedMeta =
            serde_json::from_str(meta_text).map_err(|e| format!("invalid metadata: {}", e))?;
        if meta.version != META_VERSION {
            return Err(format!("unsupported metadata version {}", meta.version));
        }
        let front = front.ok_or("front image missing")?;
        let side = side.ok_or("side image missing")?;
        if front.len() != meta.front_len || side.len() != meta.side_len {
            return Err("image length mismatch".to_string());
        }

        let capture = GuestCapture {
            answers: meta.answers,
            front_image: front,
            side_image: side,
            created_at: meta.created_at,
        };
        if !capture.is_complete() {
            return Err("empty image".to_string());
        }
        Ok(capture)
    }

    /// Remove every capture key
    pub fn clear(&self) -> Result<(), StagingError> {
        self.backend.remove(KEY_META)?;
        self.backend.remove(KEY_FRONT)?;
        self.backend.remove(KEY_SIDE)?;
        Ok(())
    }

    /// True when the commit marker is present. Does not read image payloads.
    pub fn has_complete(&self) -> bool {
        match self.backend.contains(KEY_META) {
            Ok(present) => present,
            Err(e) => {
                warn!("Failed to check staging metadata: {}", e);
                false
            }
        }
    }

    /// Drop every key outside the capture namespace. Returns the count removed.
    pub fn evict_unrelated(&self) -> Result<usize, StagingError> {
        let mut evicted = 0;
        for key in self.backend.keys()? {
            if !key.starts_with(CAPTURE_PREFIX) {
                self.backend.remove(&key)?;
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}
