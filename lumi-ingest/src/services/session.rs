//! Signed-in owner of this device
//!
//! Sign-in itself happens elsewhere; this only remembers whose session is
//! active so that flushes and profile writes can be attributed.

use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct SessionStore {
    owner_id: Arc<RwLock<Option<String>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sign_in(&self, owner_id: impl Into<String>) {
        let owner_id = owner_id.into();
        tracing::info!(owner_id = %owner_id, "Session started");
        *self.owner_id.write().await = Some(owner_id);
    }

    pub async fn sign_out(&self) {
        if let Some(owner_id) = self.owner_id.write().await.take() {
            tracing::info!(owner_id = %owner_id, "Session ended");
        }
    }

    pub async fn current_owner(&self) -> Option<String> {
        self.owner_id.read().await.clone()
    }
}
