//! Access fact gathering
//!
//! Collects the three facts from their owners (session, profile record,
//! entitlement source). Each lookup fails independently to `false`.

use crate::db::profiles;
use crate::services::{EntitlementGate, SessionStore};
use lumi_common::access::AccessFacts;
use sqlx::SqlitePool;
use tracing::warn;

#[derive(Clone)]
pub struct AccessFactsProvider {
    db: SqlitePool,
    sessions: SessionStore,
    gate: EntitlementGate,
}

impl AccessFactsProvider {
    pub fn new(db: SqlitePool, sessions: SessionStore, gate: EntitlementGate) -> Self {
        Self { db, sessions, gate }
    }

    pub async fn gather(&self) -> AccessFacts {
        let Some(owner_id) = self.sessions.current_owner().await else {
            return AccessFacts::from_lookups(Some(false), None, None);
        };

        let onboarding_completed = match profiles::onboarding_completed(&self.db, &owner_id).await {
            Ok(completed) => completed,
            Err(e) => {
                warn!(owner_id = %owner_id, "Profile lookup failed: {}", e);
                None
            }
        };
        let is_entitled = self.gate.lookup(&owner_id).await;

        AccessFacts::from_lookups(Some(true), onboarding_completed, is_entitled)
    }
}
