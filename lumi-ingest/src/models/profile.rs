//! Profile record
//!
//! Owns the `onboarding_completed` fact and the questionnaire answers.
//! Upserted independently of scan ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub owner_id: String,
    pub onboarding_completed: bool,
    #[serde(default)]
    pub answers: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(owner_id: impl Into<String>, onboarding_completed: bool, answers: Map<String, Value>) -> Self {
        Self {
            owner_id: owner_id.into(),
            onboarding_completed,
            answers,
            updated_at: Utc::now(),
        }
    }
}
