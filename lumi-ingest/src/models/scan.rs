//! Scan record
//!
//! Permanent result of one successful ingestion. Created exactly once, by the
//! persist step of the pipeline, and never edited afterwards.

use chrono::{DateTime, Utc};
use lumi_common::score::ScoreVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Classification reported by the analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Male,
    Female,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Male => "male",
            Classification::Female => "female",
        }
    }

    /// Parse the service's classification field (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Classification::Male),
            "female" => Some(Classification::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub owner_id: String,
    /// Object storage path of the front image
    pub front_image_ref: String,
    /// Object storage path of the side image
    pub side_image_ref: String,
    pub classification: Classification,
    pub score_vector: ScoreVector,
    pub analysis_notes: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}
