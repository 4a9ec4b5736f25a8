//! Guest capture
//!
//! Questionnaire answers plus the front/side photo pair, staged on the
//! device until the owner is signed in and entitled.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Age sent to the analysis service when the questionnaire has none
pub const UNKNOWN_AGE: u32 = 0;

/// Sex sent to the analysis service when the questionnaire has none
pub const UNKNOWN_SEX: &str = "unspecified";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestCapture {
    #[serde(default)]
    pub answers: Map<String, Value>,
    /// Base64 image text, optionally with a `data:<mime>;base64,` prefix
    pub front_image: String,
    pub side_image: String,
    pub created_at: DateTime<Utc>,
}

impl GuestCapture {
    pub fn new(answers: Map<String, Value>, front_image: String, side_image: String) -> Self {
        Self {
            answers,
            front_image,
            side_image,
            created_at: Utc::now(),
        }
    }

    /// Both images present. An incomplete capture is never staged.
    pub fn is_complete(&self) -> bool {
        !self.front_image.trim().is_empty() && !self.side_image.trim().is_empty()
    }

    /// Minimal demographic context for the analysis call
    pub fn demographics(&self) -> Demographics {
        let age = self
            .answers
            .get("age")
            .and_then(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse::<u64>().ok(),
                _ => None,
            })
            .and_then(|age| u32::try_from(age).ok())
            .unwrap_or(UNKNOWN_AGE);

        let sex = ["sex", "gender"]
            .iter()
            .find_map(|key| self.answers.get(*key).and_then(Value::as_str))
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_SEX.to_string());

        Demographics { age, sex }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub age: u32,
    pub sex: String,
}

/// Decode base64 image text, accepting a data URL prefix
pub fn decode_image(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = text.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => trimmed,
    };
    STANDARD.decode(payload)
}
