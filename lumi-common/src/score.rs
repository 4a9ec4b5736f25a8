//! Score normalization
//!
//! Maps the heterogeneous score payload returned by the analysis service into
//! the canonical [`ScoreVector`]. This module is the single gate for scores:
//! `overall` and the boosted `potential` are always recomputed here and are
//! never taken from a raw payload or a stored row.
//!
//! # Rounding
//! Fractional inputs and the mean are rounded half-up (65.5 → 66), in
//! integer arithmetic so the result does not depend on float formatting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Fixed boost added to the raw potential before it folds into `overall`.
///
/// Any client that re-derives scores must use this constant.
pub const POTENTIAL_BOOST: u8 = 8;

/// Upper bound of every score
pub const SCORE_MAX: u8 = 100;

/// Base facial-quality measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Skin,
    Jaw,
    Cheekbones,
    Symmetry,
    EyeArea,
    Potential,
}

impl Aspect {
    pub const ALL: [Aspect; 6] = [
        Aspect::Skin,
        Aspect::Jaw,
        Aspect::Cheekbones,
        Aspect::Symmetry,
        Aspect::EyeArea,
        Aspect::Potential,
    ];

    /// Canonical key used in raw maps produced by [`ScoreVector::to_raw`]
    pub fn canonical_key(self) -> &'static str {
        self.aliases()[0]
    }

    /// Historical key spellings, canonical first. First key present wins.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Aspect::Skin => &["skin", "skin_quality", "skinQuality", "skin_score"],
            Aspect::Jaw => &["jaw", "jawline", "jaw_line", "jawLine"],
            Aspect::Cheekbones => &["cheekbones", "cheekbone", "cheek", "cheeks"],
            Aspect::Symmetry => &["symmetry", "sym", "facial_symmetry", "facialSymmetry"],
            Aspect::EyeArea => &["eye_area", "eyeArea", "eye", "eyes"],
            Aspect::Potential => &["potential", "potential_score", "potentialScore"],
        }
    }
}

impl std::fmt::Display for Aspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_key())
    }
}

/// Raw score payload could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("Missing score aspect: {0}")]
    MissingAspect(Aspect),

    #[error("Invalid value for score aspect {aspect}: {value}")]
    InvalidValue { aspect: Aspect, value: String },
}

/// Canonical, immutable score vector
///
/// Constructed only through [`ScoreVector::from_aspects`] (directly or via
/// [`normalize`] or deserialization), all of which recompute the derived
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "StoredScoreVector", into = "StoredScoreVector")]
pub struct ScoreVector {
    skin: u8,
    jaw: u8,
    cheekbones: u8,
    symmetry: u8,
    eye_area: u8,
    potential_raw: u8,
    potential: u8,
    overall: u8,
}

impl ScoreVector {
    /// Build a vector from already-resolved base aspects.
    ///
    /// Values are clamped into `[0,100]`, the boost is applied to
    /// `potential_raw` and `overall` is recomputed.
    pub fn from_aspects(
        skin: u8,
        jaw: u8,
        cheekbones: u8,
        symmetry: u8,
        eye_area: u8,
        potential_raw: u8,
    ) -> Self {
        let skin = skin.min(SCORE_MAX);
        let jaw = jaw.min(SCORE_MAX);
        let cheekbones = cheekbones.min(SCORE_MAX);
        let symmetry = symmetry.min(SCORE_MAX);
        let eye_area = eye_area.min(SCORE_MAX);
        let potential_raw = potential_raw.min(SCORE_MAX);
        let potential = boosted_potential(potential_raw);
        let overall = mean_half_up(&[skin, jaw, cheekbones, symmetry, eye_area, potential]);

        Self {
            skin,
            jaw,
            cheekbones,
            symmetry,
            eye_area,
            potential_raw,
            potential,
            overall,
        }
    }

    pub fn skin(&self) -> u8 {
        self.skin
    }

    pub fn jaw(&self) -> u8 {
        self.jaw
    }

    pub fn cheekbones(&self) -> u8 {
        self.cheekbones
    }

    pub fn symmetry(&self) -> u8 {
        self.symmetry
    }

    pub fn eye_area(&self) -> u8 {
        self.eye_area
    }

    /// Potential after the boost
    pub fn potential(&self) -> u8 {
        self.potential
    }

    /// Potential as reported by the analysis service, before the boost
    pub fn potential_raw(&self) -> u8 {
        self.potential_raw
    }

    /// Rounded mean of the six base aspects (boosted potential)
    pub fn overall(&self) -> u8 {
        self.overall
    }

    pub fn aspect(&self, aspect: Aspect) -> u8 {
        match aspect {
            Aspect::Skin => self.skin,
            Aspect::Jaw => self.jaw,
            Aspect::Cheekbones => self.cheekbones,
            Aspect::Symmetry => self.symmetry,
            Aspect::EyeArea => self.eye_area,
            Aspect::Potential => self.potential,
        }
    }

    /// Raw-payload equivalent of this vector, using canonical keys and the
    /// pre-boost potential. `normalize(&v.to_raw()) == Ok(v)`.
    pub fn to_raw(&self) -> Map<String, Value> {
        let mut raw = Map::new();
        for aspect in Aspect::ALL {
            let value = match aspect {
                Aspect::Potential => self.potential_raw,
                other => self.aspect(other),
            };
            raw.insert(aspect.canonical_key().to_string(), Value::from(value));
        }
        raw
    }
}

/// Serialized shape of a [`ScoreVector`]. Derived fields are written for
/// readers but ignored when reading back.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredScoreVector {
    skin: u8,
    jaw: u8,
    cheekbones: u8,
    symmetry: u8,
    eye_area: u8,
    potential_raw: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    potential: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    overall: Option<u8>,
}

impl From<StoredScoreVector> for ScoreVector {
    fn from(stored: StoredScoreVector) -> Self {
        ScoreVector::from_aspects(
            stored.skin,
            stored.jaw,
            stored.cheekbones,
            stored.symmetry,
            stored.eye_area,
            stored.potential_raw,
        )
    }
}

impl From<ScoreVector> for StoredScoreVector {
    fn from(vector: ScoreVector) -> Self {
        Self {
            skin: vector.skin,
            jaw: vector.jaw,
            cheekbones: vector.cheekbones,
            symmetry: vector.symmetry,
            eye_area: vector.eye_area,
            potential_raw: vector.potential_raw,
            potential: Some(vector.potential),
            overall: Some(vector.overall),
        }
    }
}

/// Normalize a raw score payload into a [`ScoreVector`].
///
/// Any `overall` key in `raw` is ignored.
pub fn normalize(raw: &Map<String, Value>) -> Result<ScoreVector, NormalizationError> {
    let mut resolved = [0u8; 6];
    for (slot, aspect) in resolved.iter_mut().zip(Aspect::ALL) {
        *slot = resolve_aspect(raw, aspect)?;
    }

    Ok(ScoreVector::from_aspects(
        resolved[0],
        resolved[1],
        resolved[2],
        resolved[3],
        resolved[4],
        resolved[5],
    ))
}

/// `min(100, potential_raw + POTENTIAL_BOOST)`
pub fn boosted_potential(potential_raw: u8) -> u8 {
    let boosted = u16::from(potential_raw.min(SCORE_MAX)) + u16::from(POTENTIAL_BOOST);
    boosted.min(u16::from(SCORE_MAX)) as u8
}

/// Mean of `values` rounded half-up, computed as `floor((2*sum + n) / 2n)`
pub fn mean_half_up(values: &[u8]) -> u8 {
    if values.is_empty() {
        return 0;
    }
    let n = values.len() as u32;
    let sum: u32 = values.iter().map(|v| u32::from(*v)).sum();
    ((2 * sum + n) / (2 * n)) as u8
}

fn resolve_aspect(raw: &Map<String, Value>, aspect: Aspect) -> Result<u8, NormalizationError> {
    let value = aspect
        .aliases()
        .iter()
        .find_map(|key| raw.get(*key).filter(|v| !v.is_null()))
        .ok_or(NormalizationError::MissingAspect(aspect))?;

    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or_else(|| NormalizationError::InvalidValue {
        aspect,
        value: value.to_string(),
    })?;

    Ok(clamp_score(number))
}

fn clamp_score(value: f64) -> u8 {
    (value + 0.5).floor().clamp(0.0, f64::from(SCORE_MAX)) as u8
}
