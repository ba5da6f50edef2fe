//! Game math models: versioned weighted prize tables
//!
//! A model is authored outside this crate (bundle import or explicit
//! registration) and is read-only to the outcome engine.

pub mod registry;

pub use registry::MathModelRegistry;

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Label conventionally used for the losing bucket
pub const LOSE_TIER: &str = "LOSE";

/// Stored game math payload (schema_version 1)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MathModel {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub model_version: String,
    #[serde(default)]
    pub mechanic: Mechanic,
    #[serde(default)]
    pub math_mode: String,
    #[serde(default)]
    pub win_logic: String,
    #[serde(default)]
    pub prize_table: Vec<PrizeTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<GameStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
}

/// How the game presents a tier, e.g. `match_3` or `continuous_multiplier`
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Mechanic {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub match_count: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// One payout bucket
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrizeTier {
    pub tier: String,
    pub multiplier: f64,
    /// Relative draw mass; weight <= 0 is never drawn
    #[serde(deserialize_with = "deserialize_weight")]
    pub weight: i64,
}

/// Bundles may carry weights as JSON floats; the fraction is dropped
fn deserialize_weight<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Number::deserialize(deserializer)?;
    if let Some(weight) = value.as_i64() {
        return Ok(weight);
    }
    match value.as_f64() {
        Some(weight) if weight.is_finite() => Ok(weight.trunc() as i64),
        _ => Err(serde::de::Error::custom(format!("invalid weight {}", value))),
    }
}

impl PrizeTier {
    pub fn new(tier: impl Into<String>, multiplier: f64, weight: i64) -> Self {
        Self {
            tier: tier.into(),
            multiplier,
            weight,
        }
    }

    pub fn is_losing(&self) -> bool {
        self.tier == LOSE_TIER || self.multiplier == 0.0
    }
}

/// Statistics supplied by the model author. Informational only.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameStats {
    pub computed_rtp: f64,
    pub hit_rate: f64,
    pub variance: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Integrity {
    pub content_hash: String,
}

impl MathModel {
    pub fn new(model_id: impl Into<String>, prize_table: Vec<PrizeTier>) -> Self {
        Self {
            schema_version: 1,
            model_id: model_id.into(),
            prize_table,
            ..Default::default()
        }
    }

    /// Sum of positive weights, `None` on overflow
    pub fn total_weight(&self) -> Option<u64> {
        self.prize_table
            .iter()
            .filter(|t| t.weight > 0)
            .try_fold(0u64, |acc, t| acc.checked_add(t.weight as u64))
    }

    /// At least one tier can be drawn
    pub fn is_usable(&self) -> bool {
        matches!(self.total_weight(), Some(total) if total > 0)
    }

    /// Raw weighted-average multiplier of the table.
    ///
    /// Audit output only: the author's `stats.computed_rtp` is never
    /// recomputed or enforced from this value.
    pub fn weighted_return(&self) -> Option<f64> {
        let total = self.total_weight().filter(|t| *t > 0)? as f64;
        let expected: f64 = self
            .prize_table
            .iter()
            .filter(|t| t.weight > 0)
            .map(|t| t.multiplier * t.weight as f64)
            .sum();
        Some(expected / total)
    }

    /// SHA-256 over the serialized prize table, hex encoded
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(&self.prize_table).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Structural checks applied before a model is accepted for registration.
    ///
    /// A table whose weights are all non-positive passes: it is stored as-is
    /// and fails closed at draw time. A `LOSE` tier must not pay.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prize_table.is_empty() {
            return Err(ValidationError::InvalidModel("prize_table required".to_string()));
        }
        let mut labels = HashSet::with_capacity(self.prize_table.len());
        for tier in &self.prize_table {
            if tier.tier.trim().is_empty() {
                return Err(ValidationError::InvalidModel("tier label required".to_string()));
            }
            if !labels.insert(tier.tier.as_str()) {
                return Err(ValidationError::InvalidModel(format!(
                    "duplicate tier label '{}'",
                    tier.tier
                )));
            }
            if !(tier.multiplier.is_finite() && tier.multiplier >= 0.0) {
                return Err(ValidationError::InvalidModel(format!(
                    "tier '{}' has invalid multiplier {}",
                    tier.tier, tier.multiplier
                )));
            }
            if tier.tier == LOSE_TIER && tier.multiplier != 0.0 {
                return Err(ValidationError::InvalidModel(format!(
                    "{} tier must have multiplier 0, got {}",
                    LOSE_TIER, tier.multiplier
                )));
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_losing_tier_convention() {
        assert!(PrizeTier::new("LOSE", 3.0, 1).is_losing());
        assert!(PrizeTier::new("T0", 0.0, 1).is_losing());
        assert!(!PrizeTier::new("T1", 2.0, 1).is_losing());
    }

    #[test]
    fn test_total_weight_ignores_non_positive() {
        let model = MathModel::new(
            "m",
            vec![
                PrizeTier::new("A", 1.0, -5),
                PrizeTier::new("B", 2.0, 0),
                PrizeTier::new("C", 3.0, 7),
            ],
        );
        assert_eq!(model.total_weight(), Some(7));
        assert!(model.is_usable());

        let dead = MathModel::new("dead", vec![PrizeTier::new("LOSE", 0.0, 0)]);
        assert!(!dead.is_usable());
        assert!(!MathModel::new("empty", vec![]).is_usable());
    }

    #[test]
    fn test_total_weight_overflow_is_unusable() {
        let model = MathModel::new(
            "huge",
            vec![PrizeTier::new("A", 1.0, i64::MAX), PrizeTier::new("B", 1.0, i64::MAX), PrizeTier::new("C", 1.0, i64::MAX)],
        );
        assert_eq!(model.total_weight(), None);
        assert!(!model.is_usable());
    }

    #[test]
    fn test_weighted_return_of_scratch_table() {
        let rtp = fixtures::scratch_match3().weighted_return().unwrap();
        // (2*164798 + 5*10646 + 20*142 + 100*2) / 1000002
        assert!((rtp - 385_866.0 / 1_000_002.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_multipliers() {
        let dup = MathModel::new("m", vec![PrizeTier::new("T1", 1.0, 1), PrizeTier::new("T1", 2.0, 1)]);
        assert!(dup.validate().unwrap_err().to_string().contains("duplicate"));

        let negative = MathModel::new("m", vec![PrizeTier::new("T1", -1.0, 1)]);
        assert!(negative.validate().is_err());

        assert!(MathModel::new("m", vec![]).validate().is_err());
        assert!(fixtures::scratch_match3().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_paying_lose_tier() {
        let paying = MathModel::new("m", vec![PrizeTier::new("LOSE", 1.5, 10), PrizeTier::new("T1", 2.0, 1)]);
        let err = paying.validate().unwrap_err();
        assert!(err.to_string().contains("LOSE"));

        // Zero-multiplier tiers under other labels are plain losses
        let blank = MathModel::new("m", vec![PrizeTier::new("BLANK", 0.0, 10), PrizeTier::new("T1", 2.0, 1)]);
        assert!(blank.validate().is_ok());
    }

    #[test]
    fn test_content_hash_tracks_prize_table() {
        let a = fixtures::seventy_twenty_ten("a");
        let mut b = fixtures::seventy_twenty_ten("b");
        assert_eq!(a.content_hash(), b.content_hash());

        b.prize_table[0].weight = 71;
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn test_deserializes_stored_payload() {
        let json = r#"{
            "schema_version": 1,
            "model_id": "lucky",
            "mechanic": { "type": "match_3", "match_count": 3 },
            "prize_table": [
                { "tier": "LOSE", "multiplier": 0, "weight": 9 },
                { "tier": "T1", "multiplier": 2.5, "weight": 1 }
            ],
            "stats": { "computed_rtp": 0.96, "hit_rate": 0.1, "variance": 1.2 }
        }"#;
        let model: MathModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.mechanic.kind, "match_3");
        assert_eq!(model.prize_table[1].multiplier, 2.5);
        assert_eq!(model.stats.unwrap().computed_rtp, 0.96);
    }

    #[test]
    fn test_float_weights_are_truncated() {
        let tier: PrizeTier =
            serde_json::from_str(r#"{ "tier": "T1", "multiplier": 2, "weight": 164798.0 }"#).unwrap();
        assert_eq!(tier.weight, 164_798);
        assert!(serde_json::from_str::<PrizeTier>(r#"{ "tier": "T1", "multiplier": 2, "weight": "x" }"#).is_err());
    }
}
