use crate::math::{MathModel, PrizeTier};
use rand::Rng;
use rand_core::{CryptoRng, OsRng, RngCore};

/// Weighted prize tier selection.
///
/// Outcomes carry direct financial value, so draws only accept
/// cryptographically secure generators.
pub struct OutcomeEngine;

impl OutcomeEngine {
    /// Draw a tier from `model` using the operating system CSPRNG.
    ///
    /// `None` means the model has no usable weight. That is a configuration
    /// problem, never a losing draw.
    pub fn draw(model: &MathModel) -> Option<PrizeTier> {
        Self::draw_with(model, &mut OsRng)
    }

    pub fn draw_with<R: RngCore + CryptoRng>(model: &MathModel, rng: &mut R) -> Option<PrizeTier> {
        let total = model.total_weight()?;
        if total == 0 {
            return None;
        }

        let roll = rng.gen_range(0..total);
        Self::tier_at(model, roll).cloned()
    }

    /// Tier whose cumulative weight range contains `roll`
    fn tier_at(model: &MathModel, roll: u64) -> Option<&PrizeTier> {
        let mut cumulative = 0u64;
        for tier in model.prize_table.iter().filter(|t| t.weight > 0) {
            cumulative += tier.weight as u64;
            if roll < cumulative {
                return Some(tier);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixtures;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn tally(model: &MathModel, rounds: usize) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for _ in 0..rounds {
            let tier = OutcomeEngine::draw(model).expect("usable model");
            *counts.entry(tier.tier).or_insert(0) += 1;
        }
        counts
    }

    fn share(counts: &HashMap<String, usize>, tier: &str, rounds: usize) -> f64 {
        counts.get(tier).copied().unwrap_or(0) as f64 / rounds as f64
    }

    #[test]
    fn test_empty_or_zero_weight_models_fail_closed() {
        assert!(OutcomeEngine::draw(&MathModel::new("empty", vec![])).is_none());
        assert!(OutcomeEngine::draw(&MathModel::new("zero", vec![PrizeTier::new("LOSE", 0.0, 0)])).is_none());
        assert!(OutcomeEngine::draw(&MathModel::new(
            "negative",
            vec![PrizeTier::new("A", 2.0, -1), PrizeTier::new("B", 2.0, 0)]
        ))
        .is_none());
    }

    #[test]
    fn test_single_tier_always_drawn() {
        let model = MathModel::new("single", vec![PrizeTier::new("T1", 2.0, 100)]);
        for _ in 0..20 {
            let tier = OutcomeEngine::draw(&model).unwrap();
            assert_eq!(tier.tier, "T1");
            assert_eq!(tier.multiplier, 2.0);
        }
    }

    #[test]
    fn test_zero_weight_tiers_never_selected() {
        let model = MathModel::new(
            "skip",
            vec![PrizeTier::new("A", 1.0, 0), PrizeTier::new("B", 2.0, 100), PrizeTier::new("C", 3.0, -4)],
        );
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert_eq!(OutcomeEngine::draw_with(&model, &mut rng).unwrap().tier, "B");
        }
    }

    #[test]
    fn test_cumulative_ranges_follow_table_order() {
        let model = fixtures::seventy_twenty_ten("ranges");
        assert_eq!(OutcomeEngine::tier_at(&model, 0).unwrap().tier, "LOSE");
        assert_eq!(OutcomeEngine::tier_at(&model, 69).unwrap().tier, "LOSE");
        assert_eq!(OutcomeEngine::tier_at(&model, 70).unwrap().tier, "T1");
        assert_eq!(OutcomeEngine::tier_at(&model, 89).unwrap().tier, "T1");
        assert_eq!(OutcomeEngine::tier_at(&model, 90).unwrap().tier, "T2");
        assert_eq!(OutcomeEngine::tier_at(&model, 99).unwrap().tier, "T2");
        assert!(OutcomeEngine::tier_at(&model, 100).is_none());
    }

    #[test]
    fn test_distribution_seventy_twenty_ten() {
        const ROUNDS: usize = 100_000;
        let counts = tally(&fixtures::seventy_twenty_ten("dist"), ROUNDS);

        let lose = share(&counts, "LOSE", ROUNDS);
        let t1 = share(&counts, "T1", ROUNDS);
        let t2 = share(&counts, "T2", ROUNDS);
        assert!((0.68..=0.72).contains(&lose), "LOSE share {lose:.4}");
        assert!((0.18..=0.22).contains(&t1), "T1 share {t1:.4}");
        assert!((0.08..=0.12).contains(&t2), "T2 share {t2:.4}");
    }

    #[test]
    fn test_distribution_scratch_match3() {
        const ROUNDS: usize = 200_000;
        let model = fixtures::scratch_match3();
        let total = model.total_weight().unwrap() as f64;
        let counts = tally(&model, ROUNDS);

        for tier in &model.prize_table {
            let expected = tier.weight as f64 / total;
            let observed = share(&counts, &tier.tier, ROUNDS);
            assert!(
                (observed - expected).abs() <= 0.015,
                "tier {}: observed {observed:.4}, expected {expected:.4}",
                tier.tier
            );
        }
    }
}
