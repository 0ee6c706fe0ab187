//! Weighted prize selection for randomized bonuses.
//!
//! A [`PrizeTable`] is a finite list of `{value, weight}` entries. A draw picks
//! a point in `0..total_weight` and walks the cumulative weights, so uniform
//! tables are just tables where every weight is 1.

use rand::Rng;

use crate::config::WheelPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prize {
    pub value_cents: i64,
    pub weight: u32,
}

#[derive(Debug, Clone)]
pub struct PrizeTable {
    prizes: Vec<Prize>,
    total_weight: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PrizeTableError {
    #[error("prize table is empty")]
    Empty,
    #[error("prize values must be positive")]
    NonPositiveValue,
    #[error("prize table has no positive weight")]
    ZeroWeight,
}

impl PrizeTable {
    /// Build a table from `(value_cents, weight)` pairs.
    pub fn weighted(pairs: &[(i64, u32)]) -> Result<Self, PrizeTableError> {
        if pairs.is_empty() {
            return Err(PrizeTableError::Empty);
        }
        if pairs.iter().any(|&(value, _)| value <= 0) {
            return Err(PrizeTableError::NonPositiveValue);
        }

        let total_weight: u64 = pairs.iter().map(|&(_, w)| u64::from(w)).sum();
        if total_weight == 0 {
            return Err(PrizeTableError::ZeroWeight);
        }

        Ok(Self {
            prizes: pairs
                .iter()
                .map(|&(value_cents, weight)| Prize {
                    value_cents,
                    weight,
                })
                .collect(),
            total_weight,
        })
    }

    /// Every value equally likely.
    pub fn uniform(values: &[i64]) -> Result<Self, PrizeTableError> {
        let pairs: Vec<(i64, u32)> = values.iter().map(|&v| (v, 1)).collect();
        Self::weighted(&pairs)
    }

    /// The wheel of fortune segments: 50, 100, 150, 200, 250, 500 and 1000 units.
    pub fn wheel_uniform() -> Result<Self, PrizeTableError> {
        Self::uniform(&[5_000, 10_000, 15_000, 20_000, 25_000, 50_000, 100_000])
    }

    /// The wheel with percentage odds 40/30/15/10/5 for 50/100/200/500/1000 units.
    pub fn wheel_weighted() -> Result<Self, PrizeTableError> {
        Self::weighted(&[
            (5_000, 40),
            (10_000, 30),
            (20_000, 15),
            (50_000, 10),
            (100_000, 5),
        ])
    }

    pub fn for_policy(policy: WheelPolicy) -> Result<Self, PrizeTableError> {
        match policy {
            WheelPolicy::Uniform => Self::wheel_uniform(),
            WheelPolicy::Weighted => Self::wheel_weighted(),
        }
    }

    pub fn prizes(&self) -> &[Prize] {
        &self.prizes
    }

    /// Draw one prize value.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        let mut point = rng.random_range(0..self.total_weight);
        for prize in &self.prizes {
            let weight = u64::from(prize.weight);
            if point < weight {
                return prize.value_cents;
            }
            point -= weight;
        }
        // Unreachable while total_weight is the sum of the weights.
        self.prizes[self.prizes.len() - 1].value_cents
    }
}
