//! Hi/Lo: guess whether the next number is higher or lower than the shown one

use crate::errors::ValidationError;
use crate::games::types::RoundOutcome;
use rand::Rng;
use rand_core::{CryptoRng, OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_NUMBER: u8 = 1;
pub const MAX_NUMBER: u8 = 10;

/// Even-money game: a win pays twice the stake
pub const WIN_MULTIPLIER: f64 = 2.0;

/// Uniform number in `MIN_NUMBER..=MAX_NUMBER` from the OS CSPRNG
pub fn draw_number() -> u8 {
    draw_number_with(&mut OsRng)
}

pub fn draw_number_with<R: RngCore + CryptoRng>(rng: &mut R) -> u8 {
    rng.gen_range(MIN_NUMBER..=MAX_NUMBER)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HiLoChoice {
    Higher,
    Lower,
}

impl FromStr for HiLoChoice {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "higher" => Ok(HiLoChoice::Higher),
            "lower" => Ok(HiLoChoice::Lower),
            other => Err(ValidationError::InvalidChoice(other.to_string())),
        }
    }
}

impl fmt::Display for HiLoChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HiLoChoice::Higher => write!(f, "higher"),
            HiLoChoice::Lower => write!(f, "lower"),
        }
    }
}

/// Outcome of `choice` when `next` follows `current`. Equal numbers push.
pub fn resolve(current: u8, next: u8, choice: HiLoChoice) -> RoundOutcome {
    if next == current {
        return RoundOutcome::Push;
    }
    let won = match choice {
        HiLoChoice::Higher => next > current,
        HiLoChoice::Lower => next < current,
    };
    if won {
        RoundOutcome::Win
    } else {
        RoundOutcome::Loss
    }
}

/// Amount returned to the player for `outcome`
pub fn payout(stake: f64, outcome: RoundOutcome) -> f64 {
    match outcome {
        RoundOutcome::Win => stake * WIN_MULTIPLIER,
        RoundOutcome::Push => stake,
        RoundOutcome::Loss => 0.0,
    }
}
