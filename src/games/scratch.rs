//! Scratch card presentation of a drawn tier

use crate::games::types::Symbol;
use crate::math::PrizeTier;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_core::{CryptoRng, OsRng, RngCore};

/// Symbols shown for `tier`: a full match for a winning tier, never a full
/// match for a losing one.
pub fn render_symbols(tier: &PrizeTier) -> [Symbol; 3] {
    render_symbols_with(tier, &mut OsRng)
}

pub fn render_symbols_with<R: RngCore + CryptoRng>(tier: &PrizeTier, rng: &mut R) -> [Symbol; 3] {
    if tier.is_losing() {
        losing_symbols(rng)
    } else {
        let symbol = pick(rng);
        [symbol, symbol, symbol]
    }
}

pub fn is_full_match(symbols: &[Symbol; 3]) -> bool {
    symbols[0] == symbols[1] && symbols[1] == symbols[2]
}

fn losing_symbols<R: RngCore + CryptoRng>(rng: &mut R) -> [Symbol; 3] {
    let mut symbols = [pick(rng), pick(rng), pick(rng)];
    if is_full_match(&symbols) {
        // Swap the last symbol for any other one
        let others: Vec<Symbol> = Symbol::ALL.into_iter().filter(|s| *s != symbols[0]).collect();
        symbols[2] = others[rng.gen_range(0..others.len())];
    }
    symbols
}

fn pick<R: RngCore + CryptoRng>(rng: &mut R) -> Symbol {
    *Symbol::ALL.choose(rng).unwrap_or(&Symbol::Cherry)
}
