//! Selection operators
//! ---
//!
//! Both operators draw `target_size` members from a (possibly enlarged)
//! candidate pool, copying the winners into the next generation.  The
//! selection type is a closed variant validated at configuration time; an
//! invalid setting never reaches the evaluation loop.

use rand::distributions::{Distribution, Uniform};
use rand_xorshift::XorShiftRng;

use crate::controller::Controller;
use crate::error::{EvoError, EvoResult};

/// Sentinel accepted by [`Selection::parse`] for fitness-proportional
/// selection.
pub const ROULETTE_WHEEL: &str = "roulette-wheel";

/// Strategy producing the next generation from the current pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    /// Best-of-`k` over indices drawn uniformly with replacement.
    Tournament(usize),
    /// Fitness-proportional sampling over the cumulative fitness sum.
    /// Requires every fitness to be non-negative and their total positive.
    RouletteWheel,
}

impl Selection {
    /// Tournament selection with group size `k`; `k` must be positive.
    pub fn tournament(k: usize) -> EvoResult<Selection> {
        if k == 0 {
            return Err(EvoError::InvalidConfig(
                "tournament size must be a positive integer".to_string(),
            ));
        }
        Ok(Selection::Tournament(k))
    }

    /// Parses a selection setting: a positive integer tournament size or the
    /// `"roulette-wheel"` sentinel.  Anything else fails immediately.
    pub fn parse(raw: &str) -> EvoResult<Selection> {
        if raw == ROULETTE_WHEEL {
            return Ok(Selection::RouletteWheel);
        }
        match raw.parse::<usize>() {
            Ok(k) if k > 0 => Ok(Selection::Tournament(k)),
            _ => Err(EvoError::InvalidConfig(format!(
                "selection must be a positive tournament size or \"{}\", got \"{}\"",
                ROULETTE_WHEEL, raw
            ))),
        }
    }

    /// Draws the next generation from `pool`.
    pub fn apply(
        &self,
        pool: &[Controller],
        target_size: usize,
        rng: &mut XorShiftRng,
    ) -> EvoResult<Vec<Controller>> {
        match *self {
            Selection::Tournament(k) => Ok(tournament(pool, k, target_size, rng)),
            Selection::RouletteWheel => roulette(pool, target_size, rng),
        }
    }
}

/// First-occurrence argmax over the drawn group.
fn pick_winner(pool: &[Controller], group: &[usize]) -> usize {
    let mut winner = group[0];
    for &candidate in &group[1..] {
        if pool[candidate].fitness > pool[winner].fitness {
            winner = candidate;
        }
    }
    winner
}

fn tournament(
    pool: &[Controller],
    k: usize,
    target_size: usize,
    rng: &mut XorShiftRng,
) -> Vec<Controller> {
    let draw = Uniform::from(0..pool.len());
    let mut group = vec![0usize; k];
    let mut next = Vec::with_capacity(target_size);
    for _ in 0..target_size {
        for slot in group.iter_mut() {
            *slot = draw.sample(rng);
        }
        next.push(pool[pick_winner(pool, &group)].clone());
    }
    next
}

fn roulette(
    pool: &[Controller],
    target_size: usize,
    rng: &mut XorShiftRng,
) -> EvoResult<Vec<Controller>> {
    let mut cumulative = Vec::with_capacity(pool.len());
    let mut total = 0f32;
    for member in pool.iter() {
        if member.fitness < 0.0 {
            return Err(EvoError::DegenerateFitness(member.fitness));
        }
        total += member.fitness;
        cumulative.push(total);
    }
    if total <= 0.0 {
        return Err(EvoError::DegenerateFitness(total));
    }

    let draw = Uniform::new(0f32, total);
    let next = (0..target_size)
        .map(|_| {
            let ticket = draw.sample(rng);
            pool[lower_bound(&cumulative, ticket)].clone()
        })
        .collect();
    Ok(next)
}

/// Index of the first cumulative sum >= `ticket`.
fn lower_bound(cumulative: &[f32], ticket: f32) -> usize {
    let mut lo = 0usize;
    let mut hi = cumulative.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        if cumulative[mid] < ticket {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo.min(cumulative.len() - 1)
}
