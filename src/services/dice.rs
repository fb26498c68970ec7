//! Dice rolls and speaking-order computation.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;

use crate::state::game::{DicePair, Player};

/// Roll two independent dice, each uniform in `1..=6`.
pub fn roll_dice<R: Rng + ?Sized>(rng: &mut R) -> DicePair {
    DicePair {
        d1: rng.random_range(1..=6),
        d2: rng.random_range(1..=6),
    }
}

/// Supplies dice rolls to the game engine.
pub trait DiceSource: Send + Sync {
    /// Draw the next pair.
    fn roll(&self) -> DicePair;
}

/// Uniform dice backed by a seedable generator.
pub struct RandomDice {
    rng: Mutex<StdRng>,
}

impl RandomDice {
    /// Seeded generator when `seed` is set, entropy otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl DiceSource for RandomDice {
    fn roll(&self) -> DicePair {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        roll_dice(&mut *rng)
    }
}

/// Replays a fixed list of rolls, then falls back to a constant pair.
pub struct ScriptedDice {
    rolls: Mutex<VecDeque<DicePair>>,
    fallback: DicePair,
}

impl ScriptedDice {
    /// Replay `rolls` in order; `(1, 1)` once they run out.
    pub fn new(rolls: impl IntoIterator<Item = (u8, u8)>) -> Self {
        Self {
            rolls: Mutex::new(
                rolls
                    .into_iter()
                    .map(|(d1, d2)| DicePair { d1, d2 })
                    .collect(),
            ),
            fallback: DicePair { d1: 1, d2: 1 },
        }
    }
}

impl DiceSource for ScriptedDice {
    fn roll(&self) -> DicePair {
        self.rolls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// Speaking position assigned to one alive player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSlot {
    /// Speaker.
    pub username: String,
    /// 1-based.
    pub order: u32,
}

/// Why a speaking order could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnOrderError {
    /// A later round found a player that never received an order.
    #[error("player `{username}` has no previous speaking order")]
    MissingOrder {
        /// Player without an order.
        username: String,
    },
}

/// Compute the speaking order of the alive players for `round`.
///
/// Round 1 sorts by descending dice total, ties keeping the input order. Later rounds
/// rotate the previous order: whoever spoke first goes last, and when that player was
/// eliminated the others simply move up. Eliminated players are left out.
pub fn compute_turn_order(
    players: &[Player],
    round: u32,
) -> Result<Vec<TurnSlot>, TurnOrderError> {
    let mut alive: Vec<&Player> = players.iter().filter(|player| player.is_alive).collect();

    if round <= 1 {
        // stable sort
        alive.sort_by(|a, b| b.total().cmp(&a.total()));
    } else {
        let mut previous = Vec::with_capacity(alive.len());
        for player in alive {
            let order = player.order.ok_or_else(|| TurnOrderError::MissingOrder {
                username: player.username.clone(),
            })?;
            previous.push((order, player));
        }
        previous.sort_by_key(|(order, _)| *order);
        // an eliminated first speaker already left the head of the line
        let first_still_alive = previous.first().is_some_and(|(order, _)| *order == 1);
        alive = previous.into_iter().map(|(_, player)| player).collect();
        if first_still_alive {
            alive.rotate_left(1);
        }
    }

    Ok(alive
        .into_iter()
        .zip(1u32..)
        .map(|(player, order)| TurnSlot {
            username: player.username.clone(),
            order,
        })
        .collect())
}

/// Alive players sorted by their assigned order.
pub fn speaking_order(players: &[Player]) -> Vec<&Player> {
    let mut ordered: Vec<&Player> = players
        .iter()
        .filter(|player| player.is_alive && player.order.is_some())
        .collect();
    ordered.sort_by_key(|player| player.order);
    ordered
}
