//! Elimination outcome and win-condition evaluation. Pure functions over player snapshots.

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::game::{Player, Role};

/// Why a vote did or did not eliminate someone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum EliminationReason {
    NoVotes,
    Tie,
    Eliminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of the vote count of a round.
pub struct EliminationOutcome {
    pub eliminated: Option<String>,
    /// Human-readable summary broadcast in RESULTS.
    pub message: String,
    pub reason: EliminationReason,
}

/// Decide who is eliminated from the votes of the alive players.
///
/// Nobody leaves when the top count is zero or when the two highest counts tie.
/// The caller is responsible for persisting the elimination.
pub fn calculate_elimination(players: &[Player]) -> EliminationOutcome {
    let mut alive: Vec<&Player> = players.iter().filter(|player| player.is_alive).collect();
    alive.sort_by(|a, b| b.votes_received.cmp(&a.votes_received));

    let top = alive.first().map(|player| player.votes_received).unwrap_or(0);
    if top == 0 {
        return EliminationOutcome {
            eliminated: None,
            message: "Nobody voted, no one is eliminated.".into(),
            reason: EliminationReason::NoVotes,
        };
    }

    if alive
        .get(1)
        .is_some_and(|runner_up| runner_up.votes_received == top)
    {
        return EliminationOutcome {
            eliminated: None,
            message: "The vote is tied, no one is eliminated.".into(),
            reason: EliminationReason::Tie,
        };
    }

    let username = alive[0].username.clone();
    EliminationOutcome {
        message: format!("{username} was eliminated with {top} vote(s)."),
        eliminated: Some(username),
        reason: EliminationReason::Eliminated,
    }
}

/// Side that won the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Winner {
    Civilians,
    Impostors,
}

/// What ended the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum WinCause {
    /// Every impostor was eliminated.
    ImpostorsEliminated,
    /// Civilians no longer outnumber impostors by the configured ratio.
    Parity,
    RoundsExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Who won and why.
pub struct GameOutcome {
    pub winner: Winner,
    pub cause: WinCause,
}

/// Check the win conditions after a round's results.
///
/// Returns `None` when the game goes on to another round.
pub fn check_winner(
    players: &[Player],
    round: u32,
    max_rounds: u32,
    parity_ratio: f64,
) -> Option<GameOutcome> {
    let (impostors, civilians) = players
        .iter()
        .filter(|player| player.is_alive)
        .fold((0usize, 0usize), |(imp, civ), player| match player.role {
            Role::Impostor => (imp + 1, civ),
            Role::Civilian => (imp, civ + 1),
        });

    if impostors == 0 {
        return Some(GameOutcome {
            winner: Winner::Civilians,
            cause: WinCause::ImpostorsEliminated,
        });
    }
    if civilians as f64 <= impostors as f64 * parity_ratio {
        return Some(GameOutcome {
            winner: Winner::Impostors,
            cause: WinCause::Parity,
        });
    }
    if round >= max_rounds {
        return Some(GameOutcome {
            winner: Winner::Impostors,
            cause: WinCause::RoundsExceeded,
        });
    }
    None
}
