use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::dao::models::PhaseEntity;

/// Phases a game moves through, one round at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    /// Every player rolls two dice. Only played in the first round.
    Dice,
    /// The speaking order is shown before the first speaker starts.
    TurnAssignment,
    /// Per-player speaking turns; each turn restarts this phase.
    Game,
    Discussion,
    Voting,
    /// Elimination outcome is shown, then the win condition is checked.
    Results,
    /// Terminal phase.
    Finish,
}

/// Events driving the phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// All players rolled, naturally or forced.
    DiceCompleted,
    /// The order pause elapsed and the first speaker is up.
    SpeakingStarted,
    /// The current speaker confirmed or ran out of time and another one follows.
    TurnAdvanced,
    /// Every alive player has spoken.
    SpeakingCompleted,
    DiscussionElapsed,
    /// Every alive player voted, naturally or forced.
    VotingCompleted,
    /// No win condition was met.
    NextRound,
    /// A win condition was met.
    GameOver,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the game was in when the invalid event was received.
    pub from: GamePhase,
    /// The event that cannot be applied from this phase.
    pub event: PhaseEvent,
}

impl GamePhase {
    /// Compute the phase reached by applying `event`, if the transition is valid.
    pub fn next(self, event: PhaseEvent) -> Result<GamePhase, InvalidTransition> {
        let next = match (self, event) {
            (GamePhase::Dice, PhaseEvent::DiceCompleted) => GamePhase::TurnAssignment,
            (GamePhase::TurnAssignment, PhaseEvent::SpeakingStarted) => GamePhase::Game,
            (GamePhase::Game, PhaseEvent::TurnAdvanced) => GamePhase::Game,
            (GamePhase::Game, PhaseEvent::SpeakingCompleted) => GamePhase::Discussion,
            // a round where nobody is left to speak goes straight to discussion
            (GamePhase::TurnAssignment, PhaseEvent::SpeakingCompleted) => GamePhase::Discussion,
            (GamePhase::Discussion, PhaseEvent::DiscussionElapsed) => GamePhase::Voting,
            (GamePhase::Voting, PhaseEvent::VotingCompleted) => GamePhase::Results,
            (GamePhase::Results, PhaseEvent::NextRound) => GamePhase::TurnAssignment,
            (from, PhaseEvent::GameOver) if from != GamePhase::Finish => GamePhase::Finish,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }

    /// Whether the phase runs under a deadline.
    pub fn is_timed(self) -> bool {
        !matches!(self, GamePhase::Finish)
    }
}

impl From<PhaseEntity> for GamePhase {
    fn from(value: PhaseEntity) -> Self {
        match value {
            PhaseEntity::Dice => GamePhase::Dice,
            PhaseEntity::TurnAssignment => GamePhase::TurnAssignment,
            PhaseEntity::Game => GamePhase::Game,
            PhaseEntity::Discussion => GamePhase::Discussion,
            PhaseEntity::Voting => GamePhase::Voting,
            PhaseEntity::Results => GamePhase::Results,
            PhaseEntity::Finish => GamePhase::Finish,
        }
    }
}

impl From<GamePhase> for PhaseEntity {
    fn from(value: GamePhase) -> Self {
        match value {
            GamePhase::Dice => PhaseEntity::Dice,
            GamePhase::TurnAssignment => PhaseEntity::TurnAssignment,
            GamePhase::Game => PhaseEntity::Game,
            GamePhase::Discussion => PhaseEntity::Discussion,
            GamePhase::Voting => PhaseEntity::Voting,
            GamePhase::Results => PhaseEntity::Results,
            GamePhase::Finish => PhaseEntity::Finish,
        }
    }
}
