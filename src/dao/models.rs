use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a room as persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

/// Lobby room grouping players before and during a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Short uppercase alphanumeric join code.
    pub id: String,
    pub name: String,
    /// Username of the member allowed to start the game.
    pub host: String,
    /// Seats, between 3 and 12.
    pub max_players: u8,
    /// Number of rounds after which impostors win by default.
    pub max_rounds: u32,
    pub status: RoomStatus,
    /// Members in join order.
    pub members: Vec<String>,
    pub created_at: SystemTime,
}

/// Phase names as persisted in the game record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseEntity {
    Dice,
    TurnAssignment,
    Game,
    Discussion,
    Voting,
    Results,
    Finish,
}

/// Pair of secret words handed to players according to their role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretsEntity {
    pub category: String,
    pub civilian_word: String,
    pub impostor_word: String,
}

/// Game record holding the phase machine position for one room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    pub id: Uuid,
    /// Room this game belongs to.
    pub room_id: String,
    pub phase: PhaseEntity,
    pub round: u32,
    pub max_rounds: u32,
    /// Index of the current speaker in the alive order.
    pub turn_index: usize,
    /// Absolute deadline of the current timed phase.
    pub phase_deadline: Option<SystemTime>,
    /// Incremented every time a phase or speaking turn starts.
    pub epoch: u64,
    pub secrets: SecretsEntity,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Hidden role of a player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleEntity {
    Civilian,
    Impostor,
}

/// Per-game player record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    pub username: String,
    pub role: RoleEntity,
    pub color: String,
    pub dice1: u8,
    pub dice2: u8,
    /// 1-based speaking position, absent until assigned or once eliminated.
    pub order: Option<u32>,
    pub has_rolled: bool,
    pub has_spoken: bool,
    pub has_voted: bool,
    pub is_alive: bool,
    pub can_talk: bool,
    /// Votes collected during the current VOTING phase.
    pub votes_received: u32,
}

/// Opaque store revision used for conditional writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Wrap a backend-specific revision token.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    /// Revision to pass back on a conditional write.
    pub revision: Revision,
}
