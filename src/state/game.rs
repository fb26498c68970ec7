use std::time::SystemTime;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{
        GameEntity, PlayerEntity, RoleEntity, RoomEntity, RoomStatus, SecretsEntity,
    },
    state::phase::GamePhase,
};

/// Hidden role of a player, fixed at game creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Civilian,
    Impostor,
}

/// Two dice values in `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DicePair {
    pub d1: u8,
    pub d2: u8,
}

impl DicePair {
    /// Sum of both dice, in `2..=12`.
    pub fn total(&self) -> u8 {
        self.d1 + self.d2
    }
}

/// Word pair of a game. Never part of public payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSecrets {
    pub category: String,
    pub civilian_word: String,
    pub impostor_word: String,
}

impl GameSecrets {
    /// Secret word handed to a player holding `role`.
    pub fn word_for(&self, role: Role) -> &str {
        match role {
            Role::Civilian => &self.civilian_word,
            Role::Impostor => &self.impostor_word,
        }
    }
}

/// Per-game player state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub username: String,
    pub role: Role,
    pub color: String,
    pub dice: DicePair,
    /// 1-based speaking position; `None` until assigned and once eliminated.
    pub order: Option<u32>,
    pub has_rolled: bool,
    pub has_spoken: bool,
    pub has_voted: bool,
    pub is_alive: bool,
    pub can_talk: bool,
    pub votes_received: u32,
}

impl Player {
    /// Dice total used to rank the speaking order.
    pub fn total(&self) -> u8 {
        self.dice.total()
    }
}

/// One playthrough bound to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub id: Uuid,
    pub room_id: String,
    pub phase: GamePhase,
    pub round: u32,
    pub max_rounds: u32,
    /// Position in the alive speaking order; equal to its length once everyone spoke.
    pub turn_index: usize,
    /// Absolute deadline of the running timed phase.
    pub phase_deadline: Option<SystemTime>,
    /// Bumped on every phase or turn start so stale timers can tell they lost.
    pub epoch: u64,
    pub secrets: GameSecrets,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Lobby grouping players before and during a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub name: String,
    /// Member allowed to start the game.
    pub host: String,
    pub max_players: u8,
    pub max_rounds: u32,
    pub status: RoomStatus,
    /// Members in join order.
    pub members: Vec<String>,
    pub created_at: SystemTime,
}

impl Room {
    pub fn is_member(&self, username: &str) -> bool {
        self.members.iter().any(|member| member == username)
    }
}

impl From<RoleEntity> for Role {
    fn from(value: RoleEntity) -> Self {
        match value {
            RoleEntity::Civilian => Role::Civilian,
            RoleEntity::Impostor => Role::Impostor,
        }
    }
}

impl From<Role> for RoleEntity {
    fn from(value: Role) -> Self {
        match value {
            Role::Civilian => RoleEntity::Civilian,
            Role::Impostor => RoleEntity::Impostor,
        }
    }
}

impl From<SecretsEntity> for GameSecrets {
    fn from(value: SecretsEntity) -> Self {
        Self {
            category: value.category,
            civilian_word: value.civilian_word,
            impostor_word: value.impostor_word,
        }
    }
}

impl From<GameSecrets> for SecretsEntity {
    fn from(value: GameSecrets) -> Self {
        Self {
            category: value.category,
            civilian_word: value.civilian_word,
            impostor_word: value.impostor_word,
        }
    }
}

impl From<PlayerEntity> for Player {
    fn from(value: PlayerEntity) -> Self {
        Self {
            username: value.username,
            role: value.role.into(),
            color: value.color,
            dice: DicePair {
                d1: value.dice1,
                d2: value.dice2,
            },
            order: value.order,
            has_rolled: value.has_rolled,
            has_spoken: value.has_spoken,
            has_voted: value.has_voted,
            is_alive: value.is_alive,
            can_talk: value.can_talk,
            votes_received: value.votes_received,
        }
    }
}

impl From<Player> for PlayerEntity {
    fn from(value: Player) -> Self {
        Self {
            username: value.username,
            role: value.role.into(),
            color: value.color,
            dice1: value.dice.d1,
            dice2: value.dice.d2,
            order: value.order,
            has_rolled: value.has_rolled,
            has_spoken: value.has_spoken,
            has_voted: value.has_voted,
            is_alive: value.is_alive,
            can_talk: value.can_talk,
            votes_received: value.votes_received,
        }
    }
}

impl From<GameEntity> for Game {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            phase: value.phase.into(),
            round: value.round,
            max_rounds: value.max_rounds,
            turn_index: value.turn_index,
            phase_deadline: value.phase_deadline,
            epoch: value.epoch,
            secrets: value.secrets.into(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<Game> for GameEntity {
    fn from(value: Game) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            phase: value.phase.into(),
            round: value.round,
            max_rounds: value.max_rounds,
            turn_index: value.turn_index,
            phase_deadline: value.phase_deadline,
            epoch: value.epoch,
            secrets: value.secrets.into(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<RoomEntity> for Room {
    fn from(value: RoomEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            host: value.host,
            max_players: value.max_players,
            max_rounds: value.max_rounds,
            status: value.status,
            members: value.members,
            created_at: value.created_at,
        }
    }
}

impl From<Room> for RoomEntity {
    fn from(value: Room) -> Self {
        Self {
            id: value.id,
            name: value.name,
            host: value.host,
            max_players: value.max_players,
            max_rounds: value.max_rounds,
            status: value.status,
            members: value.members,
            created_at: value.created_at,
        }
    }
}
