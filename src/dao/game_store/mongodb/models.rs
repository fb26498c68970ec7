use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::{
    GameEntity, PhaseEntity, PlayerEntity, RoomEntity, RoomStatus, SecretsEntity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    host: String,
    max_players: i32,
    max_rounds: i64,
    status: RoomStatus,
    members: Vec<String>,
    created_at: DateTime,
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            host: value.host,
            max_players: i32::from(value.max_players),
            max_rounds: i64::from(value.max_rounds),
            status: value.status,
            members: value.members,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoRoomDocument> for RoomEntity {
    fn from(value: MongoRoomDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            host: value.host,
            max_players: u8::try_from(value.max_players).unwrap_or(u8::MAX),
            max_rounds: u32::try_from(value.max_rounds).unwrap_or(1),
            status: value.status,
            members: value.members,
            created_at: value.created_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    id: String,
    room_id: String,
    phase: PhaseEntity,
    round: i64,
    max_rounds: i64,
    turn_index: i64,
    phase_deadline: Option<DateTime>,
    epoch: i64,
    secrets: SecretsEntity,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id.to_string(),
            room_id: value.room_id,
            phase: value.phase,
            round: i64::from(value.round),
            max_rounds: i64::from(value.max_rounds),
            turn_index: value.turn_index as i64,
            phase_deadline: value.phase_deadline.map(DateTime::from_system_time),
            epoch: value.epoch as i64,
            secrets: value.secrets,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoGameDocument> for GameEntity {
    type Error = uuid::Error;

    fn try_from(value: MongoGameDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.parse()?,
            room_id: value.room_id,
            phase: value.phase,
            round: value.round as u32,
            max_rounds: value.max_rounds as u32,
            turn_index: value.turn_index as usize,
            phase_deadline: value.phase_deadline.map(DateTime::to_system_time),
            epoch: value.epoch as u64,
            secrets: value.secrets,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

/// One player record. `seq` preserves insertion order, `version` backs
/// conditional replaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    pub key: String,
    pub game_id: String,
    pub seq: i64,
    pub version: i64,
    pub player: PlayerEntity,
}

pub fn player_key(game_id: &str, username: &str) -> String {
    format!("{game_id}:{username}")
}

pub fn string_id(id: &str) -> Document {
    doc! {"_id": id}
}
