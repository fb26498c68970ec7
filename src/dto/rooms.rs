use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::RoomStatus,
    dto::{format_system_time, validation::validate_username},
    state::game::Room,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Payload used to open a room; the requester joins as host.
pub struct CreateRoomRequest {
    /// Display name.
    #[validate(length(min = 1, max = 40))]
    pub name: String,
    /// Host's username.
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(range(min = 3, max = 12))]
    pub max_players: u8,
    /// Rounds after which impostors win.
    #[validate(range(min = 1, max = 10))]
    pub max_rounds: u32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Identifies the member performing a join, leave or delete.
pub struct MemberRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
}

#[derive(Debug, Serialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
/// Public view of a room.
pub struct RoomSummary {
    /// Join code.
    pub id: String,
    pub name: String,
    pub host: String,
    pub max_players: u8,
    pub max_rounds: u32,
    pub status: RoomStatus,
    pub members: Vec<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<Room> for RoomSummary {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            name: room.name,
            host: room.host,
            max_players: room.max_players,
            max_rounds: room.max_rounds,
            status: room.status,
            members: room.members,
            created_at: format_system_time(room.created_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Result of a leave request.
pub struct LeaveRoomResponse {
    /// Room after the departure; absent when the last member left and the room was closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomSummary>,
    /// The room was deleted by this departure.
    pub closed: bool,
}
