use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

use crate::{
    services::voting::{EliminationReason, WinCause, Winner},
    state::{
        game::{Player, Role},
        phase::GamePhase,
    },
};

#[derive(Clone, Debug, Serialize, PartialEq)]
/// Envelope pushed to players over their WebSocket: `{"event": name, "data": payload}`.
pub struct ServerEvent {
    /// Event name, one of the `EVENT_*` constants.
    pub event: String,
    pub data: Value,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<T>(event: &str, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize + ?Sized,
    {
        Ok(Self {
            event: event.to_owned(),
            data: serde_json::to_value(payload)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Public view of a seated player.
pub struct PublicPlayer {
    pub username: String,
    /// Colour rolled at game start.
    pub color: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast once when a room's game starts.
pub struct GameStartedEvent {
    pub room_id: String,
    pub game_id: String,
    /// Always 1.
    pub round: u32,
    pub max_rounds: u32,
    pub players: Vec<PublicPlayer>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Whether a player may currently speak.
pub struct PlayerTalkState {
    pub username: String,
    pub can_talk: bool,
}

impl From<&Player> for PlayerTalkState {
    fn from(player: &Player) -> Self {
        Self {
            username: player.username.clone(),
            can_talk: player.can_talk,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// One line of the speaking order.
pub struct TurnOrderEntry {
    pub username: String,
    pub order: u32,
    /// Dice total that ranked the player.
    pub total: u8,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Role disclosed once the game is over.
pub struct RoleReveal {
    pub username: String,
    pub role: Role,
    pub is_alive: bool,
}

/// Phase-specific fields merged into [`PhaseChangedEvent`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PhaseDetails {
    /// Speaking order computed for the round.
    TurnOrder {
        #[serde(rename = "turnOrder")]
        turn_order: Vec<TurnOrderEntry>,
    },
    /// Current speaker of a GAME turn.
    Turn {
        #[serde(rename = "turnIndex")]
        turn_index: usize,
        #[serde(rename = "currentPlayer")]
        current_player: String,
    },
    /// Vote outcome shown during RESULTS.
    Results {
        eliminated: Option<String>,
        message: String,
        reason: EliminationReason,
    },
    /// Final outcome with every role revealed.
    Finished {
        winner: Winner,
        cause: WinCause,
        roles: Vec<RoleReveal>,
    },
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// Broadcast exactly once every time a phase or speaking turn starts.
pub struct PhaseChangedEvent {
    pub phase: GamePhase,
    pub round: u32,
    pub players: Vec<PlayerTalkState>,
    /// RFC 3339 deadline; absent for the terminal phase.
    pub end_time: Option<String>,
    /// Phase length in seconds.
    pub duration: Option<u64>,
    #[serde(flatten)]
    pub details: Option<PhaseDetails>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast when a player rolls, by hand or on the deadline.
pub struct PlayerRolledDiceEvent {
    pub username: String,
    pub dice1: u8,
    pub dice2: u8,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast when the current speaker confirms their word.
pub struct PlayerSpokenEvent {
    pub username: String,
    /// Turn index of the next speaker.
    pub next_index: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerVotedEvent {
    pub username: String,
    pub has_voted: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Private role and word reveal.
pub struct IdentityAssignedEvent {
    pub role: Role,
    pub secret_word: String,
    pub is_impostor: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Private rejection of an invalid action, sent to the acting player only.
pub struct ActionRejectedEvent {
    /// Client action name that was refused.
    pub action: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn phase_changed_flattens_details_and_skips_missing_fields() {
        let event = PhaseChangedEvent {
            phase: GamePhase::Game,
            round: 1,
            players: vec![PlayerTalkState {
                username: "p3".into(),
                can_talk: true,
            }],
            end_time: Some("2026-01-01T00:00:30Z".into()),
            duration: Some(30),
            details: Some(PhaseDetails::Turn {
                turn_index: 0,
                current_player: "p3".into(),
            }),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "phase": "GAME",
                "round": 1,
                "players": [{"username": "p3", "canTalk": true}],
                "endTime": "2026-01-01T00:00:30Z",
                "duration": 30,
                "turnIndex": 0,
                "currentPlayer": "p3",
            })
        );

        let finished = PhaseChangedEvent {
            phase: GamePhase::Finish,
            round: 2,
            players: Vec::new(),
            end_time: None,
            duration: None,
            details: Some(PhaseDetails::Finished {
                winner: Winner::Civilians,
                cause: WinCause::ImpostorsEliminated,
                roles: vec![RoleReveal {
                    username: "p1".into(),
                    role: Role::Impostor,
                    is_alive: false,
                }],
            }),
        };
        let value = serde_json::to_value(&finished).unwrap();
        assert!(value.get("endTime").is_none());
        assert_eq!(value["winner"], "civilians");
        assert_eq!(value["cause"], "impostorsEliminated");
        assert_eq!(value["roles"][0]["role"], "IMPOSTOR");
    }

    #[test]
    fn envelope_wraps_payload() {
        let event = ServerEvent::json(
            "playerVoted",
            &PlayerVotedEvent {
                username: "p1".into(),
                has_voted: true,
            },
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "playerVoted", "data": {"username": "p1", "hasVoted": true}})
        );
    }
}
