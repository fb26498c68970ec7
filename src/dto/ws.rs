use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dto::validation::{validate_room_code, validate_username};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Host request to start the room's game.
    StartGame {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    RollDice {},
    /// The current speaker is done with their turn.
    ConfirmWord {},
    /// `null` registers an abstention.
    SubmitVote {
        #[serde(rename = "voteFor", default)]
        vote_for: Option<String>,
    },
}

impl ClientMessage {
    /// Name of the action, echoed back in rejections.
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::StartGame { .. } => "startGame",
            ClientMessage::RollDice {} => "rollDice",
            ClientMessage::ConfirmWord {} => "confirmWord",
            ClientMessage::SubmitVote { .. } => "submitVote",
        }
    }
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
/// Identification of a socket, given on the upgrade request.
pub struct ConnectParams {
    /// Room join code.
    #[validate(length(equal = 6), custom(function = "validate_room_code"))]
    pub room: String,
    /// Member the socket speaks for.
    #[validate(custom(function = "validate_username"))]
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inbound_messages() {
        let start: ClientMessage =
            serde_json::from_str(r#"{"type":"startGame","roomId":"ABC123"}"#).unwrap();
        assert_eq!(
            start,
            ClientMessage::StartGame {
                room_id: "ABC123".into()
            }
        );

        let roll: ClientMessage = serde_json::from_str(r#"{"type":"rollDice"}"#).unwrap();
        assert_eq!(roll, ClientMessage::RollDice {});

        let vote: ClientMessage =
            serde_json::from_str(r#"{"type":"submitVote","voteFor":"bob"}"#).unwrap();
        assert_eq!(
            vote,
            ClientMessage::SubmitVote {
                vote_for: Some("bob".into())
            }
        );

        let abstain: ClientMessage =
            serde_json::from_str(r#"{"type":"submitVote","voteFor":null}"#).unwrap();
        assert_eq!(abstain, ClientMessage::SubmitVote { vote_for: None });
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"dance"}"#).is_err());
    }
}
