//! Room fan-out of game events over the live WebSocket connections.

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    dto::events::{
        ActionRejectedEvent, GameStartedEvent, IdentityAssignedEvent, PhaseChangedEvent,
        PlayerRolledDiceEvent, PlayerSpokenEvent, PlayerVotedEvent, ServerEvent,
    },
    dto::rooms::RoomSummary,
    state::{ConnectionRegistry, game::Player},
};

/// Event names as seen by clients.
pub const EVENT_GAME_STARTED: &str = "gameStarted";
pub const EVENT_PHASE_CHANGED: &str = "phaseChanged";
pub const EVENT_PLAYER_ROLLED_DICE: &str = "playerRolledDice";
pub const EVENT_PLAYER_SPOKEN: &str = "playerSpoken";
pub const EVENT_PLAYER_VOTED: &str = "playerVoted";
pub const EVENT_IDENTITY_ASSIGNED: &str = "identityAssigned";
pub const EVENT_ACTION_REJECTED: &str = "actionRejected";
pub const EVENT_ROOM_UPDATED: &str = "roomUpdated";

/// Deliver the same payload to every live connection of the room.
///
/// Best effort: nothing is queued for members without a connection. Returns the
/// number of connections reached.
pub fn broadcast_to_room<T>(
    connections: &ConnectionRegistry,
    room_id: &str,
    event: &str,
    payload: &T,
) -> usize
where
    T: Serialize + ?Sized,
{
    let message = match ServerEvent::json(event, payload) {
        Ok(message) => message,
        Err(err) => {
            warn!(room_id, event, error = %err, "failed to serialize room event");
            return 0;
        }
    };

    let mut delivered = 0;
    for (username, connection) in connections.room_connections(room_id) {
        if connection.tx.send(message.clone()).is_ok() {
            delivered += 1;
        } else {
            debug!(room_id, %username, event, "writer closed; dropping connection");
            connections.prune(room_id, &username);
        }
    }
    delivered
}

/// Build and deliver a per-recipient payload to each listed player.
///
/// Players without a live connection are skipped silently. Returns the number of
/// players reached.
pub fn send_personalized<'a, I, T, F>(
    connections: &ConnectionRegistry,
    room_id: &str,
    players: I,
    event: &str,
    mut build: F,
) -> usize
where
    I: IntoIterator<Item = &'a Player>,
    T: Serialize,
    F: FnMut(&Player) -> T,
{
    let mut delivered = 0;
    for player in players {
        let Some(connection) = connections.resolve(room_id, &player.username) else {
            continue;
        };
        let message = match ServerEvent::json(event, &build(player)) {
            Ok(message) => message,
            Err(err) => {
                warn!(room_id, username = %player.username, event, error = %err, "failed to serialize private event");
                continue;
            }
        };
        if connection.tx.send(message).is_ok() {
            delivered += 1;
        } else {
            connections.prune(room_id, &player.username);
        }
    }
    delivered
}

/// Deliver a payload to a single player if connected.
pub fn send_to_player<T>(
    connections: &ConnectionRegistry,
    room_id: &str,
    username: &str,
    event: &str,
    payload: &T,
) -> bool
where
    T: Serialize + ?Sized,
{
    let Some(connection) = connections.resolve(room_id, username) else {
        return false;
    };
    match ServerEvent::json(event, payload) {
        Ok(message) => connection.tx.send(message).is_ok(),
        Err(err) => {
            warn!(room_id, username, event, error = %err, "failed to serialize private event");
            false
        }
    }
}

/// Broadcast that the room's game started.
pub fn broadcast_game_started(
    connections: &ConnectionRegistry,
    room_id: &str,
    payload: &GameStartedEvent,
) {
    broadcast_to_room(connections, room_id, EVENT_GAME_STARTED, payload);
}

/// Broadcast a phase or speaking-turn start.
pub fn broadcast_phase_changed(
    connections: &ConnectionRegistry,
    room_id: &str,
    payload: &PhaseChangedEvent,
) {
    broadcast_to_room(connections, room_id, EVENT_PHASE_CHANGED, payload);
}

/// Announce a roll with both dice and the player's colour.
pub fn broadcast_player_rolled(connections: &ConnectionRegistry, room_id: &str, player: &Player) {
    let payload = PlayerRolledDiceEvent {
        username: player.username.clone(),
        dice1: player.dice.d1,
        dice2: player.dice.d2,
        color: player.color.clone(),
    };
    broadcast_to_room(connections, room_id, EVENT_PLAYER_ROLLED_DICE, &payload);
}

pub fn broadcast_player_spoken(
    connections: &ConnectionRegistry,
    room_id: &str,
    username: &str,
    next_index: usize,
) {
    let payload = PlayerSpokenEvent {
        username: username.to_owned(),
        next_index,
    };
    broadcast_to_room(connections, room_id, EVENT_PLAYER_SPOKEN, &payload);
}

/// Announce that someone voted, never for whom.
pub fn broadcast_player_voted(connections: &ConnectionRegistry, room_id: &str, username: &str) {
    let payload = PlayerVotedEvent {
        username: username.to_owned(),
        has_voted: true,
    };
    broadcast_to_room(connections, room_id, EVENT_PLAYER_VOTED, &payload);
}

pub fn broadcast_room_updated(connections: &ConnectionRegistry, summary: &RoomSummary) {
    broadcast_to_room(connections, &summary.id, EVENT_ROOM_UPDATED, summary);
}

/// Privately reveal role and secret word to each player.
pub fn send_identities(
    connections: &ConnectionRegistry,
    room_id: &str,
    players: &[Player],
    build: impl FnMut(&Player) -> IdentityAssignedEvent,
) -> usize {
    send_personalized(connections, room_id, players, EVENT_IDENTITY_ASSIGNED, build)
}

/// Tell a player their action was refused.
pub fn send_action_rejected(
    connections: &ConnectionRegistry,
    room_id: &str,
    username: &str,
    action: &str,
    message: String,
) {
    let payload = ActionRejectedEvent {
        action: action.to_owned(),
        message,
    };
    send_to_player(connections, room_id, username, EVENT_ACTION_REJECTED, &payload);
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::state::game::{DicePair, Role};

    fn player(username: &str, role: Role) -> Player {
        Player {
            username: username.into(),
            role,
            color: "#ffffff".into(),
            dice: DicePair { d1: 1, d2: 2 },
            order: None,
            has_rolled: false,
            has_spoken: false,
            has_voted: false,
            is_alive: true,
            can_talk: true,
            votes_received: 0,
        }
    }

    #[test]
    fn broadcast_reaches_only_room_members() {
        let registry = ConnectionRegistry::new();
        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let (carol_tx, mut carol_rx) = mpsc::unbounded_channel();
        registry.register("ROOM01", "alice", alice_tx);
        registry.register("ROOM01", "bob", bob_tx);
        registry.register("ROOM02", "carol", carol_tx);

        let reached = broadcast_to_room(&registry, "ROOM01", "ping", &serde_json::json!({}));
        assert_eq!(reached, 2);
        assert_eq!(alice_rx.try_recv().unwrap().event, "ping");
        assert_eq!(bob_rx.try_recv().unwrap().event, "ping");
        assert!(carol_rx.try_recv().is_err());
    }

    #[test]
    fn personalized_payloads_skip_offline_players() {
        let registry = ConnectionRegistry::new();
        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        registry.register("ROOM01", "alice", alice_tx);
        let players = vec![player("alice", Role::Impostor), player("bob", Role::Civilian)];

        let reached = send_identities(&registry, "ROOM01", &players, |player| {
            IdentityAssignedEvent {
                role: player.role,
                secret_word: format!("word-{}", player.username),
                is_impostor: player.role == Role::Impostor,
            }
        });
        assert_eq!(reached, 1);

        let event = alice_rx.try_recv().unwrap();
        assert_eq!(event.event, EVENT_IDENTITY_ASSIGNED);
        assert_eq!(event.data["secretWord"], "word-alice");
        assert_eq!(event.data["isImpostor"], true);
    }

    #[test]
    fn closed_connections_are_pruned() {
        let registry = ConnectionRegistry::new();
        let (alice_tx, alice_rx) = mpsc::unbounded_channel();
        registry.register("ROOM01", "alice", alice_tx);
        drop(alice_rx);

        assert_eq!(
            broadcast_to_room(&registry, "ROOM01", "ping", &serde_json::json!({})),
            0
        );
        assert!(registry.resolve("ROOM01", "alice").is_none());
    }
}
