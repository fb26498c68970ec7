//! Lobby operations: create, join, leave and delete rooms.

use rand::Rng;
use tracing::info;

use crate::{
    dao::models::RoomStatus,
    dto::rooms::{CreateRoomRequest, LeaveRoomResponse, RoomSummary},
    error::ServiceError,
    services::{
        events,
        session::{self, load_room},
    },
    state::{SharedState, game::Room},
};

const ROOM_CODE_LENGTH: usize = 6;
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ROOM_CODE_ATTEMPTS: usize = 8;

/// Open a room with the requester as host and only member.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomSummary, ServiceError> {
    let store = state.require_game_store().await?;
    let CreateRoomRequest {
        name,
        username,
        max_players,
        max_rounds,
    } = request;

    if name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "room name must not be empty".into(),
        ));
    }

    for _ in 0..ROOM_CODE_ATTEMPTS {
        let code = generate_room_code();
        let _gate = state.gates().lock(&code).await;
        if store.find_room(code.clone()).await?.is_some() {
            continue;
        }

        let room = Room {
            id: code,
            name: name.trim().to_owned(),
            host: username.clone(),
            max_players,
            max_rounds,
            status: RoomStatus::Waiting,
            members: vec![username.clone()],
            created_at: std::time::SystemTime::now(),
        };
        store.save_room(room.clone().into()).await?;
        info!(room_id = %room.id, host = %room.host, "room created");
        return Ok(room.into());
    }

    Err(ServiceError::InvalidState(
        "could not allocate a free room code".into(),
    ))
}

/// Look up a room by its join code.
pub async fn get_room(state: &SharedState, room_id: &str) -> Result<RoomSummary, ServiceError> {
    let store = state.require_game_store().await?;
    Ok(load_room(&store, room_id).await?.into())
}

/// Add `username` to a waiting room. Joining twice is a no-op.
pub async fn join_room(
    state: &SharedState,
    room_id: &str,
    username: &str,
) -> Result<RoomSummary, ServiceError> {
    let _gate = state.gates().lock(room_id).await;
    let store = state.require_game_store().await?;
    let mut room = load_room(&store, room_id).await?;

    if room.status != RoomStatus::Waiting {
        return Err(ServiceError::InvalidState(
            "the game has already started".into(),
        ));
    }
    if room.is_member(username) {
        return Ok(room.into());
    }
    if room.members.len() >= usize::from(room.max_players) {
        return Err(ServiceError::InvalidState("room is full".into()));
    }

    room.members.push(username.to_owned());
    store.save_room(room.clone().into()).await?;
    info!(%room_id, %username, members = room.members.len(), "player joined room");

    let summary = RoomSummary::from(room);
    events::broadcast_room_updated(state.connections(), &summary);
    Ok(summary)
}

/// Remove `username` from the room.
///
/// The host role passes to the next member in join order; the room closes when the
/// last member leaves.
pub async fn leave_room(
    state: &SharedState,
    room_id: &str,
    username: &str,
) -> Result<LeaveRoomResponse, ServiceError> {
    let gate = state.gates().lock(room_id).await;
    let store = state.require_game_store().await?;
    let mut room = load_room(&store, room_id).await?;

    if !room.is_member(username) {
        return Err(ServiceError::InvalidInput(format!(
            "`{username}` is not a member of room `{room_id}`"
        )));
    }
    room.members.retain(|member| member != username);
    state.connections().prune(room_id, username);

    let Some(next_host) = room.members.first().cloned() else {
        store.delete_room(room_id.to_owned()).await?;
        session::teardown_room(state, room_id).await?;
        state.gates().release(room_id, gate);
        info!(%room_id, "last member left; room closed");
        return Ok(LeaveRoomResponse {
            room: None,
            closed: true,
        });
    };
    if room.host == username {
        info!(%room_id, from = %username, to = %next_host, "host handed over");
        room.host = next_host;
    }

    store.save_room(room.clone().into()).await?;
    info!(%room_id, %username, "player left room");

    let summary = RoomSummary::from(room);
    events::broadcast_room_updated(state.connections(), &summary);
    Ok(LeaveRoomResponse {
        room: Some(summary),
        closed: false,
    })
}

/// Delete the room and everything it holds. Host only.
pub async fn delete_room(
    state: &SharedState,
    room_id: &str,
    username: &str,
) -> Result<(), ServiceError> {
    let gate = state.gates().lock(room_id).await;
    let store = state.require_game_store().await?;
    let room = load_room(&store, room_id).await?;

    if room.host != username {
        return Err(ServiceError::Unauthorized(
            "only the host can delete the room".into(),
        ));
    }

    store.delete_room(room_id.to_owned()).await?;
    session::teardown_room(state, room_id).await?;
    state.gates().release(room_id, gate);
    info!(%room_id, "room deleted");
    Ok(())
}

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::game_store::memory::MemoryGameStore, dto::validation,
        state::AppState,
    };

    async fn state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_game_store(Arc::new(MemoryGameStore::new()))
            .await;
        state
    }

    fn request(max_players: u8) -> CreateRoomRequest {
        CreateRoomRequest {
            name: "  Friday  ".into(),
            username: "alice".into(),
            max_players,
            max_rounds: 3,
        }
    }

    #[test]
    fn room_codes_are_valid_join_codes() {
        for _ in 0..32 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
            assert!(validation::validate_room_code(&code).is_ok());
        }
    }

    #[tokio::test]
    async fn join_is_idempotent_and_bounded() {
        let state = state().await;
        let room = create_room(&state, request(3)).await.unwrap();
        assert_eq!(room.name, "Friday");
        assert_eq!(room.members, ["alice"]);

        join_room(&state, &room.id, "bob").await.unwrap();
        let again = join_room(&state, &room.id, "bob").await.unwrap();
        assert_eq!(again.members, ["alice", "bob"]);

        join_room(&state, &room.id, "carol").await.unwrap();
        let err = join_room(&state, &room.id, "dave").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn host_leaving_hands_over_and_last_leave_closes() {
        let state = state().await;
        let room = create_room(&state, request(4)).await.unwrap();
        join_room(&state, &room.id, "bob").await.unwrap();

        let left = leave_room(&state, &room.id, "alice").await.unwrap();
        assert!(!left.closed);
        assert_eq!(left.room.unwrap().host, "bob");

        let closed = leave_room(&state, &room.id, "bob").await.unwrap();
        assert!(closed.closed);
        assert!(matches!(
            get_room(&state, &room.id).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn only_host_deletes() {
        let state = state().await;
        let room = create_room(&state, request(4)).await.unwrap();
        join_room(&state, &room.id, "bob").await.unwrap();

        let err = delete_room(&state, &room.id, "bob").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        delete_room(&state, &room.id, "alice").await.unwrap();
        assert!(get_room(&state, &room.id).await.is_err());
    }

    #[tokio::test]
    async fn degraded_mode_rejects_lobby_calls() {
        let state = AppState::new(AppConfig::default());
        let err = create_room(&state, request(4)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }
}
