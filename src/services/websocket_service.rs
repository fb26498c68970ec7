use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dto::{events::ServerEvent, ws::ClientMessage},
    error::ServiceError,
    services::{events, game_actions, session::load_room},
    state::SharedState,
};

/// Check that `username` may open a socket on `room_id`.
pub async fn authorize(
    state: &SharedState,
    room_id: &str,
    username: &str,
) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    let room = load_room(&store, room_id).await?;
    if !room.is_member(username) {
        return Err(ServiceError::Unauthorized(format!(
            "`{username}` is not a member of room `{room_id}`"
        )));
    }
    Ok(())
}

/// Handle the full lifecycle of one player socket.
///
/// Outbound room events and control frames go through a dedicated writer task; the
/// read loop dispatches every inbound message to the game actions.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    room_id: String,
    username: String,
) {
    let (sender, mut receiver) = socket.split();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Message>();
    let writer_task = spawn_writer(sender, event_rx, frame_rx);

    let connection_id = state
        .connections()
        .register(&room_id, &username, event_tx.clone());
    info!(%room_id, %username, connection_id, "player connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%room_id, %username, payload = %text.as_str(), "received player message");
                match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => dispatch(&state, &room_id, &username, message).await,
                    Err(err) => {
                        warn!(%room_id, %username, error = %err, "failed to parse player message");
                        events::send_action_rejected(
                            state.connections(),
                            &room_id,
                            &username,
                            "unknown",
                            format!("malformed message: {err}"),
                        );
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = frame_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%room_id, %username, "player closed the socket");
                let _ = frame_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%room_id, %username, error = %err, "websocket error");
                break;
            }
        }
    }

    state
        .connections()
        .unregister(&room_id, &username, connection_id);
    info!(%room_id, %username, connection_id, "player disconnected");

    finalize(writer_task, event_tx, frame_tx).await;
}

/// Run one action and report validation failures to the acting player only.
async fn dispatch(state: &SharedState, room_id: &str, username: &str, message: ClientMessage) {
    let action = message.action();
    match game_actions::handle_client_message(state, room_id, username, message).await {
        Ok(()) => {}
        Err(err) if err.is_validation() => {
            info!(%room_id, %username, action, error = %err, "action rejected");
            events::send_action_rejected(
                state.connections(),
                room_id,
                username,
                action,
                err.to_string(),
            );
        }
        Err(err) => {
            warn!(%room_id, %username, action, error = %err, "action failed");
        }
    }
}

fn spawn_writer(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    frame_rx: mpsc::UnboundedReceiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let events = UnboundedReceiverStream::new(event_rx).map(|event| encode(&event));
        let frames = UnboundedReceiverStream::new(frame_rx).map(Some);
        let mut outbound = tokio_stream::StreamExt::merge(events, frames);

        while let Some(next) = outbound.next().await {
            let Some(message) = next else {
                continue;
            };
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    })
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(payload) => Some(Message::Text(payload.into())),
        Err(err) => {
            warn!(event = %event.event, error = %err, "failed to serialize outbound event");
            None
        }
    }
}

async fn finalize(
    writer_task: JoinHandle<()>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    frame_tx: mpsc::UnboundedSender<Message>,
) {
    drop(event_tx);
    drop(frame_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::game_store::memory::MemoryGameStore,
        dto::rooms::CreateRoomRequest,
        services::room_service,
        state::AppState,
    };

    #[tokio::test]
    async fn only_members_may_connect() {
        let state = AppState::new(AppConfig::default());
        state
            .install_game_store(Arc::new(MemoryGameStore::new()))
            .await;
        let room = room_service::create_room(
            &state,
            CreateRoomRequest {
                name: "Room".into(),
                username: "alice".into(),
                max_players: 4,
                max_rounds: 2,
            },
        )
        .await
        .unwrap();

        authorize(&state, &room.id, "alice").await.unwrap();
        assert!(matches!(
            authorize(&state, &room.id, "mallory").await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            authorize(&state, "ZZZZZZ", "alice").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejected_actions_reach_only_the_actor() {
        let state = AppState::new(AppConfig::default());
        state
            .install_game_store(Arc::new(MemoryGameStore::new()))
            .await;
        let room = room_service::create_room(
            &state,
            CreateRoomRequest {
                name: "Room".into(),
                username: "alice".into(),
                max_players: 4,
                max_rounds: 2,
            },
        )
        .await
        .unwrap();
        room_service::join_room(&state, &room.id, "bob").await.unwrap();

        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        state.connections().register(&room.id, "alice", alice_tx);
        state.connections().register(&room.id, "bob", bob_tx);

        dispatch(
            &state,
            &room.id,
            "bob",
            ClientMessage::StartGame {
                room_id: room.id.clone(),
            },
        )
        .await;

        let rejection = bob_rx.try_recv().unwrap();
        assert_eq!(rejection.event, events::EVENT_ACTION_REJECTED);
        assert_eq!(rejection.data["action"], "startGame");
        assert!(alice_rx.try_recv().is_err());
    }
}
