//! Game session lifecycle: start, finish, teardown and resume after a restart.

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime},
};

use rand::seq::index;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{game_store::GameStore, models::RoomStatus},
    dto::{
        events::{GameStartedEvent, IdentityAssignedEvent, PhaseDetails, PublicPlayer, RoleReveal},
        rooms::RoomSummary,
    },
    error::ServiceError,
    services::{
        dice::DiceSource,
        events,
        phase_engine::{
            PhaseTimeout, clear_timer, load_game, phase_changed, registry, run_timeout,
            start_timed_phase,
        },
        players::NewPlayer,
        voting::GameOutcome,
    },
    state::{
        SharedState,
        game::{Game, GameSecrets, Player, Role, Room},
        phase::{GamePhase, PhaseEvent},
    },
};

/// Start the game of `room_id` on behalf of its host.
pub async fn start_game(
    state: &SharedState,
    room_id: &str,
    requester: &str,
) -> Result<Game, ServiceError> {
    let _gate = state.gates().lock(room_id).await;
    let store = state.require_game_store().await?;
    let mut room = load_room(&store, room_id).await?;
    let config = state.config();

    if room.host != requester {
        return Err(ServiceError::Unauthorized(
            "only the host can start the game".into(),
        ));
    }
    if room.status != RoomStatus::Waiting {
        return Err(ServiceError::InvalidState(format!(
            "room is {:?}, a game can only start while waiting",
            room.status
        )));
    }
    if room.members.len() < config.min_players() {
        return Err(ServiceError::InvalidState(format!(
            "at least {} players are required, {} joined",
            config.min_players(),
            room.members.len()
        )));
    }
    if store.find_game_for_room(room_id.to_owned()).await?.is_some() {
        return Err(ServiceError::InvalidState(
            "a game is already running in this room".into(),
        ));
    }

    let (seats, secrets) = draw_seats(&config, state.dice(), &room.members);
    let now = SystemTime::now();
    let game = Game {
        id: Uuid::new_v4(),
        room_id: room_id.to_owned(),
        phase: GamePhase::Dice,
        round: 1,
        max_rounds: room.max_rounds,
        turn_index: 0,
        phase_deadline: None,
        epoch: 0,
        secrets,
        created_at: now,
        updated_at: now,
    };
    store.save_game(game.clone().into()).await?;

    let players = match seat_players(state, &store, &game, &mut room, seats).await {
        Ok(players) => players,
        Err(err) => {
            abandon_start(state, &store, game.id, None).await;
            return Err(err);
        }
    };
    info!(%room_id, game_id = %game.id, players = players.len(), "game started");

    let connections = state.connections();
    events::broadcast_room_updated(connections, &RoomSummary::from(room.clone()));
    events::broadcast_game_started(
        connections,
        room_id,
        &GameStartedEvent {
            room_id: room_id.to_owned(),
            game_id: game.id.to_string(),
            round: game.round,
            max_rounds: game.max_rounds,
            players: players
                .iter()
                .map(|player| PublicPlayer {
                    username: player.username.clone(),
                    color: player.color.clone(),
                })
                .collect(),
        },
    );
    events::send_identities(connections, room_id, &players, |player| {
        IdentityAssignedEvent {
            role: player.role,
            secret_word: game.secrets.word_for(player.role).to_owned(),
            is_impostor: player.role == Role::Impostor,
        }
    });

    let game_id = game.id;
    let dice = config.phases().dice;
    let started = start_timed_phase(
        state,
        &store,
        game,
        GamePhase::Dice,
        dice,
        PhaseTimeout::ForceDice,
        None,
    )
    .await;
    if started.is_err() {
        abandon_start(state, &store, game_id, Some(room)).await;
    }
    started
}

/// Create the players of `game` and mark the room as playing.
async fn seat_players(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game: &Game,
    room: &mut Room,
    seats: Vec<NewPlayer>,
) -> Result<Vec<Player>, ServiceError> {
    let registry = registry(state, store);
    let mut players = Vec::with_capacity(seats.len());
    for seat in seats {
        players.push(registry.create(game.id, seat).await?);
    }

    room.status = RoomStatus::Playing;
    store.save_room(room.clone().into()).await?;
    Ok(players)
}

/// Undo a start that failed half-way so the host can try again.
///
/// `playing_room` is the room already switched to PLAYING, if it got that far.
async fn abandon_start(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game_id: Uuid,
    playing_room: Option<Room>,
) {
    if let Err(err) = store.delete_game(game_id).await {
        warn!(%game_id, error = %err, "failed to discard a game that did not start");
    }
    let Some(mut room) = playing_room else {
        return;
    };
    room.status = RoomStatus::Waiting;
    match store.save_room(room.clone().into()).await {
        Ok(()) => events::broadcast_room_updated(state.connections(), &RoomSummary::from(room)),
        Err(err) => {
            warn!(room_id = %room.id, error = %err, "failed to reopen room after a failed start")
        }
    }
}

/// Roles, colors, dice and the word pair for a new game, in member order.
fn draw_seats(
    config: &AppConfig,
    dice: &dyn DiceSource,
    members: &[String],
) -> (Vec<NewPlayer>, GameSecrets) {
    let mut rng = rand::rng();
    let count = config.impostor_count(members.len()).min(members.len());
    let impostors: HashSet<usize> = index::sample(&mut rng, members.len(), count)
        .into_iter()
        .collect();
    let words = config.pick_words(&mut rng);

    let mut colors: Vec<String> = Vec::with_capacity(members.len());
    let seats = members
        .iter()
        .enumerate()
        .map(|(seat, username)| {
            let color = config.first_unused_color(&colors);
            colors.push(color.clone());
            NewPlayer {
                username: username.clone(),
                role: if impostors.contains(&seat) {
                    Role::Impostor
                } else {
                    Role::Civilian
                },
                color,
                dice: dice.roll(),
                order: None,
            }
        })
        .collect();

    let secrets = GameSecrets {
        category: words.category,
        civilian_word: words.civilian,
        impostor_word: words.impostor,
    };
    (seats, secrets)
}

/// End `game` with `outcome`: reveal every role, close the room and drop the records.
///
/// Every write happens before the broadcasts, so a failed attempt can simply run
/// again. Callers hold the room gate.
pub async fn finish_game(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    mut game: Game,
    outcome: GameOutcome,
) -> Result<Game, ServiceError> {
    clear_timer(state, &game.room_id);

    let players = registry(state, store).list(game.id).await?;
    let room = match store.find_room(game.room_id.clone()).await? {
        Some(entity) => {
            let mut room = Room::from(entity);
            room.status = RoomStatus::Finished;
            store.save_room(room.clone().into()).await?;
            Some(room)
        }
        None => None,
    };

    game.phase = game.phase.next(PhaseEvent::GameOver)?;
    game.epoch += 1;
    game.phase_deadline = None;
    game.updated_at = SystemTime::now();
    store.save_game(game.clone().into()).await?;
    store.delete_game(game.id).await?;

    let roles = players
        .iter()
        .map(|player| RoleReveal {
            username: player.username.clone(),
            role: player.role,
            is_alive: player.is_alive,
        })
        .collect();
    events::broadcast_phase_changed(
        state.connections(),
        &game.room_id,
        &phase_changed(
            &game,
            &players,
            None,
            Some(PhaseDetails::Finished {
                winner: outcome.winner,
                cause: outcome.cause,
                roles,
            }),
        ),
    );
    if let Some(room) = room {
        events::broadcast_room_updated(state.connections(), &RoomSummary::from(room));
    }

    info!(
        room_id = %game.room_id,
        game_id = %game.id,
        winner = ?outcome.winner,
        cause = ?outcome.cause,
        round = game.round,
        "game finished"
    );
    Ok(game)
}

/// Release the timer, game and connections of a deleted room. Callers hold the room
/// gate and release it through [`RoomGates::release`](crate::state::RoomGates::release).
pub async fn teardown_room(state: &SharedState, room_id: &str) -> Result<(), ServiceError> {
    clear_timer(state, room_id);
    if let Some(store) = state.game_store().await {
        if let Some(game_id) = store.find_game_for_room(room_id.to_owned()).await? {
            store.delete_game(game_id).await?;
            info!(%room_id, %game_id, "active game discarded with its room");
        }
    }
    state.connections().remove_room(room_id);
    Ok(())
}

/// Re-arm the deadline of every persisted game, typically after a restart.
///
/// Rooms that already have a pending deadline are left alone. Returns how many games
/// were re-armed.
pub async fn resume_games(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_game_store().await?;
    let mut resumed = 0;

    for game_id in store.list_active_games().await? {
        let game = match load_game(&store, game_id).await {
            Ok(game) => game,
            Err(err) => {
                warn!(%game_id, error = %err, "cannot resume game");
                continue;
            }
        };
        let Some(action) = PhaseTimeout::for_phase(game.phase) else {
            // finished but not cleaned up
            store.delete_game(game.id).await?;
            continue;
        };
        if state.timers().is_pending(&game.room_id) {
            continue;
        }

        let remaining = game
            .phase_deadline
            .and_then(|deadline| deadline.duration_since(SystemTime::now()).ok())
            .unwrap_or(Duration::ZERO);
        state.timers().start(
            &game.room_id,
            remaining,
            run_timeout(
                Arc::clone(state),
                game.room_id.clone(),
                game.id,
                game.epoch,
                action,
            ),
        );
        info!(
            room_id = %game.room_id,
            game_id = %game.id,
            phase = ?game.phase,
            remaining_ms = remaining.as_millis() as u64,
            "game deadline re-armed"
        );
        resumed += 1;
    }

    Ok(resumed)
}

pub(crate) async fn load_room(
    store: &Arc<dyn GameStore>,
    room_id: &str,
) -> Result<Room, ServiceError> {
    store
        .find_room(room_id.to_owned())
        .await?
        .map(Room::from)
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}` not found")))
}
