//! Player actions received over the room socket.

use tracing::info;

use crate::{
    dto::ws::ClientMessage,
    error::ServiceError,
    services::{
        dice::speaking_order,
        events,
        phase_engine::{load_room_game, registry},
        players::{PlayerPatch, PlayerRegistry, PlayerRegistryError},
        progression, session,
    },
    state::{
        SharedState,
        game::{Game, Player},
        phase::GamePhase,
    },
};

/// Route one inbound socket message from `username`, connected to `room_id`.
pub async fn handle_client_message(
    state: &SharedState,
    room_id: &str,
    username: &str,
    message: ClientMessage,
) -> Result<(), ServiceError> {
    match message {
        ClientMessage::StartGame { room_id: target } => {
            if target != room_id {
                return Err(ServiceError::InvalidInput(format!(
                    "connected to room `{room_id}`, cannot start `{target}`"
                )));
            }
            session::start_game(state, room_id, username).await?;
        }
        ClientMessage::RollDice {} => {
            roll_dice(state, room_id, username).await?;
        }
        ClientMessage::ConfirmWord {} => {
            confirm_word(state, room_id, username).await?;
        }
        ClientMessage::SubmitVote { vote_for } => {
            submit_vote(state, room_id, username, vote_for).await?;
        }
    }
    Ok(())
}

/// Reveal the dice of `username`, drawn when the game was created.
pub async fn roll_dice(
    state: &SharedState,
    room_id: &str,
    username: &str,
) -> Result<Player, ServiceError> {
    let _gate = state.gates().lock(room_id).await;
    let store = state.require_game_store().await?;
    let game = load_room_game(&store, room_id).await?;
    ensure_phase(&game, GamePhase::Dice, "dice can only be rolled during the DICE phase")?;

    let registry = registry(state, &store);
    let player = find_participant(&registry, &game, username).await?;
    if player.has_rolled {
        return Err(ServiceError::InvalidState("dice already rolled".into()));
    }

    let patch = PlayerPatch {
        has_rolled: Some(true),
        ..Default::default()
    };
    let rolled = registry.update(game.id, username, patch).await?;
    events::broadcast_player_rolled(state.connections(), room_id, &rolled);

    let everyone_rolled = registry
        .list(game.id)
        .await?
        .iter()
        .all(|player| player.has_rolled);
    if everyone_rolled {
        info!(%room_id, game_id = %game.id, "every player rolled");
        progression::complete_dice(state, &store, game).await?;
    }
    Ok(rolled)
}

/// End the speaking turn of `username`, who must be the current speaker.
pub async fn confirm_word(
    state: &SharedState,
    room_id: &str,
    username: &str,
) -> Result<(), ServiceError> {
    let _gate = state.gates().lock(room_id).await;
    let store = state.require_game_store().await?;
    let game = load_room_game(&store, room_id).await?;
    ensure_phase(&game, GamePhase::Game, "words can only be confirmed during a speaking turn")?;

    let registry = registry(state, &store);
    let players = registry.list(game.id).await?;
    let Some(current) = speaking_order(&players).get(game.turn_index).copied() else {
        return Err(ServiceError::InvalidState("no speaker is up".into()));
    };
    if current.username != username {
        return Err(ServiceError::InvalidState(format!(
            "it is `{}`'s turn to speak",
            current.username
        )));
    }
    if current.has_spoken {
        return Err(ServiceError::InvalidState("already spoke this round".into()));
    }

    let patch = PlayerPatch {
        has_spoken: Some(true),
        ..Default::default()
    };
    registry.update(game.id, username, patch).await?;
    progression::pass_turn(state, &store, game, username).await?;
    Ok(())
}

/// Cast the vote of `username`; `None` abstains.
pub async fn submit_vote(
    state: &SharedState,
    room_id: &str,
    username: &str,
    vote_for: Option<String>,
) -> Result<(), ServiceError> {
    let _gate = state.gates().lock(room_id).await;
    let store = state.require_game_store().await?;
    let game = load_room_game(&store, room_id).await?;
    ensure_phase(&game, GamePhase::Voting, "votes are only accepted during the VOTING phase")?;

    let registry = registry(state, &store);
    let players = registry.list(game.id).await?;
    let voter = players
        .iter()
        .find(|player| player.username == username)
        .ok_or_else(|| not_a_player(username))?;
    if !voter.is_alive {
        return Err(ServiceError::InvalidState(
            "eliminated players cannot vote".into(),
        ));
    }
    if voter.has_voted {
        return Err(ServiceError::InvalidState("already voted".into()));
    }

    if let Some(target) = vote_for.as_deref() {
        if target == username {
            return Err(ServiceError::InvalidInput("cannot vote for yourself".into()));
        }
        let valid_target = players
            .iter()
            .any(|player| player.username == target && player.is_alive);
        if !valid_target {
            return Err(ServiceError::InvalidInput(format!(
                "`{target}` is not an alive player"
            )));
        }
        let votes = registry.increment_votes(game.id, target).await?;
        info!(%room_id, voter = %username, %target, votes, "vote registered");
    } else {
        info!(%room_id, voter = %username, "abstention registered");
    }

    let patch = PlayerPatch {
        has_voted: Some(true),
        ..Default::default()
    };
    registry.update(game.id, username, patch).await?;
    events::broadcast_player_voted(state.connections(), room_id, username);

    if all_alive_voted(&registry, &game).await? {
        progression::finish_voting(state, &store, game).await?;
    }
    Ok(())
}

fn ensure_phase(game: &Game, expected: GamePhase, message: &str) -> Result<(), ServiceError> {
    if game.phase == expected {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(message.to_owned()))
    }
}

async fn find_participant(
    registry: &PlayerRegistry,
    game: &Game,
    username: &str,
) -> Result<Player, ServiceError> {
    match registry.find(game.id, username).await {
        Ok(player) => Ok(player),
        Err(PlayerRegistryError::NotFound { .. }) => Err(not_a_player(username)),
        Err(err) => Err(err.into()),
    }
}

fn not_a_player(username: &str) -> ServiceError {
    ServiceError::Unauthorized(format!("`{username}` is not playing in this game"))
}

async fn all_alive_voted(registry: &PlayerRegistry, game: &Game) -> Result<bool, ServiceError> {
    Ok(registry
        .list(game.id)
        .await?
        .iter()
        .filter(|player| player.is_alive)
        .all(|player| player.has_voted))
}
