//! Phase-to-phase progression, natural or forced by a deadline.
//!
//! Every function here expects the caller to hold the room gate and to pass the
//! freshly loaded game.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    dao::game_store::GameStore,
    dto::events::{PhaseDetails, TurnOrderEntry},
    error::ServiceError,
    services::{
        dice::{compute_turn_order, speaking_order},
        events,
        phase_engine::{PhaseTimeout, registry, start_timed_phase},
        players::{PlayerPatch, PlayerRegistry},
        session,
        voting::{calculate_elimination, check_winner},
    },
    state::{
        SharedState,
        game::{Game, Player},
        phase::{GamePhase, PhaseEvent},
    },
};

/// Dispatch an elapsed deadline.
pub(crate) async fn on_timeout(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game: Game,
    action: PhaseTimeout,
) -> Result<(), ServiceError> {
    match action {
        PhaseTimeout::ForceDice => force_dice(state, store, game).await?,
        PhaseTimeout::BeginSpeaking => begin_speaking(state, store, game).await?,
        PhaseTimeout::ForceTurn => force_turn(state, store, game).await?,
        PhaseTimeout::EndDiscussion => begin_voting(state, store, game).await?,
        PhaseTimeout::ForceVoting => force_voting(state, store, game).await?,
        PhaseTimeout::ResolveResults => resolve_results(state, store, game).await?,
    };
    Ok(())
}

/// Roll for every straggler with the dice drawn at game creation, then move on.
async fn force_dice(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game: Game,
) -> Result<Game, ServiceError> {
    let registry = registry(state, store);
    for player in registry.list(game.id).await? {
        if player.has_rolled {
            continue;
        }
        let patch = PlayerPatch {
            has_rolled: Some(true),
            ..Default::default()
        };
        match registry.update(game.id, &player.username, patch).await {
            Ok(rolled) => {
                info!(room_id = %game.room_id, username = %rolled.username, "dice rolled on deadline");
                events::broadcast_player_rolled(state.connections(), &game.room_id, &rolled);
            }
            Err(err) => {
                warn!(room_id = %game.room_id, username = %player.username, error = %err, "failed to force dice roll");
            }
        }
    }
    complete_dice(state, store, game).await
}

/// Every player rolled: compute the first speaking order and show it.
pub(crate) async fn complete_dice(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game: Game,
) -> Result<Game, ServiceError> {
    let next = game.phase.next(PhaseEvent::DiceCompleted)?;
    let registry = registry(state, store);
    let players = registry.list(game.id).await?;
    let turn_order = assign_turn_order(&registry, &game, &players).await?;

    start_timed_phase(
        state,
        store,
        game,
        next,
        state.config().phases().turn_assignment,
        PhaseTimeout::BeginSpeaking,
        Some(PhaseDetails::TurnOrder { turn_order }),
    )
    .await
}

/// Persist the speaking order of `game.round` and describe it for the broadcast.
async fn assign_turn_order(
    registry: &PlayerRegistry,
    game: &Game,
    players: &[Player],
) -> Result<Vec<TurnOrderEntry>, ServiceError> {
    let slots = compute_turn_order(players, game.round)?;
    let mut entries = Vec::with_capacity(slots.len());
    for slot in slots {
        let patch = PlayerPatch {
            order: Some(Some(slot.order)),
            ..Default::default()
        };
        let player = registry.update(game.id, &slot.username, patch).await?;
        entries.push(TurnOrderEntry {
            username: player.username,
            order: slot.order,
            total: player.dice.total(),
        });
    }
    Ok(entries)
}

async fn begin_speaking(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    mut game: Game,
) -> Result<Game, ServiceError> {
    game.turn_index = 0;
    begin_turn(state, store, game).await
}

/// Give the floor to the speaker at `game.turn_index`, or open the discussion once
/// everyone alive has spoken.
async fn begin_turn(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    mut game: Game,
) -> Result<Game, ServiceError> {
    let players = registry(state, store).list(game.id).await?;
    let ordered = speaking_order(&players);
    let Some(speaker) = ordered.get(game.turn_index) else {
        game.turn_index = ordered.len();
        return begin_discussion(state, store, game).await;
    };
    let current_player = speaker.username.clone();

    let event = if game.phase == GamePhase::Game {
        PhaseEvent::TurnAdvanced
    } else {
        PhaseEvent::SpeakingStarted
    };
    let next = game.phase.next(event)?;
    let turn_index = game.turn_index;

    start_timed_phase(
        state,
        store,
        game,
        next,
        state.config().phases().turn,
        PhaseTimeout::ForceTurn,
        Some(PhaseDetails::Turn {
            turn_index,
            current_player,
        }),
    )
    .await
}

/// The current speaker ran out of time: mark them spoken and move on.
async fn force_turn(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    mut game: Game,
) -> Result<Game, ServiceError> {
    let registry = registry(state, store);
    let players = registry.list(game.id).await?;
    let Some(speaker) = speaking_order(&players)
        .get(game.turn_index)
        .map(|player| player.username.clone())
    else {
        game.turn_index = speaking_order(&players).len();
        return begin_discussion(state, store, game).await;
    };

    let patch = PlayerPatch {
        has_spoken: Some(true),
        ..Default::default()
    };
    if let Err(err) = registry.update(game.id, &speaker, patch).await {
        warn!(room_id = %game.room_id, username = %speaker, error = %err, "failed to force speaking turn");
    }
    pass_turn(state, store, game, &speaker).await
}

/// Announce that `speaker` is done and hand the floor to the next one.
pub(crate) async fn pass_turn(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    mut game: Game,
    speaker: &str,
) -> Result<Game, ServiceError> {
    game.turn_index += 1;
    events::broadcast_player_spoken(state.connections(), &game.room_id, speaker, game.turn_index);
    begin_turn(state, store, game).await
}

async fn begin_discussion(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game: Game,
) -> Result<Game, ServiceError> {
    let next = game.phase.next(PhaseEvent::SpeakingCompleted)?;
    start_timed_phase(
        state,
        store,
        game,
        next,
        state.config().phases().discussion,
        PhaseTimeout::EndDiscussion,
        None,
    )
    .await
}

async fn begin_voting(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game: Game,
) -> Result<Game, ServiceError> {
    let next = game.phase.next(PhaseEvent::DiscussionElapsed)?;
    registry(state, store).reset_votes(game.id).await?;
    start_timed_phase(
        state,
        store,
        game,
        next,
        state.config().phases().voting,
        PhaseTimeout::ForceVoting,
        None,
    )
    .await
}

/// Register an abstention for every alive player who did not vote.
async fn force_voting(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game: Game,
) -> Result<Game, ServiceError> {
    let registry = registry(state, store);
    for player in registry.list(game.id).await? {
        if !player.is_alive || player.has_voted {
            continue;
        }
        let patch = PlayerPatch {
            has_voted: Some(true),
            ..Default::default()
        };
        if let Err(err) = registry.update(game.id, &player.username, patch).await {
            warn!(room_id = %game.room_id, username = %player.username, error = %err, "failed to register abstention");
        }
    }
    finish_voting(state, store, game).await
}

/// Tally the votes, apply the elimination and show the outcome.
pub(crate) async fn finish_voting(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game: Game,
) -> Result<Game, ServiceError> {
    let next = game.phase.next(PhaseEvent::VotingCompleted)?;
    let registry = registry(state, store);
    let players = registry.list(game.id).await?;
    let outcome = calculate_elimination(&players);

    if let Some(eliminated) = &outcome.eliminated {
        let patch = PlayerPatch {
            is_alive: Some(false),
            order: Some(None),
            ..Default::default()
        };
        registry.update(game.id, eliminated, patch).await?;
        info!(room_id = %game.room_id, game_id = %game.id, username = %eliminated, "player eliminated");
    }

    start_timed_phase(
        state,
        store,
        game,
        next,
        state.config().phases().results,
        PhaseTimeout::ResolveResults,
        Some(PhaseDetails::Results {
            eliminated: outcome.eliminated,
            message: outcome.message,
            reason: outcome.reason,
        }),
    )
    .await
}

/// Results pause elapsed: end the game or start the next round.
async fn resolve_results(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    game: Game,
) -> Result<Game, ServiceError> {
    let config = state.config();
    let players = registry(state, store).list(game.id).await?;
    match check_winner(
        &players,
        game.round,
        game.max_rounds,
        config.impostor_parity_ratio(),
    ) {
        Some(outcome) => session::finish_game(state, store, game, outcome).await,
        None => start_new_round(state, store, game).await,
    }
}

async fn start_new_round(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    mut game: Game,
) -> Result<Game, ServiceError> {
    let next = game.phase.next(PhaseEvent::NextRound)?;
    let registry = registry(state, store);
    registry.reset_for_round(game.id).await?;

    game.round += 1;
    game.turn_index = 0;
    let players = registry.list(game.id).await?;
    let turn_order = assign_turn_order(&registry, &game, &players).await?;
    info!(room_id = %game.room_id, game_id = %game.id, round = game.round, "new round");

    start_timed_phase(
        state,
        store,
        game,
        next,
        state.config().phases().turn_assignment,
        PhaseTimeout::BeginSpeaking,
        Some(PhaseDetails::TurnOrder { turn_order }),
    )
    .await
}
