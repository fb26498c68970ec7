//! Timed phases: persisting a phase start, announcing it and arming its deadline.
//!
//! Every state-changing path of a room runs under that room's gate. Deadline
//! callbacks take the same gate, re-read the persisted game and only act when the
//! phase and epoch they were armed for are still current, so a player action and a
//! deadline racing each other produce exactly one transition.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::game_store::GameStore,
    dto::{
        events::{PhaseChangedEvent, PhaseDetails, PlayerTalkState},
        format_system_time,
    },
    error::ServiceError,
    services::{events, players::PlayerRegistry, progression},
    state::{
        SharedState,
        game::{Game, Player},
        phase::GamePhase,
    },
};

/// What to do when a phase deadline elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTimeout {
    /// Roll for every player who did not.
    ForceDice,
    /// Order pause elapsed; hand the floor to the first speaker.
    BeginSpeaking,
    /// The current speaker ran out of time.
    ForceTurn,
    /// Discussion time is over; open the vote.
    EndDiscussion,
    /// Register abstentions for every player who did not vote.
    ForceVoting,
    /// Results pause elapsed; run the win check.
    ResolveResults,
}

impl PhaseTimeout {
    /// Phase a deadline of this kind was armed in.
    pub fn expected_phase(self) -> GamePhase {
        match self {
            PhaseTimeout::ForceDice => GamePhase::Dice,
            PhaseTimeout::BeginSpeaking => GamePhase::TurnAssignment,
            PhaseTimeout::ForceTurn => GamePhase::Game,
            PhaseTimeout::EndDiscussion => GamePhase::Discussion,
            PhaseTimeout::ForceVoting => GamePhase::Voting,
            PhaseTimeout::ResolveResults => GamePhase::Results,
        }
    }

    /// Deadline action of a persisted phase, used to re-arm games after a restart.
    pub fn for_phase(phase: GamePhase) -> Option<Self> {
        match phase {
            GamePhase::Dice => Some(PhaseTimeout::ForceDice),
            GamePhase::TurnAssignment => Some(PhaseTimeout::BeginSpeaking),
            GamePhase::Game => Some(PhaseTimeout::ForceTurn),
            GamePhase::Discussion => Some(PhaseTimeout::EndDiscussion),
            GamePhase::Voting => Some(PhaseTimeout::ForceVoting),
            GamePhase::Results => Some(PhaseTimeout::ResolveResults),
            GamePhase::Finish => None,
        }
    }
}

/// Pause before a failed deadline runs again.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Registry bound to the installed store and the configured retry budget.
pub(crate) fn registry(state: &SharedState, store: &Arc<dyn GameStore>) -> PlayerRegistry {
    PlayerRegistry::new(Arc::clone(store), state.config().vote_retry_attempts())
}

/// Load the game currently bound to `room_id`.
pub(crate) async fn load_room_game(
    store: &Arc<dyn GameStore>,
    room_id: &str,
) -> Result<Game, ServiceError> {
    let Some(game_id) = store.find_game_for_room(room_id.to_owned()).await? else {
        return Err(ServiceError::NotFound(format!(
            "no game running in room `{room_id}`"
        )));
    };
    load_game(store, game_id).await
}

pub(crate) async fn load_game(
    store: &Arc<dyn GameStore>,
    game_id: Uuid,
) -> Result<Game, ServiceError> {
    store
        .find_game(game_id)
        .await?
        .map(Game::from)
        .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))
}

/// Cancel the pending deadline of a room. Idempotent.
pub fn clear_timer(state: &SharedState, room_id: &str) -> bool {
    state.timers().clear(room_id)
}

/// Enter `next_phase` for `duration`.
///
/// Persists the phase with a fresh epoch and deadline, replaces the room's pending
/// deadline with `on_timeout` and broadcasts one `phaseChanged`. When the write fails
/// nothing changes and the previous deadline stays armed. Callers hold the room gate.
pub async fn start_timed_phase(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    mut game: Game,
    next_phase: GamePhase,
    duration: Duration,
    on_timeout: PhaseTimeout,
    details: Option<PhaseDetails>,
) -> Result<Game, ServiceError> {
    let now = SystemTime::now();
    let deadline = now + duration;
    game.phase = next_phase;
    game.epoch += 1;
    game.phase_deadline = Some(deadline);
    game.updated_at = now;
    store.save_game(game.clone().into()).await?;

    state.timers().start(
        &game.room_id,
        duration,
        run_timeout(
            Arc::clone(state),
            game.room_id.clone(),
            game.id,
            game.epoch,
            on_timeout,
        ),
    );

    info!(
        room_id = %game.room_id,
        game_id = %game.id,
        phase = ?game.phase,
        round = game.round,
        epoch = game.epoch,
        seconds = duration.as_secs(),
        "phase started"
    );

    match registry(state, store).list(game.id).await {
        Ok(players) => events::broadcast_phase_changed(
            state.connections(),
            &game.room_id,
            &phase_changed(&game, &players, Some(duration), details),
        ),
        Err(err) => warn!(
            room_id = %game.room_id,
            game_id = %game.id,
            phase = ?game.phase,
            error = %err,
            "phase started unannounced; players unavailable"
        ),
    }

    Ok(game)
}

/// Build a `phaseChanged` payload for the current state of `game`.
pub(crate) fn phase_changed(
    game: &Game,
    players: &[Player],
    duration: Option<Duration>,
    details: Option<PhaseDetails>,
) -> PhaseChangedEvent {
    PhaseChangedEvent {
        phase: game.phase,
        round: game.round,
        players: players.iter().map(PlayerTalkState::from).collect(),
        end_time: game.phase_deadline.map(format_system_time),
        duration: duration.map(|duration| duration.as_secs()),
        details,
    }
}

/// Deadline callback armed for `(game_id, epoch)`.
///
/// Boxed so the progression functions it dispatches to can arm further deadlines.
pub(crate) fn run_timeout(
    state: SharedState,
    room_id: String,
    game_id: Uuid,
    epoch: u64,
    action: PhaseTimeout,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let _gate = state.gates().lock(&room_id).await;

        let Some(store) = state.game_store().await else {
            warn!(%room_id, %game_id, ?action, "deadline elapsed in degraded mode; retrying");
            retry_later(&state, &room_id, game_id, epoch, action);
            return;
        };

        let game = match load_game(&store, game_id).await {
            Ok(game) => game,
            Err(ServiceError::NotFound(_)) => {
                debug!(%room_id, %game_id, ?action, "deadline elapsed for a closed game");
                return;
            }
            Err(err) => {
                error!(%room_id, %game_id, ?action, error = %err, "failed to load game on deadline");
                retry_later(&state, &room_id, game_id, epoch, action);
                return;
            }
        };

        if game.phase != action.expected_phase() || game.epoch != epoch {
            debug!(
                %room_id,
                %game_id,
                ?action,
                phase = ?game.phase,
                epoch = game.epoch,
                armed_epoch = epoch,
                "stale deadline ignored"
            );
            return;
        }

        debug!(%room_id, %game_id, ?action, epoch, "deadline elapsed");
        if let Err(err) = progression::on_timeout(&state, &store, game, action).await {
            error!(%room_id, %game_id, ?action, error = %err, "forced progression failed");
            retry_later(&state, &room_id, game_id, epoch, action);
        }
    })
}

/// Run the same deadline again after [`RETRY_DELAY`] unless the room already has one.
fn retry_later(
    state: &SharedState,
    room_id: &str,
    game_id: Uuid,
    epoch: u64,
    action: PhaseTimeout,
) {
    if state.timers().is_pending(room_id) {
        return;
    }
    state.timers().start(
        room_id,
        RETRY_DELAY,
        run_timeout(
            Arc::clone(state),
            room_id.to_owned(),
            game_id,
            epoch,
            action,
        ),
    );
}
