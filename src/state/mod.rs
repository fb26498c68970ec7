/// Live WebSocket connections.
pub mod connections;
/// Domain view of rooms, games and players.
pub mod game;
pub mod gates;
pub mod phase;
/// Phase deadline tasks.
pub mod timers;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::game_store::GameStore,
    error::ServiceError,
    services::dice::{DiceSource, RandomDice},
};

pub use self::connections::{ConnectionRegistry, PlayerConnection};
pub use self::gates::RoomGates;
pub use self::timers::PhaseTimers;

pub type SharedState = Arc<AppState>;

/// Central application state: configuration, storage handle and the per-room registries.
pub struct AppState {
    config: Arc<AppConfig>,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    connections: ConnectionRegistry,
    timers: PhaseTimers,
    gates: RoomGates,
    dice: Arc<dyn DiceSource>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let dice = Arc::new(RandomDice::new(config.dice_seed()));
        Self::with_dice(config, dice)
    }

    /// Same as [`AppState::new`] with an explicit dice source.
    pub fn with_dice(config: AppConfig, dice: Arc<dyn DiceSource>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            connections: ConnectionRegistry::new(),
            timers: PhaseTimers::new(),
            gates: RoomGates::new(),
            dice,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store or [`ServiceError::Degraded`].
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn timers(&self) -> &PhaseTimers {
        &self.timers
    }

    /// Per-room mutexes serializing every state change.
    pub fn gates(&self) -> &RoomGates {
        &self.gates
    }

    pub fn dice(&self) -> &dyn DiceSource {
        self.dice.as_ref()
    }
}
