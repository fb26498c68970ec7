//! Per-game player state on top of the store's revision-checked writes.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::GameStore,
        models::PlayerEntity,
        storage::StorageError,
    },
    state::game::{DicePair, Player, Role},
};

const BACKOFF_BASE_MS: u64 = 2;
const BACKOFF_CAP_MS: u64 = 100;

#[derive(Debug, Error)]
/// Failures of [`PlayerRegistry`] operations.
pub enum PlayerRegistryError {
    /// The game has no such player.
    #[error("player `{username}` not found in game {game_id}")]
    NotFound { game_id: Uuid, username: String },
    #[error("player record `{key}` is corrupt")]
    Corrupt {
        key: String,
        #[source]
        source: StorageError,
    },
    /// Every compare-and-swap attempt lost against a concurrent writer.
    #[error("gave up updating `{username}` after {attempts} conflicting attempts")]
    TooManyConflicts { username: String, attempts: u32 },
    /// Any other store failure.
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for PlayerRegistryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupt { ref key, .. } => PlayerRegistryError::Corrupt {
                key: key.clone(),
                source: err,
            },
            other => PlayerRegistryError::Storage(other),
        }
    }
}

pub type RegistryResult<T> = Result<T, PlayerRegistryError>;

/// Fields needed to seat a player in a new game.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub username: String,
    pub role: Role,
    pub color: String,
    pub dice: DicePair,
    /// Speaking position, usually assigned later.
    pub order: Option<u32>,
}

/// Partial update merged into a stored player.
#[derive(Debug, Clone, Default)]
pub struct PlayerPatch {
    pub has_rolled: Option<bool>,
    pub has_spoken: Option<bool>,
    pub has_voted: Option<bool>,
    /// Only `false` has an effect: elimination is permanent.
    pub is_alive: Option<bool>,
    pub can_talk: Option<bool>,
    pub order: Option<Option<u32>>,
    pub votes_received: Option<u32>,
}

impl PlayerPatch {
    fn apply(&self, player: &mut PlayerEntity) {
        if let Some(value) = self.has_rolled {
            player.has_rolled = value;
        }
        if let Some(value) = self.has_spoken {
            player.has_spoken = value;
        }
        if let Some(value) = self.has_voted {
            player.has_voted = value;
        }
        if let Some(value) = self.is_alive {
            player.is_alive = player.is_alive && value;
        }
        if let Some(value) = self.can_talk {
            player.can_talk = value;
        }
        if let Some(value) = self.order {
            player.order = value;
        }
        if let Some(value) = self.votes_received {
            player.votes_received = value;
        }
    }
}

/// Create, read and update the players of a game.
#[derive(Clone)]
pub struct PlayerRegistry {
    store: Arc<dyn GameStore>,
    max_attempts: u32,
}

impl PlayerRegistry {
    /// `max_attempts` is clamped to at least one.
    pub fn new(store: Arc<dyn GameStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Seat a player with default flags.
    pub async fn create(&self, game_id: Uuid, new: NewPlayer) -> RegistryResult<Player> {
        let player = Player {
            username: new.username,
            role: new.role,
            color: new.color,
            dice: new.dice,
            order: new.order,
            has_rolled: false,
            has_spoken: false,
            has_voted: false,
            is_alive: true,
            can_talk: true,
            votes_received: 0,
        };
        self.store
            .insert_player(game_id, player.clone().into())
            .await?;
        Ok(player)
    }

    pub async fn find(&self, game_id: Uuid, username: &str) -> RegistryResult<Player> {
        self.store
            .find_player(game_id, username.to_owned())
            .await?
            .map(|record| record.value.into())
            .ok_or_else(|| PlayerRegistryError::NotFound {
                game_id,
                username: username.to_owned(),
            })
    }

    /// Players of a game in seating order.
    pub async fn list(&self, game_id: Uuid) -> RegistryResult<Vec<Player>> {
        let players = self.store.list_players(game_id).await?;
        Ok(players.into_iter().map(Into::into).collect())
    }

    /// Merge `patch` into the stored player.
    pub async fn update(
        &self,
        game_id: Uuid,
        username: &str,
        patch: PlayerPatch,
    ) -> RegistryResult<Player> {
        self.compare_and_swap(game_id, username, |player| patch.apply(player))
            .await
    }

    /// Add one vote to `username` and return the new count.
    pub async fn increment_votes(&self, game_id: Uuid, username: &str) -> RegistryResult<u32> {
        let player = self
            .compare_and_swap(game_id, username, |player| {
                player.votes_received = player.votes_received.saturating_add(1);
            })
            .await?;
        Ok(player.votes_received)
    }

    /// Clear vote state of every alive player before a voting phase.
    pub async fn reset_votes(&self, game_id: Uuid) -> RegistryResult<()> {
        self.reset_alive(
            game_id,
            PlayerPatch {
                has_voted: Some(false),
                votes_received: Some(0),
                ..Default::default()
            },
        )
        .await
    }

    /// Clear per-round flags of every alive player.
    pub async fn reset_for_round(&self, game_id: Uuid) -> RegistryResult<()> {
        self.reset_alive(
            game_id,
            PlayerPatch {
                has_rolled: Some(false),
                has_spoken: Some(false),
                has_voted: Some(false),
                votes_received: Some(0),
                ..Default::default()
            },
        )
        .await
    }

    async fn reset_alive(&self, game_id: Uuid, patch: PlayerPatch) -> RegistryResult<()> {
        for player in self.list(game_id).await? {
            if !player.is_alive {
                continue;
            }
            self.update(game_id, &player.username, patch.clone()).await?;
        }
        Ok(())
    }

    /// Read, modify and conditionally write one player, retrying with jittered
    /// backoff when another writer changed the record in between.
    pub async fn compare_and_swap<F>(
        &self,
        game_id: Uuid,
        username: &str,
        mut modify: F,
    ) -> RegistryResult<Player>
    where
        F: FnMut(&mut PlayerEntity) + Send,
    {
        for attempt in 0..self.max_attempts {
            let record = self
                .store
                .find_player(game_id, username.to_owned())
                .await?
                .ok_or_else(|| PlayerRegistryError::NotFound {
                    game_id,
                    username: username.to_owned(),
                })?;

            let mut next = record.value;
            modify(&mut next);

            match self
                .store
                .replace_player(game_id, next.clone(), record.revision)
                .await
            {
                Ok(_) => return Ok(next.into()),
                Err(StorageError::Conflict { key }) => {
                    debug!(%game_id, %username, %key, attempt, "player write conflict; retrying");
                    sleep(backoff(attempt)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(%game_id, %username, attempts = self.max_attempts, "player update kept conflicting");
        Err(PlayerRegistryError::TooManyConflicts {
            username: username.to_owned(),
            attempts: self.max_attempts,
        })
    }
}

fn backoff(attempt: u32) -> Duration {
    let ceiling = BACKOFF_BASE_MS
        .saturating_mul(1u64 << attempt.min(6))
        .min(BACKOFF_CAP_MS);
    Duration::from_millis(rand::rng().random_range(0..=ceiling))
}
