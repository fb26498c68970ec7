/// In-process store used by default and in tests.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{GameEntity, PlayerEntity, Revision, RoomEntity, Versioned};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the durable store holding rooms, games and per-game players.
///
/// Single-record writes are atomic. Player records additionally carry a
/// [`Revision`] so callers can perform compare-and-swap updates through
/// [`GameStore::replace_player`].
pub trait GameStore: Send + Sync {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_room(&self, id: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    fn delete_room(&self, id: String) -> BoxFuture<'static, StorageResult<bool>>;

    /// Upsert a game and refresh the room -> game index and the active-games set.
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    fn find_game_for_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<Uuid>>>;
    fn list_active_games(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>>;
    /// Remove a game, its players and every index entry pointing at it.
    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Insert or overwrite a player record unconditionally.
    fn insert_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>>;
    fn find_player(
        &self,
        game_id: Uuid,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PlayerEntity>>>>;
    /// Players of a game in insertion order.
    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Replace a player record only if it is still at `expected`.
    ///
    /// Fails with [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict)
    /// when another writer got there first.
    fn replace_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<Revision>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
