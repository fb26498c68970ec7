//! In-process store backed by concurrent maps. Player records are kept as raw
//! JSON documents so decoding behaves like a document database.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    game_store::GameStore,
    models::{GameEntity, PlayerEntity, Revision, RoomEntity, Versioned},
    storage::{StorageError, StorageResult},
};

#[derive(Clone, Default)]
/// [`GameStore`] kept in `DashMap`s; clones share the same data.
pub struct MemoryGameStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    rooms: DashMap<String, RoomEntity>,
    games: DashMap<Uuid, GameEntity>,
    room_games: DashMap<String, Uuid>,
    active_games: DashSet<Uuid>,
    players: DashMap<Uuid, IndexMap<String, StoredDocument>>,
}

struct StoredDocument {
    revision: u64,
    body: Value,
}

impl StoredDocument {
    fn revision(&self) -> Revision {
        Revision::new(self.revision.to_string())
    }
}

fn player_key(game_id: Uuid, username: &str) -> String {
    format!("game:{game_id}:player:{username}")
}

fn encode(game_id: Uuid, player: &PlayerEntity) -> StorageResult<Value> {
    serde_json::to_value(player).map_err(|err| StorageError::corrupt(player_key(game_id, &player.username), err))
}

fn decode(game_id: Uuid, username: &str, body: &Value) -> StorageResult<PlayerEntity> {
    serde_json::from_value(body.clone())
        .map_err(|err| StorageError::corrupt(player_key(game_id, username), err))
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw JSON document for a player, bypassing model encoding.
    pub fn insert_raw_player(&self, game_id: Uuid, username: &str, body: Value) {
        let mut players = self.inner.players.entry(game_id).or_default();
        let revision = players
            .get(username)
            .map(|doc| doc.revision + 1)
            .unwrap_or(1);
        players.insert(username.to_string(), StoredDocument { revision, body });
    }
}

impl MemoryInner {
    fn save_game(&self, game: GameEntity) {
        self.room_games.insert(game.room_id.clone(), game.id);
        self.active_games.insert(game.id);
        self.games.insert(game.id, game);
    }

    fn delete_game(&self, id: Uuid) -> bool {
        let removed = self.games.remove(&id);
        self.players.remove(&id);
        self.active_games.remove(&id);
        if let Some((_, game)) = &removed {
            self.room_games
                .remove_if(&game.room_id, |_, indexed| *indexed == id);
        }
        removed.is_some()
    }

    fn insert_player(&self, game_id: Uuid, player: PlayerEntity) -> StorageResult<Revision> {
        let body = encode(game_id, &player)?;
        let mut players = self.players.entry(game_id).or_default();
        let revision = players
            .get(&player.username)
            .map(|doc| doc.revision + 1)
            .unwrap_or(1);
        let document = StoredDocument { revision, body };
        let rev = document.revision();
        players.insert(player.username, document);
        Ok(rev)
    }

    fn find_player(
        &self,
        game_id: Uuid,
        username: &str,
    ) -> StorageResult<Option<Versioned<PlayerEntity>>> {
        let Some(players) = self.players.get(&game_id) else {
            return Ok(None);
        };
        let Some(document) = players.get(username) else {
            return Ok(None);
        };
        let value = decode(game_id, username, &document.body)?;
        Ok(Some(Versioned {
            value,
            revision: document.revision(),
        }))
    }

    fn list_players(&self, game_id: Uuid) -> Vec<PlayerEntity> {
        let Some(players) = self.players.get(&game_id) else {
            return Vec::new();
        };
        players
            .iter()
            .filter_map(|(username, document)| match decode(game_id, username, &document.body) {
                Ok(player) => Some(player),
                Err(err) => {
                    warn!(%game_id, %username, error = %err, "skipping undecodable player record");
                    None
                }
            })
            .collect()
    }

    fn replace_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
        expected: Revision,
    ) -> StorageResult<Revision> {
        let key = player_key(game_id, &player.username);
        let body = encode(game_id, &player)?;
        let mut players = self
            .players
            .get_mut(&game_id)
            .ok_or_else(|| StorageError::conflict(key.clone()))?;
        let document = players
            .get_mut(&player.username)
            .ok_or_else(|| StorageError::conflict(key.clone()))?;

        if document.revision() != expected {
            return Err(StorageError::conflict(key));
        }

        document.revision += 1;
        document.body = body;
        Ok(document.revision())
    }
}

impl GameStore for MemoryGameStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.rooms.insert(room.id.clone(), room);
            Ok(())
        })
    }

    fn find_room(&self, id: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.rooms.get(&id).map(|room| room.clone())) })
    }

    fn delete_room(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.rooms.remove(&id).is_some()) })
    }

    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.save_game(game);
            Ok(())
        })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.games.get(&id).map(|game| game.clone())) })
    }

    fn find_game_for_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.room_games.get(&room_id).map(|id| *id)) })
    }

    fn list_active_games(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.active_games.iter().map(|id| *id).collect()) })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.delete_game(id)) })
    }

    fn insert_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.inner.insert_player(game_id, player) })
    }

    fn find_player(
        &self,
        game_id: Uuid,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PlayerEntity>>>> {
        let store = self.clone();
        Box::pin(async move { store.inner.find_player(game_id, &username) })
    }

    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.list_players(game_id)) })
    }

    fn replace_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.inner.replace_player(game_id, player, expected) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{PhaseEntity, RoleEntity, SecretsEntity};

    fn player(username: &str) -> PlayerEntity {
        PlayerEntity {
            username: username.into(),
            role: RoleEntity::Civilian,
            color: "#ffffff".into(),
            dice1: 1,
            dice2: 2,
            order: None,
            has_rolled: false,
            has_spoken: false,
            has_voted: false,
            is_alive: true,
            can_talk: true,
            votes_received: 0,
        }
    }

    fn game(room_id: &str) -> GameEntity {
        GameEntity {
            id: Uuid::new_v4(),
            room_id: room_id.into(),
            phase: PhaseEntity::Dice,
            round: 1,
            max_rounds: 3,
            turn_index: 0,
            phase_deadline: None,
            epoch: 0,
            secrets: SecretsEntity {
                category: "food".into(),
                civilian_word: "apple".into(),
                impostor_word: "pear".into(),
            },
            created_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn replace_with_stale_revision_conflicts() {
        let store = MemoryGameStore::new();
        let game_id = Uuid::new_v4();
        let rev = store.insert_player(game_id, player("alice")).await.unwrap();

        let mut updated = player("alice");
        updated.votes_received = 1;
        let next = store
            .replace_player(game_id, updated.clone(), rev.clone())
            .await
            .unwrap();
        assert_ne!(next, rev);

        let err = store.replace_player(game_id, updated, rev).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn corrupt_document_fails_find_and_is_skipped_by_list() {
        let store = MemoryGameStore::new();
        let game_id = Uuid::new_v4();
        store.insert_player(game_id, player("alice")).await.unwrap();
        store.insert_raw_player(game_id, "bob", serde_json::json!({"username": 42}));

        let err = store.find_player(game_id, "bob".into()).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));

        let players = store.list_players(game_id).await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].username, "alice");
    }

    #[tokio::test]
    async fn delete_game_clears_indexes_and_players() {
        let store = MemoryGameStore::new();
        let game = game("ABC123");
        let id = game.id;
        store.save_game(game).await.unwrap();
        store.insert_player(id, player("alice")).await.unwrap();

        assert_eq!(store.find_game_for_room("ABC123".into()).await.unwrap(), Some(id));
        assert_eq!(store.list_active_games().await.unwrap(), vec![id]);

        assert!(store.delete_game(id).await.unwrap());
        assert!(store.find_game_for_room("ABC123".into()).await.unwrap().is_none());
        assert!(store.list_active_games().await.unwrap().is_empty());
        assert!(store.list_players(id).await.unwrap().is_empty());
        assert!(!store.delete_game(id).await.unwrap());
    }
}
