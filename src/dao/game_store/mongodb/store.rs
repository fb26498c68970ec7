use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoGameDocument, MongoPlayerDocument, MongoRoomDocument, player_key, string_id},
};
use crate::dao::{
    game_store::GameStore,
    models::{GameEntity, PlayerEntity, Revision, RoomEntity, Versioned},
    storage::{StorageError, StorageResult},
};

const ROOM_COLLECTION_NAME: &str = "rooms";
const GAME_COLLECTION_NAME: &str = "games";
const PLAYER_COLLECTION_NAME: &str = "players";

#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        // room -> game lookup; at most one active game per room
        let games = self.games().await;
        let room_index = mongodb::IndexModel::builder()
            .keys(doc! {"room_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("game_room_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        games
            .create_index(room_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: GAME_COLLECTION_NAME,
                index: "room_id",
                source,
            })?;

        let players = self.players().await;
        let player_index = mongodb::IndexModel::builder()
            .keys(doc! {"game_id": 1, "seq": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_game_idx".to_owned()))
                    .build(),
            )
            .build();
        players
            .create_index(player_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "game_id,seq",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.database()
            .await
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    async fn games(&self) -> Collection<MongoGameDocument> {
        self.database()
            .await
            .collection::<MongoGameDocument>(GAME_COLLECTION_NAME)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        self.database()
            .await
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME)
    }

    async fn save_room(&self, room: RoomEntity) -> MongoResult<()> {
        let id = room.id.clone();
        let document: MongoRoomDocument = room.into();
        self.rooms()
            .await
            .replace_one(string_id(&id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRoom { id, source })?;
        Ok(())
    }

    async fn find_room(&self, id: String) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(string_id(&id))
            .await
            .map_err(|source| MongoDaoError::LoadRoom { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn delete_room(&self, id: String) -> MongoResult<bool> {
        let result = self
            .rooms()
            .await
            .delete_one(string_id(&id))
            .await
            .map_err(|source| MongoDaoError::DeleteRoom { id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn save_game(&self, game: GameEntity) -> MongoResult<()> {
        let id = game.id.to_string();
        let document: MongoGameDocument = game.into();
        self.games()
            .await
            .replace_one(string_id(&id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveGame { id, source })?;
        Ok(())
    }

    async fn find_game(&self, id: Uuid) -> StorageResult<Option<GameEntity>> {
        let key = id.to_string();
        let document = self
            .games()
            .await
            .find_one(string_id(&key))
            .await
            .map_err(|source| MongoDaoError::LoadGame {
                id: key.clone(),
                source,
            })?;

        document
            .map(GameEntity::try_from)
            .transpose()
            .map_err(|err| StorageError::corrupt(key, err))
    }

    async fn find_game_for_room(&self, room_id: String) -> StorageResult<Option<Uuid>> {
        let document = self
            .games()
            .await
            .find_one(doc! {"room_id": &room_id})
            .await
            .map_err(|source| MongoDaoError::LoadGame {
                id: room_id.clone(),
                source,
            })?;

        document
            .map(|doc| GameEntity::try_from(doc).map(|game| game.id))
            .transpose()
            .map_err(|err| StorageError::corrupt(room_id, err))
    }

    async fn list_active_games(&self) -> MongoResult<Vec<Uuid>> {
        let documents: Vec<MongoGameDocument> = self
            .games()
            .await
            .find(doc! {})
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?;

        Ok(documents
            .into_iter()
            .filter_map(|doc| GameEntity::try_from(doc).ok().map(|game| game.id))
            .collect())
    }

    async fn delete_game(&self, id: Uuid) -> MongoResult<bool> {
        let key = id.to_string();
        self.players()
            .await
            .delete_many(doc! {"game_id": &key})
            .await
            .map_err(|source| MongoDaoError::DeleteGame {
                id: key.clone(),
                source,
            })?;
        let result = self
            .games()
            .await
            .delete_one(string_id(&key))
            .await
            .map_err(|source| MongoDaoError::DeleteGame { id: key, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn find_player_document(&self, key: &str) -> MongoResult<Option<MongoPlayerDocument>> {
        self.players()
            .await
            .find_one(string_id(key))
            .await
            .map_err(|source| MongoDaoError::LoadPlayer {
                key: key.to_owned(),
                source,
            })
    }

    /// Unconditional overwrite: the version still moves forward so earlier
    /// readers lose their conditional replace.
    async fn insert_player(&self, game_id: Uuid, player: PlayerEntity) -> MongoResult<Revision> {
        let game_key = game_id.to_string();
        let key = player_key(&game_key, &player.username);
        let collection = self.players().await;

        let (seq, version) = match self.find_player_document(&key).await? {
            Some(existing) => (existing.seq, existing.version + 1),
            None => {
                let count = collection
                    .count_documents(doc! {"game_id": &game_key})
                    .await
                    .map_err(|source| MongoDaoError::SavePlayer {
                        key: key.clone(),
                        source,
                    })?;
                (count as i64, 1)
            }
        };

        let document = MongoPlayerDocument {
            key: key.clone(),
            game_id: game_key,
            seq,
            version,
            player,
        };
        collection
            .replace_one(string_id(&key), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SavePlayer { key, source })?;

        Ok(Revision::new(version.to_string()))
    }

    async fn find_player(
        &self,
        game_id: Uuid,
        username: String,
    ) -> MongoResult<Option<Versioned<PlayerEntity>>> {
        let key = player_key(&game_id.to_string(), &username);
        let document = self.find_player_document(&key).await?;
        Ok(document.map(|doc| Versioned {
            value: doc.player,
            revision: Revision::new(doc.version.to_string()),
        }))
    }

    async fn list_players(&self, game_id: Uuid) -> MongoResult<Vec<PlayerEntity>> {
        let game_key = game_id.to_string();
        let mut cursor = self
            .players()
            .await
            .find(doc! {"game_id": &game_key})
            .sort(doc! {"seq": 1})
            .await
            .map_err(|source| MongoDaoError::ListPlayers {
                game_id: game_key.clone(),
                source,
            })?;

        let mut players = Vec::new();
        while let Some(item) = cursor.next().await {
            match item {
                Ok(document) => players.push(document.player),
                Err(source) => {
                    let err = MongoDaoError::ListPlayers {
                        game_id: game_key.clone(),
                        source,
                    };
                    if err.is_decode_failure() {
                        warn!(game_id = %game_key, error = %err, "skipping undecodable player record");
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Ok(players)
    }

    async fn replace_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
        expected: Revision,
    ) -> StorageResult<Revision> {
        let game_key = game_id.to_string();
        let key = player_key(&game_key, &player.username);
        let expected_version: i64 = expected
            .as_str()
            .parse()
            .map_err(|_| StorageError::conflict(key.clone()))?;

        let Some(current) = self.find_player_document(&key).await? else {
            return Err(StorageError::conflict(key));
        };
        if current.version != expected_version {
            return Err(StorageError::conflict(key));
        }

        let next_version = expected_version + 1;
        let document = MongoPlayerDocument {
            key: key.clone(),
            game_id: game_key,
            seq: current.seq,
            version: next_version,
            player,
        };
        let result = self
            .players()
            .await
            .replace_one(doc! {"_id": &key, "version": expected_version}, &document)
            .await
            .map_err(|source| MongoDaoError::SavePlayer {
                key: key.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            return Err(StorageError::conflict(key));
        }
        Ok(Revision::new(next_version.to_string()))
    }
}

impl GameStore for MongoGameStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_room(room).await.map_err(Into::into) })
    }

    fn find_room(&self, id: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_room(id).await.map_err(Into::into) })
    }

    fn delete_room(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_room(id).await.map_err(Into::into) })
    }

    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_game(game).await.map_err(Into::into) })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(id).await })
    }

    fn find_game_for_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game_for_room(room_id).await })
    }

    fn list_active_games(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { store.list_active_games().await.map_err(Into::into) })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_game(id).await.map_err(Into::into) })
    }

    fn insert_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.insert_player(game_id, player).await.map_err(Into::into) })
    }

    fn find_player(
        &self,
        game_id: Uuid,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PlayerEntity>>>> {
        let store = self.clone();
        Box::pin(async move { store.find_player(game_id, username).await.map_err(Into::into) })
    }

    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_players(game_id).await.map_err(Into::into) })
    }

    fn replace_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.replace_player(game_id, player, expected).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
