use mongodb::error::{Error as MongoError, ErrorKind};
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save room `{id}`")]
    SaveRoom {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load room `{id}`")]
    LoadRoom {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete room `{id}`")]
    DeleteRoom {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save game `{id}`")]
    SaveGame {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load game `{id}`")]
    LoadGame {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete game `{id}`")]
    DeleteGame {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list active games")]
    ListGames {
        #[source]
        source: MongoError,
    },
    #[error("failed to save player `{key}`")]
    SavePlayer {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load player `{key}`")]
    LoadPlayer {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list players of game `{game_id}`")]
    ListPlayers {
        game_id: String,
        #[source]
        source: MongoError,
    },
}

impl MongoDaoError {
    fn mongo_source(&self) -> Option<&MongoError> {
        match self {
            Self::MissingEnvVar { .. } => None,
            Self::InvalidUri { source, .. }
            | Self::ClientConstruction { source }
            | Self::InitialPing { source, .. }
            | Self::HealthPing { source }
            | Self::EnsureIndex { source, .. }
            | Self::SaveRoom { source, .. }
            | Self::LoadRoom { source, .. }
            | Self::DeleteRoom { source, .. }
            | Self::SaveGame { source, .. }
            | Self::LoadGame { source, .. }
            | Self::DeleteGame { source, .. }
            | Self::ListGames { source }
            | Self::SavePlayer { source, .. }
            | Self::LoadPlayer { source, .. }
            | Self::ListPlayers { source, .. } => Some(source),
        }
    }

    /// Whether the driver failed to decode a stored document.
    pub fn is_decode_failure(&self) -> bool {
        self.mongo_source()
            .is_some_and(|source| matches!(*source.kind, ErrorKind::BsonDeserialization(_)))
    }

    /// Identifier of the record the operation was about, if any.
    pub fn record_key(&self) -> String {
        match self {
            Self::SaveRoom { id, .. }
            | Self::LoadRoom { id, .. }
            | Self::DeleteRoom { id, .. }
            | Self::SaveGame { id, .. }
            | Self::LoadGame { id, .. }
            | Self::DeleteGame { id, .. } => id.clone(),
            Self::SavePlayer { key, .. } | Self::LoadPlayer { key, .. } => key.clone(),
            Self::ListPlayers { game_id, .. } => game_id.clone(),
            _ => String::from("unknown"),
        }
    }
}
