mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoGameStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        if err.is_decode_failure() {
            let key = err.record_key();
            StorageError::corrupt(key, err)
        } else {
            StorageError::unavailable(err.to_string(), err)
        }
    }
}
