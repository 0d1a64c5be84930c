use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("key collision: {key}")]
    Collision { key: String },

    #[error("not loaded: {0}")]
    NotLoaded(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("core error: {0}")]
    Core(#[from] draftwork_core::CoreError),
}

impl From<rmp_serde::encode::Error> for StorageError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StorageError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
