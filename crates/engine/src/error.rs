use draftwork_core::CoreError;
use draftwork_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("item not found: {0}")]
    NotFound(String),

    #[error("item already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("language not loaded: {0}")]
    LanguageNotLoaded(String),

    #[error("wrong key or item type: expected {expected}")]
    KeyType { expected: &'static str },
}
