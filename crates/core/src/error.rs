use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown field {field} on {record}")]
    UnknownField { record: String, field: String },

    #[error("field {field} on {record} is read-only")]
    ReadOnlyField { record: String, field: String },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid data: {0}")]
    InvalidData(String),
}
