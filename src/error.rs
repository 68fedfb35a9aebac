//! Crate-wide error taxonomy. Each variant is a distinct failure kind the
//! caller may need to match on; low-level storage failures
//! are wrapped rather than flattened so the originating `sqlx` error is
//! never lost.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("store was bootstrapped with a different schema or version")]
    IncompatibleSchema,

    #[error("unsafe identifier '{0}': must match ^[A-Za-z0-9_]+$")]
    UnsafeIdentifier(String),

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("cannot register object '{id}' with union type '{typename}'; register with a concrete subtype")]
    AmbiguousType { id: String, typename: String },

    #[error("object id '{id}' already registered as '{existing}', cannot re-register as '{attempted}'")]
    InconsistentType {
        id: String,
        existing: String,
        attempted: String,
    },

    #[error("no connection registered for object '{object_id}' field '{fieldname}'")]
    UnknownConnection { object_id: String, fieldname: String },

    #[error("operation attempted while already inside a transaction")]
    AlreadyInTransaction,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
