//! Error Types
//!
//! Absence of a record, an id or an index entry is never an error in FlashMap:
//! lookups return `Ok(None)` or an empty collection. The errors below cover
//! transport failures, codec failures and lifecycle misuse.

use crate::adapter::lifecycle::State;
use thiserror::Error;

/// Errors reported by a [`KeyValueStore`](crate::storage::KeyValueStore).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The key holds a different kind of value than the command expects
    #[error("WRONGTYPE operation against key '{key}' holding the wrong kind of value")]
    WrongType { key: String },

    /// The underlying connection failed
    #[error("connection failure: {0}")]
    Connection(String),

    /// The store does not implement the command
    #[error("command not supported: {0}")]
    Unsupported(&'static str),
}

/// Errors raised while converting between objects and buckets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// serde_json failed to serialize the object
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A custom serde error raised while reading a bucket
    #[error("{0}")]
    Message(String),

    /// Only structs and maps can be written to a bucket
    #[error("top-level value must be an object")]
    NotAnObject,

    /// A stored field could not be parsed as the requested scalar type
    #[error("invalid value '{value}' at '{path}'")]
    InvalidScalar { path: String, value: String },
}

impl serde::de::Error for CodecError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        CodecError::Message(msg.to_string())
    }
}

/// Errors raised by lifecycle transitions and listener wiring.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The requested transition is not allowed from the current state
    #[error("cannot transition from {from:?} to {to:?}")]
    InvalidTransition { from: State, to: State },

    /// The adapter was destroyed and cannot be restarted
    #[error("adapter has been destroyed")]
    Destroyed,

    /// A managed listener container already exists
    #[error("cannot set a listener container after a managed container was initialized")]
    ContainerAlreadyInitialized,

    /// Listener tasks need a Tokio runtime
    #[error("no Tokio runtime available to run the listener container")]
    NoRuntime,
}

/// Top-level error type of the mapping engine.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Result type used throughout the mapping engine.
pub type Result<T> = std::result::Result<T, MappingError>;

/// Result type of store primitives.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
