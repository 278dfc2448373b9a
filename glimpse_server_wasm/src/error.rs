//! Error types for the WASM signaling server

use glimpse_protocol::UserId;
use thiserror::Error;

/// Errors that can occur during signaling
#[derive(Error, Debug)]
pub enum SignalingError {
    /// Referenced room is not in the store
    #[error("room does not exist")]
    RoomNotFound,

    /// Join request is unknown or was already approved/denied
    #[error("join request does not exist")]
    RequestNotFound,

    /// Host-only action attempted by someone else
    #[error("user is not the room host")]
    NotHost,

    /// Caller is neither host nor guest of the room
    #[error("user is not in this room")]
    NotParticipant,

    /// Approving would replace a guest that is already admitted
    #[error("room already has a guest")]
    GuestAlreadyPresent,

    /// Relay attempted before any guest was admitted
    #[error("room has no guest yet")]
    NoGuest,

    /// No live connection for the recipient
    #[error("user {0} is not connected")]
    UserNotConnected(UserId),

    /// Malformed inbound envelope or empty identity
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Failed to send message to a connection
    #[error("Failed to send message: {0}")]
    SendError(String),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from client requests
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// A required field or query parameter was absent or empty
    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),

    /// Request did not identify its user
    #[error("Missing or invalid x-user-id header")]
    MissingUserHeader,

    /// Body exceeds the configured limit
    #[error("Payload too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: usize },

    /// Body could not be read
    #[error("Failed to read body: {0}")]
    Body(String),

    /// JSON parsing error
    #[error("Invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// A size or time limit was set to zero
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    /// Allowed origin is not a valid header value
    #[error("Allowed origin is not a valid header value")]
    InvalidOrigin,

    #[error("State persistence is enabled but no state file is set")]
    MissingStateFile,
}

/// Errors reading or writing the state snapshot
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is not a valid snapshot: {0}")]
    Json(#[from] serde_json::Error),
}
