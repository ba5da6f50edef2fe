//! Error types for the settlement core
//!
//! Every failure crossing the core boundary is one of five categories. Callers
//! branch on the category to produce the right external response: a
//! misconfigured game must never be billed as a player loss.

use crate::games::types::SettlementResult;
use thiserror::Error;

/// Root error type for all settlement operations
#[derive(Debug, Error)]
pub enum RgsError {
    /// Model missing or unusable, or process configuration rejected
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Malformed request input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown round identifier
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Round already settled or identifier already in use
    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Durable write or read failed; the operation did not take effect
    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),
}

/// Game configuration and process configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("No math model registered for '{0}'")]
    ModelNotFound(String),

    #[error("Math model '{0}' has no tier with positive weight")]
    ModelUnusable(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Request input errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("round id is required")]
    MissingRoundId,

    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("stake must be a positive finite amount, got {0}")]
    InvalidStake(f64),

    #[error("stake {stake} exceeds maximum {max}")]
    StakeAboveLimit { stake: f64, max: f64 },

    #[error("cannot cash out at step {claimed}: current step is {current}")]
    FutureStep { claimed: i64, current: i64 },

    #[error("invalid math model: {0}")]
    InvalidModel(String),

    #[error("choice must be higher or lower, got '{0}'")]
    InvalidChoice(String),
}

/// Lookup errors
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("round '{0}' not found")]
    Round(String),
}

/// State conflicts on a round identifier
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Carries the recorded result so the caller can answer without redrawing
    #[error("round '{round_id}' already settled")]
    AlreadySettled {
        round_id: String,
        result: Box<SettlementResult>,
    },

    #[error("round '{0}' already exists")]
    RoundExists(String),
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    OpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

impl RgsError {
    /// Stable machine-readable code for logs, metrics and API bodies
    pub fn code(&self) -> &'static str {
        match self {
            RgsError::Configuration(ConfigurationError::ModelNotFound(_))
            | RgsError::Configuration(ConfigurationError::ModelUnusable(_)) => "GAME_MISCONFIGURED",
            RgsError::Configuration(_) => "CONFIGURATION_ERROR",
            RgsError::Validation(ValidationError::FutureStep { .. }) => "INVALID_STEP",
            RgsError::Validation(ValidationError::InvalidStake(_))
            | RgsError::Validation(ValidationError::StakeAboveLimit { .. }) => "INVALID_AMOUNT",
            RgsError::Validation(ValidationError::MissingRoundId) => "INVALID_ROUND",
            RgsError::Validation(_) => "INVALID_REQUEST",
            RgsError::NotFound(_) => "ROUND_NOT_FOUND",
            RgsError::Conflict(ConflictError::AlreadySettled { .. }) => "ROUND_SETTLED",
            RgsError::Conflict(ConflictError::RoundExists(_)) => "ROUND_EXISTS",
            RgsError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Short category name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            RgsError::Configuration(_) => "configuration",
            RgsError::Validation(_) => "validation",
            RgsError::NotFound(_) => "not_found",
            RgsError::Conflict(_) => "conflict",
            RgsError::Persistence(_) => "persistence",
        }
    }
}

// External error conversions
impl From<rocksdb::Error> for RgsError {
    fn from(e: rocksdb::Error) -> Self {
        RgsError::Persistence(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<std::io::Error> for RgsError {
    fn from(e: std::io::Error) -> Self {
        RgsError::Persistence(StorageError::ReadFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for RgsError {
    fn from(e: serde_json::Error) -> Self {
        RgsError::Persistence(StorageError::CorruptedData(e.to_string()))
    }
}

// Convenience type alias for Results
pub type RgsResult<T> = Result<T, RgsError>;
