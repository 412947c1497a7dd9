//! Error types for AutoMudae.

use std::time::Duration;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Correlation error: {0}")]
    Correlation(#[from] CorrelationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },
}

/// A message that matched a known shape but is missing required fields.
///
/// These are logged and dropped; a partially built event never leaves the classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Roll {message_id} has no character name")]
    MissingCharacter { message_id: u64 },

    #[error("Roll {message_id} has no series or kakera value (is $togglekakerarolls enabled?)")]
    MissingSeriesOrKakera { message_id: u64 },

    #[error("Roll {message_id} has an unreadable kakera value: {raw}")]
    InvalidKakera { message_id: u64, raw: String },
}

/// Owner resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    #[error("Owner not found for message {message_id}: searched the past {searched:?}")]
    OwnerNotFound { message_id: u64, searched: Duration },

    #[error("History lookup failed: {0}")]
    History(#[from] ChannelError),
}

/// Session wiring errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Queue {0} closed")]
    QueueClosed(&'static str),

    #[error("Invalid schedule: {0}")]
    Schedule(String),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
