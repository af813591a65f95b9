//! Error types for Event Desk.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Bot error: {0}")]
    Bot(#[from] BotError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Failures of a single conversational interaction.
///
/// Every variant is caught by the bot router; none of them terminate the
/// listening process.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Inbound update carries no user identity")]
    IdentityMissing,

    #[error("Validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("User {identity} has not completed onboarding")]
    NotOnboarded { identity: String },

    #[error("Invalid selection payload: {payload}")]
    InvalidSelection { payload: String },

    #[error("Unknown session state {raw:?} for {identity}")]
    CorruptSession { identity: String, raw: String },

    #[error("Store failure: {0}")]
    Store(#[from] DatabaseError),

    #[error("Dispatch failure: {0}")]
    Dispatch(#[from] ChannelError),
}
