use thiserror::Error;

/// Main error type for the herder supervisor
#[derive(Debug, Error)]
pub enum HerderError {
    // Program registry errors
    #[error("Program already exists: {0}")]
    ProgramAlreadyExists(String),

    #[error("Program not found: {0}")]
    ProgramNotFound(String),

    #[error("Invalid program definition: {0}")]
    InvalidProgram(String),

    #[error("Programs cannot be added once watching has started")]
    WatchStarted,

    // Process errors
    #[error("Failed to spawn process: {0}")]
    SpawnError(String),

    #[error("Failed to resolve run-as identity: {0}")]
    UserLookup(String),

    // Configuration errors
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    #[error("Logging setup failed: {0}")]
    LogError(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    // IO errors (signal registration and the like)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for herder operations
pub type Result<T> = std::result::Result<T, HerderError>;
