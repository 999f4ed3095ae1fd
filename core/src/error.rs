use thiserror::Error;

/// Feil fra sample-lageret, øktregisteret og persistens.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("session {0} is not active")]
    SessionClosed(String),

    #[error("session already exists: {0}")]
    DuplicateSession(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Tagget resultat fra sensorlesing – kalleren bestemmer fallback-policy.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("device responded with status {0}")]
    Status(u16),

    #[error("malformed device payload: {0}")]
    Malformed(String),

    #[error("device payload carried no channel for {0}")]
    NoChannels(crate::models::TestType),
}

/// Feil fra tekstgenereringstjenesten.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor service unreachable: {0}")]
    Unavailable(String),

    #[error("advisor service returned an empty answer")]
    EmptyAnswer,

    #[error("missing api key (env {0})")]
    MissingApiKey(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error at {path}: {message}")]
    Parse { path: String, message: String },
}

/// Paraplyfeil for API-kanten (binær og Python-bindinger).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Advisor(#[from] AdvisorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
