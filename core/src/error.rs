use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResonanceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed fingerprint for '{entity_id}': {reason}")]
    MalformedFingerprint { entity_id: String, reason: String },

    #[error("Invalid pillar value '{value}'")]
    InvalidPillar { value: String },

    #[error("Insufficient samples: {similar} similar, {dissimilar} dissimilar")]
    InsufficientSamples { similar: usize, dissimilar: usize },

    #[error("Invalid match depth {depth}: expected 1..=7")]
    InvalidDepth { depth: usize },

    #[error("Entity '{entity_id}' not found")]
    EntityNotFound { entity_id: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResonanceError {
    /// Text shown to end users. Malformed input and infrastructure
    /// failures collapse to a single retry message.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InsufficientSamples { .. } => "not enough labeled data to retune weights",
            Self::Cancelled => "computation cancelled",
            _ => "computation failed — please retry",
        }
    }
}

pub type ResonanceResult<T> = Result<T, ResonanceError>;
