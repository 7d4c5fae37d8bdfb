//! Error types shared across BattleLink crates.

/// Checkpoint encode/decode failures.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Failed to encode checkpoint: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode checkpoint: {0}")]
    Decode(#[source] serde_json::Error),
}
