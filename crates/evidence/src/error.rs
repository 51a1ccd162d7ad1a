use thiserror::Error;

/// Errors raised by the evidence store and seed compiler.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// An underlying SQLite failure (also covers malformed defender SQL).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An artifact referenced a seed email or template that does not exist.
    #[error("unknown artifact id: {0}")]
    UnknownArtifact(String),

    /// The store directory could not be created.
    #[error("failed to prepare evidence store directory: {0}")]
    Io(#[from] std::io::Error),
}
