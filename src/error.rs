// Error taxonomy for the tray tracking core
//
// Every failure in the write path is surfaced to the caller as one of these
// variants; read-only queries on an absent tray return empty/zero values
// instead of failing. The binary edge wraps these in anyhow.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, TrayError>;

/// All errors the tray core can produce
#[derive(Debug, Error)]
pub enum TrayError {
    /// Malformed input: empty position text, blank result, zero dimensions
    #[error("validation failed: {0}")]
    Validation(String),

    /// Position text that is neither "row_col", "row,col" nor a scan index
    #[error("unrecognized position format: {0}")]
    Format(String),

    /// Row/col or scan index outside the owning tray's bounds
    #[error("out of range: {0}")]
    Range(String),

    /// Operation requires a current tray but none exists
    #[error("no active tray; call start_tray first")]
    NoActiveTray,

    /// Repository operation referencing an unknown tray id
    #[error("tray not found: {0}")]
    NotFound(String),

    /// Underlying store failure; not retried internally
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl TrayError {
    /// Stable label for logging and event payloads
    pub fn kind(&self) -> &'static str {
        match self {
            TrayError::Validation(_) => "validation",
            TrayError::Format(_) => "format",
            TrayError::Range(_) => "range",
            TrayError::NoActiveTray => "no_active_tray",
            TrayError::NotFound(_) => "not_found",
            TrayError::Persistence(_) => "persistence",
        }
    }
}
