//! Error types for the transcription layer.
use thiserror::Error;

/// Errors raised while building or driving a transcription.
///
/// Build-phase problems abort the solve and surface as `Err`; a non-success verdict from
/// the optimizer is not an error here - it is reported inside the `Solution` stats so the
/// caller can inspect the partial result.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Inconsistent user input (bad mesh, mismatched counts, unknown option...)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A helper received data only the transcription itself can produce wrongly; programmer bug
    #[error("internal error: {0}")]
    Internal(String),

    /// Propagated verbatim from a user-supplied point-function
    #[error("point function error: {0}")]
    PointFunction(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
