//! Error kinds for the rhythm analysis pipeline (spec §7).
//!
//! Recoverable kinds ([`AnalysisError::BeatTrackFailure`],
//! [`AnalysisError::HpssFailure`], [`AnalysisError::StemServiceUnavailable`])
//! are caught by the pipeline orchestrator and downgraded to a documented
//! fallback; they are still constructible here so that a caller invoking a
//! stage directly (e.g. the step-by-step pass) can observe the failure.
//! [`AnalysisError::InvariantViolation`] is never swallowed by any stage.

use thiserror::Error;

/// Top-level error type returned by the public pipeline functions.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The input buffer could not be decoded as audio.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// The input exceeded the configured size ceiling.
    #[error("input size {size_bytes} bytes exceeds the {limit_bytes} byte ceiling")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },

    /// No usable tempo could be extracted from the onset envelope.
    #[error("beat tracking failed: {0}")]
    BeatTrackFailure(String),

    /// Harmonic/percussive separation diverged or blew up numerically.
    #[error("HPSS failed: {0}")]
    HpssFailure(String),

    /// The external stem-separation service did not respond in time or at all.
    #[error("stem separation service unavailable: {0}")]
    StemServiceUnavailable(String),

    /// An internal invariant was violated; this always surfaces, never a
    /// silent default.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// An `AnalysisResult` could not be encoded or decoded as JSON at the
    /// client-facing API boundary (spec §7).
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
