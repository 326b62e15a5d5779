//! External service interfaces (spec §6).
//!
//! The stem separator and the LLM pattern oracle are out-of-core
//! collaborators; the core only needs their interface shape, not an HTTP
//! client, so both are modeled as traits with a null implementation that
//! lets the orchestrator exercise its degrade-gracefully path without a
//! live service.

use crate::error::{AnalysisError, Result};
use crate::waveform::Waveform;

/// An isolated-drums waveform returned by an external stem separator
/// (spec §6: `POST /separate`, `GET /jobs/{id}`, `GET /stems/{id}/{name}`
/// collapsed to their effect on the core — a drums waveform or a
/// recoverable failure).
pub trait StemSeparator {
    fn separate_drums(&self, mix: &Waveform) -> Result<Waveform>;
}

/// Always reports the service as unavailable, so the pipeline exercises
/// its `StemServiceUnavailable` recovery path (spec §4.13, §7) without a
/// network dependency.
pub struct NullStemSeparator;

impl StemSeparator for NullStemSeparator {
    fn separate_drums(&self, _mix: &Waveform) -> Result<Waveform> {
        Err(AnalysisError::StemServiceUnavailable(
            "no stem separator configured".to_string(),
        ))
    }
}

/// A structured pattern hint an LLM oracle may optionally return (spec
/// §6). The core never gates on this; it is accepted only as an
/// additional, ignorable signal.
#[derive(Debug, Clone, Default)]
pub struct PatternHint {
    pub kick_pattern: Option<String>,
    pub kick_per_bar: Option<u32>,
    pub snare_pattern: Option<String>,
    pub snare_per_bar: Option<u32>,
    pub hihat_pattern: Option<String>,
    pub hihat_per_bar: Option<u32>,
    pub clap_layered: Option<bool>,
    pub has_reverb: Option<bool>,
    pub genre: Option<String>,
    pub confidence: Option<f32>,
    pub notes: Option<String>,
}

/// Given a spectrogram image and hints, may return a [`PatternHint`].
/// Non-core; the pipeline never requires a live implementation.
pub trait PatternOracle {
    fn suggest_pattern(&self, spectrogram_png: &[u8]) -> Option<PatternHint>;
}

/// Always declines to suggest a pattern, the default when no oracle is
/// configured.
pub struct NullPatternOracle;

impl PatternOracle for NullPatternOracle {
    fn suggest_pattern(&self, _spectrogram_png: &[u8]) -> Option<PatternHint> {
        None
    }
}
