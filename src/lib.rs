//! Rhythm analysis pipeline: audio in, beat grid + classified drum hits out.
//!
//! See [`pipeline`] for the three published analysis passes.

pub mod adaptive;
pub mod beat_tracker;
pub mod classifier;
pub mod error;
pub mod external;
pub mod features;
pub mod filters;
pub mod genre;
pub mod hpss;
pub mod onsets;
pub mod patterns;
pub mod pipeline;
pub mod quantize;
pub mod stft;
pub mod swing;
pub mod types;
pub mod waveform;

pub use error::{AnalysisError, Result};
pub use types::{AnalysisResult, BeatGrid, DrumHit, DrumType, Genre, Pattern};
