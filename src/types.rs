//! Core domain types shared across the pipeline (spec §3).

use serde::{Deserialize, Serialize};

/// Fixed sample rate the whole pipeline operates at, per spec §3.
pub const SAMPLE_RATE: u32 = 44_100;

/// Drum classes the classifier can emit.
///
/// Variants are declared in alphabetical order so that `#[derive(Ord)]`
/// gives the lexicographic tie-break spec §5 requires when two hits share
/// a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DrumType {
    Clap,
    Hihat,
    Kick,
    Perc,
    Snare,
    Tom,
}

impl DrumType {
    pub const ALL: [DrumType; 6] = [
        DrumType::Clap,
        DrumType::Hihat,
        DrumType::Kick,
        DrumType::Perc,
        DrumType::Snare,
        DrumType::Tom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DrumType::Kick => "kick",
            DrumType::Snare => "snare",
            DrumType::Hihat => "hihat",
            DrumType::Clap => "clap",
            DrumType::Tom => "tom",
            DrumType::Perc => "perc",
        }
    }
}

impl std::fmt::Display for DrumType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bar's time signature; only 3/4 and 4/4 are modeled per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSignature {
    ThreeFour,
    FourFour,
}

impl TimeSignature {
    pub fn beats_per_bar(&self) -> u8 {
        match self {
            TimeSignature::ThreeFour => 3,
            TimeSignature::FourFour => 4,
        }
    }
}

/// A beat marked as a particular position within its bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Downbeat {
    pub time: f64,
    /// 1-indexed position within the bar, in `[1..=time_signature]`.
    pub beat_position: u8,
}

/// Global tempo/beat/downbeat grid for an analyzed track (spec §3).
///
/// Invariants upheld by constructors in [`crate::beat_tracker`]:
/// - `median(diff(beats)) == 60 / bpm` within 1%.
/// - consecutive position-1 downbeats are spaced by
///   `time_signature * (60 / bpm)` within 5%.
/// - `beats` is monotonically non-decreasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatGrid {
    pub bpm: f64,
    pub confidence: f32,
    pub beats: Vec<f64>,
    pub downbeats: Vec<Downbeat>,
    pub time_signature: TimeSignature,
}

impl BeatGrid {
    pub fn beat_interval_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Time of the anchor downbeat (the first `beat_position == 1` entry).
    pub fn downbeat_anchor(&self) -> f64 {
        self.downbeats
            .iter()
            .find(|d| d.beat_position == 1)
            .map(|d| d.time)
            .or_else(|| self.beats.first().copied())
            .unwrap_or(0.0)
    }

    /// Synthesize a default grid when beat tracking fails entirely
    /// (spec §4.13 failure policy: fall back to 120 BPM).
    pub fn synthesize_default(duration_seconds: f64) -> Self {
        let bpm = 120.0;
        let interval = 60.0 / bpm;
        let mut beats = Vec::new();
        let mut t = 0.0;
        while t < duration_seconds {
            beats.push(t);
            t += interval;
        }
        let downbeats = beats
            .iter()
            .enumerate()
            .map(|(i, &t)| Downbeat {
                time: t,
                beat_position: ((i % 4) + 1) as u8,
            })
            .collect();
        BeatGrid {
            bpm,
            confidence: 0.2,
            beats,
            downbeats,
            time_signature: TimeSignature::FourFour,
        }
    }
}

/// Fixed-schema descriptor extracted from a window around one onset
/// (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub sub_bass: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub high: f32,
    pub hihat_band: f32,
    pub centroid: f32,
    pub flatness: f32,
    pub zcr: f32,
    pub attack_ms: f32,
    pub decay_ms: f32,
}

impl Default for FeatureVector {
    /// Documented default used when the analysis window is shorter than
    /// 256 samples (spec §4.4).
    fn default() -> Self {
        FeatureVector {
            sub_bass: 0.0,
            bass: 0.0,
            low_mid: 0.0,
            mid: 0.0,
            high_mid: 0.0,
            high: 0.0,
            hihat_band: 0.0,
            centroid: 0.0,
            flatness: 0.0,
            zcr: 0.0,
            attack_ms: 0.0,
            decay_ms: 0.0,
        }
    }
}

/// A single classified drum event (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumHit {
    pub time: f64,
    pub drum_type: DrumType,
    pub confidence: f32,
    pub features: Option<FeatureVector>,
}

/// Sort hits by time, tie-broken by drum type's lexicographic order
/// (spec §5: "ties ... broken by drum-type lexicographic order").
pub fn sort_hits(hits: &mut [DrumHit]) {
    hits.sort_by(|a, b| {
        a.time
            .partial_cmp(&b.time)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.drum_type.cmp(&b.drum_type))
    });
}

/// A named groove owned by the static pattern library (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: &'static str,
    pub display_name: &'static str,
    pub genre_tag: &'static str,
    pub description: &'static str,
    /// 16th-note step indices (`0..=15`) active for each drum, within one bar.
    pub drums: PatternSteps,
    pub swing: u8,
}

/// Per-drum step sets for one bar (spec §3, §4.9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternSteps {
    pub kick: Vec<u8>,
    pub snare: Vec<u8>,
    pub hihat: Vec<u8>,
    pub clap: Vec<u8>,
    pub tom: Vec<u8>,
    pub perc: Vec<u8>,
}

impl PatternSteps {
    pub fn steps_for(&self, drum: DrumType) -> &[u8] {
        match drum {
            DrumType::Kick => &self.kick,
            DrumType::Snare => &self.snare,
            DrumType::Hihat => &self.hihat,
            DrumType::Clap => &self.clap,
            DrumType::Tom => &self.tom,
            DrumType::Perc => &self.perc,
        }
    }
}

/// Genre guesses the heuristic can emit (spec §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genre {
    Edm,
    AfroHouse,
    Trap,
    Pop,
    HipHop,
    Kpop,
    Unknown,
}

impl Genre {
    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Edm => "edm",
            Genre::AfroHouse => "afro_house",
            Genre::Trap => "trap",
            Genre::Pop => "pop",
            Genre::HipHop => "hip_hop",
            Genre::Kpop => "kpop",
            Genre::Unknown => "unknown",
        }
    }
}

/// Which mix the hits were detected from, recorded for the client-visible
/// `analysis_method` string (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisSource {
    FullMix,
    DrumsStem,
}

/// Final object returned by the standard/adaptive passes (spec §3, §4.13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub beat_grid: BeatGrid,
    pub hits: Vec<DrumHit>,
    pub swing: f32,
    pub genre: Genre,
    pub analysis_method: String,
    pub analysis_source: AnalysisSource,
    pub hits_before_filter: usize,
    pub hits_after_filter: usize,
}

impl AnalysisResult {
    /// Verify the counters/time-domain invariants spec §3 and §8 require.
    /// Intended for tests and debug assertions, not the hot path.
    pub fn check_invariants(&self, duration_seconds: f64) -> crate::error::Result<()> {
        if self.hits_after_filter > self.hits_before_filter {
            return Err(crate::error::AnalysisError::InvariantViolation(format!(
                "hits_after_filter ({}) > hits_before_filter ({})",
                self.hits_after_filter, self.hits_before_filter
            )));
        }
        for hit in &self.hits {
            if hit.time < 0.0 || hit.time > duration_seconds {
                return Err(crate::error::AnalysisError::InvariantViolation(format!(
                    "hit time {} outside [0, {}]",
                    hit.time, duration_seconds
                )));
            }
        }
        for pair in self.hits.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let ordered = a.time < b.time
                || (a.time == b.time && a.drum_type <= b.drum_type);
            if !ordered {
                return Err(crate::error::AnalysisError::InvariantViolation(
                    "hits are not sorted by time/drum-type".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Encode as the JSON document returned across the client-facing API
    /// boundary (spec §7).
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a previously-encoded result, e.g. when replaying a cached
    /// analysis rather than re-running the pipeline.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drum_type_lexicographic_order() {
        let mut drums = vec![
            DrumType::Snare,
            DrumType::Kick,
            DrumType::Clap,
            DrumType::Tom,
            DrumType::Hihat,
            DrumType::Perc,
        ];
        drums.sort();
        assert_eq!(
            drums,
            vec![
                DrumType::Clap,
                DrumType::Hihat,
                DrumType::Kick,
                DrumType::Perc,
                DrumType::Snare,
                DrumType::Tom,
            ]
        );
    }

    #[test]
    fn sort_hits_breaks_ties_by_type() {
        let mut hits = vec![
            DrumHit {
                time: 1.0,
                drum_type: DrumType::Snare,
                confidence: 0.9,
                features: None,
            },
            DrumHit {
                time: 1.0,
                drum_type: DrumType::Kick,
                confidence: 0.9,
                features: None,
            },
        ];
        sort_hits(&mut hits);
        assert_eq!(hits[0].drum_type, DrumType::Kick);
        assert_eq!(hits[1].drum_type, DrumType::Snare);
    }

    #[test]
    fn synthesized_default_grid_is_120_bpm() {
        let grid = BeatGrid::synthesize_default(4.0);
        assert_eq!(grid.bpm, 120.0);
        assert_eq!(grid.confidence, 0.2);
        assert!(grid.beats.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn json_round_trip_preserves_hits_and_method() {
        let result = AnalysisResult {
            beat_grid: BeatGrid::synthesize_default(4.0),
            hits: vec![DrumHit {
                time: 0.5,
                drum_type: DrumType::Kick,
                confidence: 0.8,
                features: None,
            }],
            swing: 52.0,
            genre: Genre::Edm,
            analysis_method: "standard".to_string(),
            analysis_source: AnalysisSource::FullMix,
            hits_before_filter: 1,
            hits_after_filter: 1,
        };
        let json = result.to_json().unwrap();
        let decoded = AnalysisResult::from_json(&json).unwrap();
        assert_eq!(decoded.hits.len(), 1);
        assert_eq!(decoded.analysis_method, "standard");
        assert_eq!(decoded.genre, Genre::Edm);
    }
}
