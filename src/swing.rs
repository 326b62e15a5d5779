//! Swing estimator (C8, spec §4.8).

use crate::types::DrumHit;

const OFFBEAT_MIN: f64 = 0.35;
const OFFBEAT_MAX: f64 = 0.75;
const DEFAULT_SWING: f32 = 50.0;

/// Median offbeat position within its beat interval, expressed as a
/// swing percentage in `[40, 75]`. Falls back to 50 (straight) when fewer
/// than two offbeat-region hits are present.
pub fn estimate(hits: &[DrumHit], beat_interval_seconds: f64, beats: &[f64]) -> f32 {
    if beat_interval_seconds <= 0.0 || beats.is_empty() {
        return DEFAULT_SWING;
    }

    let mut fractions: Vec<f64> = Vec::new();
    for hit in hits {
        let Some(&beat_start) = beats
            .iter()
            .rev()
            .find(|&&b| b <= hit.time)
        else {
            continue;
        };
        let fraction = (hit.time - beat_start) / beat_interval_seconds;
        if fraction > OFFBEAT_MIN && fraction < OFFBEAT_MAX {
            fractions.push(fraction);
        }
    }

    if fractions.len() < 2 {
        return DEFAULT_SWING;
    }

    fractions.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = median_of(&fractions);
    (median * 100.0).clamp(40.0, 75.0) as f32
}

fn median_of(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
