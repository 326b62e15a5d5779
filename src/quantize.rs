//! Quantizer (C11, spec §4.11).

use crate::types::{DrumHit, DrumType};

/// Parameters for one quantize pass; `drum_type` restricts the pass to a
/// single instrument for the per-instrument variant (spec §4.11).
#[derive(Debug, Clone)]
pub struct QuantizeParams {
    pub bpm: f64,
    pub downbeat_anchor: f64,
    pub swing: f32,
    pub strength: f32,
    pub subdivision: u32,
    pub drum_type: Option<DrumType>,
}

impl Default for QuantizeParams {
    fn default() -> Self {
        QuantizeParams {
            bpm: 120.0,
            downbeat_anchor: 0.0,
            swing: 50.0,
            strength: 1.0,
            subdivision: 4,
            drum_type: None,
        }
    }
}

/// A quantized hit plus its `(bar, beat, sub-beat)` grid address, assuming
/// 4 beats per bar (spec §4.11).
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedHit {
    pub hit: DrumHit,
    pub bar: i64,
    pub beat: u32,
    pub sub_beat: u32,
}

const BEATS_PER_BAR: u32 = 4;

/// Quantize `hits` to the grid described by `params`. When `drum_type` is
/// set, hits of other types pass through untouched at their original
/// grid address (still computed, but with `strength` effectively 0 for
/// the snap itself — their time is unmodified).
pub fn quantize(hits: &[DrumHit], params: &QuantizeParams) -> Vec<QuantizedHit> {
    let step_duration = 60.0 / params.bpm / params.subdivision as f64;
    if step_duration <= 0.0 {
        return Vec::new();
    }

    hits.iter()
        .map(|hit| quantize_one(hit, params, step_duration))
        .collect()
}

fn quantize_one(hit: &DrumHit, params: &QuantizeParams, step_duration: f64) -> QuantizedHit {
    let applies = params.drum_type.map_or(true, |d| d == hit.drum_type);
    let strength = if applies { params.strength } else { 0.0 };

    let relative = hit.time - params.downbeat_anchor;
    let step_index = (relative / step_duration).round() as i64;

    let swing_offset = if step_index.rem_euclid(2) == 1 {
        (params.swing as f64 / 100.0 - 0.5) * step_duration
    } else {
        0.0
    };
    let snapped_time = params.downbeat_anchor + step_index as f64 * step_duration + swing_offset;

    let output_time = hit.time * (1.0 - strength as f64) + snapped_time * strength as f64;

    let steps_per_bar = BEATS_PER_BAR * params.subdivision;
    let grid_index = step_index.rem_euclid(steps_per_bar as i64) as u32;
    let bar = step_index.div_euclid(steps_per_bar as i64);
    let beat = grid_index / params.subdivision;
    let sub_beat = grid_index % params.subdivision;

    QuantizedHit {
        hit: DrumHit {
            time: output_time,
            drum_type: hit.drum_type,
            confidence: hit.confidence,
            features: hit.features,
        },
        bar,
        beat,
        sub_beat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(time: f64, drum: DrumType) -> DrumHit {
        DrumHit {
            time,
            drum_type: drum,
            confidence: 0.8,
            features: None,
        }
    }

    #[test]
    fn full_strength_snaps_exactly_to_grid() {
        let bpm = 120.0;
        let step = 60.0 / bpm / 4.0;
        let params = QuantizeParams {
            bpm,
            downbeat_anchor: 0.0,
            swing: 50.0,
            strength: 1.0,
            subdivision: 4,
            drum_type: None,
        };
        let hits = vec![hit(step * 4.0 + 0.003, DrumType::Kick)];
        let result = quantize(&hits, &params);
        assert!((result[0].hit.time - step * 4.0).abs() < 1e-9);
        assert_eq!(result[0].beat, 0);
    }

    #[test]
    fn idempotent_at_full_strength() {
        let params = QuantizeParams {
            bpm: 128.0,
            downbeat_anchor: 0.1,
            swing: 58.0,
            strength: 1.0,
            subdivision: 4,
            drum_type: None,
        };
        let hits = vec![hit(0.73, DrumType::Snare)];
        let once = quantize(&hits, &params);
        let twice = quantize(
            &once.iter().map(|q| q.hit.clone()).collect::<Vec<_>>(),
            &params,
        );
        assert!((once[0].hit.time - twice[0].hit.time).abs() < 1e-9);
    }

    #[test]
    fn per_instrument_variant_leaves_other_types_untouched() {
        let params = QuantizeParams {
            bpm: 120.0,
            downbeat_anchor: 0.0,
            swing: 58.0,
            strength: 1.0,
            subdivision: 4,
            drum_type: Some(DrumType::Hihat),
        };
        let hits = vec![hit(0.2001, DrumType::Kick), hit(0.2502, DrumType::Hihat)];
        let result = quantize(&hits, &params);
        assert_eq!(result[0].hit.time, 0.2001);
        assert_ne!(result[1].hit.time, 0.2502);
    }
}
