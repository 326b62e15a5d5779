//! Pattern matcher (C9, spec §4.9).
//!
//! The static pattern library mirrors the teacher's approach to
//! immutable, process-lifetime configuration tables (`once_cell`-backed
//! globals in `library/types.rs`); F1 scoring is new, built directly from
//! the spec's weighted-average formula.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::types::{DrumHit, DrumType, Pattern, PatternSteps};

const STEPS_PER_BAR: usize = 16;

fn drum_weight(drum: DrumType) -> f32 {
    match drum {
        DrumType::Kick => 3.0,
        DrumType::Snare | DrumType::Clap => 2.5,
        DrumType::Tom => 1.5,
        DrumType::Hihat | DrumType::Perc => 1.0,
    }
}

/// The static, versioned pattern library (spec §6).
pub static PATTERN_LIBRARY: Lazy<Vec<Pattern>> = Lazy::new(build_library);

fn build_library() -> Vec<Pattern> {
    vec![
        Pattern {
            id: "edm_four_on_floor",
            display_name: "EDM Four on the Floor",
            genre_tag: "edm",
            description: "Kick on every quarter, claps on 2 and 4, steady 8th hi-hats.",
            drums: PatternSteps {
                kick: vec![0, 4, 8, 12],
                snare: vec![],
                hihat: vec![0, 2, 4, 6, 8, 10, 12, 14],
                clap: vec![4, 12],
                tom: vec![],
                perc: vec![],
            },
            swing: 50,
        },
        Pattern {
            id: "trap_rolling",
            display_name: "Trap Rolling Hi-Hats",
            genre_tag: "trap",
            description: "Sparse kick/snare with rolling 16th-note hi-hats.",
            drums: PatternSteps {
                kick: vec![0, 10],
                snare: vec![8],
                hihat: (0..16).collect(),
                clap: vec![],
                tom: vec![],
                perc: vec![],
            },
            swing: 50,
        },
        Pattern {
            id: "trap_basic",
            display_name: "Trap Basic",
            genre_tag: "trap",
            description: "Half-time kick/snare with 8th-note hi-hats.",
            drums: PatternSteps {
                kick: vec![0, 6],
                snare: vec![8],
                hihat: vec![0, 2, 4, 6, 8, 10, 12, 14],
                clap: vec![],
                tom: vec![],
                perc: vec![],
            },
            swing: 50,
        },
        Pattern {
            id: "afro_foundation",
            display_name: "Afro House Foundation",
            genre_tag: "afro_house",
            description: "Kicks on 1 and 3, shaker on every 8th, swung.",
            drums: PatternSteps {
                kick: vec![0, 8],
                snare: vec![],
                hihat: vec![0, 2, 4, 6, 8, 10, 12, 14],
                clap: vec![],
                tom: vec![],
                perc: vec![2, 6, 10, 14],
            },
            swing: 60,
        },
        Pattern {
            id: "hip_hop_boom_bap",
            display_name: "Hip-Hop Boom Bap",
            genre_tag: "hip_hop",
            description: "Kick on 1 and the 'and' of 2, snare on 2 and 4.",
            drums: PatternSteps {
                kick: vec![0, 6],
                snare: vec![4, 12],
                hihat: vec![0, 2, 4, 6, 8, 10, 12, 14],
                clap: vec![],
                tom: vec![],
                perc: vec![],
            },
            swing: 56,
        },
        Pattern {
            id: "pop_backbeat",
            display_name: "Pop Backbeat",
            genre_tag: "pop",
            description: "Kick on 1 and 3, snare on 2 and 4, straight 8ths.",
            drums: PatternSteps {
                kick: vec![0, 8],
                snare: vec![4, 12],
                hihat: vec![0, 2, 4, 6, 8, 10, 12, 14],
                clap: vec![],
                tom: vec![],
                perc: vec![],
            },
            swing: 50,
        },
        Pattern {
            id: "kpop_hybrid",
            display_name: "K-Pop Hybrid",
            genre_tag: "kpop",
            description: "Dense kick and snare hits layered over steady hi-hats.",
            drums: PatternSteps {
                kick: vec![0, 3, 8, 11],
                snare: vec![4, 12, 14],
                hihat: (0..16).step_by(2).collect(),
                clap: vec![4, 12],
                tom: vec![],
                perc: vec![],
            },
            swing: 50,
        },
    ]
}

/// Quantize hits to a 16-step-per-bar grid relative to `downbeat_anchor`,
/// producing a per-drum step set (spec §4.9).
pub fn quantize_to_steps(
    hits: &[DrumHit],
    bpm: f64,
    downbeat_anchor: f64,
) -> HashMap<DrumType, Vec<u8>> {
    let step_duration = 60.0 / bpm / 4.0;
    let mut sets: HashMap<DrumType, std::collections::BTreeSet<u8>> = HashMap::new();

    for hit in hits {
        if step_duration <= 0.0 {
            continue;
        }
        let step = (((hit.time - downbeat_anchor) / step_duration).round() as i64)
            .rem_euclid(STEPS_PER_BAR as i64) as u8;
        sets.entry(hit.drum_type).or_default().insert(step);
    }

    sets.into_iter().map(|(k, v)| (k, v.into_iter().collect())).collect()
}

fn f1_score(expected: &[u8], detected: &[u8]) -> f32 {
    if expected.is_empty() || detected.is_empty() {
        return 0.0;
    }
    let expected_set: std::collections::HashSet<u8> = expected.iter().copied().collect();
    let detected_set: std::collections::HashSet<u8> = detected.iter().copied().collect();

    let true_positives = expected_set.intersection(&detected_set).count() as f32;
    if true_positives == 0.0 {
        return 0.0;
    }
    let precision = true_positives / detected_set.len() as f32;
    let recall = true_positives / expected_set.len() as f32;
    2.0 * precision * recall / (precision + recall)
}

/// One pattern's match result, per spec §4.9's `PatternMatchResult`.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern_id: &'static str,
    pub score: f32,
    pub missing_drums: Vec<DrumType>,
}

/// Score every pattern in the library against the detected per-drum step
/// sets, returning the top 5 by score (spec §4.9). Never errors: an empty
/// detected set, or no drum-type overlap with any pattern, yields an
/// empty result.
pub fn match_patterns(detected: &HashMap<DrumType, Vec<u8>>) -> Vec<PatternMatch> {
    let mut results: Vec<PatternMatch> = PATTERN_LIBRARY
        .iter()
        .filter_map(|pattern| score_pattern(pattern, detected))
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(5);
    results
}

fn score_pattern(pattern: &Pattern, detected: &HashMap<DrumType, Vec<u8>>) -> Option<PatternMatch> {
    let mut weighted_sum = 0.0f32;
    let mut weight_total = 0.0f32;
    let mut common = 0usize;
    let mut missing = Vec::new();

    for &drum in DrumType::ALL.iter() {
        let expected = pattern.drums.steps_for(drum);
        let detected_steps = detected.get(&drum).map(|v| v.as_slice()).unwrap_or(&[]);

        if expected.is_empty() {
            continue;
        }
        if detected_steps.is_empty() {
            missing.push(drum);
            continue;
        }

        common += 1;
        let weight = drum_weight(drum);
        weighted_sum += weight * f1_score(expected, detected_steps);
        weight_total += weight;
    }

    if common == 0 {
        return None;
    }

    let avg_f1 = weighted_sum / weight_total.max(1e-6);
    let detected_types = detected.iter().filter(|(_, steps)| !steps.is_empty()).count().max(1);
    let coverage_bonus = (common as f32 / detected_types as f32) * 0.2;

    Some(PatternMatch {
        pattern_id: pattern.id,
        score: avg_f1 + coverage_bonus,
        missing_drums: missing,
    })
}
