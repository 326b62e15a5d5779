//! Genre heuristic (C12, spec §4.12).

use std::collections::HashMap;

use crate::types::{DrumHit, DrumType, Genre};

const MIN_SCORE: f32 = 0.5;

/// Score the closed genre set from tempo, per-drum hit ratios, and swing,
/// returning the highest scorer only if it clears 0.5 (spec §4.12).
pub fn estimate(bpm: f64, hits: &[DrumHit], swing: f32) -> Genre {
    let ratios = hit_ratios(hits);
    let scores = [
        (Genre::Edm, score_edm(bpm, &ratios, swing)),
        (Genre::AfroHouse, score_afro_house(bpm, &ratios, swing)),
        (Genre::Trap, score_trap(bpm, &ratios)),
        (Genre::Pop, score_pop(bpm, &ratios, swing)),
        (Genre::HipHop, score_hip_hop(bpm, swing)),
        (Genre::Kpop, score_kpop(bpm, &ratios)),
    ];

    let best = scores
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .copied();

    match best {
        Some((genre, score)) if score >= MIN_SCORE => genre,
        _ => Genre::Unknown,
    }
}

fn hit_ratios(hits: &[DrumHit]) -> HashMap<DrumType, f32> {
    let total = hits.len().max(1) as f32;
    let mut counts: HashMap<DrumType, u32> = HashMap::new();
    for hit in hits {
        *counts.entry(hit.drum_type).or_insert(0) += 1;
    }
    counts.into_iter().map(|(k, v)| (k, v as f32 / total)).collect()
}

fn ratio(ratios: &HashMap<DrumType, f32>, drum: DrumType) -> f32 {
    ratios.get(&drum).copied().unwrap_or(0.0)
}

fn in_window(bpm: f64, low: f64, high: f64) -> f32 {
    if (low..=high).contains(&bpm) {
        1.0
    } else {
        0.0
    }
}

fn score_edm(bpm: f64, ratios: &HashMap<DrumType, f32>, swing: f32) -> f32 {
    let mut score = 0.0;
    score += in_window(bpm, 118.0, 138.0) * 0.4;
    score += (ratio(ratios, DrumType::Kick) > 0.25) as i32 as f32 * 0.2;
    score += (ratio(ratios, DrumType::Clap) + ratio(ratios, DrumType::Snare) > 0.1) as i32 as f32 * 0.2;
    score += ((swing - 50.0).abs() < 5.0) as i32 as f32 * 0.2;
    score
}

fn score_afro_house(bpm: f64, ratios: &HashMap<DrumType, f32>, swing: f32) -> f32 {
    let mut score = 0.0;
    score += in_window(bpm, 115.0, 130.0) * 0.3;
    score += (ratio(ratios, DrumType::Kick) < 0.2) as i32 as f32 * 0.2;
    score += (swing > 54.0) as i32 as f32 * 0.3;
    score += (ratio(ratios, DrumType::Hihat) + ratio(ratios, DrumType::Perc) > 0.3) as i32 as f32 * 0.2;
    score
}

fn score_trap(bpm: f64, ratios: &HashMap<DrumType, f32>) -> f32 {
    let mut score = 0.0;
    score += (in_window(bpm, 60.0, 90.0).max(in_window(bpm, 130.0, 180.0))) * 0.4;
    score += (ratio(ratios, DrumType::Snare) < 0.15) as i32 as f32 * 0.2;
    score += (ratio(ratios, DrumType::Hihat) > 0.4) as i32 as f32 * 0.4;
    score
}

fn score_pop(bpm: f64, ratios: &HashMap<DrumType, f32>, swing: f32) -> f32 {
    let mut score = 0.0;
    score += in_window(bpm, 85.0, 135.0) * 0.3;
    score += (ratio(ratios, DrumType::Kick) > 0.15 && ratio(ratios, DrumType::Kick) < 0.4) as i32 as f32 * 0.2;
    score += (ratio(ratios, DrumType::Snare) > 0.1) as i32 as f32 * 0.3;
    score += ((swing - 50.0).abs() < 8.0) as i32 as f32 * 0.2;
    score
}

fn score_hip_hop(bpm: f64, swing: f32) -> f32 {
    let mut score = 0.0;
    score += in_window(bpm, 80.0, 120.0) * 0.5;
    score += ((52.0..=62.0).contains(&swing)) as i32 as f32 * 0.5;
    score
}

fn score_kpop(bpm: f64, ratios: &HashMap<DrumType, f32>) -> f32 {
    let mut score = 0.0;
    score += in_window(bpm, 95.0, 145.0) * 0.3;
    score += (ratio(ratios, DrumType::Kick) > 0.25) as i32 as f32 * 0.35;
    score += (ratio(ratios, DrumType::Snare) > 0.15) as i32 as f32 * 0.35;
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(drum: DrumType) -> DrumHit {
        DrumHit {
            time: 0.0,
            drum_type: drum,
            confidence: 0.8,
            features: None,
        }
    }

    #[test]
    fn four_on_floor_reads_as_edm() {
        let hits = vec![
            hit(DrumType::Kick),
            hit(DrumType::Kick),
            hit(DrumType::Kick),
            hit(DrumType::Kick),
            hit(DrumType::Clap),
            hit(DrumType::Clap),
        ];
        let genre = estimate(128.0, &hits, 50.0);
        assert_eq!(genre, Genre::Edm);
    }

    #[test]
    fn unclear_signal_falls_back_to_unknown() {
        let hits = vec![hit(DrumType::Tom)];
        let genre = estimate(200.0, &hits, 50.0);
        assert_eq!(genre, Genre::Unknown);
    }

    #[test]
    fn swung_sparse_kick_house_reads_as_afro_house() {
        let hits = vec![
            hit(DrumType::Kick),
            hit(DrumType::Hihat),
            hit(DrumType::Hihat),
            hit(DrumType::Hihat),
            hit(DrumType::Perc),
        ];
        let genre = estimate(122.0, &hits, 60.0);
        assert_eq!(genre, Genre::AfroHouse);
    }
}
