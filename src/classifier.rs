//! Rule-based classifier (C7, spec §4.7).
//!
//! Two scoring variants over [`FeatureVector`], grounded on the teacher's
//! preference for small, exhaustive `match`-driven scoring tables (see
//! `library/types.rs`'s `DeckState` transitions) rather than a generic
//! weighted-sum model: every term here is a named, documented rule.

use crate::types::{DrumType, FeatureVector};

/// Which scoring table to use, per spec §4.7's two variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierVariant {
    /// Full mix: bass/synth bleed means low bands are less reliable.
    FullMix,
    /// Isolated drums stem: direct band dominance is trustworthy.
    DrumsStem,
}

/// Phase of an onset within its beat, used for pattern-position boosting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatPhase {
    OnBeat,
    OffBeat,
    Backbeat,
    Unknown,
}

/// Classify one onset's features into a drum type and confidence.
pub fn classify(
    features: &FeatureVector,
    variant: ClassifierVariant,
    phase: BeatPhase,
) -> (DrumType, f32) {
    let mut scores: Vec<(DrumType, f32)> = DrumType::ALL
        .iter()
        .map(|&drum| (drum, raw_score(drum, features, variant)))
        .collect();

    apply_pattern_boost(&mut scores, phase);

    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let (best_drum, best_score) = scores[0];
    let total: f32 = scores.iter().map(|(_, s)| s.max(0.0)).sum::<f32>().max(1e-6);
    let runner_up = scores.get(1).map(|(_, s)| *s).unwrap_or(0.0);

    let mut confidence = best_score.max(0.0) / total;
    if runner_up > 0.0 && best_score > runner_up * 1.5 {
        confidence = (confidence * 1.3).min(0.95);
    }
    confidence = confidence.min(0.95);

    (best_drum, confidence)
}

fn raw_score(drum: DrumType, f: &FeatureVector, variant: ClassifierVariant) -> f32 {
    match variant {
        ClassifierVariant::FullMix => score_full_mix(drum, f),
        ClassifierVariant::DrumsStem => score_drums_stem(drum, f),
    }
}

/// Variant F (spec §4.7): relative spectral balance, penalizing centroid
/// positions that overlap where bass/synth energy typically bleeds.
fn score_full_mix(drum: DrumType, f: &FeatureVector) -> f32 {
    let low_dominance = f.sub_bass + f.bass;
    match drum {
        DrumType::Kick => {
            let mut score: f32 = 0.3;
            if f.centroid > 0.30 {
                score -= 0.4;
            }
            if f.centroid < 0.22 && low_dominance > 0.50 {
                score += 0.5;
            }
            score.max(0.0)
        }
        DrumType::Hihat => {
            let mut score: f32 = 0.2;
            if f.centroid > 0.45 {
                score += 0.3;
            }
            if f.decay_ms < 12.0 {
                score += 0.2;
            }
            if f.high > 0.35 {
                score += 0.3;
            }
            if low_dominance > 0.40 {
                score -= 0.3;
            }
            score.max(0.0)
        }
        DrumType::Snare => {
            let mut score: f32 = 0.2;
            if f.flatness > 0.28 {
                score += 0.2;
            }
            if f.zcr > 0.07 {
                score += 0.2;
            }
            if (0.22..=0.48).contains(&f.centroid) {
                score += 0.2;
            }
            if f.mid > 0.22 {
                score += 0.2;
            }
            score.max(0.0)
        }
        DrumType::Clap => {
            let mut score: f32 = 0.15;
            if f.flatness > 0.42 {
                score += 0.25;
            }
            if f.zcr > 0.10 {
                score += 0.25;
            }
            if (0.25..=0.45).contains(&f.centroid) {
                score += 0.2;
            }
            score.max(0.0)
        }
        DrumType::Tom => {
            let mut score: f32 = 0.1;
            if f.flatness < 0.22 && f.decay_ms > 30.0 && (0.15..=0.35).contains(&f.centroid) {
                score += 0.5;
            }
            score.max(0.0)
        }
        DrumType::Perc => 0.15,
    }
}

/// Variant D (spec §4.7): direct band dominance on a clean stem.
fn score_drums_stem(drum: DrumType, f: &FeatureVector) -> f32 {
    let low_dominance = f.sub_bass + f.bass;
    match drum {
        DrumType::Kick => {
            let mut score: f32 = 0.1;
            if low_dominance > 0.35 {
                score += 0.4;
            }
            if f.centroid < 0.20 {
                score += 0.4;
            }
            score.max(0.0)
        }
        DrumType::Hihat => {
            let mut score: f32 = 0.1;
            if f.high > 0.25 {
                score += 0.4;
            }
            if f.centroid > 0.50 {
                score += 0.3;
            }
            if f.decay_ms < 12.0 {
                score += 0.2;
            }
            score.max(0.0)
        }
        DrumType::Snare => {
            let mut score: f32 = 0.15;
            if f.flatness > 0.30 && f.zcr > 0.08 {
                score += 0.4;
            }
            if f.mid > 0.20 {
                score += 0.3;
            }
            score.max(0.0)
        }
        DrumType::Clap => {
            let mut score: f32 = 0.15;
            if f.flatness > 0.45 {
                score += 0.4;
            }
            if f.zcr > 0.12 {
                score += 0.3;
            }
            score.max(0.0)
        }
        DrumType::Tom => {
            let mut score: f32 = 0.1;
            if f.flatness < 0.22 && f.decay_ms > 30.0 && (0.15..=0.35).contains(&f.centroid) {
                score += 0.5;
            }
            score.max(0.0)
        }
        DrumType::Perc => 0.15,
    }
}

/// Pattern-position boosting (spec §4.7): a known beat phase nudges the
/// scores toward the drum type most plausible at that position.
fn apply_pattern_boost(scores: &mut [(DrumType, f32)], phase: BeatPhase) {
    const BOOST: f32 = 0.15;
    for (drum, score) in scores.iter_mut() {
        match (phase, *drum) {
            (BeatPhase::OnBeat, DrumType::Kick) => *score += BOOST,
            (BeatPhase::OffBeat, DrumType::Hihat) => *score += BOOST,
            (BeatPhase::Backbeat, DrumType::Snare) | (BeatPhase::Backbeat, DrumType::Clap) => {
                *score += BOOST
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kick_like() -> FeatureVector {
        FeatureVector {
            sub_bass: 0.4,
            bass: 0.3,
            low_mid: 0.1,
            mid: 0.1,
            high_mid: 0.05,
            high: 0.05,
            hihat_band: 0.02,
            centroid: 0.1,
            flatness: 0.1,
            zcr: 0.02,
            attack_ms: 3.0,
            decay_ms: 80.0,
        }
    }

    fn hihat_like() -> FeatureVector {
        FeatureVector {
            sub_bass: 0.02,
            bass: 0.03,
            low_mid: 0.05,
            mid: 0.1,
            high_mid: 0.3,
            high: 0.5,
            hihat_band: 0.45,
            centroid: 0.7,
            flatness: 0.6,
            zcr: 0.3,
            attack_ms: 1.0,
            decay_ms: 8.0,
        }
    }

    #[test]
    fn classifies_kick_like_features_as_kick() {
        let (drum, confidence) = classify(&kick_like(), ClassifierVariant::FullMix, BeatPhase::Unknown);
        assert_eq!(drum, DrumType::Kick);
        assert!(confidence > 0.0);
    }

    #[test]
    fn classifies_hihat_like_features_as_hihat() {
        let (drum, _) = classify(&hihat_like(), ClassifierVariant::FullMix, BeatPhase::Unknown);
        assert_eq!(drum, DrumType::Hihat);
    }

    #[test]
    fn classification_is_deterministic() {
        let features = kick_like();
        let a = classify(&features, ClassifierVariant::DrumsStem, BeatPhase::OnBeat);
        let b = classify(&features, ClassifierVariant::DrumsStem, BeatPhase::OnBeat);
        assert_eq!(a, b);
    }

    #[test]
    fn confidence_never_exceeds_cap() {
        let (_, confidence) = classify(&kick_like(), ClassifierVariant::FullMix, BeatPhase::OnBeat);
        assert!(confidence <= 0.95);
    }
}
