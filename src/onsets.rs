//! Onset and hit detector (C6, spec §4.6).
//!
//! Mode A's beat-aligned RMS probing and percentile thresholds, and Mode
//! B's per-drum bandpass onset-peak-picking, both build on the windowed
//! RMS / peak-picking style the teacher uses in `library/qm_tempo.rs`,
//! generalized from a single tempo-detection band into a per-`DrumType`
//! parameter table per spec §9 ("dynamic dispatch across drum types").

use crate::filters::{self, SosFilter};
use crate::types::{BeatGrid, DrumHit, DrumType};

const WINDOW_MS: f64 = 30.0;
const COLLISION_MS: f64 = 30.0;

/// Per-drum band cutoffs and detection parameters used by both modes.
struct DrumParams {
    mode_b_low_hz: f64,
    mode_b_high_hz: f64,
    delta: f32,
    wait_ms: f64,
}

fn drum_params(drum: DrumType, sample_rate: f64) -> DrumParams {
    match drum {
        DrumType::Kick => DrumParams {
            mode_b_low_hz: 30.0,
            mode_b_high_hz: 150.0,
            delta: 0.1,
            wait_ms: 180.0,
        },
        DrumType::Snare => DrumParams {
            mode_b_low_hz: 150.0,
            mode_b_high_hz: 1_200.0,
            delta: 0.08,
            wait_ms: 135.0,
        },
        DrumType::Clap => DrumParams {
            mode_b_low_hz: 1_200.0,
            mode_b_high_hz: 4_000.0,
            delta: 0.08,
            wait_ms: 135.0,
        },
        DrumType::Hihat => DrumParams {
            mode_b_low_hz: 6_000.0,
            mode_b_high_hz: (16_000.0f64).min(sample_rate / 2.0 - 100.0),
            delta: 0.05,
            wait_ms: 45.0,
        },
        DrumType::Tom => DrumParams {
            mode_b_low_hz: 80.0,
            mode_b_high_hz: 400.0,
            delta: 0.1,
            wait_ms: 100.0,
        },
        DrumType::Perc => DrumParams {
            mode_b_low_hz: 4_000.0,
            mode_b_high_hz: 8_000.0,
            delta: 0.05,
            wait_ms: 60.0,
        },
    }
}

/// Mode A's three shared probing bands (spec §4.6).
struct ProbeBands {
    low: Vec<f32>,
    mid: Vec<f32>,
    high: Vec<f32>,
}

fn build_probe_bands(percussive: &[f32], sample_rate: f64) -> ProbeBands {
    ProbeBands {
        low: filters::bandpass(sample_rate, 20.0, 300.0, 4).apply(percussive),
        mid: filters::bandpass(sample_rate, 150.0, 2_000.0, 4).apply(percussive),
        high: filters::bandpass(sample_rate, 5_000.0, 16_000.0, 4).apply(percussive),
    }
}

fn band_for(drum: DrumType, bands: &ProbeBands) -> &[f32] {
    match drum {
        DrumType::Kick => &bands.low,
        DrumType::Snare | DrumType::Clap => &bands.mid,
        DrumType::Hihat | DrumType::Perc | DrumType::Tom => &bands.high,
    }
}

fn rms_at(signal: &[f32], sample_rate: f64, center_time: f64) -> f32 {
    let half_window = (WINDOW_MS / 1000.0 / 2.0 * sample_rate) as i64;
    let center = (center_time * sample_rate) as i64;
    let start = (center - half_window).max(0) as usize;
    let end = ((center + half_window).max(0) as usize).min(signal.len());
    if start >= end {
        return 0.0;
    }
    let sum_sq: f64 = signal[start..end].iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / (end - start) as f64).sqrt() as f32
}

fn percentile(sorted: &[f32], p: f64) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Candidate grid positions for one drum type within a beat grid, in
/// seconds, per spec §4.6's position filters.
fn candidate_positions(drum: DrumType, grid: &BeatGrid) -> Vec<f64> {
    let interval = grid.beat_interval_seconds();
    let per_bar = grid.time_signature.beats_per_bar() as usize;

    match drum {
        DrumType::Kick => {
            let mut out = Vec::with_capacity(grid.beats.len() * 2);
            for &b in &grid.beats {
                out.push(b);
                out.push(b + interval / 2.0);
            }
            out
        }
        DrumType::Snare | DrumType::Clap => grid
            .downbeats
            .iter()
            .filter(|d| {
                if per_bar == 4 {
                    d.beat_position == 2 || d.beat_position == 4
                } else {
                    d.beat_position == 2
                }
            })
            .map(|d| d.time)
            .collect(),
        DrumType::Hihat => grid
            .beats
            .iter()
            .flat_map(|&b| [b, b + interval / 2.0])
            .collect(),
        DrumType::Tom | DrumType::Perc => grid.beats.clone(),
    }
}

fn sensitivity_range(drum: DrumType, sensitivity: f32) -> (f64, f64) {
    let s = sensitivity.clamp(0.0, 1.0) as f64;
    match drum {
        DrumType::Kick => (60.0, 60.0),
        DrumType::Snare | DrumType::Clap => (30.0 + s * 30.0, 60.0),
        DrumType::Hihat => (40.0 + s * 40.0, 80.0),
        DrumType::Tom | DrumType::Perc => (40.0 + s * 30.0, 70.0),
    }
}

/// Per-drum threshold and energy statistics, exposed for pass 2 (spec §4.13,
/// §6 `StepByStepResult`).
#[derive(Debug, Clone)]
pub struct DrumProbeStats {
    pub drum: DrumType,
    pub threshold: f32,
    pub energies: Vec<f32>,
    pub candidates: Vec<f64>,
}

/// Mode A: beat-aligned probing of the percussive waveform at the grid
/// positions appropriate to each drum type, using adaptive percentile
/// thresholds (spec §4.6).
pub fn detect_mode_a(
    percussive: &[f32],
    sample_rate: f64,
    grid: &BeatGrid,
    sensitivities: &[(DrumType, f32)],
    sensitivity_divisor: f32,
) -> (Vec<DrumHit>, Vec<DrumProbeStats>) {
    let bands = build_probe_bands(percussive, sample_rate);
    let mut hits = Vec::new();
    let mut stats = Vec::new();

    for &drum in DrumType::ALL.iter() {
        let sensitivity = sensitivities
            .iter()
            .find(|(d, _)| *d == drum)
            .map(|(_, s)| *s)
            .unwrap_or(0.5);
        let (low_pct, high_pct) = sensitivity_range(drum, sensitivity);
        let use_pct = if (high_pct - low_pct).abs() < 1e-9 {
            low_pct
        } else {
            low_pct + (high_pct - low_pct) * 0.5
        };

        let signal = band_for(drum, &bands);
        let candidates = candidate_positions(drum, grid);
        if candidates.is_empty() {
            continue;
        }

        let mut energies: Vec<f32> = candidates
            .iter()
            .map(|&t| rms_at(signal, sample_rate, t))
            .collect();
        let mut sorted = energies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let threshold = percentile(&sorted, use_pct) / sensitivity_divisor.max(1e-6);

        for (i, &time) in candidates.iter().enumerate() {
            if energies[i] >= threshold && threshold > 0.0 {
                let confidence = (energies[i] / (sorted.last().copied().unwrap_or(1.0)).max(1e-6)).clamp(0.0, 1.0);
                hits.push(DrumHit {
                    time,
                    drum_type: drum,
                    confidence,
                    features: None,
                });
            }
        }

        stats.push(DrumProbeStats {
            drum,
            threshold,
            energies: std::mem::take(&mut energies),
            candidates,
        });
    }

    crate::types::sort_hits(&mut hits);
    (hits, stats)
}

/// Mode B: per-drum bandpass filtering + onset-strength peak picking on
/// the isolated-drums stem (spec §4.6), followed by cross-drum collision
/// resolution.
pub fn detect_mode_b(drums_stem: &[f32], sample_rate: f64) -> Vec<DrumHit> {
    use rayon::prelude::*;

    // Each drum band is independent of the others until collision
    // resolution, so this fans out across cores per spec §5 without
    // affecting the (later, explicitly sorted) hit ordering.
    let per_drum: Vec<(DrumType, Vec<f64>)> = DrumType::ALL
        .par_iter()
        .map(|&drum| {
            let params = drum_params(drum, sample_rate);
            let filter = build_mode_b_filter(&params, sample_rate);
            let filtered = filter.apply(drums_stem);
            let envelope = onset_envelope(&filtered, sample_rate);
            let times = pick_peaks(&envelope, sample_rate, params.delta, params.wait_ms);
            (drum, times)
        })
        .collect();

    let mut by_drum: std::collections::HashMap<DrumType, Vec<f64>> = per_drum.into_iter().collect();

    resolve_collisions(&mut by_drum);

    let mut hits = Vec::new();
    for (&drum, times) in by_drum.iter() {
        for &t in times {
            hits.push(DrumHit {
                time: t,
                drum_type: drum,
                confidence: 0.7,
                features: None,
            });
        }
    }

    crate::types::sort_hits(&mut hits);
    dedup_within(&mut hits, COLLISION_MS);
    hits
}

fn build_mode_b_filter(params: &DrumParams, sample_rate: f64) -> SosFilter {
    filters::bandpass(sample_rate, params.mode_b_low_hz, params.mode_b_high_hz, 4)
}

/// Simple absolute-value onset envelope at a fixed 10ms hop, sufficient
/// for the narrowband per-drum peak picking Mode B needs.
fn onset_envelope(signal: &[f32], sample_rate: f64) -> Vec<f32> {
    let hop = (sample_rate * 0.01) as usize;
    if hop == 0 {
        return Vec::new();
    }
    signal
        .chunks(hop)
        .map(|chunk| chunk.iter().map(|s| s.abs()).sum::<f32>() / chunk.len() as f32)
        .collect()
}

fn pick_peaks(envelope: &[f32], sample_rate: f64, delta: f32, wait_ms: f64) -> Vec<f64> {
    let hop = (sample_rate * 0.01).max(1.0);
    let wait_frames = (wait_ms / 1000.0 * sample_rate / hop).round() as usize;
    let mut peaks = Vec::new();
    let mut last_peak: Option<usize> = None;

    for i in 1..envelope.len().saturating_sub(1) {
        let is_local_max = envelope[i] > envelope[i - 1] && envelope[i] >= envelope[i + 1];
        if is_local_max && envelope[i] > delta {
            if let Some(last) = last_peak {
                if i - last < wait_frames {
                    continue;
                }
            }
            peaks.push(i);
            last_peak = Some(i);
        }
    }

    peaks
        .into_iter()
        .map(|i| i as f64 * hop / sample_rate)
        .collect()
}

/// Resolve cross-drum collisions per spec §4.6: tom onsets near a kick,
/// and perc onsets near a hi-hat or clap, are discarded.
fn resolve_collisions(by_drum: &mut std::collections::HashMap<DrumType, Vec<f64>>) {
    let kicks = by_drum.get(&DrumType::Kick).cloned().unwrap_or_default();
    if let Some(toms) = by_drum.get_mut(&DrumType::Tom) {
        toms.retain(|&t| !kicks.iter().any(|&k| (t - k).abs() * 1000.0 < 50.0));
    }

    let mut near: Vec<f64> = by_drum.get(&DrumType::Hihat).cloned().unwrap_or_default();
    near.extend(by_drum.get(&DrumType::Clap).cloned().unwrap_or_default());
    if let Some(perc) = by_drum.get_mut(&DrumType::Perc) {
        perc.retain(|&t| !near.iter().any(|&n| (t - n).abs() * 1000.0 < 30.0));
    }
}

fn dedup_within(hits: &mut Vec<DrumHit>, window_ms: f64) {
    let window = window_ms / 1000.0;
    let mut kept: Vec<DrumHit> = Vec::with_capacity(hits.len());
    for hit in hits.drain(..) {
        let collides = kept
            .iter()
            .any(|k| k.drum_type == hit.drum_type && (k.time - hit.time).abs() < window);
        if !collides {
            kept.push(hit);
        }
    }
    *hits = kept;
}
