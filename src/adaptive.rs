//! Adaptive quiet-section rescan (C10, spec §4.10).

use crate::onsets::{detect_mode_a, DrumProbeStats};
use crate::types::{BeatGrid, DrumHit, DrumType};

const QUIET_THRESHOLD_RATIO: f64 = 0.6;
const DEFAULT_SENSITIVITY_BOOST: f32 = 2.0;
const DEDUP_MS: f64 = 30.0;

/// Which bars to rescan: either an explicit list, or every bar whose
/// energy falls below the quiet threshold (spec §4.10, §6).
#[derive(Debug, Clone)]
pub enum TargetBars {
    Explicit(Vec<usize>),
    Quiet,
}

/// Per-bar RMS energy and quiet-bar classification (spec §4.10 step 1-3).
#[derive(Debug, Clone)]
pub struct BarEnergyMap {
    pub bar_rms: Vec<f64>,
    pub median_rms: f64,
    pub quiet_bars: Vec<usize>,
}

/// Divide the percussive waveform into one-bar slices per the beat grid
/// and compute each bar's RMS energy, marking bars quiet when they fall
/// below 60% of the median (spec §4.10).
pub fn compute_bar_energy_map(percussive: &[f32], sample_rate: f64, grid: &BeatGrid) -> BarEnergyMap {
    let per_bar = grid.time_signature.beats_per_bar() as usize;
    let bar_starts: Vec<f64> = grid
        .downbeats
        .iter()
        .filter(|d| d.beat_position == 1)
        .map(|d| d.time)
        .collect();

    let duration = percussive.len() as f64 / sample_rate;
    let mut bar_rms = Vec::with_capacity(bar_starts.len());

    for (i, &start) in bar_starts.iter().enumerate() {
        let end = bar_starts
            .get(i + 1)
            .copied()
            .unwrap_or(start + per_bar as f64 * grid.beat_interval_seconds())
            .min(duration);
        bar_rms.push(rms_between(percussive, sample_rate, start, end));
    }

    let mut sorted = bar_rms.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_rms = if sorted.is_empty() {
        0.0
    } else {
        sorted[sorted.len() / 2]
    };

    let quiet_bars = bar_rms
        .iter()
        .enumerate()
        .filter(|(_, &rms)| rms < median_rms * QUIET_THRESHOLD_RATIO)
        .map(|(i, _)| i)
        .collect();

    BarEnergyMap {
        bar_rms,
        median_rms,
        quiet_bars,
    }
}

fn rms_between(signal: &[f32], sample_rate: f64, start: f64, end: f64) -> f64 {
    let start_idx = (start * sample_rate).max(0.0) as usize;
    let end_idx = ((end * sample_rate) as usize).min(signal.len());
    if start_idx >= end_idx {
        return 0.0;
    }
    let sum_sq: f64 = signal[start_idx..end_idx]
        .iter()
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    (sum_sq / (end_idx - start_idx) as f64).sqrt()
}

/// New hit plus its originating bar and the relaxed threshold used to
/// find it (spec §4.10's rescan output contract).
#[derive(Debug, Clone)]
pub struct RescanHit {
    pub hit: DrumHit,
    pub bar_index: usize,
    pub threshold: f32,
}

/// Re-run Mode A over the selected (or quiet) bars with thresholds
/// divided by `sensitivity_boost`, skipping any hit within 30 ms of an
/// existing hit of the same type (spec §4.10 steps 4-5).
pub fn rescan(
    percussive: &[f32],
    sample_rate: f64,
    grid: &BeatGrid,
    existing_hits: &[DrumHit],
    targets: TargetBars,
    sensitivity_boost: f32,
) -> Vec<RescanHit> {
    let energy_map = compute_bar_energy_map(percussive, sample_rate, grid);
    let bars_to_scan: Vec<usize> = match targets {
        TargetBars::Explicit(bars) => bars,
        TargetBars::Quiet => energy_map.quiet_bars.clone(),
    };

    if bars_to_scan.is_empty() {
        return Vec::new();
    }

    let boost = if sensitivity_boost > 0.0 {
        sensitivity_boost
    } else {
        DEFAULT_SENSITIVITY_BOOST
    };

    let per_bar = grid.time_signature.beats_per_bar() as usize;
    let bar_starts: Vec<f64> = grid
        .downbeats
        .iter()
        .filter(|d| d.beat_position == 1)
        .map(|d| d.time)
        .collect();

    let (candidate_hits, stats) = detect_mode_a(percussive, sample_rate, grid, &[], boost);

    let mut out = Vec::new();
    for hit in candidate_hits {
        let Some(bar_index) = bar_index_for(&bar_starts, per_bar, grid, hit.time) else {
            continue;
        };
        if !bars_to_scan.contains(&bar_index) {
            continue;
        }
        if is_within_same_type(existing_hits, &hit, DEDUP_MS) {
            continue;
        }
        let threshold = threshold_for(&stats, hit.drum_type);
        out.push(RescanHit {
            hit,
            bar_index,
            threshold,
        });
    }

    out
}

fn threshold_for(stats: &[DrumProbeStats], drum: DrumType) -> f32 {
    stats
        .iter()
        .find(|s| s.drum == drum)
        .map(|s| s.threshold)
        .unwrap_or(0.0)
}

fn bar_index_for(bar_starts: &[f64], per_bar: usize, grid: &BeatGrid, time: f64) -> Option<usize> {
    if bar_starts.is_empty() {
        return None;
    }
    let bar_length = per_bar as f64 * grid.beat_interval_seconds();
    bar_starts
        .iter()
        .enumerate()
        .rev()
        .find(|(_, &start)| start <= time + bar_length * 0.001)
        .map(|(i, _)| i)
}

fn is_within_same_type(existing: &[DrumHit], candidate: &DrumHit, window_ms: f64) -> bool {
    let window = window_ms / 1000.0;
    existing
        .iter()
        .any(|h| h.drum_type == candidate.drum_type && (h.time - candidate.time).abs() < window)
}
