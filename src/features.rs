//! Feature extractor (C4, spec §4.4).
//!
//! Produces the fixed-schema [`FeatureVector`] the classifier (C7) scores.
//! FFT plumbing follows the windowed-FFT pattern in the teacher's
//! `library/analysis.rs`; band-ratio/centroid/flatness/ZCR/envelope math is
//! new, built directly from spec §4.4's formulas.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::types::FeatureVector;

/// Minimum window length below which spec §4.4 mandates the documented
/// default feature vector.
const MIN_WINDOW_SAMPLES: usize = 256;

const WINDOW_TOTAL_MS: f64 = 80.0;
const WINDOW_PRE_FRACTION: f64 = 0.25;

struct Band {
    low_hz: f32,
    high_hz: f32,
}

const BANDS: [Band; 7] = [
    Band { low_hz: 20.0, high_hz: 60.0 },     // sub_bass
    Band { low_hz: 60.0, high_hz: 200.0 },    // bass
    Band { low_hz: 200.0, high_hz: 500.0 },   // low_mid
    Band { low_hz: 500.0, high_hz: 2000.0 },  // mid
    Band { low_hz: 2000.0, high_hz: 6000.0 }, // high_mid
    Band { low_hz: 6000.0, high_hz: 20000.0 },// high
    Band { low_hz: 6000.0, high_hz: 16000.0 },// hihat_band
];

/// Extract a [`FeatureVector`] from the window centered on `onset_time`
/// (seconds) within `samples` at `sample_rate`.
pub fn extract(samples: &[f32], sample_rate: u32, onset_time: f64) -> FeatureVector {
    let total_len = ((WINDOW_TOTAL_MS / 1000.0) * sample_rate as f64).round() as usize;
    let pre_len = ((total_len as f64) * WINDOW_PRE_FRACTION).round() as usize;
    let onset_sample = (onset_time * sample_rate as f64).round() as i64;

    let start = (onset_sample - pre_len as i64).max(0) as usize;
    let end = ((onset_sample - pre_len as i64 + total_len as i64).max(0) as usize).min(samples.len());

    if end <= start || end - start < MIN_WINDOW_SAMPLES {
        return FeatureVector::default();
    }

    let window = &samples[start..end];
    extract_from_window(window, sample_rate)
}

/// Extract features directly from a pre-sliced window (used by tests and
/// by callers that already isolated the onset window).
pub fn extract_from_window(window: &[f32], sample_rate: u32) -> FeatureVector {
    if window.len() < MIN_WINDOW_SAMPLES {
        return FeatureVector::default();
    }

    let spectrum = magnitude_spectrum(window);
    let bin_width = sample_rate as f32 / window.len() as f32;

    let band_energies: Vec<f32> = BANDS
        .iter()
        .map(|b| band_energy(&spectrum, bin_width, b.low_hz, b.high_hz))
        .collect();
    let total_energy: f32 = spectrum.iter().map(|m| m * m).sum::<f32>().max(1e-12);

    let centroid = spectral_centroid(&spectrum, bin_width);
    let flatness = spectral_flatness(&spectrum);
    let zcr = zero_crossing_rate(window);
    let (attack_ms, decay_ms) = envelope_timing(window, sample_rate);

    FeatureVector {
        sub_bass: band_energies[0] / total_energy,
        bass: band_energies[1] / total_energy,
        low_mid: band_energies[2] / total_energy,
        mid: band_energies[3] / total_energy,
        high_mid: band_energies[4] / total_energy,
        high: band_energies[5] / total_energy,
        hihat_band: band_energies[6] / total_energy,
        centroid,
        flatness,
        zcr,
        attack_ms,
        decay_ms,
    }
}

fn magnitude_spectrum(window: &[f32]) -> Vec<f32> {
    let n = window.len();
    let hanning: Vec<f32> = (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()))
        .collect();

    let mut buffer: Vec<Complex<f32>> = window
        .iter()
        .zip(hanning.iter())
        .map(|(s, w)| Complex::new(s * w, 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    buffer[..n / 2 + 1].iter().map(|c| c.norm()).collect()
}

fn band_energy(spectrum: &[f32], bin_width: f32, low_hz: f32, high_hz: f32) -> f32 {
    let low_bin = (low_hz / bin_width).floor() as usize;
    let high_bin = ((high_hz / bin_width).ceil() as usize).min(spectrum.len().saturating_sub(1));
    if low_bin > high_bin {
        return 0.0;
    }
    spectrum[low_bin..=high_bin].iter().map(|m| m * m).sum()
}

fn spectral_centroid(spectrum: &[f32], bin_width: f32) -> f32 {
    let mut weighted = 0.0f32;
    let mut total = 0.0f32;
    for (bin, &mag) in spectrum.iter().enumerate() {
        let freq = bin as f32 * bin_width;
        weighted += freq * mag;
        total += mag;
    }
    let centroid_hz = if total > 1e-12 { weighted / total } else { 0.0 };
    (centroid_hz / 10_000.0).clamp(0.0, 1.0)
}

fn spectral_flatness(spectrum: &[f32]) -> f32 {
    let positive: Vec<f32> = spectrum.iter().copied().filter(|&m| m > 1e-12).collect();
    if positive.is_empty() {
        return 0.0;
    }
    let log_sum: f32 = positive.iter().map(|m| m.ln()).sum();
    let geo_mean = (log_sum / positive.len() as f32).exp();
    let arith_mean = positive.iter().sum::<f32>() / positive.len() as f32;
    if arith_mean > 1e-12 {
        (geo_mean / arith_mean).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn zero_crossing_rate(window: &[f32]) -> f32 {
    if window.len() < 2 {
        return 0.0;
    }
    let crossings = window
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / (window.len() - 1) as f32
}

/// Attack width (10%-90% of peak) and decay time (peak to 10% of peak),
/// both in milliseconds, from the absolute-value envelope (spec §4.4).
fn envelope_timing(window: &[f32], sample_rate: u32) -> (f32, f32) {
    let envelope: Vec<f32> = window.iter().map(|s| s.abs()).collect();
    let (peak_idx, &peak_val) = envelope
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or((0, &0.0));

    if peak_val <= 1e-9 {
        return (0.0, 0.0);
    }

    let ten_pct = peak_val * 0.1;
    let ninety_pct = peak_val * 0.9;

    let t10 = (0..=peak_idx)
        .find(|&i| envelope[i] >= ten_pct)
        .unwrap_or(0);
    let t90 = (t10..=peak_idx)
        .find(|&i| envelope[i] >= ninety_pct)
        .unwrap_or(peak_idx);
    let attack_samples = t90.saturating_sub(t10);

    let decay_end = (peak_idx..envelope.len())
        .find(|&i| envelope[i] <= ten_pct)
        .unwrap_or(envelope.len() - 1);
    let decay_samples = decay_end.saturating_sub(peak_idx);

    let ms_per_sample = 1000.0 / sample_rate as f32;
    (attack_samples as f32 * ms_per_sample, decay_samples as f32 * ms_per_sample)
}
