//! Filter bank (C2, spec §4.2).
//!
//! Cascaded biquad second-order sections built from the Audio EQ Cookbook
//! formulas (grounded the way `speccade-backend-audio`'s `filter.rs`
//! builds its biquads), staggered per-section Q values approximating an
//! `order`-pole Butterworth response. All filtering is causal direct-form
//! I (no zero-phase/filtfilt), per spec: "preserve transient timing".

use std::f64::consts::PI;

/// One second-order section: `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
#[derive(Debug, Clone, Copy)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    fn identity() -> Self {
        BiquadCoeffs {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    fn bandpass(center: f64, q: f64, sample_rate: f64) -> Self {
        let q = q.max(0.05);
        let omega = 2.0 * PI * center / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    fn lowpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let q = q.max(0.05);
        let omega = 2.0 * PI * cutoff / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    fn highpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let q = q.max(0.05);
        let omega = 2.0 * PI * cutoff / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 + cos_omega) / 2.0;
        let b1 = -(1.0 + cos_omega);
        let b2 = (1.0 + cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, c: &BiquadCoeffs, input: f64) -> f64 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// A cascade of second-order sections: the filter bank's stable, causal
/// primitive (spec §4.2's "stable second-order-section filter").
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<BiquadCoeffs>,
}

impl SosFilter {
    /// The identity filter (passthrough), returned when `lowcut >= highcut`.
    pub fn identity() -> Self {
        SosFilter {
            sections: vec![BiquadCoeffs::identity()],
        }
    }

    /// Apply the filter to a buffer causally (forward-only), returning a
    /// new buffer the same length as the input.
    pub fn apply(&self, input: &[f32]) -> Vec<f32> {
        let mut states = vec![BiquadState::default(); self.sections.len()];
        input
            .iter()
            .map(|&s| {
                let mut v = s as f64;
                for (section, state) in self.sections.iter().zip(states.iter_mut()) {
                    v = state.process(section, v);
                }
                v as f32
            })
            .collect()
    }
}

/// Staggered per-section Q values for an `order`-pole Butterworth
/// lowpass prototype (pole angles `theta_k = pi*(2k-1)/(4n)`), reused here
/// to stagger a bandpass cascade's resonance so the combined response
/// approximates a maximally-flat Butterworth band.
fn butterworth_section_qs(sections: usize) -> Vec<f64> {
    (1..=sections.max(1))
        .map(|k| {
            let theta = PI * (2.0 * k as f64 - 1.0) / (4.0 * sections.max(1) as f64);
            1.0 / (2.0 * theta.cos())
        })
        .collect()
}

fn clamp_cutoffs(sample_rate: f64, lowcut: f64, highcut: f64) -> Option<(f64, f64)> {
    let nyquist = sample_rate / 2.0;
    let lowcut = lowcut.max(0.01 * nyquist);
    let highcut = highcut.min(0.99 * nyquist);
    if lowcut >= highcut {
        log::warn!(
            "bandpass({lowcut}, {highcut}) has lowcut >= highcut after clamping; returning identity filter"
        );
        None
    } else {
        Some((lowcut, highcut))
    }
}

/// Construct a bandpass filter covering `[lowcut, highcut]` Hz using
/// `order` poles (an even number; `order/2` cascaded sections). Returns
/// the identity filter when the clamped band is empty (spec §4.2).
pub fn bandpass(sample_rate: f64, lowcut: f64, highcut: f64, order: usize) -> SosFilter {
    let Some((lowcut, highcut)) = clamp_cutoffs(sample_rate, lowcut, highcut) else {
        return SosFilter::identity();
    };

    let center = (lowcut * highcut).sqrt();
    let bandwidth = highcut - lowcut;
    let base_q = (center / bandwidth).max(0.05);

    let sections = (order / 2).max(1);
    let qs = butterworth_section_qs(sections);
    let coeffs = qs
        .into_iter()
        .map(|stagger| BiquadCoeffs::bandpass(center, base_q * stagger, sample_rate))
        .collect();

    SosFilter { sections: coeffs }
}

/// Construct a highpass filter at `cutoff` Hz using `order` poles.
pub fn highpass(sample_rate: f64, cutoff: f64, order: usize) -> SosFilter {
    let nyquist = sample_rate / 2.0;
    let cutoff = cutoff.clamp(0.01 * nyquist, 0.99 * nyquist);
    let sections = (order / 2).max(1);
    let qs = butterworth_section_qs(sections);
    let coeffs = qs
        .into_iter()
        .map(|q| BiquadCoeffs::highpass(cutoff, q, sample_rate))
        .collect();
    SosFilter { sections: coeffs }
}

/// Construct a lowpass filter at `cutoff` Hz using `order` poles.
pub fn lowpass(sample_rate: f64, cutoff: f64, order: usize) -> SosFilter {
    let nyquist = sample_rate / 2.0;
    let cutoff = cutoff.clamp(0.01 * nyquist, 0.99 * nyquist);
    let sections = (order / 2).max(1);
    let qs = butterworth_section_qs(sections);
    let coeffs = qs
        .into_iter()
        .map(|q| BiquadCoeffs::lowpass(cutoff, q, sample_rate))
        .collect();
    SosFilter { sections: coeffs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: f64, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin() as f32)
            .collect()
    }

    fn rms(signal: &[f32]) -> f64 {
        let sum_sq: f64 = signal.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / signal.len() as f64).sqrt()
    }

    #[test]
    fn identity_filter_passes_signal_unchanged() {
        let filter = bandpass(44_100.0, 100.0, 50.0, 4); // lowcut >= highcut
        let input = sine(440.0, 44_100.0, 1024);
        let output = filter.apply(&input);
        assert_eq!(input, output);
    }

    #[test]
    fn bandpass_rejects_out_of_band_energy() {
        let filter = bandpass(44_100.0, 900.0, 1100.0, 4);
        let in_band = sine(1000.0, 44_100.0, 8192);
        let out_of_band = sine(60.0, 44_100.0, 8192);

        let pass_in_band = filter.apply(&in_band);
        let pass_out_of_band = filter.apply(&out_of_band);

        // Settle past the filter's transient before comparing.
        let settle = 2048;
        assert!(rms(&pass_in_band[settle..]) > rms(&pass_out_of_band[settle..]) * 3.0);
    }

    #[test]
    fn highpass_attenuates_dc() {
        let filter = highpass(44_100.0, 200.0, 4);
        let dc = vec![1.0f32; 4096];
        let output = filter.apply(&dc);
        assert!(output[4095].abs() < 0.05);
    }
}
