//! Short-time Fourier transform (C3, spec §4.3).
//!
//! Grounded on the windowed-FFT loop the teacher repeats in
//! `library/analysis.rs` and `library/qm_tempo.rs`, generalized into a
//! reusable forward/inverse transform over a 2-D magnitude/phase matrix
//! (the shape `hpss.rs` needs) instead of being inlined into each onset
//! function.

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// STFT analysis parameters; defaults match spec §4.3.
#[derive(Debug, Clone, Copy)]
pub struct StftConfig {
    pub n_fft: usize,
    pub hop: usize,
}

impl Default for StftConfig {
    fn default() -> Self {
        StftConfig {
            n_fft: 2048,
            hop: 512,
        }
    }
}

pub fn hann_window(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()))
        .collect()
}

/// Complex spectrogram: rows are frequency bins (`n_fft/2 + 1`), columns
/// are time frames. One of these is the "single STFT-sized matrix" the
/// memory-discipline note in spec §4.3 allows to be live at a time.
pub type Spectrogram = Array2<Complex<f32>>;

/// Forward STFT with a Hann window.
pub fn stft(samples: &[f32], config: StftConfig) -> Spectrogram {
    let n_fft = config.n_fft;
    let hop = config.hop;
    let n_freqs = n_fft / 2 + 1;

    if samples.len() < n_fft {
        return Array2::zeros((n_freqs, 0));
    }

    let n_frames = (samples.len() - n_fft) / hop + 1;
    let window = hann_window(n_fft);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);

    let mut out = Array2::<Complex<f32>>::zeros((n_freqs, n_frames));
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

    for frame in 0..n_frames {
        let start = frame * hop;
        for i in 0..n_fft {
            buffer[i] = Complex::new(samples[start + i] * window[i], 0.0);
        }
        fft.process(&mut buffer);
        for (bin, c) in buffer.iter().take(n_freqs).enumerate() {
            out[[bin, frame]] = *c;
        }
    }

    out
}

/// Inverse STFT via overlap-add, reconstructing `out_len` samples.
/// Consumes `spec` so the caller can't accidentally keep two spectrogram-
/// sized matrices alive across the call.
pub fn istft(spec: Spectrogram, config: StftConfig, out_len: usize) -> Vec<f32> {
    let n_fft = config.n_fft;
    let hop = config.hop;
    let (n_freqs, n_frames) = spec.dim();
    if n_frames == 0 {
        return vec![0.0; out_len];
    }

    let window = hann_window(n_fft);
    let mut planner = FftPlanner::new();
    let ifft = planner.plan_fft_inverse(n_fft);

    let mut output = vec![0.0f32; out_len];
    let mut window_sum = vec![0.0f32; out_len];
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

    for frame in 0..n_frames {
        for k in 0..n_freqs {
            buffer[k] = spec[[k, frame]];
        }
        // Conjugate-symmetric mirror for a real-valued inverse transform.
        for k in 1..n_fft - n_freqs + 1 {
            buffer[n_fft - k] = buffer[k].conj();
        }

        ifft.process(&mut buffer);

        let start = frame * hop;
        let norm = 1.0 / n_fft as f32;
        for i in 0..n_fft {
            if start + i >= out_len {
                break;
            }
            let windowed = buffer[i].re * norm * window[i];
            output[start + i] += windowed;
            window_sum[start + i] += window[i] * window[i];
        }
    }

    for (o, w) in output.iter_mut().zip(window_sum.iter()) {
        if *w > 1e-8 {
            *o /= *w;
        }
    }

    output
}
