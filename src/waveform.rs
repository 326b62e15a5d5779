//! Audio loader (C1, spec §4.1).
//!
//! Decodes an arbitrary byte buffer to PCM at the pipeline's fixed sample
//! rate. Channels are preserved (mono stays mono, stereo stays two
//! channels) rather than always downmixed, since §3 allows either shape;
//! callers that need mono for analysis call [`Waveform::to_mono`].

use std::io::{Cursor, Read};

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AnalysisError, Result};
use crate::types::SAMPLE_RATE;

/// Maximum accepted input size, per spec §5 resource caps.
pub const MAX_INPUT_BYTES: u64 = 200 * 1024 * 1024;

/// Decoded audio, resampled to [`SAMPLE_RATE`] and either mono or stereo.
///
/// Channels are stored non-interleaved ("interleaved-by-channel not by
/// frame", spec §3): `channels[0]` is the full left/mono track,
/// `channels[1]` (if present) is the full right track.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn is_stereo(&self) -> bool {
        self.channels.len() >= 2
    }

    /// Average all channels down to mono, the shape every DSP stage in
    /// this crate operates on.
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => {
                let len = self.channels[0].len();
                let mut out = vec![0.0f32; len];
                for ch in &self.channels {
                    for (o, s) in out.iter_mut().zip(ch.iter()) {
                        *o += s;
                    }
                }
                let inv = 1.0 / n as f32;
                for o in out.iter_mut() {
                    *o *= inv;
                }
                out
            }
        }
    }

    /// Build a waveform from a pre-decoded mono buffer, e.g. for tests and
    /// for the isolated-drums stem returned by an external separator.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Waveform {
            channels: vec![samples],
            sample_rate,
        }
    }
}

/// Decode a byte buffer to a [`Waveform`], with a filename hint used only
/// to help format probing (spec §4.1, §6).
pub fn decode(bytes: &[u8], filename_hint: Option<&str>) -> Result<Waveform> {
    if bytes.len() as u64 > MAX_INPUT_BYTES {
        return Err(AnalysisError::TooLarge {
            size_bytes: bytes.len() as u64,
            limit_bytes: MAX_INPUT_BYTES,
        });
    }

    let cursor = Cursor::new(bytes.to_vec());
    let source = ReadOnlySource::new(cursor);
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(name) = filename_hint {
        if let Some(ext) = name.rsplit('.').next() {
            hint.with_extension(ext);
        }
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AnalysisError::Decode(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::Decode("no audio track found".to_string()))?
        .clone();

    let track_id = track.id;
    let source_rate = track.codec_params.sample_rate.unwrap_or(SAMPLE_RATE);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::Decode(e.to_string()))?;

    let mut raw_channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("error reading packet: {e}");
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => append_channels(&mut raw_channels, &decoded),
            Err(e) => log::warn!("error decoding packet: {e}"),
        }
    }

    if raw_channels.is_empty() {
        return Err(AnalysisError::Decode(
            "decoder produced no samples".to_string(),
        ));
    }

    let channels = if source_rate == SAMPLE_RATE {
        raw_channels
    } else {
        raw_channels
            .into_iter()
            .map(|c| resample_linear(&c, source_rate, SAMPLE_RATE))
            .collect()
    };

    Ok(Waveform {
        channels,
        sample_rate: SAMPLE_RATE,
    })
}

/// Append one decoded packet's samples to per-channel buffers, preserving
/// silence exactly as decoded (spec §4.1: "silence is preserved").
fn append_channels(channels: &mut Vec<Vec<f32>>, decoded: &AudioBufferRef) {
    macro_rules! push_typed {
        ($buf:expr, $convert:expr) => {{
            let n_channels = $buf.spec().channels.count();
            if channels.len() < n_channels {
                channels.resize_with(n_channels, Vec::new);
            }
            for ch in 0..n_channels {
                let src = $buf.chan(ch);
                channels[ch].extend(src.iter().map(|&s| $convert(s)));
            }
        }};
    }

    match decoded {
        AudioBufferRef::F32(buf) => push_typed!(buf, |s: f32| s),
        AudioBufferRef::S16(buf) => push_typed!(buf, |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S32(buf) => push_typed!(buf, |s: i32| s as f32 / 2147483648.0),
        AudioBufferRef::U8(buf) => push_typed!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
        _ => {}
    }
}

/// Linear-interpolation resampler. Good enough for the analysis pipeline,
/// which only needs a fixed, deterministic sample rate downstream; a host
/// wanting mastering-grade resampling can resample before calling in.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx0 = src_pos.floor() as usize;
        let idx1 = (idx0 + 1).min(samples.len() - 1);
        let frac = (src_pos - idx0 as f64) as f32;
        let idx0 = idx0.min(samples.len() - 1);
        out.push(samples[idx0] * (1.0 - frac) + samples[idx1] * frac);
    }
    out
}

/// A thin in-memory reader so tests can decode from a `Vec<u8>` the same
/// way production code decodes from an upload buffer.
pub fn read_all(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}
