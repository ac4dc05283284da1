//! Stereo frame type and conversion between it and interleaved wire samples.
//!
//! - Decode: little-endian interleaved bytes → normalized `AudioFrame`s
//! - Encode: `AudioFrame`s → little-endian interleaved bytes

use std::fmt;
use std::str::FromStr;

use alsa::pcm::Format;
use anyhow::Result;

/// Channels per frame. The engine only ever runs stereo.
pub const CHANNELS: u32 = 2;

const S16_FULL_SCALE: f32 = i16::MAX as f32;

/// One sample instant across both channels, normalized to [-1.0, 1.0].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

impl AudioFrame {
    pub const SILENCE: AudioFrame = AudioFrame { left: 0.0, right: 0.0 };

    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }
}

/// Sample format used on the wire between the engine and the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Signed 16-bit little-endian
    S16Le,
    /// Signed 32-bit little-endian
    S32Le,
    /// IEEE 32-bit float little-endian
    F32Le,
}

impl WireFormat {
    /// Bytes per single-channel sample.
    pub fn sample_bytes(self) -> usize {
        match self {
            WireFormat::S16Le => 2,
            WireFormat::S32Le | WireFormat::F32Le => 4,
        }
    }

    /// Bytes per interleaved stereo frame.
    pub fn frame_bytes(self) -> usize {
        self.sample_bytes() * CHANNELS as usize
    }

    pub fn alsa_format(self) -> Format {
        match self {
            WireFormat::S16Le => Format::S16LE,
            WireFormat::S32Le => Format::S32LE,
            WireFormat::F32Le => Format::FloatLE,
        }
    }

    fn decode_sample(self, bytes: &[u8]) -> f32 {
        match self {
            WireFormat::S16Le => {
                i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / S16_FULL_SCALE
            }
            WireFormat::S32Le => {
                // f64 keeps the full 32-bit mantissa before narrowing
                let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                (v as f64 / i32::MAX as f64) as f32
            }
            WireFormat::F32Le => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    fn encode_sample(self, value: f32, out: &mut [u8]) {
        match self {
            WireFormat::S16Le => {
                let v = (value * S16_FULL_SCALE) as i16;
                out[..2].copy_from_slice(&v.to_le_bytes());
            }
            WireFormat::S32Le => {
                let v = (value as f64 * i32::MAX as f64) as i32;
                out[..4].copy_from_slice(&v.to_le_bytes());
            }
            WireFormat::F32Le => out[..4].copy_from_slice(&value.to_le_bytes()),
        }
    }

    /// Decode `frames.len()` interleaved stereo frames from `raw`.
    ///
    /// `raw` must hold at least `frames.len() * frame_bytes()` bytes.
    pub fn decode(self, raw: &[u8], frames: &mut [AudioFrame]) {
        let sb = self.sample_bytes();
        for (frame, chunk) in frames.iter_mut().zip(raw.chunks_exact(self.frame_bytes())) {
            frame.left = self.decode_sample(&chunk[..sb]);
            frame.right = self.decode_sample(&chunk[sb..]);
        }
    }

    /// Encode `frames` into `raw` as interleaved stereo samples.
    ///
    /// Values outside [-1.0, 1.0] follow Rust's saturating float-to-int cast
    /// for integer formats and pass through unchanged for float.
    pub fn encode(self, frames: &[AudioFrame], raw: &mut [u8]) {
        let sb = self.sample_bytes();
        for (frame, chunk) in frames.iter().zip(raw.chunks_exact_mut(self.frame_bytes())) {
            self.encode_sample(frame.left, &mut chunk[..sb]);
            self.encode_sample(frame.right, &mut chunk[sb..]);
        }
    }
}

impl FromStr for WireFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "S16_LE" | "S16LE" => Ok(WireFormat::S16Le),
            "S32_LE" | "S32LE" => Ok(WireFormat::S32Le),
            "FLOAT_LE" | "FLOAT" | "F32_LE" | "F32LE" => Ok(WireFormat::F32Le),
            other => anyhow::bail!("Unsupported wire format: {}", other),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireFormat::S16Le => "S16_LE",
            WireFormat::S32Le => "S32_LE",
            WireFormat::F32Le => "FLOAT_LE",
        };
        f.write_str(name)
    }
}
