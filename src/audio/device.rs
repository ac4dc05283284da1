//! Device layer seam between the engine and the PCM driver.
//!
//! The engine only talks to `PcmBackend` / `PcmDevice`; `alsa_device` provides
//! the hardware implementation. A device handle is closed when it is dropped.

use std::fmt;

use anyhow::Result;
use thiserror::Error;

use super::format::WireFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Capture,
    Playback,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Capture => f.write_str("Capture"),
            Direction::Playback => f.write_str("Playback"),
        }
    }
}

/// Hardware parameters asked of one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwRequest {
    pub format: WireFormat,
    pub channels: u32,
    pub sample_rate: u32,
    /// Target ring buffer size in frames
    pub buffer_size: usize,
    /// Target period size in frames
    pub period_size: usize,
}

/// What the hardware actually committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwGrant {
    pub buffer_size: usize,
    pub period_size: usize,
}

/// Transfer-time failures reported by a device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Overrun on capture, underrun on playback.
    #[error("xrun")]
    Xrun,

    #[error("stream suspended")]
    Suspended,

    /// Resume not finished yet; try again later.
    #[error("resource temporarily unavailable")]
    Again,

    #[error("{0}")]
    Failed(String),
}

/// One open, configured PCM stream.
///
/// Buffers are interleaved stereo in the configured wire format; transfer
/// sizes are implied by the buffer length.
pub trait PcmDevice: Send {
    /// Commit hardware parameters and read back the granted sizes.
    fn configure(&mut self, request: &HwRequest) -> Result<HwGrant>;

    /// Blocking read; returns frames read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;

    /// Blocking write; returns frames written.
    fn write(&mut self, buf: &[u8]) -> Result<usize, DeviceError>;

    fn prepare(&mut self) -> Result<(), DeviceError>;

    /// `Err(DeviceError::Again)` means the hardware is still waking up.
    fn resume(&mut self) -> Result<(), DeviceError>;
}

/// Opens device handles by name.
pub trait PcmBackend {
    type Device: PcmDevice + 'static;

    fn open(&self, direction: Direction, name: &str) -> Result<Self::Device>;
}
