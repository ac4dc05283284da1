//! audio - Full-duplex ALSA bridge
//!
//! Reads one period from the capture device, hands it to a user transform as
//! normalized stereo frames, and writes the result to the playback device.
//! Handles overrun, underrun and suspend in place on a dedicated thread.

mod alsa_device;
mod device;
mod engine;
mod format;
#[cfg(test)]
mod mock;
mod negotiate;
mod stats;

pub use alsa_device::{AlsaBackend, AlsaPcm};
pub use device::{DeviceError, Direction, HwGrant, HwRequest, PcmBackend, PcmDevice};
pub use engine::{DuplexEngine, EngineConfig, LoopExit, Transform};
pub use format::{AudioFrame, WireFormat, CHANNELS};
pub use negotiate::{latency_ms, MismatchPolicy, Negotiated, PeriodSpec};
pub use stats::{EngineState, StatsSnapshot};
