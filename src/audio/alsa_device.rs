//! ALSA PCM device wrappers for duplex capture and playback.

use alsa::pcm::{Access, Frames, HwParams, PCM};
use alsa::ValueOr;
use anyhow::{Context, Result};

use super::device::{DeviceError, Direction, HwGrant, HwRequest, PcmBackend, PcmDevice};

/// Opens real ALSA PCM handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlsaBackend;

impl PcmBackend for AlsaBackend {
    type Device = AlsaPcm;

    fn open(&self, direction: Direction, name: &str) -> Result<AlsaPcm> {
        let alsa_dir = match direction {
            Direction::Capture => alsa::Direction::Capture,
            Direction::Playback => alsa::Direction::Playback,
        };
        let pcm = PCM::new(name, alsa_dir, false)
            .with_context(|| format!("Failed to open PCM device '{}' for {}", name, direction))?;
        Ok(AlsaPcm {
            pcm,
            direction,
            name: name.to_string(),
        })
    }
}

/// A blocking, interleaved ALSA stream. Closed on drop.
pub struct AlsaPcm {
    pcm: PCM,
    direction: Direction,
    name: String,
}

fn map_err(e: alsa::Error) -> DeviceError {
    match e.errno().abs() {
        libc::EPIPE => DeviceError::Xrun,
        libc::ESTRPIPE => DeviceError::Suspended,
        libc::EAGAIN => DeviceError::Again,
        _ => DeviceError::Failed(e.to_string()),
    }
}

impl PcmDevice for AlsaPcm {
    fn configure(&mut self, request: &HwRequest) -> Result<HwGrant> {
        let dir_name = self.direction;

        // Configure hardware parameters
        {
            let hwp = HwParams::any(&self.pcm).with_context(|| "Failed to initialize HwParams")?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_format(request.format.alsa_format())
                .with_context(|| format!("{}: format {} not supported", dir_name, request.format))?;
            hwp.set_channels(request.channels)?;
            hwp.set_rate(request.sample_rate, ValueOr::Nearest)
                .with_context(|| format!("{}: rate {} not supported", dir_name, request.sample_rate))?;
            hwp.set_buffer_size_near(request.buffer_size as Frames)?;
            hwp.set_period_size_near(request.period_size as Frames, ValueOr::Nearest)?;
            self.pcm
                .hw_params(&hwp)
                .with_context(|| format!("Cannot configure {} device '{}'", dir_name, self.name))?;
        }

        // Read back actual negotiated parameters
        let hwp = self.pcm.hw_params_current()?;
        let buffer_size = hwp.get_buffer_size()? as usize;
        let period_size = hwp.get_period_size()? as usize;

        log::debug!(
            "ALSA {}: device={}, buffer_size={}, period_size={}",
            dir_name,
            self.name,
            buffer_size,
            period_size,
        );

        Ok(HwGrant {
            buffer_size,
            period_size,
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        self.pcm.io_bytes().readi(buf).map_err(map_err)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, DeviceError> {
        self.pcm.io_bytes().writei(buf).map_err(map_err)
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.pcm.prepare().map_err(map_err)
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.pcm.resume().map_err(map_err)
    }
}

impl Drop for AlsaPcm {
    fn drop(&mut self) {
        log::debug!("Closing ALSA {} device '{}'", self.direction, self.name);
    }
}
