//! Buffer/period negotiation for the capture and playback streams.

use std::str::FromStr;

use anyhow::{Context, Result};

use super::device::{Direction, HwGrant, HwRequest, PcmBackend, PcmDevice};
use super::engine::EngineConfig;
use super::format::CHANNELS;

/// How the period is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSpec {
    /// Derive from a target buffer time in microseconds split into `periods`.
    Latency { latency_us: u32, periods: u32 },
    /// Use a fixed period size; the buffer holds `periods` of them.
    Fixed { period_size: usize, periods: u32 },
}

impl PeriodSpec {
    pub fn periods(&self) -> u32 {
        match *self {
            PeriodSpec::Latency { periods, .. } | PeriodSpec::Fixed { periods, .. } => periods,
        }
    }

    /// Requested (buffer_size, period_size) in frames.
    pub fn targets(&self, sample_rate: u32) -> Result<(usize, usize)> {
        let periods = self.periods();
        anyhow::ensure!(periods > 0, "Period count must be greater than zero");
        let (buffer, period) = match *self {
            PeriodSpec::Latency { latency_us, periods } => {
                let buffer = (sample_rate as u64 * latency_us as u64 / 1_000_000) as usize;
                (buffer, buffer / periods as usize)
            }
            PeriodSpec::Fixed { period_size, periods } => (period_size * periods as usize, period_size),
        };
        anyhow::ensure!(
            period > 0,
            "Requested period size is zero (rate={}, {:?})",
            sample_rate,
            self
        );
        Ok((buffer, period))
    }
}

/// What to do when both directions settle on different period sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Fail construction.
    #[default]
    Reject,
    /// Run both directions on the playback period size.
    PreferPlayback,
}

impl FromStr for MismatchPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" | "error" => Ok(MismatchPolicy::Reject),
            "playback" => Ok(MismatchPolicy::PreferPlayback),
            other => anyhow::bail!("Unknown period mismatch policy: {}", other),
        }
    }
}

/// Sizes committed by the hardware for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub capture: HwGrant,
    pub playback: HwGrant,
    /// Frames per period shared by both directions
    pub period_size: usize,
}

/// Milliseconds needed to drain `frames` at `sample_rate`.
pub fn latency_ms(frames: usize, sample_rate: u32) -> f64 {
    frames as f64 * 1000.0 / sample_rate as f64
}

impl Negotiated {
    /// Sum of both directions' buffer drain time.
    pub fn round_trip_ms(&self, sample_rate: u32) -> f64 {
        latency_ms(self.capture.buffer_size, sample_rate) + latency_ms(self.playback.buffer_size, sample_rate)
    }
}

fn report(direction: Direction, grant: &HwGrant, config: &EngineConfig) {
    log::info!(
        "{} configuration: buffer_size={} frames, period_size={} frames, periods={}, rate={} Hz, channels={}, latency={:.2} ms",
        direction,
        grant.buffer_size,
        grant.period_size,
        config.period.periods(),
        config.sample_rate,
        CHANNELS,
        latency_ms(grant.buffer_size, config.sample_rate),
    );
}

fn configure_one<D: PcmDevice>(
    device: &mut D,
    direction: Direction,
    request: &HwRequest,
    config: &EngineConfig,
) -> Result<HwGrant> {
    let grant = device
        .configure(request)
        .with_context(|| format!("Cannot configure {} device '{}'", direction, config.device))?;
    anyhow::ensure!(grant.period_size > 0, "{} device granted a zero period size", direction);
    report(direction, &grant, config);
    Ok(grant)
}

/// Open and configure both directions.
///
/// Any failure drops whatever was already opened before returning.
pub fn open_duplex<B: PcmBackend>(
    backend: &B,
    config: &EngineConfig,
) -> Result<(B::Device, B::Device, Negotiated)> {
    anyhow::ensure!(config.sample_rate > 0, "Sample rate must be greater than zero");
    let (buffer_size, period_size) = config.period.targets(config.sample_rate)?;

    let mut capture = backend.open(Direction::Capture, &config.device)?;
    let mut playback = backend.open(Direction::Playback, &config.device)?;

    let request = HwRequest {
        format: config.format,
        channels: CHANNELS,
        sample_rate: config.sample_rate,
        buffer_size,
        period_size,
    };

    let capture_grant = configure_one(&mut capture, Direction::Capture, &request, config)?;
    let playback_grant = configure_one(&mut playback, Direction::Playback, &request, config)?;

    let period_size = if capture_grant.period_size == playback_grant.period_size {
        playback_grant.period_size
    } else {
        match config.mismatch {
            MismatchPolicy::Reject => anyhow::bail!(
                "Capture and playback negotiated different period sizes ({} vs {} frames)",
                capture_grant.period_size,
                playback_grant.period_size
            ),
            MismatchPolicy::PreferPlayback => {
                log::warn!(
                    "Period size mismatch (capture={}, playback={}), using playback value",
                    capture_grant.period_size,
                    playback_grant.period_size
                );
                playback_grant.period_size
            }
        }
    };

    let negotiated = Negotiated {
        capture: capture_grant,
        playback: playback_grant,
        period_size,
    };
    log::info!(
        "Total round-trip latency: {:.2} ms",
        negotiated.round_trip_ms(config.sample_rate)
    );

    Ok((capture, playback, negotiated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::WireFormat;
    use crate::audio::mock::{MockBackend, Script};
    use approx::assert_abs_diff_eq;

    fn config(period: PeriodSpec) -> EngineConfig {
        EngineConfig {
            device: "mock".to_string(),
            sample_rate: 48000,
            period,
            format: WireFormat::S16Le,
            mismatch: MismatchPolicy::Reject,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn latency_targets() {
        let spec = PeriodSpec::Latency { latency_us: 5333, periods: 2 };
        // 48000 * 5333 / 1e6 = 255.98 → 255
        assert_eq!(spec.targets(48000).unwrap(), (255, 127));

        let fixed = PeriodSpec::Fixed { period_size: 64, periods: 3 };
        assert_eq!(fixed.targets(44100).unwrap(), (192, 64));
    }

    #[test]
    fn degenerate_targets_rejected() {
        assert!(PeriodSpec::Latency { latency_us: 10, periods: 2 }.targets(48000).is_err());
        assert!(PeriodSpec::Latency { latency_us: 10_000, periods: 0 }.targets(48000).is_err());
        assert!(PeriodSpec::Fixed { period_size: 0, periods: 2 }.targets(48000).is_err());
    }

    #[test]
    fn matching_grants_share_period() {
        let backend = MockBackend::new(Script::default(), Script::default());
        let cfg = config(PeriodSpec::Fixed { period_size: 128, periods: 2 });
        let (_c, _p, negotiated) = open_duplex(&backend, &cfg).unwrap();

        assert_eq!(negotiated.period_size, 128);
        assert_eq!(negotiated.capture.period_size, negotiated.playback.period_size);
        assert_abs_diff_eq!(negotiated.round_trip_ms(48000), 2.0 * 256.0 * 1000.0 / 48000.0, epsilon = 1e-9);
    }

    #[test]
    fn mismatch_rejected_by_default_and_devices_released() {
        let playback = Script {
            grant_period: Some(96),
            ..Script::default()
        };
        let backend = MockBackend::new(Script::default(), playback);
        let cfg = config(PeriodSpec::Fixed { period_size: 128, periods: 2 });

        let err = open_duplex(&backend, &cfg).err().unwrap();
        assert!(err.to_string().contains("different period sizes"));
        assert_eq!(backend.closes(), 2);
    }

    #[test]
    fn mismatch_prefers_playback_when_asked() {
        let playback = Script {
            grant_period: Some(96),
            ..Script::default()
        };
        let backend = MockBackend::new(Script::default(), playback);
        let mut cfg = config(PeriodSpec::Fixed { period_size: 128, periods: 2 });
        cfg.mismatch = MismatchPolicy::PreferPlayback;

        let (_c, _p, negotiated) = open_duplex(&backend, &cfg).unwrap();
        assert_eq!(negotiated.period_size, 96);
        assert_eq!(negotiated.capture.period_size, 128);
    }

    #[test]
    fn configure_failure_releases_both() {
        let capture = Script {
            fail_configure: true,
            ..Script::default()
        };
        let backend = MockBackend::new(capture, Script::default());
        let cfg = config(PeriodSpec::Fixed { period_size: 128, periods: 2 });

        assert!(open_duplex(&backend, &cfg).is_err());
        assert_eq!(backend.opens(), 2);
        assert_eq!(backend.closes(), 2);
    }

    #[test]
    fn playback_open_failure_releases_capture() {
        let playback = Script {
            fail_open: true,
            ..Script::default()
        };
        let backend = MockBackend::new(Script::default(), playback);
        let cfg = config(PeriodSpec::Fixed { period_size: 128, periods: 2 });

        assert!(open_duplex(&backend, &cfg).is_err());
        assert_eq!(backend.opens(), 1);
        assert_eq!(backend.closes(), 1);
    }

    #[test]
    fn policy_names() {
        assert_eq!("reject".parse::<MismatchPolicy>().unwrap(), MismatchPolicy::Reject);
        assert_eq!("Playback".parse::<MismatchPolicy>().unwrap(), MismatchPolicy::PreferPlayback);
        assert!("capture".parse::<MismatchPolicy>().is_err());
    }
}
