//! The duplex engine: capture → transform → playback, one period at a time.
//!
//! Uses a dedicated std::thread for the real-time loop. The device handles and
//! frame buffers move into that thread while it runs and come back when it
//! exits, so nothing but the running flag and the counters is shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::alsa_device::{AlsaBackend, AlsaPcm};
use super::device::{DeviceError, Direction, PcmBackend, PcmDevice};
use super::format::{AudioFrame, WireFormat};
use super::negotiate::{self, MismatchPolicy, Negotiated, PeriodSpec};
use super::stats::{EngineState, EngineStats, StatsSnapshot};

/// Longest stretch the suspend back-off sleeps without checking the stop flag.
const STOP_CHECK_SLICE: Duration = Duration::from_millis(10);

/// Frame transform run once per period on the audio thread.
///
/// Receives exactly one period of input and must fill every output frame.
pub type Transform = Box<dyn FnMut(&[AudioFrame], &mut [AudioFrame]) + Send + 'static>;

/// Session configuration, fixed for the lifetime of an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// PCM name used for both directions (e.g. "default", "plughw:0,0")
    pub device: String,
    pub sample_rate: u32,
    pub period: PeriodSpec,
    pub format: WireFormat,
    pub mismatch: MismatchPolicy,
    /// Back-off between resume attempts on a suspended stream; at least 10 ms
    pub suspend_poll: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 48000,
            period: PeriodSpec::Latency {
                latency_us: 5333,
                periods: 2,
            },
            format: WireFormat::S16Le,
            mismatch: MismatchPolicy::Reject,
            suspend_poll: Duration::from_secs(1),
        }
    }
}

/// Why the processing loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    Fatal,
}

enum Step {
    Continue,
    Retry,
    Exit(LoopExit),
}

enum Recovery {
    Recovered,
    Interrupted,
    Failed,
}

/// Everything the loop thread owns while it runs.
struct Session<D> {
    capture: D,
    playback: D,
    format: WireFormat,
    period_size: usize,
    input: Vec<AudioFrame>,
    output: Vec<AudioFrame>,
    capture_raw: Vec<u8>,
    playback_raw: Vec<u8>,
    transform: Transform,
    suspend_poll: Duration,
}

/// Sleep for `total`, returning early with `false` once `running` clears.
fn sleep_while_running(running: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_CHECK_SLICE));
    }
}

/// Resume a suspended stream, falling back to prepare if resume is refused.
fn recover_suspend<D: PcmDevice>(
    device: &mut D,
    direction: Direction,
    running: &AtomicBool,
    poll: Duration,
) -> Recovery {
    log::warn!("{} stream suspended, waiting for resume", direction);
    loop {
        match device.resume() {
            Ok(()) => return Recovery::Recovered,
            Err(DeviceError::Again) => {
                if !sleep_while_running(running, poll) {
                    log::info!("{} stop requested during suspend recovery", direction);
                    return Recovery::Interrupted;
                }
            }
            Err(e) => {
                log::warn!("{} resume failed ({}), preparing instead", direction, e);
                return match device.prepare() {
                    Ok(()) => Recovery::Recovered,
                    Err(e) => {
                        log::error!("Failed to recover {} from suspend: {}", direction, e);
                        Recovery::Failed
                    }
                };
            }
        }
    }
}

impl<D: PcmDevice> Session<D> {
    fn new(capture: D, playback: D, negotiated: &Negotiated, config: &EngineConfig, transform: Transform) -> Self {
        let period_size = negotiated.period_size;
        let raw_len = period_size * config.format.frame_bytes();
        Self {
            capture,
            playback,
            format: config.format,
            period_size,
            input: vec![AudioFrame::SILENCE; period_size],
            output: vec![AudioFrame::SILENCE; period_size],
            capture_raw: vec![0u8; raw_len],
            playback_raw: vec![0u8; raw_len],
            transform,
            suspend_poll: config.suspend_poll.max(STOP_CHECK_SLICE),
        }
    }

    fn run(&mut self, running: &AtomicBool, stats: &EngineStats) -> LoopExit {
        log::info!(
            "Processing loop started: period={} frames, format={}",
            self.period_size,
            self.format
        );

        let exit = loop {
            if !running.load(Ordering::Acquire) {
                break LoopExit::Stopped;
            }

            match self.capture_period(running, stats) {
                Step::Continue => {}
                Step::Retry => continue,
                Step::Exit(exit) => break exit,
            }

            (self.transform)(&self.input, &mut self.output);
            self.format.encode(&self.output, &mut self.playback_raw);

            if let Step::Exit(exit) = self.playback_period(running, stats) {
                break exit;
            }
            stats.period_done();
        };

        log::info!("Processing loop exited: {:?}", exit);
        exit
    }

    fn capture_period(&mut self, running: &AtomicBool, stats: &EngineStats) -> Step {
        match self.capture.read(&mut self.capture_raw) {
            Ok(frames) => {
                let frames = frames.min(self.period_size);
                if frames < self.period_size {
                    log::warn!(
                        "Short read from capture device, read {} of {} frames",
                        frames,
                        self.period_size
                    );
                    stats.short_read();
                }
                let bytes = frames * self.format.frame_bytes();
                self.format.decode(&self.capture_raw[..bytes], &mut self.input[..frames]);
                self.input[frames..].fill(AudioFrame::SILENCE);
                Step::Continue
            }
            Err(DeviceError::Xrun) => {
                log::warn!("Capture overrun occurred");
                stats.overrun();
                match self.capture.prepare() {
                    Ok(()) => Step::Retry,
                    Err(e) => {
                        log::error!("Failed to recover capture from overrun: {}", e);
                        Step::Exit(LoopExit::Fatal)
                    }
                }
            }
            Err(DeviceError::Suspended) => {
                stats.suspend();
                match recover_suspend(&mut self.capture, Direction::Capture, running, self.suspend_poll) {
                    Recovery::Recovered => Step::Retry,
                    Recovery::Interrupted => Step::Exit(LoopExit::Stopped),
                    Recovery::Failed => Step::Exit(LoopExit::Fatal),
                }
            }
            Err(e) => {
                log::error!("Error reading from capture device: {}", e);
                Step::Exit(LoopExit::Fatal)
            }
        }
    }

    fn playback_period(&mut self, running: &AtomicBool, stats: &EngineStats) -> Step {
        match self.playback.write(&self.playback_raw) {
            Ok(frames) => {
                if frames < self.period_size {
                    log::warn!(
                        "Short write to playback device, wrote {} of {} frames",
                        frames,
                        self.period_size
                    );
                    stats.short_write();
                }
                Step::Continue
            }
            Err(DeviceError::Xrun) => {
                log::warn!("Playback underrun occurred");
                stats.underrun();
                match self.playback.prepare() {
                    Ok(()) => Step::Continue,
                    Err(e) => {
                        log::error!("Failed to recover playback from underrun: {}", e);
                        Step::Exit(LoopExit::Fatal)
                    }
                }
            }
            Err(DeviceError::Suspended) => {
                stats.suspend();
                match recover_suspend(&mut self.playback, Direction::Playback, running, self.suspend_poll) {
                    Recovery::Recovered => Step::Continue,
                    Recovery::Interrupted => Step::Exit(LoopExit::Stopped),
                    Recovery::Failed => Step::Exit(LoopExit::Fatal),
                }
            }
            Err(e) => {
                log::error!("Error writing to playback device: {}", e);
                Step::Exit(LoopExit::Fatal)
            }
        }
    }
}

/// Full-duplex audio engine over one capture and one playback handle.
///
/// - `start()` launches the processing loop on the "audio-duplex" thread
/// - `stop()` clears the running flag; the loop exits at its next period boundary
/// - dropping the engine stops it, joins the thread and closes both handles
pub struct DuplexEngine<D: PcmDevice + 'static> {
    running: Arc<AtomicBool>,
    stats: Arc<EngineStats>,
    session: Option<Session<D>>,
    worker: Option<JoinHandle<(Session<D>, LoopExit)>>,
    negotiated: Negotiated,
    config: EngineConfig,
    fatal: bool,
}

impl DuplexEngine<AlsaPcm> {
    /// Open `config.device` through ALSA for both directions.
    pub fn open<F>(config: EngineConfig, transform: F) -> Result<Self>
    where
        F: FnMut(&[AudioFrame], &mut [AudioFrame]) + Send + 'static,
    {
        Self::with_backend(&AlsaBackend, config, transform)
    }
}

impl<D: PcmDevice + 'static> DuplexEngine<D> {
    /// Open and configure both directions through `backend`.
    ///
    /// Fails without leaking a handle if either direction cannot be opened or
    /// configured, or if their period sizes cannot be reconciled.
    pub fn with_backend<B, F>(backend: &B, config: EngineConfig, transform: F) -> Result<Self>
    where
        B: PcmBackend<Device = D>,
        F: FnMut(&[AudioFrame], &mut [AudioFrame]) + Send + 'static,
    {
        log::info!(
            "DuplexEngine opening \"{}\": rate={}Hz, format={}, {:?}",
            config.device,
            config.sample_rate,
            config.format,
            config.period,
        );

        let (capture, playback, negotiated) = negotiate::open_duplex(backend, &config)?;
        let session = Session::new(capture, playback, &negotiated, &config, Box::new(transform));

        Ok(Self {
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(EngineStats::default()),
            session: Some(session),
            worker: None,
            negotiated,
            config,
            fatal: false,
        })
    }

    /// Launch the processing loop. No-op while already running.
    ///
    /// If a previous run is still winding down after `stop()`, this waits for
    /// it to finish its current period first.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }
        self.reclaim();
        if self.fatal {
            anyhow::bail!("Engine stopped on an unrecoverable device error; open a new engine");
        }
        let mut session = self.session.take().context("Audio session is not available")?;

        self.running.store(true, Ordering::Release);
        self.stats.set_state(EngineState::Running);

        let running = self.running.clone();
        let stats = self.stats.clone();
        let spawned = thread::Builder::new()
            .name("audio-duplex".into())
            .spawn(move || {
                let exit = session.run(&running, &stats);
                running.store(false, Ordering::Release);
                stats.set_state(match exit {
                    LoopExit::Stopped => EngineState::Stopped,
                    LoopExit::Fatal => EngineState::Fatal,
                });
                (session, exit)
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                // The session went down with the closure; nothing left to run.
                self.running.store(false, Ordering::Release);
                self.stats.set_state(EngineState::Fatal);
                self.fatal = true;
                Err(e).context("Failed to spawn audio thread")
            }
        }
    }

    /// Ask the loop to exit after its current period. Does not block.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Block until the loop thread has exited and take back its devices.
    ///
    /// Returns how the last run ended, or `None` if nothing was running.
    /// Call `stop()` first unless waiting for a fatal exit.
    pub fn wait(&mut self) -> Option<LoopExit> {
        self.reclaim()
    }

    fn reclaim(&mut self) -> Option<LoopExit> {
        let handle = self.worker.take()?;
        match handle.join() {
            Ok((session, exit)) => {
                self.session = Some(session);
                if exit == LoopExit::Fatal {
                    self.fatal = true;
                }
                Some(exit)
            }
            Err(_) => {
                log::error!("Audio thread panicked; devices were released during unwind");
                self.stats.set_state(EngineState::Fatal);
                self.fatal = true;
                Some(LoopExit::Fatal)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    pub fn period_size(&self) -> usize {
        self.negotiated.period_size
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<D: PcmDevice + 'static> Drop for DuplexEngine<D> {
    fn drop(&mut self) {
        self.stop();
        self.reclaim();
        // Both handles close when `session` drops right after this.
        log::info!("DuplexEngine for \"{}\" shut down", self.config.device);
    }
}
