//! Scripted in-memory PCM backend for exercising the engine without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;

use super::device::{DeviceError, Direction, HwGrant, HwRequest, PcmBackend, PcmDevice};
use super::format::{AudioFrame, WireFormat};

/// Outcome of one scripted read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Full,
    Short(usize),
    Xrun,
    Suspended,
    Fail,
}

/// Behaviour of one direction. Transfers beyond `steps` succeed in full.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub steps: VecDeque<Step>,
    /// Resume results; `Ok` once exhausted
    pub resumes: VecDeque<Result<(), DeviceError>>,
    pub resume_again_forever: bool,
    pub fail_open: bool,
    pub fail_configure: bool,
    pub fail_prepare: bool,
    /// Override the granted period size
    pub grant_period: Option<usize>,
    /// Block this long on every transfer
    pub delay: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub reads: usize,
    pub writes: usize,
    pub prepares: usize,
    pub resumes: usize,
}

#[derive(Debug, Default)]
struct Shared {
    opens: usize,
    closes: usize,
    capture: Counts,
    playback: Counts,
    captured: Vec<u8>,
    played: Vec<u8>,
}

pub struct MockBackend {
    capture: Script,
    playback: Script,
    shared: Arc<Mutex<Shared>>,
}

impl MockBackend {
    pub fn new(capture: Script, playback: Script) -> Self {
        Self {
            capture,
            playback,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    pub fn opens(&self) -> usize {
        self.shared.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.shared.lock().unwrap().closes
    }

    pub fn capture_counts(&self) -> Counts {
        self.shared.lock().unwrap().capture
    }

    pub fn playback_counts(&self) -> Counts {
        self.shared.lock().unwrap().playback
    }

    /// Every byte handed to the engine by capture reads.
    pub fn captured(&self) -> Vec<u8> {
        self.shared.lock().unwrap().captured.clone()
    }

    /// Every byte accepted from the engine by playback writes.
    pub fn played(&self) -> Vec<u8> {
        self.shared.lock().unwrap().played.clone()
    }
}

impl PcmBackend for MockBackend {
    type Device = MockPcm;

    fn open(&self, direction: Direction, name: &str) -> Result<MockPcm> {
        let script = match direction {
            Direction::Capture => self.capture.clone(),
            Direction::Playback => self.playback.clone(),
        };
        if script.fail_open {
            anyhow::bail!("Failed to open PCM device '{}' for {}", name, direction);
        }
        self.shared.lock().unwrap().opens += 1;
        Ok(MockPcm {
            direction,
            script,
            format: WireFormat::S16Le,
            cursor: 0,
            shared: self.shared.clone(),
        })
    }
}

pub struct MockPcm {
    direction: Direction,
    script: Script,
    format: WireFormat,
    /// Frames generated so far, drives the capture test signal
    cursor: usize,
    shared: Arc<Mutex<Shared>>,
}

impl MockPcm {
    fn counts<'a>(&self, shared: &'a mut Shared) -> &'a mut Counts {
        match self.direction {
            Direction::Capture => &mut shared.capture,
            Direction::Playback => &mut shared.playback,
        }
    }

    fn next_step(&mut self) -> Step {
        if let Some(delay) = self.script.delay {
            thread::sleep(delay);
        }
        self.script.steps.pop_front().unwrap_or(Step::Full)
    }

    /// Saw-tooth on the left, its negation on the right; never all-zero.
    fn fill(&mut self, raw: &mut [u8]) {
        let frames: Vec<AudioFrame> = (0..raw.len() / self.format.frame_bytes())
            .map(|i| {
                let v = (((self.cursor + i) % 200) as f32 - 99.5) / 128.0;
                AudioFrame::new(v, -v)
            })
            .collect();
        self.cursor += frames.len();
        self.format.encode(&frames, raw);
    }
}

impl PcmDevice for MockPcm {
    fn configure(&mut self, request: &HwRequest) -> Result<HwGrant> {
        if self.script.fail_configure {
            anyhow::bail!("{}: hw params rejected", self.direction);
        }
        self.format = request.format;
        Ok(HwGrant {
            buffer_size: request.buffer_size,
            period_size: self.script.grant_period.unwrap_or(request.period_size),
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        {
            let mut shared = self.shared.lock().unwrap();
            self.counts(&mut shared).reads += 1;
        }
        let fb = self.format.frame_bytes();
        let frames = match self.next_step() {
            Step::Full => buf.len() / fb,
            Step::Short(n) => n.min(buf.len() / fb),
            Step::Xrun => return Err(DeviceError::Xrun),
            Step::Suspended => return Err(DeviceError::Suspended),
            Step::Fail => return Err(DeviceError::Failed("scripted read failure".into())),
        };
        self.fill(&mut buf[..frames * fb]);
        self.shared.lock().unwrap().captured.extend_from_slice(&buf[..frames * fb]);
        Ok(frames)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, DeviceError> {
        {
            let mut shared = self.shared.lock().unwrap();
            self.counts(&mut shared).writes += 1;
        }
        let fb = self.format.frame_bytes();
        let frames = match self.next_step() {
            Step::Full => buf.len() / fb,
            Step::Short(n) => n.min(buf.len() / fb),
            Step::Xrun => return Err(DeviceError::Xrun),
            Step::Suspended => return Err(DeviceError::Suspended),
            Step::Fail => return Err(DeviceError::Failed("scripted write failure".into())),
        };
        self.shared.lock().unwrap().played.extend_from_slice(&buf[..frames * fb]);
        Ok(frames)
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        {
            let mut shared = self.shared.lock().unwrap();
            self.counts(&mut shared).prepares += 1;
        }
        if self.script.fail_prepare {
            return Err(DeviceError::Failed("scripted prepare failure".into()));
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        {
            let mut shared = self.shared.lock().unwrap();
            self.counts(&mut shared).resumes += 1;
        }
        if self.script.resume_again_forever {
            return Err(DeviceError::Again);
        }
        self.script.resumes.pop_front().unwrap_or(Ok(()))
    }
}

impl Drop for MockPcm {
    fn drop(&mut self) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.closes += 1;
        }
    }
}
