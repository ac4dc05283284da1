use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::audio::{EngineConfig, MismatchPolicy, PeriodSpec, WireFormat};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 音频配置
    pub device: String,
    pub sample_rate: u32,
    pub latency_us: u32,
    pub periods: u32,
    /// 0 = derive from latency_us / periods
    pub period_size: usize,
    pub format: WireFormat,
    pub suspend_poll_ms: u64,
    pub period_mismatch: MismatchPolicy,
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Failed to parse {}={:?}: {}", name, value, e))
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            device: env!("AUDIO_DEVICE").to_string(),
            sample_rate: parse("AUDIO_SAMPLE_RATE", env!("AUDIO_SAMPLE_RATE"))?,
            latency_us: parse("AUDIO_LATENCY_US", env!("AUDIO_LATENCY_US"))?,
            periods: parse("AUDIO_PERIODS", env!("AUDIO_PERIODS"))?,
            period_size: parse("AUDIO_PERIOD_SIZE", env!("AUDIO_PERIOD_SIZE"))?,
            format: parse("AUDIO_FORMAT", env!("AUDIO_FORMAT"))?,
            suspend_poll_ms: parse("AUDIO_SUSPEND_POLL_MS", env!("AUDIO_SUSPEND_POLL_MS"))?,
            period_mismatch: parse("AUDIO_PERIOD_MISMATCH", env!("AUDIO_PERIOD_MISMATCH"))?,
        })
    }

    /// Apply `DUPLEX_*` variables from the process environment on top.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("DUPLEX_DEVICE") {
            self.device = v;
        }
        if let Some(v) = lookup("DUPLEX_SAMPLE_RATE") {
            self.sample_rate = parse("DUPLEX_SAMPLE_RATE", &v)?;
        }
        if let Some(v) = lookup("DUPLEX_LATENCY_US") {
            self.latency_us = parse("DUPLEX_LATENCY_US", &v)?;
        }
        if let Some(v) = lookup("DUPLEX_PERIODS") {
            self.periods = parse("DUPLEX_PERIODS", &v)?;
        }
        if let Some(v) = lookup("DUPLEX_PERIOD_SIZE") {
            self.period_size = parse("DUPLEX_PERIOD_SIZE", &v)?;
        }
        if let Some(v) = lookup("DUPLEX_FORMAT") {
            self.format = parse("DUPLEX_FORMAT", &v)?;
        }
        Ok(self)
    }

    /// The immutable session configuration handed to the engine.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        anyhow::ensure!(self.sample_rate > 0, "sample_rate must be greater than zero");
        anyhow::ensure!(self.periods > 0, "periods must be greater than zero");
        anyhow::ensure!(self.suspend_poll_ms > 0, "suspend_poll_ms must be greater than zero");

        let period = if self.period_size > 0 {
            PeriodSpec::Fixed {
                period_size: self.period_size,
                periods: self.periods,
            }
        } else {
            PeriodSpec::Latency {
                latency_us: self.latency_us,
                periods: self.periods,
            }
        };
        period
            .targets(self.sample_rate)
            .with_context(|| format!("Invalid period settings for device '{}'", self.device))?;

        Ok(EngineConfig {
            device: self.device.clone(),
            sample_rate: self.sample_rate,
            period,
            format: self.format,
            mismatch: self.period_mismatch,
            suspend_poll: Duration::from_millis(self.suspend_poll_ms),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}
