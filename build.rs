use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    device: String,
    sample_rate: u32,
    latency_us: u32,
    periods: u32,
    period_size: u32,
    format: String,
    suspend_poll_ms: u64,
    period_mismatch: String,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 音频配置
    println!("cargo:rustc-env=AUDIO_DEVICE={}", config.audio.device);
    println!("cargo:rustc-env=AUDIO_SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=AUDIO_LATENCY_US={}", config.audio.latency_us);
    println!("cargo:rustc-env=AUDIO_PERIODS={}", config.audio.periods);
    println!("cargo:rustc-env=AUDIO_PERIOD_SIZE={}", config.audio.period_size);
    println!("cargo:rustc-env=AUDIO_FORMAT={}", config.audio.format);
    println!("cargo:rustc-env=AUDIO_SUSPEND_POLL_MS={}", config.audio.suspend_poll_ms);
    println!("cargo:rustc-env=AUDIO_PERIOD_MISMATCH={}", config.audio.period_mismatch);
}
