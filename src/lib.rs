pub mod audio;
pub mod config;

pub use audio::{AudioFrame, DuplexEngine, EngineConfig};
pub use config::Config;
