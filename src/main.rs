use alsa_duplex::audio::{AudioFrame, DuplexEngine, EngineState};
use alsa_duplex::Config;
use tokio::signal;
use tokio::time::{interval, Duration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::new()?.with_env_overrides()?;
    let engine_config = config.engine_config()?;
    log::info!("{} {} starting", config.app_name, config.app_version);

    // Simple passthrough
    let mut engine = DuplexEngine::open(engine_config, |input: &[AudioFrame], output: &mut [AudioFrame]| {
        output.copy_from_slice(input);
    })?;
    engine.start()?;
    println!("Running on \"{}\", press Ctrl+C to stop...", config.device);

    // The loop never reports failures directly; watch its state instead.
    let mut ticker = interval(Duration::from_millis(500));
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                let stats = engine.stats();
                if stats.state == EngineState::Fatal {
                    log::error!("Audio loop terminated after {} periods", stats.periods);
                    anyhow::bail!("audio engine stopped on a device error");
                }
            }
        }
    }

    engine.stop();
    engine.wait();
    let stats = engine.stats();
    log::info!(
        "periods={}, overruns={}, underruns={}, suspends={}, short reads={}, short writes={}",
        stats.periods,
        stats.overruns,
        stats.underruns,
        stats.suspends,
        stats.short_reads,
        stats.short_writes,
    );
    Ok(())
}
