use sound_meter::audio::{AudioConfig, CancelToken, CaptureSource, CpalSource, MeterLoop, MeterState};
use sound_meter::stream::{LevelServer, StreamConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load config from env, defaults are fine for local use
    let bind_addr =
        std::env::var("METER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8765".to_string());
    let target_fps = std::env::var("METER_TARGET_FPS")
        .unwrap_or_else(|_| "20".to_string())
        .parse::<u32>()
        .unwrap_or(20);
    let sample_rate = std::env::var("METER_SAMPLE_RATE")
        .unwrap_or_else(|_| "8000".to_string())
        .parse::<u32>()
        .unwrap_or(8000);
    info!("Configs loaded:");
    info!("  Bind addr: {bind_addr}");
    info!("  Target FPS: {target_fps}");
    info!("  Sample rate: {sample_rate}");

    let config = AudioConfig {
        sample_rate,
        ..AudioConfig::default()
    };
    config.validate()?;
    let source: Box<dyn CaptureSource + Send> = Box::new(CpalSource::open(&config)?);

    let state = MeterState::new();
    let cancel = CancelToken::new();
    let capture = MeterLoop::spawn(state.clone(), cancel.clone(), source);

    let server = LevelServer::with_config(bind_addr, state, StreamConfig { target_fps });
    let result = tokio::select! {
        r = server.run() => r,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    };

    cancel.cancel();
    match capture.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err("meter thread panicked".into()),
    }
    result
}
