use std::time::Duration;

use sound_meter::audio::{AudioConfig, CancelToken, CaptureSource, CpalSource, MeterLoop, MeterState, WavSource};
use sound_meter::display::TerminalMeter;
use sound_meter::error::MeterError;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    // logs go to stderr so they do not fight the in-place meter line
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let sample_rate = std::env::var("METER_SAMPLE_RATE")
        .unwrap_or_else(|_| "8000".to_string())
        .parse::<u32>()
        .unwrap_or(8000);
    let config = AudioConfig {
        sample_rate,
        ..AudioConfig::default()
    };
    config.validate()?;

    // an optional wav path runs the meter offline instead of on the mic
    let source: Box<dyn CaptureSource + Send> = match std::env::args().nth(1) {
        Some(path) => Box::new(WavSource::open(&path, config.buffer_size)?),
        None => Box::new(CpalSource::open(&config)?),
    };

    let state = MeterState::new();
    let cancel = CancelToken::new();
    let capture = MeterLoop::spawn(state.clone(), cancel.clone(), source);

    let mut meter = TerminalMeter::new();
    // 50ms refresh, about 20fps
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                if capture.is_finished() {
                    break;
                }
                meter.display(&state.latest_classification());
            }
        }
    }

    cancel.cancel();
    println!();
    match capture.join() {
        Ok(Ok(())) => info!("meter stopped"),
        // a drained wav file is a normal end of an offline run
        Ok(Err(MeterError::EndOfStream)) => info!("capture source ended"),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err("meter thread panicked".into()),
    }
    Ok(())
}
