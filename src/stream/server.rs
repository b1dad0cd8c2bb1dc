//! WebSocket bridge streaming the latest classification to subscribers.
//!
//! Readers never see the meter loop directly. Each connection gets its own
//! stream task paced at the configured FPS, pulling whatever the shared
//! state holds at that instant. Newest value wins, missed readings are
//! simply never sent.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, Duration};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{error, info, warn};

use super::protocol::{ClientMessage, LevelFrame, ServerMessage, PROTOCOL_VERSION};
use crate::audio::meter_loop::MeterState;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub target_fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { target_fps: 20 }
    }
}

pub struct LevelServer {
    bind_addr: String,
    state: MeterState,
    config: StreamConfig,
}

impl LevelServer {
    pub fn new(bind_addr: impl Into<String>, state: MeterState) -> Self {
        Self::with_config(bind_addr, state, StreamConfig::default())
    }

    pub fn with_config(
        bind_addr: impl Into<String>,
        state: MeterState,
        config: StreamConfig,
    ) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            state,
            config,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        info!(
            addr = %self.bind_addr,
            target_fps = self.config.target_fps,
            "level server ready for subscribers"
        );

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("new subscriber from {addr}");
                    let state = self.state.clone();
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, state, config).await {
                            warn!("subscriber error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("connection error: {e}");
                }
            }
        }
    }

    /// Handle one subscriber connection for its whole lifetime.
    async fn handle_client(
        stream: TcpStream,
        state: MeterState,
        config: StreamConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws = accept_async(stream).await?;
        let (mut write, mut read) = ws.split();

        let welcome = ServerMessage::Connected {
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION,
            session_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
        };
        write
            .send(Message::Text(serde_json::to_string(&welcome)?.into()))
            .await?;

        let stream_state = state.clone();
        let write_handle: tokio::task::JoinHandle<
            Result<(), Box<dyn std::error::Error + Send + Sync>>,
        > = tokio::spawn(async move { Self::stream_levels(write, stream_state, config).await });

        while let Some(msg) = read.next().await {
            match msg? {
                Message::Text(text) => {
                    if let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) {
                        Self::handle_client_message(client_msg);
                    }
                }
                Message::Close(_) => {
                    info!("subscriber disconnected");
                    break;
                }
                _ => {}
            }
        }
        write_handle.abort();
        Ok(())
    }

    /// Push the latest reading at the target cadence until the client goes
    /// away.
    async fn stream_levels(
        mut write: SplitSink<WebSocketStream<TcpStream>, Message>,
        state: MeterState,
        config: StreamConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let fps = config.target_fps.max(1);
        let mut ticker = interval(Duration::from_secs_f32(1.0 / fps as f32));
        let mut frame_id = 0u32;

        loop {
            ticker.tick().await;
            let frame = LevelFrame::from_classification(frame_id, &state.latest_classification());
            let json = serde_json::to_string(&ServerMessage::Level(frame))?;
            if write.send(Message::Text(json.into())).await.is_err() {
                // client went away mid stream
                break;
            }
            frame_id = frame_id.wrapping_add(1);
        }
        Ok(())
    }

    fn handle_client_message(msg: ClientMessage) {
        match msg {
            ClientMessage::Subscribe => {
                info!("subscriber requested the level stream");
            }
            ClientMessage::ConfigureStream { target_fps } => {
                // per-connection reconfiguration is not wired up yet,
                // the request is acknowledged in the log only
                info!("subscriber asked for {target_fps} fps");
            }
            ClientMessage::Ping { .. } => {}
        }
    }
}
