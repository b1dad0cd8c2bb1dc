//! Wire messages for the level streaming bridge.

use serde::{Deserialize, Serialize};

use crate::display::classifier::{Band, Classification};

pub const PROTOCOL_VERSION: u16 = 0x0100;

/// One published reading, as sent to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelFrame {
    /// Sequential id for detecting dropped frames
    pub frame_id: u32,
    /// ms since the unix epoch, for latency tracking on the client
    pub timestamp_ms: i64,
    pub level_db: f32,
    pub progress: f32,
    pub band: Band,
    pub color: String,
    pub message: String,
    pub warning: Option<String>,
}

impl LevelFrame {
    pub fn from_classification(frame_id: u32, reading: &Classification) -> Self {
        Self {
            frame_id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            level_db: reading.clamped_level,
            progress: reading.progress,
            band: reading.band,
            color: reading.color.to_string(),
            message: reading.message.to_string(),
            warning: reading.warning.clone(),
        }
    }
}

/// Subscriber to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    Subscribe,
    /// Update the stream cadence for this connection
    ConfigureStream { target_fps: u32 },
    Ping { timestamp: u64 },
}

/// Server to subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Connection acknowledgement
    Connected {
        server_version: String,
        protocol_version: u16,
        session_id: String,
        started_at: String,
    },
    Level(LevelFrame),
    Error { code: u16, message: String },
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}
