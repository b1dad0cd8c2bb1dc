pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, LevelFrame, ServerMessage};
pub use server::{LevelServer, StreamConfig};
