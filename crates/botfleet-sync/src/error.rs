use botfleet_core::socketio::PacketError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("namespace connect rejected: {0}")]
    Rejected(String),
    #[error("connection closed by server")]
    Closed,
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("no packet within liveness window of {0:?}")]
    Silent(Duration),
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {status}")]
    Status { status: u16 },
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("login rejected for user {0:?}")]
    LoginRejected(String),
    #[error("login required")]
    LoginRequired,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Control(#[from] ControlError),
}
