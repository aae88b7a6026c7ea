use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse message: {0}")]
    Parse(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("invalid numeric field: {0}")]
    FloatParse(#[from] std::num::ParseFloatError),

    #[error("forecast fit failed: {0}")]
    ForecastFit(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("pong timeout")]
    PongTimeout,

    #[error("stale connection: {0}ms since last message")]
    StaleConnection(u64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
