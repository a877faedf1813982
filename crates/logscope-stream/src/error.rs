use std::time::Duration;

use tokio_tungstenite::tungstenite;

/// Errors raised while talking to the log endpoints
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid server url `{url}`: {reason}")]
    Url { url: String, reason: String },

    #[error("unsupported url scheme `{0}` (expected http, https, ws or wss)")]
    Scheme(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection not established within {0:?}")]
    Timeout(Duration),
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}
