//! Library error type.

use thiserror::Error;

use crate::error_codes::*;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("WebSocket connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The agent rejected the request and said why.
    #[error("{0}")]
    Agent(String),

    #[error("Agent returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Channel is not open")]
    NotConnected,

    #[error("Channel driver has stopped")]
    ChannelClosed,

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl ClientError {
    pub fn validation(err: impl std::fmt::Display) -> Self {
        Self::Validation(err.to_string())
    }

    /// Stable code for front-end localization.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => ERR_HTTP_TRANSPORT,
            Self::Json(_) => ERR_DECODE_FAILED,
            Self::Yaml(_) | Self::Io(_) => ERR_CONFIG_LOAD_FAILED,
            Self::WebSocket(_) | Self::ConnectTimeout(_) => ERR_WEBSOCKET,
            Self::Url(_) | Self::Validation(_) => ERR_VALIDATION,
            Self::Agent(_) => ERR_AGENT_REQUEST_FAILED,
            Self::Status { .. } => ERR_AGENT_STATUS,
            Self::NotConnected => ERR_CHANNEL_NOT_OPEN,
            Self::ChannelClosed => ERR_CHANNEL_CLOSED,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
