use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionError;

/// Failures while bringing up or using the realtime voice session.
///
/// These never cross the channel's public boolean API; they exist so that
/// `try_prewarm` and the logs can say what actually went wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceChannelError {
    #[error("Session credential request failed: {reason}")]
    CredentialFetchFailed { reason: String },

    #[error("Realtime negotiation failed: {reason}")]
    NegotiationFailed { reason: String },

    #[error("Microphone unavailable: {reason}")]
    MicrophoneUnavailable { reason: String },

    #[error("Data channel did not open within {timeout_ms}ms")]
    DataChannelTimeout { timeout_ms: u64 },

    #[error("Handshake did not finish within {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("Data channel is closed")]
    ChannelClosed,

    #[error("Could not encode realtime message: {reason}")]
    Encode { reason: String },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to access store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored value for {key} is not valid: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum KaptionError {
    #[error(transparent)]
    Voice(#[from] VoiceChannelError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KaptionError>;
