//! Media seam of the realtime voice channel.
//!
//! Audio capture, playback and the peer connection itself live behind these
//! traits; the channel only drives their lifecycle.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::VoiceChannelError;

pub const EVENTS_CHANNEL_LABEL: &str = "oai-events";

/// Both directions of an ordered text data channel.
///
/// Dropping `outbound` closes the channel from our side. The transport keeps
/// `open` at `true` while messages can flow and drops its sender on close.
#[derive(Debug)]
pub struct DataChannel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
    pub open: watch::Receiver<bool>,
}

#[async_trait]
pub trait PeerConnection: Send {
    /// Routes the remote audio track to an autoplaying sink.
    async fn attach_audio_sink(&mut self) -> Result<(), VoiceChannelError>;

    /// Fails with [`VoiceChannelError::MicrophoneUnavailable`] when capture is denied.
    async fn add_microphone_track(&mut self) -> Result<(), VoiceChannelError>;

    async fn add_receive_only_audio(&mut self) -> Result<(), VoiceChannelError>;

    async fn create_data_channel(&mut self, label: &str) -> Result<DataChannel, VoiceChannelError>;

    /// Dials the realtime endpoint with the session credential, for transports
    /// that need no offer/answer exchange. Returns `false` when SDP is required.
    async fn connect_direct(&mut self, _model: &str, _token: &str) -> Result<bool, VoiceChannelError> {
        Ok(false)
    }

    async fn create_offer(&mut self) -> Result<String, VoiceChannelError>;

    async fn set_local_description(&mut self, sdp: &str) -> Result<(), VoiceChannelError>;

    async fn set_remote_description(&mut self, sdp: &str) -> Result<(), VoiceChannelError>;

    fn stop_local_tracks(&mut self);

    fn detach_audio_sink(&mut self);

    fn close(&mut self);
}

#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PeerConnection>, VoiceChannelError>;
}
