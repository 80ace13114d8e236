//! In-process stand-in for the realtime endpoint.
//!
//! The loopback transport answers every `response.create` the way the remote
//! model would, with `output_audio_buffer.started`, a transcript delta and
//! `output_audio_buffer.stopped`, but no audio. It powers the terminal's text
//! mode and doubles as the media fake in tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::trace;

use crate::{
    error::VoiceChannelError,
    voice::{
        ClientEvent, ContentPart, ConversationItem, DataChannel, PeerConnection, PeerConnector,
        READ_ALOUD_INSTRUCTIONS, Role, SessionTokenRequest, Signaling,
    },
};

pub const DEFAULT_CHAT_REPLY: &str = "Nice thought! What part of it stood out to you most?";

#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    pub microphone_denied: bool,
    /// Keeps the data channel from ever reporting open.
    pub data_channel_stays_closed: bool,
    /// Transcript used for responses that are not read-aloud requests.
    pub chat_reply: String,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            microphone_denied: false,
            data_channel_stays_closed: false,
            chat_reply: DEFAULT_CHAT_REPLY.to_string(),
        }
    }
}

/// What the loopback transport has seen so far.
#[derive(Debug, Default)]
pub struct LoopbackStats {
    connections: AtomicUsize,
    closed: AtomicUsize,
    receive_only: AtomicUsize,
    sent: Mutex<Vec<Value>>,
}

impl LoopbackStats {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn receive_only(&self) -> usize {
        self.receive_only.load(Ordering::SeqCst)
    }

    /// Every client message received, across all connections, in order.
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().expect("LoopbackStats poisoned").clone()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|m| m.get("type").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    fn record(&self, message: Value) {
        self.sent.lock().expect("LoopbackStats poisoned").push(message);
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopbackConnector {
    options: LoopbackOptions,
    stats: Arc<LoopbackStats>,
}

impl LoopbackConnector {
    pub fn new(options: LoopbackOptions) -> Self {
        Self {
            options,
            stats: Arc::new(LoopbackStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<LoopbackStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl PeerConnector for LoopbackConnector {
    async fn connect(&self) -> Result<Box<dyn PeerConnection>, VoiceChannelError> {
        self.stats.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoopbackPeer {
            options: self.options.clone(),
            stats: Arc::clone(&self.stats),
            open: None,
            responder: None,
            closed: false,
        }))
    }
}

struct LoopbackPeer {
    options: LoopbackOptions,
    stats: Arc<LoopbackStats>,
    open: Option<watch::Sender<bool>>,
    responder: Option<JoinHandle<()>>,
    closed: bool,
}

#[async_trait]
impl PeerConnection for LoopbackPeer {
    async fn attach_audio_sink(&mut self) -> Result<(), VoiceChannelError> {
        Ok(())
    }

    async fn add_microphone_track(&mut self) -> Result<(), VoiceChannelError> {
        if self.options.microphone_denied {
            return Err(VoiceChannelError::MicrophoneUnavailable {
                reason: "permission denied".to_string(),
            });
        }
        Ok(())
    }

    async fn add_receive_only_audio(&mut self) -> Result<(), VoiceChannelError> {
        self.stats.receive_only.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_data_channel(&mut self, label: &str) -> Result<DataChannel, VoiceChannelError> {
        trace!(label, "opening loopback data channel");
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (open_tx, open_rx) = watch::channel(false);

        self.open = Some(open_tx);
        self.responder = Some(tokio::spawn(respond(
            outbound_rx,
            inbound_tx,
            Arc::clone(&self.stats),
            self.options.chat_reply.clone(),
        )));

        Ok(DataChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
            open: open_rx,
        })
    }

    async fn create_offer(&mut self) -> Result<String, VoiceChannelError> {
        Ok("v=0\r\no=loopback 0 0 IN IP4 127.0.0.1\r\n".to_string())
    }

    async fn set_local_description(&mut self, _sdp: &str) -> Result<(), VoiceChannelError> {
        Ok(())
    }

    async fn set_remote_description(&mut self, _sdp: &str) -> Result<(), VoiceChannelError> {
        if let Some(open) = &self.open
            && !self.options.data_channel_stays_closed
        {
            open.send_replace(true);
        }
        Ok(())
    }

    fn stop_local_tracks(&mut self) {}

    fn detach_audio_sink(&mut self) {}

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.send_replace(false);
        }
        if let Some(responder) = self.responder.take() {
            responder.abort();
        }
        if !self.closed {
            self.closed = true;
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for LoopbackPeer {
    fn drop(&mut self) {
        if let Some(responder) = self.responder.take() {
            responder.abort();
        }
    }
}

fn user_text(item: &ConversationItem) -> Option<String> {
    let ConversationItem::Message {
        role: Role::User,
        content,
    } = item
    else {
        return None;
    };
    let text = content
        .iter()
        .map(|part| match part {
            ContentPart::InputText { text } => text.as_str(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    Some(text)
}

async fn respond(
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
    stats: Arc<LoopbackStats>,
    chat_reply: String,
) {
    let mut last_user_text: Option<String> = None;

    while let Some(raw) = outbound.recv().await {
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        stats.record(value.clone());

        let Ok(event) = serde_json::from_value::<ClientEvent>(value) else {
            continue;
        };
        match event {
            ClientEvent::ConversationItemCreate { item } => {
                if let Some(text) = user_text(&item) {
                    last_user_text = Some(text);
                }
            }
            ClientEvent::ResponseCreate { response } => {
                let transcript = if response.instructions == READ_ALOUD_INSTRUCTIONS {
                    last_user_text.take().unwrap_or_default()
                } else {
                    last_user_text = None;
                    chat_reply.clone()
                };
                let replies = [
                    json!({"type": "output_audio_buffer.started"}),
                    json!({"type": "response.audio_transcript.delta", "delta": transcript}),
                    json!({"type": "output_audio_buffer.stopped"}),
                    json!({"type": "response.done", "response": {"output": []}}),
                ];
                for reply in replies {
                    if inbound.send(reply.to_string()).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Hands out fixed credentials and echoes the offer back as the answer.
#[derive(Debug, Default)]
pub struct LoopbackSignaling {
    failure: Option<String>,
    requests: Mutex<Vec<SessionTokenRequest>>,
    exchanges: AtomicUsize,
}

impl LoopbackSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every credential request fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn token_requests(&self) -> Vec<SessionTokenRequest> {
        self.requests.lock().expect("LoopbackSignaling poisoned").clone()
    }

    pub fn sdp_exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signaling for LoopbackSignaling {
    async fn session_token(&self, request: &SessionTokenRequest) -> Result<String, VoiceChannelError> {
        self.requests
            .lock()
            .expect("LoopbackSignaling poisoned")
            .push(request.clone());

        match &self.failure {
            Some(reason) => Err(VoiceChannelError::CredentialFetchFailed {
                reason: reason.clone(),
            }),
            None => Ok("ek_loopback".to_string()),
        }
    }

    async fn exchange_sdp(
        &self,
        _model: &str,
        offer_sdp: &str,
        _token: &str,
    ) -> Result<String, VoiceChannelError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(offer_sdp.replace("o=loopback", "o=loopback-answer"))
    }
}
