//! Realtime transport over a WebSocket.
//!
//! Text only: the tutor's transcript streams back, its audio is not played.
//! The endpoint does not send `output_audio_buffer.*` over a socket, so the
//! reader marks playback boundaries itself from `response.created` and
//! `response.done`.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::{Value, json};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Message, client::IntoClientRequest, http::HeaderValue},
};
use tracing::{debug, info, warn};

use crate::{
    error::VoiceChannelError,
    voice::{DataChannel, PeerConnection, PeerConnector},
};

/// Builds the socket URL for `model` from the HTTP(S) realtime endpoint.
pub fn websocket_url(realtime_url: &str, model: &str) -> Result<Url, VoiceChannelError> {
    let invalid = |reason: String| VoiceChannelError::NegotiationFailed { reason };
    let mut url = Url::parse(realtime_url).map_err(|e| invalid(format!("{realtime_url}: {e}")))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(invalid(format!("unsupported realtime scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot use {scheme} for {realtime_url}")))?;
    url.query_pairs_mut().append_pair("model", model);
    Ok(url)
}

/// Server messages to deliver for one raw socket message, in order.
fn with_playback_marks(raw: String) -> Vec<String> {
    let kind = serde_json::from_str::<Value>(&raw)
        .ok()
        .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string));

    match kind.as_deref() {
        Some("response.created") => {
            vec![raw, json!({"type": "output_audio_buffer.started"}).to_string()]
        }
        Some("response.done") => {
            vec![raw, json!({"type": "output_audio_buffer.stopped"}).to_string()]
        }
        _ => vec![raw],
    }
}

#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    realtime_url: String,
}

impl WebSocketConnector {
    pub fn new(realtime_url: impl Into<String>) -> Self {
        Self {
            realtime_url: realtime_url.into(),
        }
    }
}

#[async_trait]
impl PeerConnector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn PeerConnection>, VoiceChannelError> {
        Ok(Box::new(WebSocketPeer {
            realtime_url: self.realtime_url.clone(),
            pending: None,
            open: None,
            tasks: Vec::new(),
        }))
    }
}

struct PendingChannel {
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
}

struct WebSocketPeer {
    realtime_url: String,
    pending: Option<PendingChannel>,
    open: Option<Arc<watch::Sender<bool>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl WebSocketPeer {
    fn no_sdp() -> VoiceChannelError {
        VoiceChannelError::NegotiationFailed {
            reason: "websocket transport does not exchange SDP".to_string(),
        }
    }
}

#[async_trait]
impl PeerConnection for WebSocketPeer {
    async fn attach_audio_sink(&mut self) -> Result<(), VoiceChannelError> {
        Ok(())
    }

    /// Input is typed, there is nothing to capture.
    async fn add_microphone_track(&mut self) -> Result<(), VoiceChannelError> {
        Ok(())
    }

    async fn add_receive_only_audio(&mut self) -> Result<(), VoiceChannelError> {
        Ok(())
    }

    async fn create_data_channel(&mut self, label: &str) -> Result<DataChannel, VoiceChannelError> {
        debug!(label, "data channel rides on the socket");
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (open_tx, open_rx) = watch::channel(false);

        self.pending = Some(PendingChannel {
            outbound: outbound_rx,
            inbound: inbound_tx,
        });
        self.open = Some(Arc::new(open_tx));

        Ok(DataChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
            open: open_rx,
        })
    }

    async fn connect_direct(&mut self, model: &str, token: &str) -> Result<bool, VoiceChannelError> {
        let failed = |reason: String| VoiceChannelError::NegotiationFailed { reason };
        let PendingChannel {
            mut outbound,
            inbound,
        } = self
            .pending
            .take()
            .ok_or_else(|| failed("data channel was not created".to_string()))?;
        let open = self
            .open
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| failed("data channel was not created".to_string()))?;

        let url = websocket_url(&self.realtime_url, model)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| failed(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| failed(format!("invalid session token: {e}")))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", bearer);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| failed(format!("websocket connect: {e}")))?;
        info!(host = url.host_str().unwrap_or_default(), "realtime socket connected");
        let (mut write, mut read) = stream.split();

        self.tasks.push(tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                if let Err(e) = write.send(Message::text(text)).await {
                    warn!(error = %e, "realtime socket write failed");
                    break;
                }
            }
            let _ = write.close().await;
        }));

        let reader_open = open.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        for raw in with_playback_marks(text.as_str().to_string()) {
                            if inbound.send(raw).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "realtime socket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "realtime socket read failed");
                        break;
                    }
                }
            }
            reader_open.send_replace(false);
        }));

        open.send_replace(true);
        Ok(true)
    }

    async fn create_offer(&mut self) -> Result<String, VoiceChannelError> {
        Err(Self::no_sdp())
    }

    async fn set_local_description(&mut self, _sdp: &str) -> Result<(), VoiceChannelError> {
        Err(Self::no_sdp())
    }

    async fn set_remote_description(&mut self, _sdp: &str) -> Result<(), VoiceChannelError> {
        Err(Self::no_sdp())
    }

    fn stop_local_tracks(&mut self) {}

    fn detach_audio_sink(&mut self) {}

    fn close(&mut self) {
        self.pending = None;
        if let Some(open) = self.open.take() {
            open.send_replace(false);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for WebSocketPeer {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
