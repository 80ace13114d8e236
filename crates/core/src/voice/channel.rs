use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    sync::{Mutex as AsyncMutex, mpsc, watch},
    task::JoinHandle,
    time::{Instant, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    config::{
        DEFAULT_DATA_CHANNEL_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REALTIME_MODEL,
    },
    error::VoiceChannelError,
    events::{EventBus, Subscription, VoiceEvent, VoiceEventKind},
    voice::{
        ClientEvent, DataChannel, EVENTS_CHANNEL_LABEL, PeerConnection, PeerConnector,
        READ_ALOUD_INSTRUCTIONS, RetryPolicy, SessionTokenRequest, Signaling, SpeakDebouncer,
        StyleUpdate, VoiceStyle, decode_server_message, debounce::DEFAULT_SPEAK_DEBOUNCE,
    },
};

#[derive(Debug, Clone)]
pub struct VoiceChannelConfig {
    pub model: String,
    pub data_channel_timeout: Duration,
    pub handshake_timeout: Duration,
    pub speak_debounce: Duration,
    pub speak_retry: RetryPolicy,
}

impl Default for VoiceChannelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_REALTIME_MODEL.to_string(),
            data_channel_timeout: DEFAULT_DATA_CHANNEL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            speak_debounce: DEFAULT_SPEAK_DEBOUNCE,
            speak_retry: RetryPolicy::default(),
        }
    }
}

/// Something that can say text aloud and carry protocol messages.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn speak(&self, text: &str) -> bool;
    async fn send_event(&self, event: &ClientEvent) -> bool;
}

struct LiveSession {
    peer: Box<dyn PeerConnection>,
    outbound: mpsc::UnboundedSender<String>,
    open: watch::Receiver<bool>,
    pump: JoinHandle<()>,
}

impl LiveSession {
    fn shutdown(mut self) {
        self.pump.abort();
        drop(self.outbound);
        self.peer.stop_local_tracks();
        self.peer.detach_audio_sink();
        self.peer.close();
    }
}

async fn pump_inbound(mut inbound: mpsc::UnboundedReceiver<String>, bus: EventBus) {
    while let Some(raw) = inbound.recv().await {
        for event in decode_server_message(&raw) {
            bus.publish(event);
        }
    }
    debug!("realtime data channel closed by remote");
}

fn encode<T: Serialize + ?Sized>(message: &T) -> Result<String, VoiceChannelError> {
    serde_json::to_string(message).map_err(|e| VoiceChannelError::Encode {
        reason: e.to_string(),
    })
}

/// One live realtime speech session, created lazily and reused until torn down.
pub struct RealtimeVoiceChannel {
    config: VoiceChannelConfig,
    signaling: Arc<dyn Signaling>,
    connector: Arc<dyn PeerConnector>,
    bus: EventBus,
    style: Mutex<VoiceStyle>,
    debouncer: Mutex<SpeakDebouncer>,
    /// Held for the whole handshake so concurrent prewarms share one.
    handshake: AsyncMutex<()>,
    live: AsyncMutex<Option<LiveSession>>,
    /// Bumped by every teardown; a handshake that started in an older epoch is discarded.
    epoch: AtomicU64,
}

impl RealtimeVoiceChannel {
    pub fn new(
        config: VoiceChannelConfig,
        signaling: Arc<dyn Signaling>,
        connector: Arc<dyn PeerConnector>,
    ) -> Self {
        Self::with_bus(config, signaling, connector, EventBus::default())
    }

    pub fn with_bus(
        config: VoiceChannelConfig,
        signaling: Arc<dyn Signaling>,
        connector: Arc<dyn PeerConnector>,
        bus: EventBus,
    ) -> Self {
        let debouncer = SpeakDebouncer::new(config.speak_debounce);
        Self {
            config,
            signaling,
            connector,
            bus,
            style: Mutex::new(VoiceStyle::default()),
            debouncer: Mutex::new(debouncer),
            handshake: AsyncMutex::new(()),
            live: AsyncMutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe<F>(&self, kind: VoiceEventKind, handler: F) -> Subscription
    where
        F: Fn(&VoiceEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn style(&self) -> VoiceStyle {
        self.style.lock().expect("VoiceStyle poisoned").clone()
    }

    /// Handshake finished and the data channel is open.
    pub async fn is_ready(&self) -> bool {
        self.live
            .lock()
            .await
            .as_ref()
            .is_some_and(|session| *session.open.borrow())
    }

    pub async fn prewarm(&self) -> bool {
        match self.try_prewarm().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "realtime prewarm failed");
                false
            }
        }
    }

    /// Brings the session up if it is not already, reporting why it could not.
    pub async fn try_prewarm(&self) -> Result<(), VoiceChannelError> {
        let _handshake = self.handshake.lock().await;
        if self.live.lock().await.is_some() {
            return Ok(());
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let style = self.style();
        let session = timeout(self.config.handshake_timeout, self.handshake(&style))
            .await
            .map_err(|_| VoiceChannelError::HandshakeTimeout {
                timeout_ms: self.config.handshake_timeout.as_millis() as u64,
            })??;

        let mut live = self.live.lock().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            session.shutdown();
            return Err(VoiceChannelError::ChannelClosed);
        }
        *live = Some(session);
        info!(voice = %style.voice, model = %self.config.model, "realtime session established");
        Ok(())
    }

    async fn handshake(&self, style: &VoiceStyle) -> Result<LiveSession, VoiceChannelError> {
        let request = SessionTokenRequest::new(&self.config.model, style);
        let token = self.signaling.session_token(&request).await?;

        let mut peer = self.connector.connect().await?;
        let channel = match self.negotiate(peer.as_mut(), &token).await {
            Ok(channel) => channel,
            Err(e) => {
                peer.close();
                return Err(e);
            }
        };

        let DataChannel {
            outbound,
            inbound,
            open,
        } = channel;
        let pump = tokio::spawn(pump_inbound(inbound, self.bus.clone()));

        Ok(LiveSession {
            peer,
            outbound,
            open,
            pump,
        })
    }

    async fn negotiate(
        &self,
        peer: &mut dyn PeerConnection,
        token: &str,
    ) -> Result<DataChannel, VoiceChannelError> {
        peer.attach_audio_sink().await?;

        if let Err(e) = peer.add_microphone_track().await {
            warn!(error = %e, "continuing without microphone");
            peer.add_receive_only_audio().await?;
        }

        let channel = peer.create_data_channel(EVENTS_CHANNEL_LABEL).await?;
        if peer.connect_direct(&self.config.model, token).await? {
            return Ok(channel);
        }

        let offer = peer.create_offer().await?;
        peer.set_local_description(&offer).await?;
        let answer = self
            .signaling
            .exchange_sdp(&self.config.model, &offer, token)
            .await?;
        peer.set_remote_description(&answer).await?;

        Ok(channel)
    }

    /// Waits (bounded) for the data channel to open and returns its sender.
    async fn open_sender(&self) -> Result<mpsc::UnboundedSender<String>, VoiceChannelError> {
        let (outbound, mut open) = {
            let live = self.live.lock().await;
            let session = live.as_ref().ok_or(VoiceChannelError::ChannelClosed)?;
            (session.outbound.clone(), session.open.clone())
        };

        match timeout(self.config.data_channel_timeout, open.wait_for(|is_open| *is_open)).await {
            Ok(Ok(_)) => Ok(outbound),
            Ok(Err(_)) => Err(VoiceChannelError::ChannelClosed),
            Err(_) => Err(VoiceChannelError::DataChannelTimeout {
                timeout_ms: self.config.data_channel_timeout.as_millis() as u64,
            }),
        }
    }

    async fn speak_once(&self, text: &str) -> Result<(), VoiceChannelError> {
        self.try_prewarm().await?;

        let outbound = match self.open_sender().await {
            Ok(outbound) => outbound,
            Err(e) => {
                // A session whose channel never opened is useless; start over next attempt.
                self.teardown().await;
                return Err(e);
            }
        };

        for message in [
            ClientEvent::user_text(text),
            ClientEvent::respond(READ_ALOUD_INSTRUCTIONS),
        ] {
            outbound
                .send(encode(&message)?)
                .map_err(|_| VoiceChannelError::ChannelClosed)?;
        }
        Ok(())
    }

    /// Reads `text` aloud. Returns whether the request reached the model.
    pub async fn speak(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let repeated = self
            .debouncer
            .lock()
            .expect("SpeakDebouncer poisoned")
            .should_skip(text, Instant::now());
        if repeated {
            debug!("skipping repeated speak");
            return true;
        }

        match self.config.speak_retry.run("speak", || self.speak_once(text)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "speak failed");
                false
            }
        }
    }

    /// Sends any protocol message if the data channel is open right now.
    pub async fn send_event<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        let payload = match encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "dropping unencodable event");
                return false;
            }
        };

        let live = self.live.lock().await;
        match live.as_ref() {
            Some(session) if *session.open.borrow() => session.outbound.send(payload).is_ok(),
            _ => {
                debug!("data channel not open, event dropped");
                false
            }
        }
    }

    /// Changes the persona and drops the live session; the next use reconnects.
    pub async fn set_style(&self, update: StyleUpdate) {
        self.style.lock().expect("VoiceStyle poisoned").apply(update);
        self.teardown().await;
    }

    pub async fn teardown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let session = self.live.lock().await.take();
        if let Some(session) = session {
            session.shutdown();
            info!("realtime session torn down");
        }
    }
}

#[async_trait]
impl Narrator for RealtimeVoiceChannel {
    async fn speak(&self, text: &str) -> bool {
        RealtimeVoiceChannel::speak(self, text).await
    }

    async fn send_event(&self, event: &ClientEvent) -> bool {
        RealtimeVoiceChannel::send_event(self, event).await
    }
}

#[async_trait]
impl<N: Narrator + ?Sized> Narrator for Arc<N> {
    async fn speak(&self, text: &str) -> bool {
        (**self).speak(text).await
    }

    async fn send_event(&self, event: &ClientEvent) -> bool {
        (**self).send_event(event).await
    }
}
