use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

/// A function call the realtime model asked the client to perform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    pub call_id: String,
}

/// Everything the voice channel reports to the rest of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// Narration audio began playing.
    Start,
    /// Incremental transcript of the narration being spoken.
    Delta { transcript: String },
    /// Narration audio finished playing.
    End,
    ToolCall(ToolCall),
}

/// Routing key of a [`VoiceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceEventKind {
    Start,
    Delta,
    End,
    ToolCall,
}

impl VoiceEventKind {
    pub const ALL: [VoiceEventKind; 4] = [
        VoiceEventKind::Start,
        VoiceEventKind::Delta,
        VoiceEventKind::End,
        VoiceEventKind::ToolCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceEventKind::Start => "tts.start",
            VoiceEventKind::Delta => "tts.delta",
            VoiceEventKind::End => "tts.end",
            VoiceEventKind::ToolCall => "tts.tool_call",
        }
    }
}

impl fmt::Display for VoiceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VoiceEvent {
    pub fn kind(&self) -> VoiceEventKind {
        match self {
            VoiceEvent::Start => VoiceEventKind::Start,
            VoiceEvent::Delta { .. } => VoiceEventKind::Delta,
            VoiceEvent::End => VoiceEventKind::End,
            VoiceEvent::ToolCall(_) => VoiceEventKind::ToolCall,
        }
    }
}

/// A published event as seen by subscribers.
#[derive(Debug)]
pub struct EnrichedEvent {
    pub event: VoiceEvent,
    pub ingest_seq: u64,
    pub session_id: Uuid,
    pub ingested_at: Instant,
}
