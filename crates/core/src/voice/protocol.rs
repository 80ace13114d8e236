//! JSON messages exchanged over the realtime data channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::events::{ToolCall, VoiceEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "input_text")]
    InputText { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConversationItem {
    #[serde(rename = "message")]
    Message { role: Role, content: Vec<ContentPart> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseOptions {
    pub instructions: String,
}

/// Messages the client sends to the realtime model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseOptions },
}

impl ClientEvent {
    pub fn message(role: Role, text: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::Message {
                role,
                content: vec![ContentPart::InputText { text: text.into() }],
            },
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::message(Role::User, text)
    }

    pub fn system_text(text: impl Into<String>) -> Self {
        Self::message(Role::System, text)
    }

    pub fn respond(instructions: impl Into<String>) -> Self {
        ClientEvent::ResponseCreate {
            response: ResponseOptions {
                instructions: instructions.into(),
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate { .. } => "response.create",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseDoneBody {
    #[serde(default)]
    pub output: Vec<Value>,
}

/// The subset of server messages the session reacts to.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "response.audio_transcript.delta")]
    TranscriptDelta {
        #[serde(default, alias = "delta")]
        transcript: String,
    },
    #[serde(rename = "output_audio_buffer.started")]
    AudioStarted,
    #[serde(rename = "output_audio_buffer.stopped")]
    AudioStopped,
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseDoneBody,
    },
    #[serde(other)]
    Other,
}

fn tool_call(entry: &Value) -> Option<ToolCall> {
    if entry.get("type").and_then(Value::as_str) != Some("function_call") {
        return None;
    }

    let name = entry.get("name").and_then(Value::as_str).unwrap_or_default();
    let call_id = entry.get("call_id").and_then(Value::as_str).unwrap_or_default();
    let arguments = match entry.get("arguments") {
        Some(Value::String(raw)) => match serde_json::from_str(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(name, call_id, error = %e, "skipping tool call with unparseable arguments");
                return None;
            }
        },
        Some(Value::Null) | None => Value::Object(Default::default()),
        Some(other) => other.clone(),
    };

    Some(ToolCall {
        name: name.to_string(),
        arguments,
        call_id: call_id.to_string(),
    })
}

impl ServerEvent {
    pub fn into_voice_events(self) -> Vec<VoiceEvent> {
        match self {
            ServerEvent::TranscriptDelta { transcript } => vec![VoiceEvent::Delta { transcript }],
            ServerEvent::AudioStarted => vec![VoiceEvent::Start],
            ServerEvent::AudioStopped => vec![VoiceEvent::End],
            ServerEvent::ResponseDone { response } => response
                .output
                .iter()
                .filter_map(tool_call)
                .map(VoiceEvent::ToolCall)
                .collect(),
            ServerEvent::Other => Vec::new(),
        }
    }
}

/// Turns one raw data-channel message into the events it implies.
///
/// Malformed messages yield nothing.
pub fn decode_server_message(raw: &str) -> Vec<VoiceEvent> {
    match serde_json::from_str::<ServerEvent>(raw) {
        Ok(event) => event.into_voice_events(),
        Err(e) => {
            debug!(error = %e, "ignoring malformed realtime message");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_match_wire_shape() {
        let item = serde_json::to_value(ClientEvent::user_text("Hello")).unwrap();
        assert_eq!(
            item,
            json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "message",
                    "role": "user",
                    "content": [{"type": "input_text", "text": "Hello"}]
                }
            })
        );

        let respond = serde_json::to_value(ClientEvent::respond("Read it aloud.")).unwrap();
        assert_eq!(
            respond,
            json!({"type": "response.create", "response": {"instructions": "Read it aloud."}})
        );

        let system = serde_json::to_value(ClientEvent::system_text("ctx")).unwrap();
        assert_eq!(system["item"]["role"], json!("system"));
    }

    #[test]
    fn narration_messages_map_to_events() {
        assert_eq!(
            decode_server_message(r#"{"type":"response.audio_transcript.delta","transcript":"Hi"}"#),
            vec![VoiceEvent::Delta { transcript: "Hi".into() }]
        );
        assert_eq!(
            decode_server_message(r#"{"type":"response.audio_transcript.delta","delta":"there"}"#),
            vec![VoiceEvent::Delta { transcript: "there".into() }]
        );
        assert_eq!(
            decode_server_message(r#"{"type":"output_audio_buffer.stopped","response_id":"r1"}"#),
            vec![VoiceEvent::End]
        );
        assert_eq!(
            decode_server_message(r#"{"type":"output_audio_buffer.started"}"#),
            vec![VoiceEvent::Start]
        );
    }

    #[test]
    fn unknown_and_malformed_messages_are_ignored() {
        assert!(decode_server_message(r#"{"type":"session.created","session":{}}"#).is_empty());
        assert!(decode_server_message("not json").is_empty());
        assert!(decode_server_message(r#"{"no_type":true}"#).is_empty());
    }

    #[test]
    fn response_done_emits_one_event_per_parseable_call() {
        let raw = json!({
            "type": "response.done",
            "response": {
                "output": [
                    {"type": "message", "content": []},
                    {"type": "function_call", "name": "show_hint", "call_id": "c1", "arguments": "{\"index\":1}"},
                    {"type": "function_call", "name": "broken", "call_id": "c2", "arguments": "{oops"},
                    {"type": "function_call", "name": "next_quiz", "call_id": "c3", "arguments": "{}"}
                ]
            }
        })
        .to_string();

        let events = decode_server_message(&raw);

        assert_eq!(
            events,
            vec![
                VoiceEvent::ToolCall(ToolCall {
                    name: "show_hint".into(),
                    arguments: json!({"index": 1}),
                    call_id: "c1".into(),
                }),
                VoiceEvent::ToolCall(ToolCall {
                    name: "next_quiz".into(),
                    arguments: json!({}),
                    call_id: "c3".into(),
                }),
            ]
        );
    }

    #[test]
    fn response_done_without_output_is_quiet() {
        assert!(decode_server_message(r#"{"type":"response.done"}"#).is_empty());
    }
}
