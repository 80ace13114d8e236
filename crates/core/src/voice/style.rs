use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_VOICE: &str = "sage";

pub const DEFAULT_INSTRUCTIONS: &str = "You are Taki, a cheerful female bunny tutor mascot. \
Speak English only. Keep it friendly, energetic, and playful. \
Use short sentences (7–12 words) and a slightly higher pitch. \
Stay natural and not overly cutesy. Keep pace comfortable. \
Sound like you are talking to a friend while teaching.";

/// Sent with every `speak` so the model voices the user item verbatim.
pub const READ_ALOUD_INSTRUCTIONS: &str =
    "Read the previous user message aloud in your configured friendly, playful style.";

/// Persona fixed for the lifetime of one realtime session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceStyle {
    pub voice: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<Value>,
}

impl Default for VoiceStyle {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            tools: None,
            tool_choice: None,
            turn_detection: None,
        }
    }
}

/// Partial persona change; `None` or a blank value keeps the current one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleUpdate {
    pub voice: Option<String>,
    pub instructions: Option<String>,
}

impl StyleUpdate {
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

impl VoiceStyle {
    pub fn apply(&mut self, update: StyleUpdate) {
        if let Some(voice) = update.voice.filter(|v| !v.trim().is_empty()) {
            self.voice = voice.trim().to_string();
        }
        if let Some(instructions) = update.instructions.filter(|i| !i.trim().is_empty()) {
            self.instructions = instructions;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_persona() {
        let style = VoiceStyle::default();
        assert_eq!(style.voice, "sage");
        assert!(style.instructions.starts_with("You are Taki"));
    }

    #[test]
    fn update_only_touches_given_fields() {
        let mut style = VoiceStyle::default();
        style.apply(StyleUpdate::default().voice("alloy"));

        assert_eq!(style.voice, "alloy");
        assert_eq!(style.instructions, DEFAULT_INSTRUCTIONS);
    }

    #[test]
    fn blank_values_are_ignored() {
        let mut style = VoiceStyle::default();
        style.apply(StyleUpdate::default().voice("  ").instructions(""));

        assert_eq!(style.voice, DEFAULT_VOICE);
        assert_eq!(style.instructions, DEFAULT_INSTRUCTIONS);
    }
}
