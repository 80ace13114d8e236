//! Scripted lines the tutor speaks or sends during a session.

use crate::types::{Checkpoint, ThinkPrompt};

pub const START_QUIZ_CUE: &str = "When you're ready, press Start Quiz.";
pub const CHAT_INVITATION: &str =
    "Before that, share one short thought about this topic—let's chat.";

pub const CHAT_START_INSTRUCTIONS: &str =
    "Start a brief on-topic convo. Ask one short follow-up. Keep it friendly.";
pub const CHAT_REPLY_INSTRUCTIONS: &str =
    "Respond briefly and conversationally to the user's thought.";

pub const CORRECT_ANSWER_LINE: &str = "That's correct! Let's move on when you're ready.";
pub const MULTIPLE_CHOICE_FALLBACK_HINT: &str = "Think again. Focus on tense and the key clue.";
pub const OPEN_ENDED_FALLBACK_HINT: &str = "Consider the key term or tense for this question.";

const NARRATED_GUIDING_QUESTIONS: usize = 2;
const CONTEXT_GUIDING_QUESTIONS: usize = 3;

const CONTEXT_STYLE: &str = "[STYLE] English only. 1-2 sentences. Friendly, conversational. \
Ask exactly one short follow-up question.";
const CONTEXT_POLICY: &str =
    "[POLICY] Stay strictly on this topic. Do NOT reveal any quiz answers or solutions.";

/// What the tutor reads when the think stage opens.
pub fn think_narration(think: &ThinkPrompt) -> String {
    let mut lines: Vec<&str> = Vec::new();
    if !think.prompt.trim().is_empty() {
        lines.push(&think.prompt);
    }
    lines.extend(
        think
            .guiding_questions
            .iter()
            .take(NARRATED_GUIDING_QUESTIONS)
            .map(String::as_str),
    );
    lines.push(START_QUIZ_CUE);
    lines.push(CHAT_INVITATION);
    lines.join("\n")
}

/// System message that keeps the think-stage chat on topic.
pub fn think_context(checkpoint: &Checkpoint, think: &ThinkPrompt) -> String {
    let mut lines = vec![format!("[CONTEXT]\nTitle: {}", checkpoint.context_title)];
    if !think.prompt.trim().is_empty() {
        lines.push(format!("Prompt: {}", think.prompt));
    }
    if !think.guiding_questions.is_empty() {
        let guiding: Vec<&str> = think
            .guiding_questions
            .iter()
            .take(CONTEXT_GUIDING_QUESTIONS)
            .map(String::as_str)
            .collect();
        lines.push(format!("Guiding: {}", guiding.join(" | ")));
    }
    lines.push(CONTEXT_STYLE.to_string());
    lines.push(CONTEXT_POLICY.to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn think(value: serde_json::Value) -> ThinkPrompt {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn narration_reads_at_most_two_guiding_questions() {
        let t = think(json!({
            "prompt": "How do you sense the mood in a room?",
            "guiding_questions": ["At work?", "With friends?", "Never read"]
        }));

        assert_eq!(
            think_narration(&t),
            "How do you sense the mood in a room?\nAt work?\nWith friends?\n\
             When you're ready, press Start Quiz.\n\
             Before that, share one short thought about this topic—let's chat."
        );
    }

    #[test]
    fn narration_without_prompt_still_has_closing_lines() {
        assert_eq!(
            think_narration(&ThinkPrompt::default()),
            format!("{START_QUIZ_CUE}\n{CHAT_INVITATION}")
        );
    }

    #[test]
    fn context_lists_three_guiding_questions() {
        let checkpoint = serde_json::from_value(json!({
            "timestamp_seconds": 12.0,
            "trigger_keyword": "nunchi",
            "context_title": "Reading the room",
            "explanation": {"summary": "", "main": "", "tip": ""}
        }))
        .unwrap();
        let t = think(json!({"prompt": "P", "guiding_questions": ["a", "b", "c", "d"]}));

        let context = think_context(&checkpoint, &t);

        assert_eq!(
            context,
            "[CONTEXT]\nTitle: Reading the room\nPrompt: P\nGuiding: a | b | c\n\
             [STYLE] English only. 1-2 sentences. Friendly, conversational. Ask exactly one short follow-up question.\n\
             [POLICY] Stay strictly on this topic. Do NOT reveal any quiz answers or solutions."
        );
    }
}
