use crate::{
    quiz::{QuizAttempt, QuizItem},
    types::Checkpoint,
};

/// Format seconds as MM:SS, or H:MM:SS past the hour
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

pub fn format_checkpoint_line(checkpoint: &Checkpoint) -> String {
    let at = if checkpoint.timestamp_formatted.is_empty() {
        format_timestamp(checkpoint.timestamp_seconds)
    } else {
        checkpoint.timestamp_formatted.clone()
    };
    format!(
        "[{}] {} ({})",
        at,
        checkpoint.context_title,
        checkpoint.trigger_keywords().join(", ")
    )
}

pub fn option_label(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// Question, lettered options and the hints revealed so far.
pub fn format_quiz(quiz: &QuizItem, attempt: &QuizAttempt) -> String {
    let mut output = String::new();
    output.push_str(quiz.question());
    output.push('\n');

    for (i, option) in quiz.options().iter().enumerate() {
        let marker = if attempt.selected_index == Some(i) { '>' } else { ' ' };
        output.push_str(&format!("{} {}. {}\n", marker, option_label(i), option.text));
    }

    for hint in attempt.visible_hints(quiz) {
        output.push_str(&format!("💡 {}\n", hint));
    }

    output
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn timestamps() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(75.9), "01:15");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
        assert_eq!(format_timestamp(-3.0), "00:00");
    }

    #[test]
    fn quiz_shows_selection_and_hints() {
        let quiz: QuizItem = serde_json::from_value(json!({
            "question": "Which shows respect?",
            "options": ["Banmal", "Jondaetmal"],
            "correct_index": 1,
            "hints": ["Think formal."]
        }))
        .unwrap();
        let mut attempt = QuizAttempt::new();
        attempt.choose_option(&quiz, 0);

        let text = format_quiz(&quiz, &attempt);

        assert!(text.contains("> A. Banmal"));
        assert!(text.contains("  B. Jondaetmal"));
        assert!(text.contains("Think formal."));
    }
}
