use serde::Serialize;

use crate::quiz::{QuizItem, is_accepted_answer, is_correct_option};

/// Hints beyond this many are never revealed.
pub const MAX_REVEALED_HINTS: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    #[default]
    None,
    Correct,
    Wrong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub correct: bool,
    /// Index of the hint this attempt revealed, if it revealed a new one.
    pub revealed_hint: Option<usize>,
}

/// Learner state for the quiz item currently on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuizAttempt {
    pub selected_index: Option<usize>,
    pub open_answer_text: String,
    pub revealed_hint_count: usize,
    pub attempt_result: AttemptResult,
    pub answered_correctly: bool,
}

fn hint_ceiling(quiz: &QuizItem) -> usize {
    quiz.hints().len().min(MAX_REVEALED_HINTS)
}

impl QuizAttempt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choose_option(&mut self, quiz: &QuizItem, selected: usize) -> AttemptOutcome {
        self.selected_index = Some(selected);
        let correct = is_correct_option(quiz, selected);
        self.record(quiz, correct)
    }

    pub fn submit_open_ended(&mut self, quiz: &QuizItem, input: &str) -> AttemptOutcome {
        self.open_answer_text = input.to_string();
        let correct = is_accepted_answer(quiz, input);
        self.record(quiz, correct)
    }

    fn record(&mut self, quiz: &QuizItem, correct: bool) -> AttemptOutcome {
        if correct {
            self.answered_correctly = true;
            self.attempt_result = AttemptResult::Correct;
            return AttemptOutcome {
                correct,
                revealed_hint: None,
            };
        }

        self.attempt_result = AttemptResult::Wrong;
        let before = self.revealed_hint_count;
        self.revealed_hint_count = (before + 1).min(hint_ceiling(quiz));

        AttemptOutcome {
            correct,
            revealed_hint: (self.revealed_hint_count > before).then(|| self.revealed_hint_count - 1),
        }
    }

    /// Reveals hints up to and including `index`; never hides one.
    pub fn reveal_hint(&mut self, quiz: &QuizItem, index: usize) {
        let wanted = (index + 1).min(hint_ceiling(quiz));
        self.revealed_hint_count = self.revealed_hint_count.max(wanted);
    }

    pub fn visible_hints<'a>(&self, quiz: &'a QuizItem) -> &'a [String] {
        let hints = quiz.hints();
        &hints[..self.revealed_hint_count.min(hints.len())]
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
