use crate::quiz::{MultipleChoiceQuiz, OpenEndedQuiz, QuizItem};

/// One way of finding the correct option of a multiple-choice quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerLocator {
    CorrectOptionIndex,
    CorrectIndex,
    AnswerIndex,
    MarkedOption,
    CorrectAnswerText,
    AnswerText,
}

/// Canonical field first, structural marker next, text matching last.
pub const RESOLUTION_ORDER: [AnswerLocator; 6] = [
    AnswerLocator::CorrectOptionIndex,
    AnswerLocator::CorrectIndex,
    AnswerLocator::AnswerIndex,
    AnswerLocator::MarkedOption,
    AnswerLocator::CorrectAnswerText,
    AnswerLocator::AnswerText,
];

/// Outcome of a single locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located {
    /// The locator does not apply; try the next one.
    NotApplicable,
    /// The locator applies and names this option.
    Index(usize),
    /// The locator applies but names no option. Resolution stops here.
    Unmatched,
}

pub fn normalize_answer(text: &str) -> String {
    text.trim().to_lowercase()
}

fn explicit(index: Option<i64>) -> Located {
    match index {
        None => Located::NotApplicable,
        Some(i) if i >= 0 => Located::Index(i as usize),
        Some(_) => Located::Unmatched,
    }
}

fn by_text(quiz: &MultipleChoiceQuiz, text: Option<&str>) -> Located {
    let Some(text) = text else {
        return Located::NotApplicable;
    };
    let wanted = normalize_answer(text);
    quiz.options
        .iter()
        .position(|o| normalize_answer(&o.text) == wanted)
        .map_or(Located::Unmatched, Located::Index)
}

impl AnswerLocator {
    pub fn locate(self, quiz: &MultipleChoiceQuiz) -> Located {
        let key = &quiz.answer_key;
        match self {
            AnswerLocator::CorrectOptionIndex => explicit(key.correct_option_index),
            AnswerLocator::CorrectIndex => explicit(key.correct_index),
            AnswerLocator::AnswerIndex => explicit(key.answer_index),
            AnswerLocator::MarkedOption => quiz
                .options
                .iter()
                .position(|o| o.is_correct == Some(true))
                .map_or(Located::NotApplicable, Located::Index),
            AnswerLocator::CorrectAnswerText => by_text(quiz, key.correct_answer_text.as_deref()),
            AnswerLocator::AnswerText => by_text(quiz, key.answer_text.as_deref()),
        }
    }
}

/// Index of the correct option, or `None` when the key cannot be resolved.
pub fn resolve_correct_index(quiz: &QuizItem) -> Option<usize> {
    let QuizItem::MultipleChoice(mc) = quiz else {
        return None;
    };

    for locator in RESOLUTION_ORDER {
        match locator.locate(mc) {
            Located::NotApplicable => continue,
            Located::Index(i) => return Some(i),
            Located::Unmatched => return None,
        }
    }
    None
}

/// Normalized accepted answers of an open-ended quiz.
pub fn accepted_answers(quiz: &OpenEndedQuiz) -> Vec<String> {
    if let Some(answers) = &quiz.accepted_answers {
        return answers.iter().map(|a| normalize_answer(a)).collect();
    }

    [&quiz.correct_answer_text, &quiz.answer_text]
        .into_iter()
        .flatten()
        .find(|a| !a.is_empty())
        .map(|a| vec![normalize_answer(a)])
        .unwrap_or_default()
}

/// An unresolvable key never grades anything as correct.
pub fn is_correct_option(quiz: &QuizItem, selected: usize) -> bool {
    resolve_correct_index(quiz) == Some(selected)
}

pub fn is_accepted_answer(quiz: &QuizItem, input: &str) -> bool {
    let QuizItem::OpenEnded(open) = quiz else {
        return false;
    };
    let normalized = normalize_answer(input);
    accepted_answers(open).contains(&normalized)
}
