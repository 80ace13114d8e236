use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOption {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

impl QuizOption {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_correct: None,
        }
    }

    pub fn correct(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_correct: Some(true),
        }
    }
}

/// Every place the lesson service has ever put "which option is right".
///
/// Index fields hold `-1` when the payload carried a number that can never
/// name an option (negative or fractional); the field still counts as present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerKey {
    pub correct_option_index: Option<i64>,
    pub correct_index: Option<i64>,
    pub answer_index: Option<i64>,
    pub correct_answer_text: Option<String>,
    pub answer_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipleChoiceQuiz {
    pub question: String,
    pub options: Vec<QuizOption>,
    pub answer_key: AnswerKey,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenEndedQuiz {
    pub question: String,
    /// Present (even empty) means it is the only source of accepted answers.
    pub accepted_answers: Option<Vec<String>>,
    pub correct_answer_text: Option<String>,
    pub answer_text: Option<String>,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizKind {
    MultipleChoice,
    OpenEnded,
}

/// One quiz of a lesson, decoded once at the payload boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawQuizItem", into = "RawQuizItem")]
pub enum QuizItem {
    MultipleChoice(MultipleChoiceQuiz),
    OpenEnded(OpenEndedQuiz),
}

impl QuizItem {
    pub fn kind(&self) -> QuizKind {
        match self {
            QuizItem::MultipleChoice(_) => QuizKind::MultipleChoice,
            QuizItem::OpenEnded(_) => QuizKind::OpenEnded,
        }
    }

    pub fn question(&self) -> &str {
        match self {
            QuizItem::MultipleChoice(q) => &q.question,
            QuizItem::OpenEnded(q) => &q.question,
        }
    }

    pub fn hints(&self) -> &[String] {
        match self {
            QuizItem::MultipleChoice(q) => &q.hints,
            QuizItem::OpenEnded(q) => &q.hints,
        }
    }

    pub fn options(&self) -> &[QuizOption] {
        match self {
            QuizItem::MultipleChoice(q) => &q.options,
            QuizItem::OpenEnded(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawOption {
    Structured {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_correct: Option<bool>,
    },
    Text(String),
}

/// Wire shape of a quiz: every legacy field optional and loosely typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawQuizItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(rename = "type", default, skip_serializing)]
    type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<RawOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correct_option_index: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correct_index: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    answer_index: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correct_answer_text: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    answer_text: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    accepted_answers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hints: Option<Vec<Value>>,
}

/// Only JSON numbers count as an index; anything else is treated as absent.
fn index_field(value: Option<Value>) -> Option<i64> {
    let n = value?.as_f64()?;
    if n >= 0.0 && n.fract() == 0.0 {
        Some(n as i64)
    } else {
        Some(-1)
    }
}

fn text_field(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn parse_kind(raw: &str) -> Option<QuizKind> {
    match raw.trim().to_lowercase().replace('-', "_").as_str() {
        "multiple_choice" | "mcq" | "choice" => Some(QuizKind::MultipleChoice),
        "open_ended" | "open" | "short_answer" | "free_text" => Some(QuizKind::OpenEnded),
        _ => None,
    }
}

impl From<RawQuizItem> for QuizItem {
    fn from(raw: RawQuizItem) -> Self {
        let declared = raw
            .kind
            .as_deref()
            .or(raw.type_.as_deref())
            .and_then(parse_kind);
        let has_options = raw.options.as_ref().is_some_and(|o| !o.is_empty());
        let kind = declared.unwrap_or(if has_options {
            QuizKind::MultipleChoice
        } else {
            QuizKind::OpenEnded
        });

        let question = raw.question.unwrap_or_default();
        let hints = raw
            .hints
            .unwrap_or_default()
            .into_iter()
            .map(value_to_text)
            .collect();

        match kind {
            QuizKind::MultipleChoice => {
                let options = raw
                    .options
                    .unwrap_or_default()
                    .into_iter()
                    .map(|o| match o {
                        RawOption::Structured { text, is_correct } => {
                            QuizOption { text, is_correct }
                        }
                        RawOption::Text(text) => QuizOption::new(text),
                    })
                    .collect();

                QuizItem::MultipleChoice(MultipleChoiceQuiz {
                    question,
                    options,
                    answer_key: AnswerKey {
                        correct_option_index: index_field(raw.correct_option_index),
                        correct_index: index_field(raw.correct_index),
                        answer_index: index_field(raw.answer_index),
                        correct_answer_text: text_field(raw.correct_answer_text),
                        answer_text: text_field(raw.answer_text),
                    },
                    hints,
                })
            }
            QuizKind::OpenEnded => {
                let accepted_answers = match raw.accepted_answers {
                    Some(Value::Array(items)) => {
                        Some(items.into_iter().map(value_to_text).collect())
                    }
                    _ => None,
                };

                QuizItem::OpenEnded(OpenEndedQuiz {
                    question,
                    accepted_answers,
                    correct_answer_text: text_field(raw.correct_answer_text),
                    answer_text: text_field(raw.answer_text),
                    hints,
                })
            }
        }
    }
}

impl From<QuizItem> for RawQuizItem {
    fn from(item: QuizItem) -> Self {
        let hints = |h: Vec<String>| Some(h.into_iter().map(Value::String).collect());
        match item {
            QuizItem::MultipleChoice(q) => RawQuizItem {
                question: Some(q.question),
                kind: Some("multiple_choice".to_string()),
                options: Some(
                    q.options
                        .into_iter()
                        .map(|o| RawOption::Structured {
                            text: o.text,
                            is_correct: o.is_correct,
                        })
                        .collect(),
                ),
                correct_option_index: q.answer_key.correct_option_index.map(Value::from),
                correct_index: q.answer_key.correct_index.map(Value::from),
                answer_index: q.answer_key.answer_index.map(Value::from),
                correct_answer_text: q.answer_key.correct_answer_text.map(Value::String),
                answer_text: q.answer_key.answer_text.map(Value::String),
                hints: hints(q.hints),
                ..Default::default()
            },
            QuizItem::OpenEnded(q) => RawQuizItem {
                question: Some(q.question),
                kind: Some("open_ended".to_string()),
                accepted_answers: q.accepted_answers.map(|a| {
                    Value::Array(a.into_iter().map(Value::String).collect())
                }),
                correct_answer_text: q.correct_answer_text.map(Value::String),
                answer_text: q.answer_text.map(Value::String),
                hints: hints(q.hints),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> QuizItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn kind_is_inferred_from_options() {
        let quiz = decode(json!({
            "question": "Which dish is fermented?",
            "options": [{"text": "Kimchi", "is_correct": true}, {"text": "Japchae"}]
        }));

        assert_eq!(quiz.kind(), QuizKind::MultipleChoice);
        assert_eq!(quiz.options()[0], QuizOption::correct("Kimchi"));

        let quiz = decode(json!({"question": "Capital of Korea?", "accepted_answers": ["Seoul"]}));
        assert_eq!(quiz.kind(), QuizKind::OpenEnded);
    }

    #[test]
    fn declared_kind_wins_over_shape() {
        let quiz = decode(json!({"kind": "open-ended", "question": "q", "options": ["a"]}));
        assert_eq!(quiz.kind(), QuizKind::OpenEnded);

        let quiz = decode(json!({"type": "mcq", "question": "q"}));
        assert_eq!(quiz.kind(), QuizKind::MultipleChoice);
        assert!(quiz.options().is_empty());
    }

    #[test]
    fn legacy_string_options_are_accepted() {
        let quiz = decode(json!({"question": "q", "options": ["A", "B"], "answer_text": "b"}));

        let QuizItem::MultipleChoice(mc) = quiz else {
            panic!("expected multiple choice");
        };
        assert_eq!(mc.options.len(), 2);
        assert_eq!(mc.options[1].text, "B");
        assert_eq!(mc.answer_key.answer_text.as_deref(), Some("b"));
    }

    #[test]
    fn non_numeric_index_fields_are_ignored() {
        let quiz = decode(json!({
            "question": "q",
            "options": ["A", "B"],
            "correct_option_index": "1",
            "correct_index": 1.5,
            "answer_index": 1
        }));

        let QuizItem::MultipleChoice(mc) = quiz else {
            panic!("expected multiple choice");
        };
        assert_eq!(mc.answer_key.correct_option_index, None);
        assert_eq!(mc.answer_key.correct_index, Some(-1));
        assert_eq!(mc.answer_key.answer_index, Some(1));
    }

    #[test]
    fn re_encoding_keeps_the_answer_key() {
        let quiz = decode(json!({
            "kind": "multiple_choice",
            "question": "q",
            "options": [{"text": "A"}, {"text": "B"}],
            "correct_index": 1,
            "hints": ["think about B"]
        }));

        let encoded = serde_json::to_value(&quiz).unwrap();
        assert_eq!(encoded["correct_index"], json!(1));
        assert_eq!(encoded["kind"], json!("multiple_choice"));
        assert_eq!(decode(encoded), quiz);
    }
}
