//! Quiz items and answer evaluation.
//!
//! Lesson payloads carry the correct answer under several historical field
//! names. They are decoded once into [`QuizItem`] and resolved through an
//! ordered list of [`AnswerLocator`]s; a key that resolves to nothing never
//! grades an answer as correct.

pub mod answer_key;
pub mod attempt;
pub mod item;

pub use answer_key::*;
pub use attempt::*;
pub use item::*;
