use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    events::VoiceEvent,
    quiz::{AttemptOutcome, QuizAttempt, QuizItem, QuizKind},
    session::{
        Stage, StagePolicies,
        context::{
            CHAT_REPLY_INSTRUCTIONS, CHAT_START_INSTRUCTIONS, CORRECT_ANSWER_LINE,
            MULTIPLE_CHOICE_FALLBACK_HINT, OPEN_ENDED_FALLBACK_HINT, think_context,
            think_narration,
        },
    },
    types::{Checkpoint, DeepDiveItem},
    voice::{ClientEvent, Narrator},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{action} is not available during the {stage} stage")]
    WrongStage { action: &'static str, stage: Stage },

    #[error("The current quiz has not been answered correctly yet")]
    NotAnsweredCorrectly,

    #[error("Chat message is empty")]
    EmptyMessage,

    #[error("Option {index} does not exist")]
    NoSuchOption { index: usize },

    #[error("Session has stopped")]
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub stage: Stage,
    pub current_quiz_index: usize,
    pub attempt: QuizAttempt,
    pub think_chat_draft: String,
}

/// Guided recap, think and quiz session for one checkpoint.
pub struct DeepDiveSession {
    checkpoint: Checkpoint,
    item: DeepDiveItem,
    narrator: Arc<dyn Narrator>,
    policies: StagePolicies,
    state: SessionState,
    /// Set while the current stage's entry narration is playing; the first
    /// narration end clears it.
    narration_armed: bool,
}

impl DeepDiveSession {
    pub fn new(checkpoint: Checkpoint, item: DeepDiveItem, narrator: Arc<dyn Narrator>) -> Self {
        Self {
            checkpoint,
            item,
            narrator,
            policies: StagePolicies::default(),
            state: SessionState::default(),
            narration_armed: false,
        }
    }

    pub fn with_policies(mut self, policies: StagePolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn item(&self) -> &DeepDiveItem {
        &self.item
    }

    pub fn quiz_count(&self) -> usize {
        self.item.quizzes.len()
    }

    pub fn current_quiz(&self) -> Option<&QuizItem> {
        match self.state.stage {
            Stage::Quiz => self.item.quizzes.get(self.state.current_quiz_index),
            _ => None,
        }
    }

    pub fn can_advance_quiz(&self) -> bool {
        self.state.stage == Stage::Quiz && self.state.attempt.answered_correctly
    }

    pub async fn start(&mut self) {
        self.enter(Stage::Recap).await;
    }

    fn require(&self, stage: Stage, action: &'static str) -> Result<(), SessionError> {
        if self.state.stage == stage {
            Ok(())
        } else {
            Err(SessionError::WrongStage {
                action,
                stage: self.state.stage,
            })
        }
    }

    async fn enter(&mut self, stage: Stage) {
        let mut next = Some(stage);
        while let Some(stage) = next.take() {
            if self.state.stage != stage {
                info!(from = %self.state.stage, to = %stage, "stage transition");
            }
            self.state.stage = stage;
            self.narration_armed = false;
            next = match stage {
                Stage::Recap => {
                    let text = self.item.recap_summary().to_string();
                    self.narrate_entry(&text).await
                }
                Stage::Think => {
                    let text = think_narration(self.item.think());
                    self.narrate_entry(&text).await
                }
                Stage::Quiz => self.enter_quiz(),
                Stage::Done => None,
            };
        }
    }

    /// Speaks the entry narration of the current stage. Returns the stage to
    /// move on to when the narration cannot play and the stage blocks on it.
    async fn narrate_entry(&mut self, text: &str) -> Option<Stage> {
        let stage = self.state.stage;
        let policy = self.policies.for_stage(stage);

        let delivered = !text.trim().is_empty() && self.narrator.speak(text).await;
        if delivered {
            self.narration_armed = true;
            return None;
        }
        if policy.blocks_on_narration {
            warn!(%stage, "entry narration unavailable, moving on");
            return Some(stage.next());
        }
        debug!(%stage, "entry narration not delivered");
        None
    }

    fn enter_quiz(&mut self) -> Option<Stage> {
        self.state.attempt.reset();
        if self.state.current_quiz_index >= self.item.quizzes.len() {
            return Some(Stage::Done);
        }
        None
    }

    /// Reacts to narration events. Returns whether the stage changed.
    pub async fn handle_voice_event(&mut self, event: &VoiceEvent) -> bool {
        match event {
            VoiceEvent::End => self.on_narration_end().await,
            VoiceEvent::ToolCall(call) => {
                debug!(name = %call.name, call_id = %call.call_id, "ignoring tool call");
                false
            }
            VoiceEvent::Start | VoiceEvent::Delta { .. } => false,
        }
    }

    async fn on_narration_end(&mut self) -> bool {
        if !self.narration_armed {
            return false;
        }
        self.narration_armed = false;

        let stage = self.state.stage;
        if self.policies.for_stage(stage).auto_advance_on_narration_end {
            self.enter(stage.next()).await;
            return true;
        }
        if stage == Stage::Think {
            self.open_chat().await;
        }
        false
    }

    async fn open_chat(&self) {
        let context = think_context(&self.checkpoint, self.item.think());
        let sent = self.narrator.send_event(&ClientEvent::system_text(context)).await
            && self
                .narrator
                .send_event(&ClientEvent::respond(CHAT_START_INSTRUCTIONS))
                .await;
        if !sent {
            warn!("could not open think chat");
        }
    }

    /// Leaves recap without waiting for its narration to end.
    pub async fn skip_recap(&mut self) -> Result<(), SessionError> {
        self.require(Stage::Recap, "skip_recap")?;
        self.enter(Stage::Think).await;
        Ok(())
    }

    pub async fn start_quiz(&mut self) -> Result<(), SessionError> {
        self.require(Stage::Think, "start_quiz")?;
        self.enter(Stage::Quiz).await;
        Ok(())
    }

    fn quiz_in_play(&self, action: &'static str) -> Result<QuizItem, SessionError> {
        self.require(Stage::Quiz, action)?;
        self.current_quiz().cloned().ok_or(SessionError::WrongStage {
            action,
            stage: self.state.stage,
        })
    }

    pub async fn choose_option(&mut self, index: usize) -> Result<AttemptOutcome, SessionError> {
        let quiz = self.quiz_in_play("choose_option")?;
        if quiz.kind() == QuizKind::MultipleChoice && index >= quiz.options().len() {
            return Err(SessionError::NoSuchOption { index });
        }

        let outcome = self.state.attempt.choose_option(&quiz, index);
        self.speak_feedback(&quiz, outcome).await;
        Ok(outcome)
    }

    pub async fn submit_open_answer(&mut self, input: &str) -> Result<AttemptOutcome, SessionError> {
        let quiz = self.quiz_in_play("submit_open_answer")?;

        let outcome = self.state.attempt.submit_open_ended(&quiz, input);
        self.speak_feedback(&quiz, outcome).await;
        Ok(outcome)
    }

    async fn speak_feedback(&self, quiz: &QuizItem, outcome: AttemptOutcome) {
        let line = if outcome.correct {
            CORRECT_ANSWER_LINE.to_string()
        } else {
            let hints = quiz.hints();
            let latest = outcome
                .revealed_hint
                .or(self.state.attempt.revealed_hint_count.checked_sub(1));
            match latest.and_then(|i| hints.get(i)) {
                Some(hint) => hint.clone(),
                None if quiz.kind() == QuizKind::MultipleChoice => {
                    MULTIPLE_CHOICE_FALLBACK_HINT.to_string()
                }
                None => OPEN_ENDED_FALLBACK_HINT.to_string(),
            }
        };
        if !self.narrator.speak(&line).await {
            debug!("quiz feedback not spoken");
        }
    }

    pub fn reveal_hint(&mut self, index: usize) -> Result<(), SessionError> {
        let quiz = self.quiz_in_play("reveal_hint")?;
        self.state.attempt.reveal_hint(&quiz, index);
        Ok(())
    }

    /// Moves to the next quiz, or to done after the last one.
    pub async fn next_quiz(&mut self) -> Result<(), SessionError> {
        self.require(Stage::Quiz, "next_quiz")?;
        if !self.state.attempt.answered_correctly {
            return Err(SessionError::NotAnsweredCorrectly);
        }

        if self.state.current_quiz_index + 1 < self.item.quizzes.len() {
            self.state.current_quiz_index += 1;
            self.enter(Stage::Quiz).await;
        } else {
            self.enter(Stage::Done).await;
        }
        Ok(())
    }

    pub fn set_think_draft(&mut self, draft: impl Into<String>) {
        self.state.think_chat_draft = draft.into();
    }

    /// Sends the draft as a chat turn. Returns whether it reached the model.
    pub async fn send_think_chat(&mut self) -> Result<bool, SessionError> {
        self.require(Stage::Think, "send_think_chat")?;
        let message = self.state.think_chat_draft.trim().to_string();
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let context = think_context(&self.checkpoint, self.item.think());
        let mut delivered = true;
        for event in [
            ClientEvent::system_text(context),
            ClientEvent::user_text(message),
            ClientEvent::respond(CHAT_REPLY_INSTRUCTIONS),
        ] {
            delivered = delivered && self.narrator.send_event(&event).await;
        }
        if !delivered {
            warn!("think chat message not delivered");
        }

        self.state.think_chat_draft.clear();
        Ok(delivered)
    }
}
