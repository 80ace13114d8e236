use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    events::{EventBus, Inbox, VoiceEventKind},
    quiz::AttemptOutcome,
    session::{DeepDiveSession, SessionError, SessionState},
};

const VOICE_INBOX_CAPACITY: usize = 32;
const COMMAND_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    SkipRecap,
    StartQuiz,
    ChooseOption(usize),
    SubmitOpenAnswer(String),
    RevealHint(usize),
    NextQuiz,
    SetThinkDraft(String),
    SendThinkChat,
    Snapshot,
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            SessionCommand::SkipRecap => "skip_recap",
            SessionCommand::StartQuiz => "start_quiz",
            SessionCommand::ChooseOption(_) => "choose_option",
            SessionCommand::SubmitOpenAnswer(_) => "submit_open_answer",
            SessionCommand::RevealHint(_) => "reveal_hint",
            SessionCommand::NextQuiz => "next_quiz",
            SessionCommand::SetThinkDraft(_) => "set_think_draft",
            SessionCommand::SendThinkChat => "send_think_chat",
            SessionCommand::Snapshot => "snapshot",
        }
    }
}

/// Result of one command, with the state it left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub state: SessionState,
    pub attempt: Option<AttemptOutcome>,
    /// For chat sends: whether the message reached the model.
    pub delivered: Option<bool>,
}

struct SessionRequest {
    command: SessionCommand,
    reply: oneshot::Sender<Result<CommandOutcome, SessionError>>,
}

/// Owns a [`DeepDiveSession`] and applies voice events and commands to it one at a time.
pub struct SessionWorker {
    session: DeepDiveSession,
    state_tx: watch::Sender<SessionState>,
}

impl SessionWorker {
    /// Subscribes to the bus before the session starts so no narration end is missed.
    pub fn spawn(
        session: DeepDiveSession,
        bus: &EventBus,
        shutdown: broadcast::Receiver<()>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let inbox = bus.subscribe_inbox(
            &[VoiceEventKind::End, VoiceEventKind::ToolCall],
            VOICE_INBOX_CAPACITY,
        );
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(session.state().clone());

        let worker = SessionWorker { session, state_tx };
        let join = tokio::spawn(worker.run(commands_rx, inbox, shutdown));

        (
            SessionHandle {
                commands: commands_tx,
                state: state_rx,
            },
            join,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionRequest>,
        inbox: Inbox,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        self.session.start().await;
        self.publish();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                request = commands.recv() => match request {
                    Some(request) => {
                        let result = self.apply(request.command).await;
                        let _ = request.reply.send(result);
                    }
                    None => break,
                },
                event = inbox.recv() => {
                    if self.session.handle_voice_event(&event.event).await {
                        debug!(ingest_seq = event.ingest_seq, "voice event moved the session");
                    }
                }
            }
            self.publish();
        }

        info!(stage = %self.session.stage(), "session worker stopped");
    }

    fn publish(&self) {
        let state = self.session.state();
        self.state_tx.send_if_modified(|current| {
            if *current == *state {
                return false;
            }
            *current = state.clone();
            true
        });
    }

    async fn apply(&mut self, command: SessionCommand) -> Result<CommandOutcome, SessionError> {
        debug!(command = command.name(), "session command");
        let mut attempt = None;
        let mut delivered = None;

        match command {
            SessionCommand::SkipRecap => self.session.skip_recap().await?,
            SessionCommand::StartQuiz => self.session.start_quiz().await?,
            SessionCommand::ChooseOption(index) => {
                attempt = Some(self.session.choose_option(index).await?);
            }
            SessionCommand::SubmitOpenAnswer(text) => {
                attempt = Some(self.session.submit_open_answer(&text).await?);
            }
            SessionCommand::RevealHint(index) => self.session.reveal_hint(index)?,
            SessionCommand::NextQuiz => self.session.next_quiz().await?,
            SessionCommand::SetThinkDraft(draft) => self.session.set_think_draft(draft),
            SessionCommand::SendThinkChat => {
                delivered = Some(self.session.send_think_chat().await?);
            }
            SessionCommand::Snapshot => {}
        }

        Ok(CommandOutcome {
            state: self.session.state().clone(),
            attempt,
            delivered,
        })
    }
}

/// Cloneable front door to a running [`SessionWorker`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionRequest>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<CommandOutcome, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionRequest { command, reply })
            .await
            .map_err(|_| SessionError::Stopped)?;
        response.await.map_err(|_| SessionError::Stopped)?
    }

    /// Latest published state; changes on commands and on voice-driven transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub async fn skip_recap(&self) -> Result<CommandOutcome, SessionError> {
        self.send(SessionCommand::SkipRecap).await
    }

    pub async fn start_quiz(&self) -> Result<CommandOutcome, SessionError> {
        self.send(SessionCommand::StartQuiz).await
    }

    pub async fn choose_option(&self, index: usize) -> Result<CommandOutcome, SessionError> {
        self.send(SessionCommand::ChooseOption(index)).await
    }

    pub async fn submit_open_answer(&self, text: impl Into<String>) -> Result<CommandOutcome, SessionError> {
        self.send(SessionCommand::SubmitOpenAnswer(text.into())).await
    }

    pub async fn reveal_hint(&self, index: usize) -> Result<CommandOutcome, SessionError> {
        self.send(SessionCommand::RevealHint(index)).await
    }

    pub async fn next_quiz(&self) -> Result<CommandOutcome, SessionError> {
        self.send(SessionCommand::NextQuiz).await
    }

    pub async fn send_think_chat(&self, draft: impl Into<String>) -> Result<CommandOutcome, SessionError> {
        self.send(SessionCommand::SetThinkDraft(draft.into())).await?;
        self.send(SessionCommand::SendThinkChat).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        events::VoiceEvent,
        session::Stage,
        voice::{ClientEvent, Narrator},
    };

    struct QuietNarrator;

    #[async_trait::async_trait]
    impl Narrator for QuietNarrator {
        async fn speak(&self, _text: &str) -> bool {
            true
        }

        async fn send_event(&self, _event: &ClientEvent) -> bool {
            true
        }
    }

    fn session() -> DeepDiveSession {
        let checkpoint = serde_json::from_value(json!({
            "timestamp_seconds": 5.0,
            "trigger_keyword": "jeong",
            "context_title": "Jeong",
            "explanation": {"summary": "", "main": "", "tip": ""}
        }))
        .unwrap();
        let item = serde_json::from_value(json!({
            "recap": {"detailed": {"summary_main": "Jeong is deep affection."}},
            "quizzes": [{"question": "q", "options": ["A", "B"], "correct_index": 0}]
        }))
        .unwrap();
        DeepDiveSession::new(checkpoint, item, Arc::new(QuietNarrator))
    }

    #[tokio::test]
    async fn bus_end_event_advances_recap() {
        let bus = EventBus::default();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, _join) = SessionWorker::spawn(session(), &bus, shutdown_rx);
        let mut state = handle.watch_state();

        // Snapshot round-trip guarantees the worker has started.
        assert_eq!(handle.send(SessionCommand::Snapshot).await.unwrap().state.stage, Stage::Recap);
        bus.publish(VoiceEvent::End);

        let think = state.wait_for(|s| s.stage == Stage::Think).await.unwrap();
        assert_eq!(think.stage, Stage::Think);
    }

    #[tokio::test]
    async fn commands_run_in_order_and_report_errors() {
        let bus = EventBus::default();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, _join) = SessionWorker::spawn(session(), &bus, shutdown_rx);

        assert!(matches!(
            handle.next_quiz().await,
            Err(SessionError::WrongStage { stage: Stage::Recap, .. })
        ));
        handle.skip_recap().await.unwrap();
        handle.start_quiz().await.unwrap();

        let chosen = handle.choose_option(0).await.unwrap();
        assert!(chosen.attempt.unwrap().correct);
        let done = handle.next_quiz().await.unwrap();
        assert_eq!(done.state.stage, Stage::Done);
        assert_eq!(handle.state().stage, Stage::Done);
    }

    #[tokio::test]
    async fn shutdown_stops_the_worker() {
        let bus = EventBus::default();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, join) = SessionWorker::spawn(session(), &bus, shutdown_rx);

        shutdown_tx.send(()).unwrap();
        join.await.unwrap();

        assert_eq!(handle.skip_recap().await, Err(SessionError::Stopped));
        assert_eq!(bus.subscriber_count(VoiceEventKind::End), 0);
    }
}
