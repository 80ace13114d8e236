use std::sync::Arc;

use anyhow::Result;
use console::style;
use kaption_core::{
    Checkpoint, DeepDiveItem, RealtimeVoiceChannel, SessionError, SessionState, Stage,
    StyleUpdate, VoiceEvent, VoiceEventKind, bootstrap_voice, format_checkpoint_line, format_quiz,
    quiz::QuizKind,
    session::CommandOutcome,
    start_session,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::debug;

use crate::ui;

/// What a line typed during the session asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Quit,
    Skip,
    StartQuiz,
    Hint,
    Next,
    Choose(usize),
    Text(String),
    Empty,
}

fn parse_input(line: &str, stage: Stage, quiz_kind: Option<QuizKind>) -> Input {
    let line = line.trim();
    match line.to_lowercase().as_str() {
        "" => return Input::Empty,
        ":q" | "quit" => return Input::Quit,
        "skip" if stage == Stage::Recap => return Input::Skip,
        "quiz" if stage == Stage::Think => return Input::StartQuiz,
        "hint" if stage == Stage::Quiz => return Input::Hint,
        "next" if stage == Stage::Quiz => return Input::Next,
        _ => {}
    }

    if quiz_kind == Some(QuizKind::MultipleChoice) && line.chars().count() == 1 {
        let c = line.chars().next().unwrap_or_default().to_ascii_uppercase();
        if c.is_ascii_uppercase() {
            return Input::Choose((c as u8 - b'A') as usize);
        }
        if let Some(d) = c.to_digit(10).filter(|d| *d > 0) {
            return Input::Choose(d as usize - 1);
        }
    }
    Input::Text(line.to_string())
}

fn prompt_for(state: &SessionState) -> &'static str {
    match state.stage {
        Stage::Recap => "listening… (skip, :q)",
        Stage::Think => "share a thought, or type quiz (:q)",
        Stage::Quiz => "answer, hint, next (:q)",
        Stage::Done => "done",
    }
}

fn show_quiz(item: &DeepDiveItem, state: &SessionState) {
    if state.stage != Stage::Quiz {
        return;
    }
    if let Some(quiz) = item.quizzes.get(state.current_quiz_index) {
        println!(
            "\n{} {}/{}",
            style("Quiz").yellow().bold(),
            state.current_quiz_index + 1,
            item.quizzes.len()
        );
        print!("{}", format_quiz(quiz, &state.attempt));
    }
}

fn report(outcome: &CommandOutcome) {
    if let Some(attempt) = outcome.attempt {
        if attempt.correct {
            println!("{}", ui::done("Correct, type next to continue"));
        } else {
            println!("{}", ui::failed("Not quite"));
        }
    }
    if outcome.delivered == Some(false) {
        println!("{}", ui::failed("Tutor is offline, message not delivered"));
    }
}

/// Walks one lesson in the terminal, printing the tutor's transcript as it streams.
pub async fn run(
    channel: Arc<RealtimeVoiceChannel>,
    checkpoint: Checkpoint,
    item: DeepDiveItem,
    voice: Option<String>,
) -> Result<()> {
    println!("{}", style(format_checkpoint_line(&checkpoint)).cyan().bold());
    ui::rule();

    let _transcript = channel.subscribe(VoiceEventKind::Delta, |event| {
        if let VoiceEvent::Delta { transcript } = event {
            println!("{} {}", style("tutor ›").magenta().bold(), transcript);
        }
    });

    let style_update = match voice {
        Some(voice) => StyleUpdate::default().voice(voice),
        None => StyleUpdate::default(),
    };
    let warmup = bootstrap_voice(Arc::clone(&channel), style_update).await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (session, worker) = start_session(Arc::clone(&channel), checkpoint, item.clone(), shutdown_rx);

    let mut stages = session.watch_state();
    let item_for_stages = item.clone();
    let stage_printer = tokio::spawn(async move {
        let mut last = None;
        while stages.changed().await.is_ok() {
            let state = stages.borrow_and_update().clone();
            if last == Some(state.stage) {
                continue;
            }
            last = Some(state.stage);
            println!("\n{} {}", style("──").dim(), style(state.stage).bold());
            show_quiz(&item_for_stages, &state);
            println!("{}", style(prompt_for(&state)).dim());
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let state = session.state();
        if state.stage == Stage::Done {
            break;
        }
        let quiz_kind = item
            .quizzes
            .get(state.current_quiz_index)
            .map(|quiz| quiz.kind());

        let result = match parse_input(&line, state.stage, quiz_kind) {
            Input::Quit => break,
            Input::Empty => continue,
            Input::Skip => session.skip_recap().await,
            Input::StartQuiz => session.start_quiz().await,
            Input::Hint => session.reveal_hint(state.attempt.revealed_hint_count).await,
            Input::Next => session.next_quiz().await,
            Input::Choose(index) => session.choose_option(index).await,
            Input::Text(text) if state.stage == Stage::Quiz => session.submit_open_answer(text).await,
            Input::Text(text) => session.send_think_chat(text).await,
        };

        match result {
            Ok(outcome) => {
                report(&outcome);
                if outcome.state.stage == Stage::Quiz && outcome.state.stage == state.stage {
                    show_quiz(&item, &outcome.state);
                }
                if outcome.state.stage == Stage::Done {
                    break;
                }
            }
            Err(SessionError::Stopped) => break,
            Err(e) => println!("{}", ui::failed(e)),
        }
    }

    let _ = shutdown_tx.send(());
    let _ = worker.await;
    stage_printer.abort();
    warmup.abort();
    channel.teardown().await;
    debug!("session closed");

    ui::rule();
    println!("{}", ui::done("Lesson finished"));
    Ok(())
}
