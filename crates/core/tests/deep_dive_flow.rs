use std::sync::Arc;

use kaption_core::{
    Checkpoint, DeepDiveItem, RealtimeVoiceChannel, SessionError, Stage, VoiceEvent,
    VoiceEventKind, start_session,
    voice::{
        DEFAULT_CHAT_REPLY, LoopbackConnector, LoopbackSignaling, LoopbackStats,
        VoiceChannelConfig,
    },
};
use serde_json::json;
use tokio::sync::broadcast;

fn checkpoint() -> Checkpoint {
    serde_json::from_value(json!({
        "timestamp_seconds": 61.5,
        "timestamp_formatted": "01:01",
        "trigger_keyword": "빨리빨리/ppalli-ppalli",
        "segment_stt": "everyone is in a hurry",
        "scene_description": "a busy street",
        "context_title": "Ppalli-ppalli culture",
        "explanation": {"summary": "Speed", "main": "Korea values speed.", "tip": "Say it twice."}
    }))
    .unwrap()
}

fn loopback_channel() -> (Arc<RealtimeVoiceChannel>, Arc<LoopbackStats>) {
    let connector = LoopbackConnector::default();
    let stats = connector.stats();
    let channel = Arc::new(RealtimeVoiceChannel::new(
        VoiceChannelConfig::default(),
        Arc::new(LoopbackSignaling::new()),
        Arc::new(connector),
    ));
    (channel, stats)
}

#[tokio::test]
async fn recap_think_quiz_done() {
    let item: DeepDiveItem = serde_json::from_value(json!({
        "recap": {"detailed": {"summary_main": "X happened because Y"}},
        "tps": {"think": {"prompt": "Why?"}},
        "quizzes": [{
            "kind": "multiple_choice",
            "question": "Q1",
            "options": [{"text": "A"}, {"text": "B", "is_correct": true}]
        }]
    }))
    .unwrap();
    let (channel, stats) = loopback_channel();
    let transcripts = channel.bus().subscribe_inbox(&[VoiceEventKind::Delta], 32);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let (session, _worker) = start_session(Arc::clone(&channel), checkpoint(), item, shutdown_rx);
    let mut state = session.watch_state();

    // Recap narration ends, think opens on its own.
    state.wait_for(|s| s.stage == Stage::Think).await.unwrap();

    // Think narration ends, the tutor opens the chat.
    let mut heard = Vec::new();
    while !heard.iter().any(|t: &String| t == DEFAULT_CHAT_REPLY) {
        if let VoiceEvent::Delta { transcript } = &transcripts.recv().await.event {
            heard.push(transcript.clone());
        }
    }
    assert_eq!(heard[0], "X happened because Y");
    assert!(heard[1].starts_with("Why?\nWhen you're ready, press Start Quiz."));

    session.start_quiz().await.unwrap();
    let chosen = session.choose_option(1).await.unwrap();
    assert!(chosen.attempt.unwrap().correct);
    let done = session.next_quiz().await.unwrap();

    assert_eq!(done.state.stage, Stage::Done);
    assert_eq!(stats.connections(), 1);

    let sent = stats.sent();
    let opener = sent
        .iter()
        .position(|m| m["item"]["role"] == json!("system"))
        .unwrap();
    assert!(
        sent[opener]["item"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("[CONTEXT]\nTitle: Ppalli-ppalli culture\nPrompt: Why?")
    );
    assert_eq!(sent[opener + 1]["type"], json!("response.create"));
}

#[tokio::test]
async fn next_quiz_is_gated_on_a_correct_answer() {
    let item: DeepDiveItem = serde_json::from_value(json!({
        "recap": {"detailed": {"summary_main": "Three questions follow."}},
        "quizzes": [
            {"question": "Q1", "options": ["A", "B"], "correct_option_index": 0, "hints": ["h1", "h2", "h3"]},
            {"question": "Q2", "options": ["A", "B"], "answer_text": "b"},
            {"kind": "open_ended", "question": "Q3", "accepted_answers": ["Seoul"]}
        ]
    }))
    .unwrap();
    let (channel, _stats) = loopback_channel();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (session, _worker) = start_session(channel, checkpoint(), item, shutdown_rx);

    session.skip_recap().await.unwrap();
    session.start_quiz().await.unwrap();

    for _ in 0..3 {
        let wrong = session.choose_option(1).await.unwrap();
        assert!(!wrong.attempt.unwrap().correct);
        assert!(wrong.state.attempt.revealed_hint_count <= 2);
        assert_eq!(session.next_quiz().await, Err(SessionError::NotAnsweredCorrectly));
    }
    session.choose_option(0).await.unwrap();
    assert_eq!(session.next_quiz().await.unwrap().state.current_quiz_index, 1);

    session.choose_option(1).await.unwrap();
    session.next_quiz().await.unwrap();

    let open = session.submit_open_answer("  seoul ").await.unwrap();
    assert!(open.attempt.unwrap().correct);
    let done = session.next_quiz().await.unwrap();

    assert_eq!(done.state.stage, Stage::Done);
    assert_eq!(done.state.current_quiz_index, 2);
    assert!(session.next_quiz().await.is_err());
}
