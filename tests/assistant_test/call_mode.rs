//! Continuous call mode

use voxgen::assistant::{AssistantEvent, AssistantStatus, InputMode};
use voxgen::services::ApiKeys;

use crate::common::{AssistantHarness, transcript_json};

#[tokio::test(start_paused = true)]
async fn test_call_resumes_listening_after_each_turn() {
    let mut h = AssistantHarness::new();
    h.assistant.start_call().await.unwrap();
    assert_eq!(h.assistant.mode(), InputMode::Call);
    assert_eq!(h.assistant.status(), AssistantStatus::Listening);
    assert!(h.assistant.snapshot().call_start_time.is_some());

    h.connector
        .last_link()
        .unwrap()
        .send_snapshot(&transcript_json("a counter"), true);
    h.drive_until(|s| s.current_component.is_some()).await;

    assert_eq!(h.assistant.status(), AssistantStatus::Listening);
    assert_eq!(h.connector.connection_count(), 2);
    assert!(!h.connector.last_link().unwrap().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_second_call_turn_lands_in_history() {
    let mut h = AssistantHarness::new();
    h.assistant.start_call().await.unwrap();

    for text in ["a counter", "make it blue"] {
        h.connector
            .last_link()
            .unwrap()
            .send_snapshot(&transcript_json(text), true);
        h.drive_until(|s| s.status == AssistantStatus::Processing)
            .await;
        assert_eq!(h.assistant.snapshot().transcript, text);
        h.drive_until(|s| s.status == AssistantStatus::Listening)
            .await;
    }

    assert_eq!(h.assistant.history().len(), 2);
    assert_eq!(h.connector.connection_count(), 3);
    let completed = h
        .recorder
        .all()
        .iter()
        .filter(|e| matches!(e, AssistantEvent::Completed(_)))
        .count();
    assert_eq!(completed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_end_call_while_listening_discards_utterance() {
    let mut h = AssistantHarness::new();
    h.assistant.start_call().await.unwrap();
    let link = h.connector.last_link().unwrap();

    h.assistant.end_call();
    assert_eq!(h.assistant.mode(), InputMode::Ptt);
    assert_eq!(h.assistant.status(), AssistantStatus::Idle);
    assert!(h.assistant.snapshot().call_start_time.is_none());
    assert!(link.is_closed());

    link.send_snapshot(&transcript_json("ignored"), true);
    h.pump().await;
    assert_eq!(h.assistant.status(), AssistantStatus::Idle);
    assert!(h.assistant.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_end_call_while_thinking_finishes_turn() {
    let mut h = AssistantHarness::new();
    h.assistant.start_call().await.unwrap();
    let link = h.connector.last_link().unwrap();
    h.assistant.stop_recording().unwrap();

    h.assistant.end_call();
    assert_eq!(h.assistant.status(), AssistantStatus::Thinking);
    assert!(!link.is_closed());

    link.send_snapshot(&transcript_json("a counter"), true);
    h.drive_until(|s| s.status == AssistantStatus::Idle).await;
    assert_eq!(h.assistant.history().len(), 1);
    assert_eq!(h.connector.connection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_call_while_processing_does_not_resume() {
    let mut h = AssistantHarness::new();
    h.assistant.start_call().await.unwrap();
    h.connector
        .last_link()
        .unwrap()
        .send_snapshot(&transcript_json("a counter"), true);
    h.drive_until(|s| s.status == AssistantStatus::Processing)
        .await;

    h.assistant.end_call();
    assert_eq!(h.assistant.status(), AssistantStatus::Processing);
    assert_eq!(h.assistant.mode(), InputMode::Ptt);

    h.drive_until(|s| s.status == AssistantStatus::Idle).await;
    assert_eq!(h.assistant.history().len(), 1);
    assert_eq!(h.connector.connection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abort_in_call_returns_to_listening() {
    let mut h = AssistantHarness::new();
    h.assistant.start_call().await.unwrap();
    let first = h.connector.last_link().unwrap();

    h.assistant.abort().await;
    assert_eq!(h.assistant.status(), AssistantStatus::Listening);
    assert_eq!(h.assistant.mode(), InputMode::Call);
    assert!(first.is_closed());
    assert_eq!(h.connector.connection_count(), 2);

    // the fresh session is the one listened to
    h.connector
        .last_link()
        .unwrap()
        .send_snapshot(&transcript_json("a counter"), true);
    h.drive_until(|s| s.current_component.is_some()).await;
    assert_eq!(h.assistant.status(), AssistantStatus::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_start_call_failure_restores_push_to_talk() {
    let mut h = AssistantHarness::new();
    h.credentials.set_keys(ApiKeys::default());

    assert!(h.assistant.start_call().await.is_err());
    assert_eq!(h.assistant.mode(), InputMode::Ptt);
    assert_eq!(h.assistant.status(), AssistantStatus::Error);

    // calls cannot start from the error state
    assert!(h.assistant.start_call().await.is_err());
    assert_eq!(h.assistant.mode(), InputMode::Ptt);
}

#[tokio::test(start_paused = true)]
async fn test_error_ends_call_and_a_new_call_can_start() {
    let mut h = AssistantHarness::new();
    h.completion.set_chunks(["Sorry, no code this time."]);
    h.assistant.start_call().await.unwrap();

    h.connector
        .last_link()
        .unwrap()
        .send_snapshot(&transcript_json("a counter"), true);
    h.drive_until(|s| s.status == AssistantStatus::Error).await;

    assert_eq!(h.assistant.mode(), InputMode::Ptt);
    assert!(h.assistant.snapshot().call_start_time.is_none());
    assert!(
        h.recorder
            .all()
            .contains(&AssistantEvent::ModeChanged(InputMode::Ptt))
    );

    h.assistant.retry().unwrap();
    h.assistant.start_call().await.unwrap();
    assert_eq!(h.assistant.mode(), InputMode::Call);
    assert_eq!(h.assistant.status(), AssistantStatus::Listening);
    assert_eq!(h.connector.connection_count(), 2);
}
