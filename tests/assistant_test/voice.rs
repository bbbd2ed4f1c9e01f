//! Push-to-talk turns

use voxgen::assistant::{AssistantEvent, AssistantStatus};
use voxgen::VoxError;
use voxgen::services::ApiKeys;

use crate::common::{AssistantHarness, COMPONENT, pcm, settle, transcript_json};

fn statuses(h: &AssistantHarness) -> Vec<AssistantStatus> {
    h.recorder
        .all()
        .into_iter()
        .filter_map(|e| match e {
            AssistantEvent::StatusChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_final_runs_one_turn() {
    let mut h = AssistantHarness::new();
    h.assistant.start_recording().await.unwrap();
    assert_eq!(h.assistant.status(), AssistantStatus::Listening);

    let link = h.connector.last_link().unwrap();
    link.send_state("listening");
    settle().await;
    assert!(h.capture.push_pcm(pcm(9, 640)));
    link.send_delta(r#"{"transcription": "a counter"#, false);
    h.pump().await;
    assert_eq!(h.assistant.snapshot().partial_transcript, "a counter");
    assert!(h.assistant.snapshot().volume > 0.0);

    h.assistant.stop_recording().unwrap();
    assert_eq!(h.assistant.status(), AssistantStatus::Thinking);

    link.send_snapshot(&transcript_json("a counter please"), true);
    h.drive_until(|s| s.status == AssistantStatus::Idle).await;

    assert_eq!(
        statuses(&h),
        vec![
            AssistantStatus::Listening,
            AssistantStatus::Thinking,
            AssistantStatus::Processing,
            AssistantStatus::Idle,
        ]
    );
    let snapshot = h.assistant.snapshot();
    assert_eq!(snapshot.transcript, "a counter please");
    assert!(snapshot.partial_transcript.is_empty());
    assert_eq!(snapshot.current_component.as_ref().unwrap().code, COMPONENT);
    assert_eq!(h.assistant.history().len(), 1);
    assert_eq!(
        h.assistant.active_conversation().unwrap().title,
        "a counter please"
    );
}

#[tokio::test(start_paused = true)]
async fn test_final_before_stop_runs_one_turn() {
    let mut h = AssistantHarness::new();
    h.assistant.start_recording().await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_snapshot(&transcript_json("a counter"), true);
    h.drive_until(|s| s.status == AssistantStatus::Processing)
        .await;

    // late release of the talk key
    h.assistant.stop_recording().unwrap();
    assert_eq!(h.assistant.status(), AssistantStatus::Processing);

    h.drive_until(|s| s.status == AssistantStatus::Idle).await;
    assert_eq!(h.assistant.history().len(), 1);
    assert_eq!(h.connector.connection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_completed_widget_is_cached() {
    let mut h = AssistantHarness::new();
    h.assistant.start_recording().await.unwrap();
    h.connector
        .last_link()
        .unwrap()
        .send_snapshot(&transcript_json("a counter"), true);
    h.drive_until(|s| s.current_component.is_some()).await;

    let cached = h.assistant.widgets().get("widget://counter").unwrap().unwrap();
    assert_eq!(cached.code, COMPONENT);
    assert!(h.stored("widget:widget://counter").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_missing_final_times_out_then_retry() {
    let mut h = AssistantHarness::new();
    h.assistant.start_recording().await.unwrap();
    h.assistant.stop_recording().unwrap();

    h.drive_until(|s| s.status == AssistantStatus::Error).await;
    let error = h.assistant.snapshot().error.clone().unwrap();
    assert!(error.contains("5000ms"));
    assert!(
        h.recorder
            .all()
            .contains(&AssistantEvent::Error(error.clone()))
    );
    assert!(h.connector.last_link().unwrap().is_closed());

    h.assistant.retry().unwrap();
    assert_eq!(h.assistant.status(), AssistantStatus::Idle);
    assert!(h.assistant.snapshot().error.is_none());
    assert!(h.assistant.retry().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_unfinalized_transcript_is_salvaged_on_timeout() {
    let mut h = AssistantHarness::new();
    h.assistant.start_recording().await.unwrap();
    h.connector
        .last_link()
        .unwrap()
        .send_delta(&transcript_json("a counter"), false);
    h.pump().await;
    h.assistant.stop_recording().unwrap();

    h.drive_until(|s| s.current_component.is_some()).await;
    h.drive_until(|s| s.status == AssistantStatus::Idle).await;
    assert_eq!(h.assistant.snapshot().transcript, "a counter");
    assert!(h.assistant.snapshot().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_restart_while_thinking_ignores_old_connection() {
    let mut h = AssistantHarness::new();
    h.assistant.start_recording().await.unwrap();
    h.assistant.stop_recording().unwrap();
    let old = h.connector.last_link().unwrap();

    h.assistant.start_recording().await.unwrap();
    assert_eq!(h.assistant.status(), AssistantStatus::Listening);
    assert_eq!(h.connector.connection_count(), 2);
    let new = h.connector.last_link().unwrap();

    old.send_snapshot(&transcript_json("old words"), true);
    h.pump().await;
    assert_eq!(h.assistant.status(), AssistantStatus::Listening);

    new.send_snapshot(&transcript_json("new words"), true);
    h.drive_until(|s| s.status == AssistantStatus::Idle).await;
    assert_eq!(h.assistant.snapshot().transcript, "new words");
    assert_eq!(h.assistant.history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_credentials_fail_before_listening() {
    let mut h = AssistantHarness::new();
    h.credentials.set_keys(ApiKeys::default());

    assert!(h.assistant.start_recording().await.is_err());
    assert_eq!(h.assistant.status(), AssistantStatus::Error);
    assert_eq!(statuses(&h), vec![AssistantStatus::Error]);
    assert!(h.assistant.snapshot().error.is_some());
    assert_eq!(h.connector.connection_count(), 0);
    assert_eq!(h.capture.start_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_fails_turn() {
    let mut h = AssistantHarness::new();
    h.capture.deny_permission();

    assert!(h.assistant.start_recording().await.is_err());
    assert_eq!(h.assistant.status(), AssistantStatus::Error);
    assert_eq!(statuses(&h), vec![AssistantStatus::Error]);
    assert!(
        h.assistant
            .snapshot()
            .error
            .as_deref()
            .unwrap()
            .contains("microphone")
    );
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_never_reaches_listening() {
    let mut h = AssistantHarness::new();
    h.connector
        .fail_next(VoxError::Connection("refused".to_string()));

    let err = h.assistant.start_recording().await.unwrap_err();
    assert!(matches!(err, VoxError::Connection(_)));
    assert_eq!(statuses(&h), vec![AssistantStatus::Error]);
    assert_eq!(h.capture.start_count(), 0);

    // the next turn works after a retry
    h.assistant.retry().unwrap();
    h.assistant.start_recording().await.unwrap();
    assert_eq!(h.assistant.status(), AssistantStatus::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_capture_init_failure_never_reaches_listening() {
    let mut h = AssistantHarness::new();
    h.capture.fail_init("no input device");

    let err = h.assistant.start_recording().await.unwrap_err();
    assert!(matches!(err, VoxError::Init(_)));
    assert_eq!(statuses(&h), vec![AssistantStatus::Error]);
    assert!(h.assistant.snapshot().error.is_some());
    assert_eq!(h.assistant.snapshot().volume, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_recording_outside_listening_is_ignored() {
    let mut h = AssistantHarness::new();
    h.assistant.stop_recording().unwrap();
    assert_eq!(h.assistant.status(), AssistantStatus::Idle);
    assert!(h.recorder.all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_abort_while_listening_returns_to_idle() {
    let mut h = AssistantHarness::new();
    h.assistant.start_recording().await.unwrap();
    let link = h.connector.last_link().unwrap();

    h.assistant.abort().await;
    assert_eq!(h.assistant.status(), AssistantStatus::Idle);
    assert!(link.is_closed());
    assert!(!h.capture.is_running());

    link.send_snapshot(&transcript_json("too late"), true);
    h.pump().await;
    assert_eq!(h.assistant.status(), AssistantStatus::Idle);
    assert!(h.assistant.history().is_empty());
}
