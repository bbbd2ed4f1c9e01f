//! Start, partial and final handling, setup failures

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use voxgen::VoxError;
use voxgen::services::ApiKeys;
use voxgen::transcription::{SessionPhase, StartOptions, TranscriptionEvent};

use crate::common::{TranscriptionHarness, settle, transcript_json};

#[tokio::test(start_paused = true)]
async fn test_start_sends_session_request() {
    let h = TranscriptionHarness::new();
    let handle = h
        .session
        .start(StartOptions {
            language: Some("de".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(handle.epoch, 1);
    assert_eq!(h.session.phase(), SessionPhase::Active { server_ready: false });
    assert!(h.capture.is_running());

    let requests = h.connector.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].api_key, "pk");
    assert_eq!(requests[0].session.language_hint, "de");
    assert_eq!(requests[0].session.medium.server_web_socket.input_sample_rate, 16000);
    assert_eq!(
        h.recorder.lifecycle(),
        vec![TranscriptionEvent::Started { epoch: 1 }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_partials_are_rate_limited() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_delta(r#"{"transcription": "hel"#, false);
    settle().await;
    link.send_delta("lo", false);
    settle().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    link.send_delta(" world", false);
    settle().await;

    let partials: Vec<String> = h
        .recorder
        .lifecycle()
        .into_iter()
        .filter_map(|e| match e {
            TranscriptionEvent::Partial { text, .. } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(partials, vec!["hel", "hello world"]);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_partial_is_not_repeated() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_delta(r#"{"transcription": "hi""#, false);
    settle().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    link.send_delta(r#", "intent": "ne"#, false);
    settle().await;

    let partials = h
        .recorder
        .lifecycle()
        .iter()
        .filter(|e| matches!(e, TranscriptionEvent::Partial { .. }))
        .count();
    assert_eq!(partials, 1);
}

#[tokio::test(start_paused = true)]
async fn test_final_is_emitted_before_teardown() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    let closed_at_final = Arc::new(Mutex::new(None));
    let watched = link.clone();
    let seen = Arc::clone(&closed_at_final);
    let _sub = h.session.events().subscribe(move |e: &TranscriptionEvent| {
        if matches!(e, TranscriptionEvent::Final { .. }) {
            *seen.lock().unwrap() = Some(watched.is_closed());
        }
    });

    link.send_state("listening");
    link.send_snapshot(&transcript_json("count my clicks"), true);
    settle().await;

    assert_eq!(*closed_at_final.lock().unwrap(), Some(false));
    assert!(link.is_closed());
    assert!(!h.capture.is_running());
    assert_eq!(h.session.phase(), SessionPhase::Idle);

    let events = h.recorder.lifecycle();
    assert_eq!(events.len(), 4);
    match &events[2] {
        TranscriptionEvent::Final { epoch, analysis } => {
            assert_eq!(*epoch, 1);
            assert_eq!(analysis.transcription, "count my clicks");
            assert_eq!(analysis.widget_url, "widget://counter");
            assert_eq!(analysis.params.get("start"), Some(&json!(0)));
        }
        other => panic!("expected final, got {:?}", other),
    }
    assert_eq!(events[3], TranscriptionEvent::Stopped { epoch: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_streamed_deltas_assemble_into_final() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    let document = transcript_json("a red button");
    let (head, tail) = document.split_at(document.len() / 2);
    link.send_delta(head, false);
    link.send_delta(tail, true);
    settle().await;

    assert!(h.recorder.lifecycle().iter().any(|e| matches!(
        e,
        TranscriptionEvent::Final { analysis, .. } if analysis.transcription == "a red button"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_user_role_transcripts_are_ignored() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_text(
        json!({"type": "transcript", "role": "user", "text": transcript_json("x"), "final": true})
            .to_string(),
    );
    link.send_text(json!({"type": "pong"}).to_string());
    link.send_text("not json");
    settle().await;

    assert_eq!(h.recorder.lifecycle().len(), 1);
    assert!(h.session.phase().is_live());
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_final_is_parse_error() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_snapshot("{\"transcription\": ", true);
    settle().await;

    let events = h.recorder.lifecycle();
    assert!(matches!(
        events[1],
        TranscriptionEvent::Error {
            error: VoxError::Parse(_),
            ..
        }
    ));
    assert_eq!(events[2], TranscriptionEvent::Stopped { epoch: 1 });
    assert!(link.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_final_without_transcription_is_missing_field() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_snapshot(r#"{"intent": "new"}"#, true);
    settle().await;

    assert!(h.recorder.lifecycle().contains(&TranscriptionEvent::Error {
        epoch: 1,
        error: VoxError::MissingField("transcription".to_string()),
    }));
}

#[tokio::test(start_paused = true)]
async fn test_backend_error_frame_fails_once() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_error("quota exceeded");
    link.fail("reset by peer");
    settle().await;

    assert_eq!(h.recorder.errors(), 1);
    assert_eq!(h.recorder.stops(), 1);
    assert!(h.recorder.lifecycle().contains(&TranscriptionEvent::Error {
        epoch: 1,
        error: VoxError::Connection("quota exceeded".to_string()),
    }));
    assert_eq!(h.session.phase(), SessionPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_missing_credentials_fail_before_connecting() {
    let h = TranscriptionHarness::new();
    h.credentials.set_keys(ApiKeys::default());

    assert!(h.session.start(StartOptions::default()).await.is_none());
    assert!(h.connector.requests().is_empty());
    assert_eq!(h.capture.start_count(), 0);
    assert!(matches!(
        h.recorder.lifecycle()[0],
        TranscriptionEvent::Error {
            error: VoxError::Credentials(_),
            ..
        }
    ));
    assert_eq!(h.session.phase(), SessionPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied() {
    let h = TranscriptionHarness::new();
    h.capture.deny_permission();

    assert!(h.session.start(StartOptions::default()).await.is_none());
    assert!(h.connector.requests().is_empty());
    assert!(matches!(
        h.recorder.lifecycle()[0],
        TranscriptionEvent::Error {
            error: VoxError::Permission(_),
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_capture_init_failure() {
    let h = TranscriptionHarness::new();
    h.capture.fail_init("no input device");

    assert!(h.session.start(StartOptions::default()).await.is_none());
    assert!(h.recorder.lifecycle().contains(&TranscriptionEvent::Error {
        epoch: 1,
        error: VoxError::Init("no input device".to_string()),
    }));
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_never_starts_capture() {
    let h = TranscriptionHarness::new();
    h.connector
        .fail_next(VoxError::Connection("refused".to_string()));

    assert!(h.session.start(StartOptions::default()).await.is_none());
    assert_eq!(h.capture.start_count(), 0);
    assert_eq!(h.recorder.errors(), 1);

    // the session is reusable afterwards
    let handle = h.session.start(StartOptions::default()).await.unwrap();
    assert_eq!(handle.epoch, 2);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_live_is_rejected() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();

    assert!(h.session.start(StartOptions::default()).await.is_none());
    assert_eq!(h.connector.connection_count(), 1);
    assert_eq!(h.session.epoch(), 1);
}
