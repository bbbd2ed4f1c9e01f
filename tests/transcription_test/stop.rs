//! Two-phase stop: grace period for the final transcript

use std::time::Duration;

use voxgen::VoxError;
use voxgen::transcription::{SessionPhase, StartOptions, TranscriptionEvent};

use crate::common::{TranscriptionHarness, pcm, settle, transcript_json};

fn finals(h: &TranscriptionHarness) -> Vec<String> {
    h.recorder
        .lifecycle()
        .into_iter()
        .filter_map(|e| match e {
            TranscriptionEvent::Final { analysis, .. } => Some(analysis.transcription),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_stop_keeps_connection_until_final() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();
    link.send_state("listening");
    settle().await;

    h.session.stop();
    assert!(matches!(h.session.phase(), SessionPhase::Stopping { .. }));
    assert!(!h.capture.is_running());
    assert!(!link.is_closed());

    // no audio leaves after stop
    assert!(!h.capture.push_pcm(pcm(9, 4)));
    assert!(link.take_sent().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    link.send_snapshot(&transcript_json("a timer"), true);
    settle().await;

    assert_eq!(finals(&h), vec!["a timer"]);
    assert!(link.is_closed());
    assert_eq!(h.session.phase(), SessionPhase::Idle);

    // the grace timer was cancelled
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.recorder.errors(), 0);
    assert_eq!(h.recorder.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_after_final_is_a_no_op() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_snapshot(&transcript_json("a timer"), true);
    settle().await;
    let before = h.recorder.lifecycle();

    h.session.stop();
    h.session.stop();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.recorder.lifecycle(), before);
    assert_eq!(finals(&h), vec!["a timer"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_timeout_without_transcript_fails_once() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    h.session.stop();
    h.session.stop();
    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(h.recorder.errors(), 0);
    assert!(!link.is_closed());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.recorder.lifecycle().contains(&TranscriptionEvent::Error {
        epoch: 1,
        error: VoxError::Timeout(5000),
    }));
    assert!(link.is_closed());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.recorder.errors(), 1);
    assert_eq!(h.recorder.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_timeout_salvages_recorded_transcript() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    // complete document, but the final marker never arrives
    link.send_delta(&transcript_json("late but whole"), false);
    settle().await;
    h.session.stop();
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(finals(&h), vec!["late but whole"]);
    assert_eq!(h.recorder.errors(), 0);
    assert_eq!(h.recorder.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_timeout_with_partial_transcript_is_timeout() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_delta(r#"{"transcription": "half"#, false);
    settle().await;
    h.session.stop();
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(finals(&h).is_empty());
    assert_eq!(h.recorder.errors(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_final_after_timeout_is_dropped() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    h.session.stop();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(h.recorder.lifecycle().contains(&TranscriptionEvent::Error {
        epoch: 1,
        error: VoxError::Timeout(5000),
    }));

    link.send_snapshot(&transcript_json("too late"), true);
    settle().await;

    assert!(finals(&h).is_empty());
    assert_eq!(h.recorder.errors(), 1);
    assert_eq!(h.recorder.stops(), 1);
    assert!(!h.session.phase().is_live());
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_while_awaiting_final() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    h.session.stop();
    link.close_remote(Some("going away"));
    settle().await;

    let events = h.recorder.lifecycle();
    assert!(events.iter().any(|e| matches!(
        e,
        TranscriptionEvent::Error { error: VoxError::Connection(m), .. } if m.contains("going away")
    )));
    assert_eq!(h.session.phase(), SessionPhase::Idle);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.recorder.errors(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_salvages_recorded_transcript() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_delta(&transcript_json("closed early"), false);
    h.session.stop();
    link.close_remote(None);
    settle().await;

    assert_eq!(finals(&h), vec!["closed early"]);
    assert_eq!(h.recorder.errors(), 0);
}
