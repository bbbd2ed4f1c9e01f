//! Superseded sessions and idempotent teardown

use std::time::Duration;

use voxgen::transcription::{SessionPhase, StartOptions, TranscriptionEvent};

use crate::common::{TranscriptionHarness, settle, transcript_json};

#[tokio::test(start_paused = true)]
async fn test_restart_while_stopping_supersedes_old_session() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let old = h.connector.last_link().unwrap();
    h.session.stop();

    let handle = h.session.start(StartOptions::default()).await.unwrap();
    assert_eq!(handle.epoch, 2);
    let new = h.connector.last_link().unwrap();
    assert!(old.is_closed());
    assert!(!new.is_closed());

    let events = h.recorder.lifecycle();
    let stopped_old = events
        .iter()
        .position(|e| *e == TranscriptionEvent::Stopped { epoch: 1 })
        .unwrap();
    let started_new = events
        .iter()
        .position(|e| *e == TranscriptionEvent::Started { epoch: 2 })
        .unwrap();
    assert!(stopped_old < started_new);

    // late traffic on the old connection is inert
    old.send_snapshot(&transcript_json("old"), true);
    settle().await;
    new.send_snapshot(&transcript_json("new"), true);
    settle().await;

    let finals: Vec<(u64, String)> = h
        .recorder
        .lifecycle()
        .into_iter()
        .filter_map(|e| match e {
            TranscriptionEvent::Final { epoch, analysis } => Some((epoch, analysis.transcription)),
            _ => None,
        })
        .collect();
    assert_eq!(finals, vec![(2, "new".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_old_grace_timer_is_inert() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    h.session.stop();
    h.session.start(StartOptions::default()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.recorder.errors(), 0);
    assert_eq!(h.session.epoch(), 2);
    assert!(matches!(h.session.phase(), SessionPhase::Active { .. }));
    assert!(!h.connector.last_link().unwrap().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    h.session.cancel();
    h.session.cancel();
    h.session.stop();

    assert_eq!(h.recorder.stops(), 1);
    let zero_volumes = h
        .recorder
        .all()
        .iter()
        .filter(|e| **e == TranscriptionEvent::Volume(0.0))
        .count();
    assert_eq!(zero_volumes, 1);
    assert!(link.is_closed());
    assert!(!h.capture.is_running());
    assert_eq!(h.session.phase(), SessionPhase::Idle);
    assert_eq!(h.session.buffered_frames(), 0);

    // nothing arrives from the cancelled connection
    link.send_snapshot(&transcript_json("ghost"), true);
    settle().await;
    assert_eq!(h.recorder.lifecycle().len(), 2);

    let handle = h.session.start(StartOptions::default()).await.unwrap();
    assert_eq!(handle.epoch, 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_tears_down() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();
    let capture = h.capture.clone();

    drop(h);

    assert!(link.is_closed());
    assert!(!capture.is_running());
}
