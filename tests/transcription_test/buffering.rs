//! Pre-ready frame buffering

use voxgen::transcription::{SessionPhase, SessionSettings, StartOptions, TranscriptionEvent};

use crate::common::{TranscriptionHarness, pcm, settle};

#[tokio::test(start_paused = true)]
async fn test_frames_buffer_until_ready_then_flush_in_order() {
    let h = TranscriptionHarness::new();
    let handle = h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    h.capture.push_pcm(pcm(1, 4));
    h.capture.push_pcm(pcm(2, 4));
    h.capture.push_pcm(pcm(3, 4));
    assert!(link.take_sent().is_empty());
    assert_eq!(h.session.buffered_frames(), 3);

    link.send_state("listening");
    settle().await;
    assert_eq!(
        h.session.phase(),
        SessionPhase::Active { server_ready: true }
    );

    h.capture.push_pcm(pcm(4, 4));
    assert_eq!(
        link.take_sent(),
        vec![pcm(1, 4), pcm(2, 4), pcm(3, 4), pcm(4, 4)]
    );
    assert_eq!(h.session.buffered_frames(), 0);
    assert!(
        h.recorder
            .lifecycle()
            .contains(&TranscriptionEvent::Ready { epoch: handle.epoch })
    );
}

#[tokio::test(start_paused = true)]
async fn test_buffer_bound_drops_oldest_frames() {
    // one millisecond of 16 kHz mono audio is 32 bytes
    let settings = SessionSettings {
        max_buffered_ms: 1,
        ..Default::default()
    };
    let h = TranscriptionHarness::with_settings(settings);
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    h.capture.push_pcm(pcm(1, 20));
    h.capture.push_pcm(pcm(2, 20));
    h.capture.push_pcm(pcm(3, 20));
    assert_eq!(h.session.buffered_frames(), 1);

    link.send_state("ready");
    settle().await;
    assert_eq!(link.take_sent(), vec![pcm(3, 20)]);
}

#[tokio::test(start_paused = true)]
async fn test_ready_flips_once() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    h.capture.push_pcm(pcm(1, 4));
    link.send_state("listening");
    link.send_state("listening");
    link.send_state("ready");
    settle().await;

    let readies = h
        .recorder
        .lifecycle()
        .into_iter()
        .filter(|e| matches!(e, TranscriptionEvent::Ready { .. }))
        .count();
    assert_eq!(readies, 1);
    assert_eq!(link.take_sent(), vec![pcm(1, 4)]);
}

#[tokio::test(start_paused = true)]
async fn test_other_states_keep_buffering() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();
    let link = h.connector.last_link().unwrap();

    link.send_state("thinking");
    settle().await;
    h.capture.push_pcm(pcm(1, 4));

    assert!(link.take_sent().is_empty());
    assert_eq!(h.session.buffered_frames(), 1);
    assert_eq!(
        h.session.phase(),
        SessionPhase::Active {
            server_ready: false
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_volume_follows_frames_and_resets_on_cleanup() {
    let h = TranscriptionHarness::new();
    h.session.start(StartOptions::default()).await.unwrap();

    // full-scale samples
    h.capture.push_pcm(vec![0xff, 0x7f, 0xff, 0x7f]);
    h.session.cancel();

    let volumes: Vec<f32> = h
        .recorder
        .all()
        .into_iter()
        .filter_map(|e| match e {
            TranscriptionEvent::Volume(level) => Some(level),
            _ => None,
        })
        .collect();
    assert_eq!(volumes.len(), 2);
    assert!(volumes[0] > 0.9);
    assert_eq!(volumes[1], 0.0);
}
