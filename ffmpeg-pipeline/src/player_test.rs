use std::{sync::Arc, time::Duration};

use futures::StreamExt;

use crate::{
    config::PipelineConfig,
    event::PlayerEvent,
    player::Player,
    testing::{MockBackend, drain_events, test_config, video_packets, wait_until},
};

fn live_backend() -> MockBackend {
    let mut backend = MockBackend::new(video_packets(10, &[0, 5]));
    backend.spacing = Duration::from_millis(33);
    backend
}

#[tokio::test]
async fn test_display_holds_oldest_frames_when_nobody_renders() -> anyhow::Result<()> {
    let config = PipelineConfig {
        display_capacity: 3,
        ..test_config()
    };
    let player = Player::new(Arc::new(live_backend()), config);
    let mut events = player.subscribe();

    assert!(player.start_play("rtsp://camera/stream").await);
    let display = player.display_queue();
    assert!(wait_until(Duration::from_secs(2), || display.len() == 3).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let shown: Vec<_> = display.drain().iter().map(|f| f.pts()).collect();
    assert_eq!(shown, vec![Some(0), Some(3000), Some(6000)]);

    let first_frames = drain_events(&mut events)
        .into_iter()
        .filter(|e| *e == PlayerEvent::FirstFrame)
        .count();
    assert_eq!(first_frames, 1);

    player.stop_play().await;
    assert!(!player.is_playing().await);
    Ok(())
}

#[tokio::test]
async fn test_commands_without_session_are_ignored() -> anyhow::Result<()> {
    let player = Player::new(Arc::new(live_backend()), test_config());

    assert!(!player.start_record("clip.mp4").await);
    assert!(!player.screenshot("shot.png").await);
    assert!(!player.is_playing().await);
    assert!(!player.is_recording().await);
    player.stop_record().await;
    player.stop_play().await;
    Ok(())
}

#[tokio::test]
async fn test_second_start_is_ignored_while_playing() -> anyhow::Result<()> {
    let player = Player::new(Arc::new(live_backend()), test_config());

    assert!(player.start_play("rtsp://camera/a").await);
    assert!(!player.start_play("rtsp://camera/b").await);
    assert!(player.is_playing().await);

    player.stop_play().await;
    assert!(player.start_play("rtsp://camera/b").await);
    player.stop_play().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_play_finalizes_recording() -> anyhow::Result<()> {
    let backend = live_backend();
    let player = Player::new(Arc::new(backend.clone()), test_config());
    let mut events = player.events();

    assert!(player.start_play("rtsp://camera/stream").await);
    let mut known = false;
    for _ in 0..100 {
        if player.stream().await.is_some() {
            known = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(known);

    assert!(player.start_record("clip.mp4").await);
    assert!(!player.start_record("other.mp4").await);
    assert!(wait_until(Duration::from_secs(3), || !backend.written().is_empty()).await);

    player.stop_play().await;
    assert_eq!(backend.finished(), 1);

    let written = backend.written();
    assert!(written[0].key);
    assert_eq!(written[0].pts, Some(0));
    assert!(written.iter().all(|p| p.stream == 0));

    let mut started = false;
    let mut finished = false;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(50), events.next()).await
    {
        match event {
            PlayerEvent::RecordStarted { .. } => started = true,
            PlayerEvent::RecordFinished { .. } => finished = true,
            _ => {}
        }
    }
    assert!(started && finished);
    Ok(())
}

#[tokio::test]
async fn test_restart_after_stream_failure() -> anyhow::Result<()> {
    let mut backend = MockBackend::new(video_packets(2, &[0]));
    backend.end = Some(crate::error::StreamError::EndOfStream);
    let player = Player::new(Arc::new(backend), test_config());
    let mut events = player.subscribe();

    assert!(player.start_play("file.mp4").await);
    let mut failed = false;
    for _ in 0..200 {
        if drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, PlayerEvent::StreamFailed(_)))
        {
            failed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(failed);

    for _ in 0..100 {
        if !player.is_playing().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(player.start_play("file.mp4").await);
    player.stop_play().await;
    Ok(())
}

#[tokio::test]
async fn test_decoder_init_failure_ends_session() -> anyhow::Result<()> {
    let mut backend = MockBackend::new(video_packets(300, &[0, 30, 60]));
    backend.spacing = Duration::from_millis(5);
    backend.decoder_error = Some(crate::error::StreamError::DecoderInit(
        "no cuda device".to_string(),
    ));
    let config = PipelineConfig {
        hw_device: Some("cuda".to_string()),
        ..test_config()
    };
    let player = Player::new(Arc::new(backend), config);
    let mut events = player.subscribe();

    assert!(player.start_play("rtsp://camera/stream").await);
    let mut failed = Vec::new();
    for _ in 0..200 {
        failed = drain_events(&mut events);
        if !failed.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        failed,
        vec![PlayerEvent::StreamFailed(
            crate::error::StreamError::DecoderInit("no cuda device".to_string())
        )]
    );

    let mut stopped = false;
    for _ in 0..200 {
        if !player.is_playing().await {
            stopped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(stopped);

    // nothing keeps feeding the queues once the session is over
    let queued = player.queues.decode.len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(player.queues.decode.len(), queued);
    assert!(queued <= 1);
    assert!(player.display_queue().is_empty());
    assert!(drain_events(&mut events).is_empty());

    // the failed session does not block a new one
    assert!(player.start_play("rtsp://camera/other").await);
    player.stop_play().await;
    Ok(())
}
