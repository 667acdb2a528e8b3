//! End-to-end tests against a shell stand-in for the engine.
#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;

use mplayer_slave::{
  MplayerClient, PlayerConfig, PlayerError, PlayerEvent, PlayerState, Status, TrackInfo,
};
use tempfile::NamedTempFile;

fn fake_engine() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake_mplayer.sh")
}

fn fake_config() -> PlayerConfig {
  PlayerConfig {
    executable: Some("sh".to_string()),
    args: vec![fake_engine().to_string_lossy().into_owned()],
    poll_interval_ms: 20,
    query_timeout_ms: 1_000,
    wait_timeout_ms: Some(5_000),
    exit_grace_ms: 2_000,
    ..PlayerConfig::default()
  }
}

fn track() -> NamedTempFile {
  tempfile::Builder::new()
    .prefix("sample1")
    .suffix(".flac")
    .tempfile()
    .unwrap()
}

async fn ready_player(config: &PlayerConfig) -> MplayerClient {
  let player = MplayerClient::spawn(config);
  player.await_ready().await.unwrap();
  player
}

#[tokio::test]
async fn test_becomes_ready() {
  let player = MplayerClient::spawn(&fake_config());
  assert!(player.pid().is_some());
  player.await_ready().await.unwrap();
  assert_eq!(player.state(), PlayerState::Ready);
  assert_eq!(player.status(), Status::Stopped);
  // Already ready: resolves immediately.
  player.await_ready().await.unwrap();
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_missing_executable_never_becomes_ready() {
  let config = PlayerConfig {
    executable: Some("/nonexistent/mplayer".to_string()),
    ..fake_config()
  };
  let player = MplayerClient::spawn(&config);

  assert!(matches!(player.await_ready().await, Err(PlayerError::Spawn(_))));
  assert_eq!(player.state(), PlayerState::Exited);
  assert!(player.pid().is_none());
  assert!(matches!(player.exit().await, Err(PlayerError::Spawn(_))));
  assert!(matches!(
    player.get_progress().await,
    Err(PlayerError::Spawn(_))
  ));
  assert!(player.play("/tmp/x.flac", false).await.is_err());
}

#[tokio::test]
async fn test_playback_lifecycle() {
  let file = track();
  let player = ready_player(&fake_config()).await;

  player.play(file.path(), false).await.unwrap();
  assert_eq!(player.status(), Status::Playing);

  player.pause().await.unwrap();
  assert_eq!(player.status(), Status::Paused);
  player.pause().await.unwrap();
  assert_eq!(player.status(), Status::Paused);

  player.resume().await.unwrap();
  assert_eq!(player.status(), Status::Playing);
  player.resume().await.unwrap();
  assert_eq!(player.status(), Status::Playing);

  player.stop().unwrap();
  assert_eq!(player.status(), Status::Stopped);
  player.stop().unwrap();
  assert_eq!(player.status(), Status::Stopped);
  // Nothing to resume once stopped.
  player.resume().await.unwrap();
  assert_eq!(player.status(), Status::Stopped);

  let report = player.exit().await.unwrap();
  assert!(report.interrupted() || report.signal == Some(libc::SIGKILL));
  assert_eq!(player.state(), PlayerState::Exited);
}

#[tokio::test]
async fn test_play_missing_file_fails() {
  let player = ready_player(&fake_config()).await;
  let result = player.play("/nonexistent/track.flac", false).await;
  assert!(matches!(result, Err(PlayerError::LoadFailed(_))));
  assert_eq!(player.status(), Status::Stopped);
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_play_rejects_line_breaks() {
  let player = ready_player(&fake_config()).await;
  let result = player.play("/music/a.flac\nstop", false).await;
  assert!(matches!(result, Err(PlayerError::InvalidCommand(_))));
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_append_while_playing_returns_once_queued() {
  let first = track();
  let second = track();
  let player = ready_player(&fake_config()).await;

  player.play(first.path(), false).await.unwrap();
  player.play(second.path(), true).await.unwrap();
  assert_eq!(player.status(), Status::Playing);

  let info = player.get_track_infos().await.unwrap();
  let first_name = first.path().file_name().unwrap().to_string_lossy();
  assert_eq!(info.file.as_deref(), Some(first_name.as_ref()));
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_track_infos() {
  let file = track();
  let player = ready_player(&fake_config()).await;
  player.play(file.path(), false).await.unwrap();

  let info = player.get_track_infos().await.unwrap();
  assert_eq!(
    info,
    TrackInfo {
      artist: Some("Best Band Ever".to_string()),
      album: Some("First Album".to_string()),
      title: Some("Sample 1".to_string()),
      file: Some(file.path().file_name().unwrap().to_string_lossy().into_owned()),
    }
  );
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_progress_is_consistent() {
  let file = track();
  let player = ready_player(&fake_config()).await;
  player.play(file.path(), false).await.unwrap();

  let first = player.get_progress().await.unwrap();
  assert!(first.is_complete());
  tokio::time::sleep(Duration::from_millis(50)).await;
  let second = player.get_progress().await.unwrap();

  assert!(second.percent >= first.percent);
  assert!(second.time >= first.time);
  assert_eq!(second.total, first.total);
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_progress_without_file_is_nan() {
  let player = ready_player(&fake_config()).await;
  let progress = player.get_progress().await.unwrap();
  assert!(progress.percent.is_nan());
  assert!(progress.time.is_nan());
  assert!(progress.total.is_nan());
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_queries_do_not_interleave() {
  let file = track();
  let player = ready_player(&fake_config()).await;
  player.play(file.path(), false).await.unwrap();

  let (info, progress, volume) = tokio::join!(
    player.get_track_infos(),
    player.get_progress(),
    player.get_property("volume"),
  );

  assert_eq!(info.unwrap().artist.as_deref(), Some("Best Band Ever"));
  let progress = progress.unwrap();
  assert_eq!(progress.percent, 1.0);
  assert_eq!(progress.time, 1.5);
  assert_eq!(progress.total, 120.0);
  assert_eq!(volume.unwrap(), "100");
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_unknown_property_does_not_affect_later_queries() {
  let file = track();
  let player = ready_player(&fake_config()).await;
  player.play(file.path(), false).await.unwrap();

  let result = player.get_property("bogus").await;
  assert_eq!(result, Err(PlayerError::PropertyUnknown("bogus".to_string())));

  let progress = player.get_progress().await.unwrap();
  assert!(progress.is_complete());
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_query_timeout_releases_slot() {
  let config = PlayerConfig {
    query_timeout_ms: 200,
    ..fake_config()
  };
  let player = ready_player(&config).await;

  let result = player.get_property("silent").await;
  assert!(matches!(result, Err(PlayerError::QueryTimeout(_))));

  assert_eq!(player.get_property("volume").await.unwrap(), "100");
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_volume() {
  let config = PlayerConfig {
    volume: Some(40.0),
    ..fake_config()
  };
  let player = ready_player(&config).await;
  assert_eq!(player.get_property("volume").await.unwrap(), "40");

  player.set_volume(75.0).unwrap();
  assert_eq!(player.get_property("volume").await.unwrap(), "75");

  assert!(matches!(
    player.set_volume(120.0),
    Err(PlayerError::InvalidCommand(_))
  ));
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_status_events() {
  let file = track();
  let player = ready_player(&fake_config()).await;
  let mut events = player.subscribe();

  player.play(file.path(), false).await.unwrap();
  player.pause().await.unwrap();
  player.stop().unwrap();

  let mut seen = Vec::new();
  while let Ok(event) = events.try_recv() {
    seen.push(event);
  }
  assert!(seen.contains(&PlayerEvent::Playing { error: None }));
  let statuses: Vec<Status> = seen
    .iter()
    .filter_map(|e| match e {
      PlayerEvent::StatusChange { status } => Some(*status),
      _ => None,
    })
    .collect();
  assert_eq!(statuses, vec![Status::Playing, Status::Paused, Status::Stopped]);
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_exit_rejects_pending_waiters() {
  let player = ready_player(&fake_config()).await;

  // Idle engines ignore pause, so this only ends when the process does.
  let (paused, exited) = tokio::join!(player.pause(), async {
    tokio::time::sleep(Duration::from_millis(100)).await;
    player.exit().await
  });

  assert_eq!(paused, Err(PlayerError::Exited));
  assert!(exited.is_ok());
  assert_eq!(player.pause().await, Err(PlayerError::Exited));
  assert_eq!(player.get_progress().await, Err(PlayerError::Exited));
  // Exiting twice reports the same exit.
  assert_eq!(player.exit().await.unwrap(), exited.unwrap());
}

#[tokio::test]
async fn test_exit_event() {
  let player = ready_player(&fake_config()).await;
  let mut events = player.subscribe();
  let report = player.exit().await.unwrap();

  let mut exited = None;
  while let Ok(event) = events.try_recv() {
    if let PlayerEvent::Exited { report } = event {
      exited = Some(report);
    }
  }
  assert_eq!(exited, Some(report));
}

#[tokio::test]
async fn test_exit_kills_engine_ignoring_interrupt() {
  let config = PlayerConfig {
    executable: Some("sh".to_string()),
    args: vec![
      "-c".to_string(),
      "trap '' INT; echo 'MPlayer (stubborn)'; while read -r line; do :; done".to_string(),
    ],
    exit_grace_ms: 200,
    ..fake_config()
  };
  let player = ready_player(&config).await;

  let report = player.exit().await.unwrap();
  assert_eq!(report.signal, Some(libc::SIGKILL));
  assert!(!report.interrupted());
}

#[tokio::test]
async fn test_answers_containing_banner_text_reach_queries() {
  let file = tempfile::Builder::new()
    .prefix("MPlayer")
    .suffix(".flac")
    .tempfile()
    .unwrap();
  let player = ready_player(&fake_config()).await;
  player.play(file.path(), false).await.unwrap();

  let info = player.get_track_infos().await.unwrap();
  let name = file.path().file_name().unwrap().to_string_lossy().into_owned();
  assert!(name.starts_with("MPlayer"));
  assert_eq!(info.file, Some(name));
  assert_eq!(info.title.as_deref(), Some("Sample 1"));
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_pause_property_is_queryable() {
  let file = track();
  let player = ready_player(&fake_config()).await;
  player.play(file.path(), false).await.unwrap();

  assert_eq!(player.get_property("pause").await.unwrap(), "no");
  assert_eq!(player.status(), Status::Playing);

  player.pause().await.unwrap();
  assert_eq!(player.get_property("pause").await.unwrap(), "yes");
  assert_eq!(player.status(), Status::Paused);
  player.exit().await.unwrap();
}

#[tokio::test]
async fn test_property_error_before_banner_fails_readiness() {
  let config = PlayerConfig {
    executable: Some("sh".to_string()),
    args: vec![
      "-c".to_string(),
      "echo \"Failed to get value of property 'x'.\" >&2; sleep 0.2; \
       echo 'MPlayer (late)'; while read -r line; do :; done"
        .to_string(),
    ],
    ..fake_config()
  };
  let player = MplayerClient::spawn(&config);
  let mut events = player.subscribe();

  let error = PlayerError::PropertyUnknown("x".to_string());
  assert_eq!(player.await_ready().await, Err(error.clone()));

  let mut seen = Vec::new();
  while let Ok(event) = events.try_recv() {
    seen.push(event);
  }
  assert!(seen.contains(&PlayerEvent::Ready {
    error: Some(error.clone())
  }));
  assert!(seen.contains(&PlayerEvent::Error { error }));

  // The banner still arrives afterwards.
  player.await_ready().await.unwrap();
  player.exit().await.unwrap();
}
