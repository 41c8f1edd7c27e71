mod common;

use common::*;
use seqplay::{
    ControlError, Player, PlayerConfig, PlayerError, SharedError, Status, StatusKind, TrackRef,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn local_config(dir: &std::path::Path) -> PlayerConfig {
    PlayerConfig {
        download_dir: dir.to_path_buf(),
        ..PlayerConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plays_local_tracks_in_order_then_done_once() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<Vec<u8>> = (0..3).map(|i| payload(3_000 + i * 500, i as u8)).collect();
    let paths: Vec<String> = files
        .iter()
        .enumerate()
        .map(|(i, bytes)| write_file(dir.path(), &format!("t{i}.mp3"), bytes))
        .collect();

    let outputs = RecordingOutputs::new();
    let player = Player::with_backends(
        paths,
        local_config(dir.path()),
        passthrough(),
        outputs.clone(),
    );
    let log = record_statuses(&player);
    let (on_done, mut done) = done_channel();

    player.play(Some(on_done), None).unwrap();
    assert!(next_done(&mut done).await.is_none());

    assert_eq!(
        entries(&log),
        ["playing:0", "playend:0", "playing:1", "playend:1", "playing:2", "playend:2"]
    );
    let opened = outputs.opened();
    assert_eq!(opened.len(), 3);
    for (output, bytes) in opened.iter().zip(&files) {
        assert_eq!(&output.bytes(), bytes);
    }
    assert_eq!(player.live_decoders(), 0);
    assert!(matches!(player.status(), Status::PlayEnd(t) if t.id == 2));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(done.try_recv().is_err(), "on_done called more than once");
}

#[tokio::test]
async fn empty_playlist_is_rejected_without_status_change() {
    let dir = tempfile::tempdir().unwrap();
    let player = Player::with_backends(
        Vec::<TrackRef>::new(),
        local_config(dir.path()),
        passthrough(),
        RecordingOutputs::new(),
    );
    let log = record_statuses(&player);

    assert_eq!(player.play(None, None), Err(ControlError::EmptyPlaylist));
    assert!(matches!(player.status(), Status::Ready));
    assert!(entries(&log).is_empty());
    assert_eq!(player.live_decoders(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn record_tracks_use_configured_source_field() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = payload(2_048, 7);
    let path = write_file(dir.path(), "rec.flac", &bytes);

    let cfg = PlayerConfig {
        source_field: "url".to_owned(),
        ..local_config(dir.path())
    };
    let track: TrackRef = serde_json::from_value(json!({ "url": path, "title": "x" })).unwrap();
    let outputs = RecordingOutputs::new();
    let player = Player::with_backends([track], cfg, passthrough(), outputs.clone());
    let (on_done, mut done) = done_channel();

    player.play(Some(on_done), None).unwrap();
    assert!(next_done(&mut done).await.is_none());
    assert_eq!(outputs.opened()[0].bytes(), bytes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_source_field_stops_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let ok = write_file(dir.path(), "ok.mp3", &payload(512, 1));
    let tracks = vec![
        TrackRef::from(ok.as_str()),
        TrackRef::from(json!({ "title": "没有地址" }).as_object().unwrap().clone()),
        TrackRef::from(ok.as_str()),
    ];
    let player = Player::with_backends(
        tracks,
        local_config(dir.path()),
        passthrough(),
        RecordingOutputs::new(),
    );
    let log = record_statuses(&player);
    let (on_done, mut done) = done_channel();

    player.play(Some(on_done), None).unwrap();
    let err = next_done(&mut done).await.expect("expected an error");
    assert!(matches!(&*err, PlayerError::MissingSource { field } if field == "src"));
    assert_eq!(entries(&log), ["playing:0", "playend:0", "error"]);
    assert!(matches!(player.status().error(), Some(e) if std::sync::Arc::ptr_eq(e, &err)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreadable_local_file_is_a_filesystem_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.mp3").to_string_lossy().into_owned();
    let player = Player::with_backends(
        [missing],
        local_config(dir.path()),
        passthrough(),
        RecordingOutputs::new(),
    );
    let (on_done, mut done) = done_channel();

    player.play(Some(on_done), None).unwrap();
    let err = next_done(&mut done).await.expect("expected an error");
    assert!(err.is_filesystem());
    assert_eq!(player.status().kind(), StatusKind::Error);
    assert_eq!(player.live_decoders(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_handler_without_on_done_ends_quietly() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.mp3").to_string_lossy().into_owned();
    let player = Player::with_backends(
        [missing],
        local_config(dir.path()),
        passthrough(),
        RecordingOutputs::new(),
    );
    let seen = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&seen);
    player.on(StatusKind::Error, move |_: &Status| *counter.lock().unwrap() += 1);

    player.play(None, None).unwrap();
    wait_until("error status", || *seen.lock().unwrap() == 1).await;
    assert_eq!(player.status().kind(), StatusKind::Error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_appends_with_positional_ids() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "a.mp3", &payload(256, 0));
    let b = write_file(dir.path(), "b.mp3", &payload(256, 9));
    let outputs = RecordingOutputs::new();
    let player = Player::with_backends([a], local_config(dir.path()), passthrough(), outputs.clone());
    player.add(b.as_str());

    let ids: Vec<usize> = player.playlist().iter().map(|t| t.id).collect();
    assert_eq!(ids, [0, 1]);
    assert_eq!(player.playlist()[1].source("src"), Some(b.as_str()));

    let (on_done, mut done) = done_channel();
    player.play(Some(on_done), None).unwrap();
    assert!(next_done(&mut done).await.is_none());
    assert_eq!(outputs.opened().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn selected_tracks_are_played_instead_of_the_whole_list() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<String> = (0..3)
        .map(|i| write_file(dir.path(), &format!("s{i}.mp3"), &payload(128, i)))
        .collect();
    let player = Player::with_backends(
        paths,
        local_config(dir.path()),
        passthrough(),
        RecordingOutputs::new(),
    );
    let log = record_statuses(&player);
    let (on_done, mut done) = done_channel();

    let selected = player.playlist()[2..].to_vec();
    player.play(Some(on_done), Some(selected)).unwrap();
    assert!(next_done(&mut done).await.is_none());
    assert_eq!(entries(&log), ["playing:2", "playend:2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_ends_output_without_advancing() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<String> = (0..2)
        .map(|i| write_file(dir.path(), &format!("h{i}.mp3"), &payload(1_000, i)))
        .collect();
    let outputs = RecordingOutputs::holding(1);
    let player = Player::with_backends(
        paths,
        local_config(dir.path()),
        passthrough(),
        outputs.clone(),
    );
    let log = record_statuses(&player);
    let (on_done, mut done) = done_channel();

    assert_eq!(player.stop(), Err(ControlError::NothingPlaying));

    player.play(Some(on_done), None).unwrap();
    wait_until("first track playing", || entries(&log) == ["playing:0"]).await;

    player.stop().unwrap();
    wait_until("decoder released", || player.live_decoders() == 0).await;
    assert!(outputs.opened()[0].is_ended());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(entries(&log), ["playing:0"]);
    assert!(matches!(player.status(), Status::Playing(t) if t.id == 0));
    assert!(done.try_recv().is_err(), "stopped session must not call on_done");
    assert_eq!(player.stop(), Err(ControlError::NothingPlaying));
}

#[test]
fn plays_without_an_ambient_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = payload(700, 3);
    let path = write_file(dir.path(), "plain.mp3", &bytes);
    let outputs = RecordingOutputs::new();
    let player = Player::with_backends([path], local_config(dir.path()), passthrough(), outputs.clone());

    let (tx, rx) = std::sync::mpsc::channel();
    player
        .play(
            Some(Arc::new(move |err: Option<SharedError>, _: &Player| {
                let _ = tx.send(err.is_none());
            })),
            None,
        )
        .unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(10)).unwrap());
    assert_eq!(outputs.opened()[0].bytes(), bytes);
}

#[tokio::test]
async fn change_status_runs_handler_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let player = Player::with_backends(
        Vec::<TrackRef>::new(),
        local_config(dir.path()),
        passthrough(),
        RecordingOutputs::new(),
    );
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    player.on(StatusKind::Custom("x".to_owned()), move |s: &Status| {
        if let Status::Custom { payload, .. } = s {
            *slot.lock().unwrap() = payload.clone();
        }
    });

    let kind = player.change_status(Status::custom("x", Some(json!({ "n": 1 }))));
    assert_eq!(kind, StatusKind::Custom("x".to_owned()));
    assert_eq!(*seen.lock().unwrap(), Some(json!({ "n": 1 })));
    assert!(matches!(
        player.status(),
        Status::Custom { name, payload: Some(p) } if name == "x" && p == json!({ "n": 1 })
    ));
}
