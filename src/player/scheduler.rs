//! 会话：按顺序逐首播放，直到列表结束、出错或被新会话取代

use tokio::sync::watch;

use super::engine::{StepOutcome, play_one};
use super::{OnDone, Player};
use crate::error::SharedError;
use crate::playlist::Track;
use crate::status::StatusKind;

pub(super) async fn run_session(
    player: Player,
    tracks: Vec<Track>,
    on_done: Option<OnDone>,
    session: u64,
) {
    let mut current = player.shared.session.subscribe();
    let mut failure = None;

    for track in &tracks {
        let step = tokio::select! {
            biased;
            _ = superseded(&mut current, session) => {
                tracing::debug!(session, track_id = track.id, "会话已被取代");
                return;
            }
            step = play_one(&player, track) => step,
        };
        match step {
            Ok(StepOutcome::Ended) => {}
            Ok(StepOutcome::Detached) => {
                tracing::debug!(session, track_id = track.id, "会话已停止");
                return;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    if *current.borrow() != session {
        return;
    }
    finish(&player, on_done, failure);
}

async fn superseded(current: &mut watch::Receiver<u64>, session: u64) {
    // 发送端由 Player 持有，不会提前关闭
    let _ = current.wait_for(|value| *value != session).await;
}

fn finish(player: &Player, on_done: Option<OnDone>, failure: Option<SharedError>) {
    match (on_done, failure) {
        (Some(cb), failure) => {
            tracing::info!(failed = failure.is_some(), "播放会话结束");
            cb(failure, player);
        }
        (None, None) => tracing::info!("播放列表已播完"),
        (None, Some(err)) => {
            if player.shared.hub.has_handler(&StatusKind::Error) {
                tracing::warn!(err = %err, "播放会话因错误结束");
                return;
            }
            tracing::error!(err = %err, "播放出错且没有任何错误处理");
            panic!("播放出错且没有任何错误处理: {err}");
        }
    }
}
