//! 单首曲目的播放步骤：解析音源 → 解码 → 输出

use bytes::Bytes;
use futures_util::StreamExt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use super::{Player, SpeakerEntry};
use crate::audio::{DecodedSink, PipelineEvent, encoded_channel, run_pipeline};
use crate::error::{PlayerError, SharedError};
use crate::playlist::Track;
use crate::source::SourceStream;
use crate::status::Status;

/// 解码器读取端的缓冲块数
const ENCODED_CAPACITY: usize = 16;

pub(super) enum StepOutcome {
    /// 正常播完
    Ended,
    /// 输出被 stop 断开
    Detached,
}

/// 曲目步骤退出时（包括会话取消导致 future 被丢弃）释放扬声器并减少解码器计数
struct TrackGuard<'a> {
    player: &'a Player,
    detached: Arc<AtomicBool>,
}

impl<'a> TrackGuard<'a> {
    fn new(player: &'a Player, detached: Arc<AtomicBool>) -> Self {
        player.state().live_decoders += 1;
        Self { player, detached }
    }
}

impl Drop for TrackGuard<'_> {
    fn drop(&mut self) {
        self.player.release_speaker(&self.detached);
        let mut st = self.player.state();
        st.live_decoders = st.live_decoders.saturating_sub(1);
    }
}

pub(super) async fn play_one(player: &Player, track: &Track) -> Result<StepOutcome, SharedError> {
    let shared = &player.shared;
    let field = &shared.config.source_field;
    let Some(src) = track.source(field) else {
        tracing::warn!(track_id = track.id, field = %field, "曲目缺少音源字段");
        return Err(player.fail(PlayerError::MissingSource {
            field: field.clone(),
        }));
    };

    let source = match shared.resolver.resolve(src).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(track_id = track.id, src, err = %e, "音源解析失败");
            return Err(player.fail(e));
        }
    };

    let decoder = shared.decoders.create(src);
    let detached = Arc::new(AtomicBool::new(false));
    let _guard = TrackGuard::new(player, Arc::clone(&detached));

    let (bytes_tx, reader) = encoded_channel(ENCODED_CAPACITY);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let sink = DecodedSink::new(Arc::clone(&shared.outputs), events_tx, Arc::clone(&detached));
    tokio::task::spawn_blocking(move || run_pipeline(decoder, reader, sink));

    tracing::debug!(track_id = track.id, src, "开始解码");
    let pump = pump_source(source, bytes_tx);
    tokio::pin!(pump);
    let mut pumping = true;

    loop {
        tokio::select! {
            biased;
            res = &mut pump, if pumping => {
                pumping = false;
                if let Err(e) = res {
                    // 音源出错优先于解码器对截断流的判断
                    tracing::warn!(track_id = track.id, err = %e, "音源传输中断");
                    detached.store(true, Ordering::Relaxed);
                    return Err(player.fail(e));
                }
            }
            ev = events.recv() => match ev {
                Some(PipelineEvent::Format { format, output }) => {
                    tracing::info!(
                        track_id = track.id,
                        sample_rate = format.sample_rate,
                        channels = format.channels,
                        "输出设备已就绪"
                    );
                    player.attach_speaker(SpeakerEntry {
                        track_id: track.id,
                        output,
                        detached: Arc::clone(&detached),
                    });
                    player.change_status(Status::Playing(track.clone()));
                }
                Some(PipelineEvent::Finished) => {
                    if detached.load(Ordering::Relaxed) {
                        tracing::debug!(track_id = track.id, "输出已断开");
                        return Ok(StepOutcome::Detached);
                    }
                    player.release_speaker(&detached);
                    tracing::info!(track_id = track.id, "曲目播放结束");
                    player.change_status(Status::PlayEnd(track.clone()));
                    return Ok(StepOutcome::Ended);
                }
                Some(PipelineEvent::Failed(e)) => {
                    if detached.load(Ordering::Relaxed) {
                        tracing::debug!(track_id = track.id, err = %e, "输出断开后解码器退出");
                        return Ok(StepOutcome::Detached);
                    }
                    tracing::warn!(track_id = track.id, err = %e, "解码失败");
                    return Err(player.fail(e));
                }
                None => {
                    tracing::error!(track_id = track.id, "解码线程异常退出");
                    return Err(player.fail(PlayerError::Decode(
                        "解码线程异常退出".to_owned(),
                    )));
                }
            }
        }
    }
}

/// 把音源分块送进解码器的读取端；解码器先退出时提前结束
async fn pump_source(
    mut source: SourceStream,
    tx: mpsc::Sender<io::Result<Bytes>>,
) -> Result<(), PlayerError> {
    while let Some(chunk) = source.next().await {
        match chunk {
            Ok(bytes) => {
                if tx.send(Ok(bytes)).await.is_err() {
                    return Ok(());
                }
            }
            Err(e) => {
                let _ = tx.try_send(Err(io::Error::other(e.to_string())));
                return Err(e);
            }
        }
    }
    Ok(())
}
