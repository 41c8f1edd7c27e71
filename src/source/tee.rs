use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::SourceStream;
use crate::error::PlayerError;

/// 缓存端最多积压的块数
const CACHE_QUEUE_CHUNKS: usize = 32;
/// 缓存队列满时最多等待这么久，超时就放弃本次缓存
const CACHE_STALL: Duration = Duration::from_secs(2);

enum CacheMsg {
    Data(Bytes),
    /// 上游中断，文件不完整
    Abort,
}

/// 缓存写入任务的句柄
pub struct CacheWrite {
    handle: JoinHandle<Option<u64>>,
}

impl CacheWrite {
    /// 完整写入时返回字节数；缓存被放弃时返回 None
    pub async fn finished(self) -> Option<u64> {
        self.handle.await.ok().flatten()
    }
}

/// 把一路字节流复制给播放端和缓存文件
///
/// 播放端是无界内存队列，永远先于缓存端收到数据。缓存端有界，
/// 写盘卡住超过 [`CACHE_STALL`] 就放弃缓存并删除文件，播放不受影响。
/// 播放端被丢弃后继续写缓存。
pub fn tee<S>(body: S, path: PathBuf) -> (SourceStream, CacheWrite)
where
    S: Stream<Item = Result<Bytes, PlayerError>> + Send + 'static,
{
    let (tx_cache, rx_cache) = mpsc::channel(CACHE_QUEUE_CHUNKS);
    let discarded = Arc::new(AtomicBool::new(false));

    let handle = tokio::spawn(write_cache(path, rx_cache, Arc::clone(&discarded)));
    let playback = split(body, tx_cache, discarded, CACHE_STALL);
    (playback, CacheWrite { handle })
}

fn split<S>(
    body: S,
    tx_cache: mpsc::Sender<CacheMsg>,
    discarded: Arc<AtomicBool>,
    stall: Duration,
) -> SourceStream
where
    S: Stream<Item = Result<Bytes, PlayerError>> + Send + 'static,
{
    let (tx_play, rx_play) = mpsc::unbounded_channel();
    tokio::spawn(pump(body, tx_play, tx_cache, discarded, stall));

    let playback = futures_util::stream::unfold(rx_play, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    Box::pin(playback)
}

/// 交给缓存端；队列满时最多等 `stall`，返回 false 表示缓存端已关闭或卡住
async fn offer(tx: &mpsc::Sender<CacheMsg>, msg: CacheMsg, stall: Duration) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Closed(_)) => false,
        Err(TrySendError::Full(msg)) => {
            matches!(tokio::time::timeout(stall, tx.send(msg)).await, Ok(Ok(())))
        }
    }
}

async fn pump<S>(
    body: S,
    tx_play: mpsc::UnboundedSender<Result<Bytes, PlayerError>>,
    tx_cache: mpsc::Sender<CacheMsg>,
    discarded: Arc<AtomicBool>,
    stall: Duration,
) where
    S: Stream<Item = Result<Bytes, PlayerError>> + Send,
{
    let mut tx_play = Some(tx_play);
    let mut tx_cache = Some(tx_cache);
    let mut body = std::pin::pin!(body);

    while let Some(item) = body.next().await {
        match item {
            Ok(bytes) => {
                if let Some(tx) = tx_play.as_ref()
                    && tx.send(Ok(bytes.clone())).is_err()
                {
                    tracing::debug!("播放端已关闭，继续写入缓存");
                    tx_play = None;
                }
                if let Some(tx) = tx_cache.as_ref()
                    && !offer(tx, CacheMsg::Data(bytes), stall).await
                {
                    if !tx.is_closed() {
                        tracing::warn!(
                            stall_ms = stall.as_millis() as u64,
                            "缓存写入停滞，放弃本次缓存"
                        );
                    }
                    // 关闭通道后写入任务据此删除文件
                    discarded.store(true, Ordering::Relaxed);
                    tx_cache = None;
                }
                if tx_play.is_none() && tx_cache.is_none() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(err = %e, "下载中断");
                if let Some(tx) = tx_play.take() {
                    let _ = tx.send(Err(e));
                }
                if let Some(tx) = tx_cache.take() {
                    let _ = offer(&tx, CacheMsg::Abort, stall).await;
                }
                return;
            }
        }
    }
}

async fn write_cache(
    path: PathBuf,
    mut rx: mpsc::Receiver<CacheMsg>,
    discarded: Arc<AtomicBool>,
) -> Option<u64> {
    if let Some(dir) = path.parent() {
        let _ = tokio::fs::create_dir_all(dir).await;
    }
    let mut file = match tokio::fs::File::create(&path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "创建缓存文件失败，本次不缓存");
            return None;
        }
    };

    let mut written = 0u64;
    while let Some(msg) = rx.recv().await {
        match msg {
            CacheMsg::Data(bytes) => {
                if let Err(e) = file.write_all(&bytes).await {
                    tracing::warn!(path = %path.display(), err = %e, "写入缓存文件失败，本次不缓存");
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return None;
                }
                written += bytes.len() as u64;
            }
            CacheMsg::Abort => {
                let _ = file.flush().await;
                tracing::warn!(path = %path.display(), bytes = written, "下载中断，缓存文件不完整");
                return None;
            }
        }
    }

    if discarded.load(Ordering::Relaxed) {
        drop(file);
        let _ = tokio::fs::remove_file(&path).await;
        tracing::debug!(path = %path.display(), bytes = written, "已删除被放弃的缓存文件");
        return None;
    }
    if let Err(e) = file.flush().await {
        tracing::warn!(path = %path.display(), err = %e, "写入缓存文件失败，本次不缓存");
        drop(file);
        let _ = tokio::fs::remove_file(&path).await;
        return None;
    }
    tracing::info!(path = %path.display(), bytes = written, "缓存写入完成");
    Some(written)
}
