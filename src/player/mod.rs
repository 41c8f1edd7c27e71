//! 播放器：播放列表、状态与控制操作
//!
//! `Player` 是可克隆的句柄，所有克隆共享同一份状态。每次 `play` 开启一个会话任务，
//! 按顺序逐首播放；`stop`/`next` 通过会话代号让旧会话失效。

mod engine;
mod scheduler;

use once_cell::sync::OnceCell;
use reqwest::Client;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::watch;

use crate::audio::{
    AudioOutput, DecoderFactory, OutputFactory, RodioDecoderFactory, RodioOutputFactory,
};
use crate::config::PlayerConfig;
use crate::error::{ControlError, PlayerError, SharedError};
use crate::playlist::{Track, TrackRef, number_tracks};
use crate::source::{Fetcher, SourceResolver};
use crate::status::{Status, StatusHub, StatusKind};

/// 会话结束回调：成功时错误为 None
pub type OnDone = Arc<dyn Fn(Option<SharedError>, &Player) + Send + Sync>;

/// 解码流与输出设备的配对，`stop` 用它中断当前输出
struct SpeakerEntry {
    track_id: usize,
    output: Arc<dyn AudioOutput>,
    detached: Arc<AtomicBool>,
}

impl SpeakerEntry {
    fn detach(&self) {
        self.detached.store(true, Ordering::Relaxed);
        self.output.end();
    }
}

#[derive(Default)]
struct PlayerState {
    playlist: Vec<Track>,
    speakers: Vec<SpeakerEntry>,
    live_decoders: usize,
    on_done: Option<OnDone>,
}

struct Shared {
    config: PlayerConfig,
    hub: Arc<StatusHub>,
    resolver: SourceResolver,
    decoders: Arc<dyn DecoderFactory>,
    outputs: Arc<dyn OutputFactory>,
    state: Mutex<PlayerState>,
    session: watch::Sender<u64>,
}

#[derive(Clone)]
pub struct Player {
    shared: Arc<Shared>,
}

pub struct PlayerBuilder {
    config: PlayerConfig,
    tracks: Vec<TrackRef>,
    decoders: Option<Arc<dyn DecoderFactory>>,
    outputs: Option<Arc<dyn OutputFactory>>,
    http: Option<Client>,
}

impl PlayerBuilder {
    pub fn tracks<I>(mut self, tracks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TrackRef>,
    {
        self.tracks = tracks.into_iter().map(Into::into).collect();
        self
    }

    pub fn decoders(mut self, decoders: Arc<dyn DecoderFactory>) -> Self {
        self.decoders = Some(decoders);
        self
    }

    pub fn outputs(mut self, outputs: Arc<dyn OutputFactory>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// 自定义 HTTP 客户端（代理、超时等）；默认不设超时
    pub fn http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    /// 未指定输出设备时打开系统默认输出
    pub fn build(mut self) -> Result<Player, PlayerError> {
        let outputs = match self.outputs.take() {
            Some(o) => o,
            None => Arc::new(RodioOutputFactory::open_default()?),
        };
        Ok(self.assemble(outputs))
    }

    fn assemble(self, outputs: Arc<dyn OutputFactory>) -> Player {
        let decoders = self
            .decoders
            .unwrap_or_else(|| Arc::new(RodioDecoderFactory));

        let hub = Arc::new(StatusHub::new());
        let fetcher = Fetcher::new(
            self.http.unwrap_or_default(),
            self.config.download_dir.clone(),
            self.config.cache,
            Arc::clone(&hub),
        );
        let resolver = SourceResolver::new(self.config.download_dir.clone(), fetcher);
        let (session, _) = watch::channel(0u64);

        tracing::info!(
            tracks = self.tracks.len(),
            cache = self.config.cache,
            download_dir = %self.config.download_dir.display(),
            "播放器已创建"
        );

        Player {
            shared: Arc::new(Shared {
                config: self.config,
                hub,
                resolver,
                decoders,
                outputs,
                state: Mutex::new(PlayerState {
                    playlist: number_tracks(self.tracks),
                    ..PlayerState::default()
                }),
                session,
            }),
        }
    }
}

impl Player {
    pub fn builder(config: PlayerConfig) -> PlayerBuilder {
        PlayerBuilder {
            config,
            tracks: Vec::new(),
            decoders: None,
            outputs: None,
            http: None,
        }
    }

    /// 使用 rodio 解码并输出到系统默认设备
    pub fn new<I>(tracks: I, config: PlayerConfig) -> Result<Self, PlayerError>
    where
        I: IntoIterator,
        I::Item: Into<TrackRef>,
    {
        Self::builder(config).tracks(tracks).build()
    }

    /// 自定义解码器与输出设备，不触碰系统音频
    pub fn with_backends<I>(
        tracks: I,
        config: PlayerConfig,
        decoders: Arc<dyn DecoderFactory>,
        outputs: Arc<dyn OutputFactory>,
    ) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TrackRef>,
    {
        Self::builder(config)
            .tracks(tracks)
            .decoders(decoders)
            .assemble(outputs)
    }

    pub fn with_http_client<I>(
        tracks: I,
        config: PlayerConfig,
        http: Client,
    ) -> Result<Self, PlayerError>
    where
        I: IntoIterator,
        I::Item: Into<TrackRef>,
    {
        Self::builder(config).tracks(tracks).http_client(http).build()
    }

    fn state(&self) -> MutexGuard<'_, PlayerState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.shared.config
    }

    pub fn status(&self) -> Status {
        self.shared.hub.status()
    }

    pub fn playlist(&self) -> Vec<Track> {
        self.state().playlist.clone()
    }

    pub fn live_decoders(&self) -> usize {
        self.state().live_decoders
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.shared.resolver
    }

    /// 开始一个播放会话
    ///
    /// `selected` 为空时播放整个列表。第一次提供的 `on_done` 会被记住，供 `next` 复用。
    pub fn play(
        &self,
        on_done: Option<OnDone>,
        selected: Option<Vec<Track>>,
    ) -> Result<(), ControlError> {
        let (tracks, on_done) = {
            let mut st = self.state();
            if st.playlist.is_empty() {
                return Err(ControlError::EmptyPlaylist);
            }
            if st.on_done.is_none()
                && let Some(cb) = on_done.as_ref()
            {
                st.on_done = Some(Arc::clone(cb));
            }
            let tracks = selected.unwrap_or_else(|| st.playlist.clone());
            let on_done = on_done.or_else(|| st.on_done.clone());
            (tracks, on_done)
        };

        let session = self.begin_session();
        tracing::info!(session, tracks = tracks.len(), "开始播放会话");
        spawn_session(scheduler::run_session(
            self.clone(),
            tracks,
            on_done,
            session,
        ));
        Ok(())
    }

    /// 跳到下一首：停止当前输出，从下一首开始新的会话
    pub fn next(&self) -> Result<(), ControlError> {
        let Status::Playing(current) = self.status() else {
            return Err(ControlError::NotPlaying);
        };
        let (rest, on_done) = {
            let st = self.state();
            let Some(next) = st.playlist.get(current.id + 1) else {
                return Err(ControlError::NoNextTrack);
            };
            (st.playlist[next.id..].to_vec(), st.on_done.clone())
        };

        tracing::info!(from = current.id, to = current.id + 1, "切换到下一首");
        if let Err(e) = self.stop() {
            tracing::debug!(err = %e, "切歌时没有可停止的输出");
        }
        self.play(on_done, Some(rest))
    }

    pub fn add(&self, track: impl Into<TrackRef>) {
        let mut st = self.state();
        let id = st.playlist.len();
        st.playlist.push(Track {
            id,
            reference: track.into(),
        });
    }

    pub fn on<F>(&self, kind: StatusKind, handler: F) -> &Self
    where
        F: Fn(&Status) + Send + Sync + 'static,
    {
        self.shared.hub.on(kind, Arc::new(handler));
        self
    }

    pub fn change_status(&self, status: Status) -> StatusKind {
        self.shared.hub.change_status(status)
    }

    /// 断开最近一次注册的输出并结束它，当前会话不再前进；播放列表位置不变
    pub fn stop(&self) -> Result<(), ControlError> {
        let entry = self
            .state()
            .speakers
            .pop()
            .ok_or(ControlError::NothingPlaying)?;
        tracing::info!(track_id = entry.track_id, "停止当前输出");
        entry.detach();
        self.cancel_session();
        Ok(())
    }

    fn begin_session(&self) -> u64 {
        let mut session = 0;
        self.shared.session.send_modify(|current| {
            *current = current.wrapping_add(1);
            session = *current;
        });
        session
    }

    fn cancel_session(&self) {
        self.shared
            .session
            .send_modify(|current| *current = current.wrapping_add(1));
    }

    fn attach_speaker(&self, entry: SpeakerEntry) {
        self.state().speakers.push(entry);
    }

    /// 按 detached 标志的身份匹配，同一曲目在新旧会话里各有一份
    fn release_speaker(&self, detached: &Arc<AtomicBool>) {
        let released: Vec<SpeakerEntry> = {
            let mut st = self.state();
            let (released, kept) = std::mem::take(&mut st.speakers)
                .into_iter()
                .partition(|s| Arc::ptr_eq(&s.detached, detached));
            st.speakers = kept;
            released
        };
        for entry in released {
            entry.detach();
        }
    }

    /// 先把状态置为 error，再把错误交给调度器
    fn fail(&self, err: PlayerError) -> SharedError {
        let err = Arc::new(err);
        self.shared.hub.change_status(Status::Error(Arc::clone(&err)));
        err
    }
}

/// 有 tokio 运行时就挂在当前运行时上，否则交给进程内的后备运行时
fn spawn_session<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(fut);
        return;
    }
    match fallback_runtime() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        Err(e) => tracing::error!(err = %e, "创建 tokio 运行时失败，无法播放"),
    }
}

/// 后备运行时存活到进程结束，会话结束后缓存写入任务仍能写完
fn fallback_runtime() -> io::Result<Handle> {
    static FALLBACK: OnceCell<Runtime> = OnceCell::new();
    let rt = FALLBACK.get_or_try_init(|| {
        tracing::debug!("创建后备 tokio 运行时");
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("seqplay-session")
            .enable_all()
            .build()
    })?;
    Ok(rt.handle().clone())
}
