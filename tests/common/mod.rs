//! 集成测试共用的假解码器、录音输出设备与等待工具
#![allow(dead_code)]

use seqplay::audio::{
    AudioDecoder, AudioFormat, AudioOutput, DecodedSink, DecoderFactory, EncodedReader,
    OutputFactory,
};
use seqplay::{OnDone, Player, PlayerError, SharedError, Status, StatusKind};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TEST_FORMAT: AudioFormat = AudioFormat {
    sample_rate: 8_000,
    channels: 1,
    bit_depth: 8,
};

/// 把每个字节原样当作一个样本输出
pub struct PassthroughDecoder;

impl AudioDecoder for PassthroughDecoder {
    fn decode(
        self: Box<Self>,
        mut input: EncodedReader,
        sink: &mut DecodedSink,
    ) -> Result<(), PlayerError> {
        sink.format(TEST_FORMAT)?;
        let mut buf = [0u8; 1024];
        loop {
            let n = input
                .read(&mut buf)
                .map_err(|e| PlayerError::Decode(e.to_string()))?;
            if n == 0 {
                return Ok(());
            }
            let samples = buf[..n].iter().map(|b| f32::from(*b)).collect();
            if !sink.write(samples) {
                return Ok(());
            }
        }
    }
}

pub fn passthrough() -> Arc<dyn DecoderFactory> {
    Arc::new(|_: &str| Box::new(PassthroughDecoder) as Box<dyn AudioDecoder>)
}

#[derive(Default)]
pub struct RecordingOutput {
    samples: Mutex<Vec<f32>>,
    ended: Mutex<bool>,
    ended_cv: Condvar,
    hold: bool,
}

impl RecordingOutput {
    pub fn bytes(&self) -> Vec<u8> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .map(|s| *s as u8)
            .collect()
    }

    pub fn is_ended(&self) -> bool {
        *self.ended.lock().unwrap()
    }
}

impl AudioOutput for RecordingOutput {
    fn write(&self, samples: Vec<f32>) {
        self.samples.lock().unwrap().extend(samples);
    }

    /// hold 的设备在 drain 里一直等到被 end
    fn drain(&self) {
        if !self.hold {
            return;
        }
        let mut ended = self.ended.lock().unwrap();
        while !*ended {
            ended = self.ended_cv.wait(ended).unwrap();
        }
    }

    fn end(&self) {
        *self.ended.lock().unwrap() = true;
        self.ended_cv.notify_all();
    }
}

/// 记录每次打开的输出设备；前 `hold_first` 个设备播放不会自行结束
#[derive(Default)]
pub struct RecordingOutputs {
    opened: Mutex<Vec<Arc<RecordingOutput>>>,
    hold_first: usize,
}

impl RecordingOutputs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn holding(hold_first: usize) -> Arc<Self> {
        Arc::new(Self {
            hold_first,
            ..Self::default()
        })
    }

    pub fn opened(&self) -> Vec<Arc<RecordingOutput>> {
        self.opened.lock().unwrap().clone()
    }
}

impl OutputFactory for RecordingOutputs {
    fn open(&self, format: &AudioFormat) -> Result<Arc<dyn AudioOutput>, PlayerError> {
        assert_eq!(*format, TEST_FORMAT);
        let mut opened = self.opened.lock().unwrap();
        let output = Arc::new(RecordingOutput {
            hold: opened.len() < self.hold_first,
            ..RecordingOutput::default()
        });
        opened.push(Arc::clone(&output));
        Ok(output)
    }
}

/// 状态变化的文字记录，例如 `playing:0`、`playend:1`、`error`
pub type StatusLog = Arc<Mutex<Vec<String>>>;

pub fn record_statuses(player: &Player) -> StatusLog {
    let log: StatusLog = Arc::default();
    for kind in [
        StatusKind::Playing,
        StatusKind::PlayEnd,
        StatusKind::Downloading,
        StatusKind::Error,
    ] {
        let log = Arc::clone(&log);
        player.on(kind, move |s: &Status| {
            let entry = match s {
                Status::Playing(t) => format!("playing:{}", t.id),
                Status::PlayEnd(t) => format!("playend:{}", t.id),
                Status::Downloading(_) => "downloading".to_owned(),
                other => other.kind().to_string(),
            };
            log.lock().unwrap().push(entry);
        });
    }
    log
}

pub fn entries(log: &StatusLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// on_done 的每次调用都会发到返回的接收端
pub fn done_channel() -> (OnDone, mpsc::UnboundedReceiver<Option<SharedError>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb: OnDone = Arc::new(move |err: Option<SharedError>, _: &Player| {
        let _ = tx.send(err);
    });
    (cb, rx)
}

pub async fn next_done(
    rx: &mut mpsc::UnboundedReceiver<Option<SharedError>>,
) -> Option<SharedError> {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("on_done was not called in time")
        .expect("on_done channel closed")
}

pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path.to_string_lossy().into_owned()
}

/// 方便比对的确定性测试数据
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}
