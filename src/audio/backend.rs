use rodio::buffer::SamplesBuffer;
use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStreamBuilder, Sink, Source};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use super::{
    AudioDecoder, AudioFormat, AudioOutput, DecodedSink, DecoderFactory, EncodedReader,
    OutputFactory,
};
use crate::error::PlayerError;

/// 每次写入约 100ms 的样本
const CHUNK_MS: usize = 100;
/// Sink 中最多排队的样本块数，超过后写入方等待
const MAX_QUEUED_CHUNKS: usize = 8;

/// 基于 rodio（symphonia）的解码器
pub struct RodioDecoder {
    hint: Option<String>,
}

impl RodioDecoder {
    pub fn new(hint: Option<String>) -> Self {
        Self { hint }
    }
}

impl AudioDecoder for RodioDecoder {
    fn decode(
        self: Box<Self>,
        input: EncodedReader,
        sink: &mut DecodedSink,
    ) -> Result<(), PlayerError> {
        let builder = Decoder::builder().with_data(input).with_seekable(false);
        let builder = match self.hint.as_deref() {
            Some(hint) => builder.with_hint(hint),
            None => builder,
        };
        let decoder = builder
            .build()
            .map_err(|e| PlayerError::Decode(e.to_string()))?;

        let format = AudioFormat {
            sample_rate: decoder.sample_rate(),
            channels: decoder.channels(),
            bit_depth: 32,
        };
        sink.format(format)?;

        let chunk_len = (format.sample_rate as usize * CHUNK_MS / 1000).max(1)
            * usize::from(format.channels.max(1));
        let mut buf = Vec::with_capacity(chunk_len);
        for sample in decoder {
            buf.push(sample);
            if buf.len() >= chunk_len {
                let full = std::mem::replace(&mut buf, Vec::with_capacity(chunk_len));
                if !sink.write(full) {
                    return Ok(());
                }
            }
        }
        if !buf.is_empty() {
            sink.write(buf);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RodioDecoderFactory;

impl DecoderFactory for RodioDecoderFactory {
    fn create(&self, source: &str) -> Box<dyn AudioDecoder> {
        Box::new(RodioDecoder::new(extension_hint(source)))
    }
}

fn extension_hint(source: &str) -> Option<String> {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| (1..=5).contains(&e.len()) && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
}

/// 默认输出设备；`OutputStream` 留在专用线程里，这里只持有 mixer
pub struct RodioOutputFactory {
    mixer: Mixer,
    _keepalive: Mutex<mpsc::Sender<()>>,
}

impl RodioOutputFactory {
    pub fn open_default() -> Result<Self, PlayerError> {
        let (tx_ready, rx_ready) = mpsc::channel::<Result<Mixer, String>>();
        let (tx_keep, rx_keep) = mpsc::channel::<()>();

        thread::Builder::new()
            .name("audio-output".to_owned())
            .spawn(move || match OutputStreamBuilder::open_default_stream() {
                Ok(stream) => {
                    let _ = tx_ready.send(Ok(stream.mixer().clone()));
                    // 所有 sender 释放后退出，OutputStream 随之关闭
                    let _ = rx_keep.recv();
                    tracing::debug!("音频输出线程退出");
                }
                Err(e) => {
                    tracing::error!(err = %e, "初始化音频输出失败");
                    let _ = tx_ready.send(Err(e.to_string()));
                }
            })
            .map_err(|e| PlayerError::Output(e.to_string()))?;

        let mixer = rx_ready
            .recv()
            .map_err(|_| PlayerError::Output("音频输出线程意外退出".to_owned()))?
            .map_err(PlayerError::Output)?;
        tracing::info!("音频输出已就绪");

        Ok(Self {
            mixer,
            _keepalive: Mutex::new(tx_keep),
        })
    }
}

impl OutputFactory for RodioOutputFactory {
    fn open(&self, format: &AudioFormat) -> Result<Arc<dyn AudioOutput>, PlayerError> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(PlayerError::Output(format!("无效的音频格式: {format:?}")));
        }
        let sink = Sink::connect_new(&self.mixer);
        sink.play();
        Ok(Arc::new(RodioOutput {
            sink,
            format: *format,
            ended: AtomicBool::new(false),
        }))
    }
}

pub struct RodioOutput {
    sink: Sink,
    format: AudioFormat,
    ended: AtomicBool,
}

impl AudioOutput for RodioOutput {
    fn write(&self, samples: Vec<f32>) {
        while self.sink.len() >= MAX_QUEUED_CHUNKS && !self.ended.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(10));
        }
        if self.ended.load(Ordering::Relaxed) {
            return;
        }
        self.sink.append(SamplesBuffer::new(
            self.format.channels,
            self.format.sample_rate,
            samples,
        ));
    }

    fn drain(&self) {
        self.sink.sleep_until_end();
    }

    fn end(&self) {
        if !self.ended.swap(true, Ordering::Relaxed) {
            self.sink.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_hint_from_paths_and_urls() {
        assert_eq!(extension_hint("a.mp3").as_deref(), Some("mp3"));
        assert_eq!(
            extension_hint("http://h/b.FLAC?token=1").as_deref(),
            Some("flac")
        );
        assert_eq!(extension_hint("http://h/stream"), None);
        assert_eq!(extension_hint("weird.not-an-ext"), None);
    }
}
