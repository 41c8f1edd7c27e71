//! 解码器与输出设备的接缝
//!
//! 解码器在阻塞线程上运行：从 [`EncodedReader`] 读取编码字节，先上报一次格式，
//! 再把 PCM 样本写入 [`DecodedSink`]。输出设备按协商出的格式创建，一首曲目一个。

mod backend;
mod pipeline;
mod reader;

use std::sync::Arc;

use crate::error::PlayerError;

pub use backend::{RodioDecoder, RodioDecoderFactory, RodioOutput, RodioOutputFactory};
pub use pipeline::DecodedSink;
pub(crate) use pipeline::{PipelineEvent, run_pipeline};
pub use reader::EncodedReader;
pub(crate) use reader::encoded_channel;

/// 解码器协商出的 PCM 格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

pub trait AudioDecoder: Send + 'static {
    /// 阻塞调用，直到输入读完、解码失败或 `sink.write` 返回 false
    fn decode(
        self: Box<Self>,
        input: EncodedReader,
        sink: &mut DecodedSink,
    ) -> Result<(), PlayerError>;
}

/// 每首曲目创建一个新的解码器，`source` 是解析后的路径/URL，可用作格式提示
pub trait DecoderFactory: Send + Sync {
    fn create(&self, source: &str) -> Box<dyn AudioDecoder>;
}

impl<F> DecoderFactory for F
where
    F: Fn(&str) -> Box<dyn AudioDecoder> + Send + Sync,
{
    fn create(&self, source: &str) -> Box<dyn AudioDecoder> {
        self(source)
    }
}

pub trait AudioOutput: Send + Sync {
    /// 排队播放一段交错样本；缓冲区满时可以阻塞
    fn write(&self, samples: Vec<f32>);
    /// 阻塞到已排队的样本全部播放完
    fn drain(&self);
    /// 立即结束输出并释放资源，可重复调用
    fn end(&self);
}

pub trait OutputFactory: Send + Sync {
    fn open(&self, format: &AudioFormat) -> Result<Arc<dyn AudioOutput>, PlayerError>;
}

impl<F> OutputFactory for F
where
    F: Fn(&AudioFormat) -> Result<Arc<dyn AudioOutput>, PlayerError> + Send + Sync,
{
    fn open(&self, format: &AudioFormat) -> Result<Arc<dyn AudioOutput>, PlayerError> {
        self(format)
    }
}
