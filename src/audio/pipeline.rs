use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use super::{AudioDecoder, AudioFormat, AudioOutput, EncodedReader, OutputFactory};
use crate::error::PlayerError;

pub(crate) enum PipelineEvent {
    /// 格式协商完成，输出设备已创建
    Format {
        format: AudioFormat,
        output: Arc<dyn AudioOutput>,
    },
    /// 解码完成且输出已播放完
    Finished,
    Failed(PlayerError),
}

/// 解码器的下游：第一次格式事件时打开输出设备，之后转发样本
pub struct DecodedSink {
    outputs: Arc<dyn OutputFactory>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    detached: Arc<AtomicBool>,
    output: Option<Arc<dyn AudioOutput>>,
}

impl DecodedSink {
    pub(crate) fn new(
        outputs: Arc<dyn OutputFactory>,
        events: mpsc::UnboundedSender<PipelineEvent>,
        detached: Arc<AtomicBool>,
    ) -> Self {
        Self {
            outputs,
            events,
            detached,
            output: None,
        }
    }

    /// 每首曲目只生效一次，后续调用被忽略
    pub fn format(&mut self, format: AudioFormat) -> Result<(), PlayerError> {
        if self.output.is_some() {
            tracing::debug!(?format, "忽略重复的格式事件");
            return Ok(());
        }
        let output = self.outputs.open(&format)?;
        self.output = Some(Arc::clone(&output));
        let _ = self.events.send(PipelineEvent::Format { format, output });
        Ok(())
    }

    /// 返回 false 表示下游已断开，解码器应当停止
    pub fn write(&mut self, samples: Vec<f32>) -> bool {
        if self.is_detached() {
            return false;
        }
        match self.output.as_ref() {
            Some(output) => output.write(samples),
            None => tracing::debug!(samples = samples.len(), "格式尚未协商，丢弃样本"),
        }
        true
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed) || self.events.is_closed()
    }
}

/// 在阻塞线程上执行：解码、等待输出播完，最后上报一次结果
pub(crate) fn run_pipeline(
    decoder: Box<dyn AudioDecoder>,
    input: EncodedReader,
    mut sink: DecodedSink,
) {
    let event = match decoder.decode(input, &mut sink) {
        Ok(()) => {
            if !sink.is_detached()
                && let Some(output) = sink.output.as_ref()
            {
                output.drain();
            }
            PipelineEvent::Finished
        }
        Err(e) => {
            if let Some(output) = sink.output.as_ref() {
                output.end();
            }
            PipelineEvent::Failed(e)
        }
    };
    let _ = sink.events.send(event);
}
