use bytes::Bytes;
use std::io::{self, Read, Seek, SeekFrom};
use tokio::sync::mpsc;

/// 把异步字节块桥接成阻塞 `Read`，供解码线程使用
///
/// 不可回退：只支持查询当前位置。
pub struct EncodedReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    chunk: Bytes,
    position: u64,
    done: bool,
}

pub(crate) fn encoded_channel(capacity: usize) -> (mpsc::Sender<io::Result<Bytes>>, EncodedReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let reader = EncodedReader {
        rx,
        chunk: Bytes::new(),
        position: 0,
        done: false,
    };
    (tx, reader)
}

impl EncodedReader {
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Read for EncodedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.chunk.is_empty() {
            if self.done {
                return Ok(0);
            }
            match self.rx.blocking_recv() {
                Some(Ok(bytes)) => self.chunk = bytes,
                Some(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                None => {
                    self.done = true;
                    return Ok(0);
                }
            }
        }

        let n = buf.len().min(self.chunk.len());
        let head = self.chunk.split_to(n);
        buf[..n].copy_from_slice(&head);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for EncodedReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            SeekFrom::Start(p) if p == self.position => Ok(self.position),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "流式音源不支持跳转",
            )),
        }
    }
}
