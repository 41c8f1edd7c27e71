//! 音源解析：本地文件、缓存文件或网络流

mod fetch;
mod tee;

use bytes::Bytes;
use futures_util::Stream;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncReadExt;

use crate::error::PlayerError;
use crate::playlist::is_remote;

pub use fetch::{Fetcher, is_audio_content_type};
pub use tee::{CacheWrite, tee};

/// 送往解码器的字节流，与来源无关
pub type SourceStream = Pin<Box<dyn Stream<Item = Result<Bytes, PlayerError>> + Send>>;

const READ_CHUNK: usize = 64 * 1024;

/// 由 URL 确定性地推导缓存文件名：完整 URL 的 MD5，加上路径中的扩展名（若有）
pub fn cache_file_name(url: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());

    match url_extension(url) {
        Some(ext) => format!("{digest}.{ext}"),
        None => digest,
    }
}

fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let (_, path) = after_scheme.split_once('/')?;
    let (_, ext) = path.rsplit('/').next()?.rsplit_once('.')?;
    ((1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

pub struct SourceResolver {
    download_dir: PathBuf,
    fetcher: Fetcher,
}

impl SourceResolver {
    pub fn new(download_dir: PathBuf, fetcher: Fetcher) -> Self {
        Self {
            download_dir,
            fetcher,
        }
    }

    pub fn cache_path(&self, url: &str) -> PathBuf {
        self.download_dir.join(cache_file_name(url))
    }

    pub async fn resolve(&self, src: &str) -> Result<SourceStream, PlayerError> {
        if !is_remote(src) {
            tracing::debug!(path = src, "本地音源");
            return open_file(Path::new(src)).await;
        }

        let cached = self.cache_path(src);
        if tokio::fs::try_exists(&cached).await.unwrap_or(false) {
            tracing::info!(url = src, path = %cached.display(), "命中缓存");
            return open_file(&cached).await;
        }

        self.fetcher.fetch(src).await
    }
}

/// 以 64KB 分块异步读取文件
pub async fn open_file(path: &Path) -> Result<SourceStream, PlayerError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| PlayerError::Filesystem {
            path: path.to_path_buf(),
            source,
        })?;

    let path = path.to_path_buf();
    let stream = futures_util::stream::try_unfold((file, path), |(mut file, path)| async move {
        let mut buf = vec![0u8; READ_CHUNK];
        let n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(source) => return Err(PlayerError::Filesystem { path, source }),
        };
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), (file, path))))
    });
    Ok(Box::pin(stream))
}
