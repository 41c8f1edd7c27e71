use futures_util::TryStreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::path::PathBuf;
use std::sync::Arc;

use super::{SourceStream, cache_file_name, tee};
use crate::error::PlayerError;
use crate::status::{Status, StatusHub};

/// 拉取远程曲目；开启缓存时把响应体一分为二，一路播放一路落盘
pub struct Fetcher {
    http: Client,
    download_dir: PathBuf,
    cache: bool,
    hub: Arc<StatusHub>,
}

impl Fetcher {
    pub fn new(http: Client, download_dir: PathBuf, cache: bool, hub: Arc<StatusHub>) -> Self {
        Self {
            http,
            download_dir,
            cache,
            hub,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<SourceStream, PlayerError> {
        tracing::info!(url, cache = self.cache, "请求远程音频");
        let resp = self.http.get(url).send().await.map_err(|e| {
            tracing::warn!(url, err = %e, "请求远程音频失败");
            PlayerError::Network(e)
        })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(url, %status, "远程音频状态码异常");
            return Err(PlayerError::ResourceInvalid {
                url: url.to_owned(),
                status,
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        if !content_type.as_deref().is_some_and(is_audio_content_type) {
            tracing::warn!(url, content_type = ?content_type, "远程资源不是音频");
            return Err(PlayerError::UnsupportedResourceType {
                url: url.to_owned(),
                content_type,
            });
        }

        let body = resp.bytes_stream().map_err(PlayerError::Network);
        if !self.cache {
            return Ok(Box::pin(body));
        }

        self.hub.change_status(Status::Downloading(url.to_owned()));
        let path = self.download_dir.join(cache_file_name(url));
        tracing::debug!(url, path = %path.display(), "边播边缓存");
        // 写缓存的任务独立运行，跳过曲目也会写完
        let (playback, _cache) = tee(body, path);
        Ok(playback)
    }
}

pub fn is_audio_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|mime| mime.trim().to_ascii_lowercase().starts_with("audio/"))
        .unwrap_or(false)
}
