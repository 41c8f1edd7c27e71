//! 播放链路错误（解析、下载、解码、输出）

use reqwest::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;

/// 状态负载与会话回调共享同一个错误实例
pub type SharedError = Arc<PlayerError>;

/// 播放链路错误类型
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// 远程资源返回非 2xx 状态码
    #[error("资源无效(HTTP {status}): {url}")]
    ResourceInvalid { url: String, status: StatusCode },

    /// 远程资源不是音频
    #[error("不支持的资源类型({}): {url}", content_type.as_deref().unwrap_or("未知"))]
    UnsupportedResourceType {
        url: String,
        content_type: Option<String>,
    },

    /// 连接或传输中断
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),

    /// 打开/读取本地文件或缓存文件失败
    #[error("文件操作失败({}): {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 解码器无法识别或解码输入
    #[error("解码音频失败: {0}")]
    Decode(String),

    /// 输出设备不可用
    #[error("音频输出失败: {0}")]
    Output(String),

    /// 记录型曲目缺少配置的来源字段
    #[error("曲目缺少来源字段 `{field}`")]
    MissingSource { field: String },
}

impl PlayerError {
    /// 仅指连接或传输层失败；HTTP 状态码与内容类型问题不算
    pub fn is_network(&self) -> bool {
        matches!(self, PlayerError::Network(_))
    }

    pub fn is_filesystem(&self) -> bool {
        matches!(self, PlayerError::Filesystem { .. })
    }
}
