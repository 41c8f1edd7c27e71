//! 配置加载/保存错误

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析配置失败
    #[error("解析配置失败: {0}")]
    Parse(#[from] serde_json::Error),

    /// 配置值无效
    #[error("配置值无效: {0}")]
    InvalidValue(String),
}
