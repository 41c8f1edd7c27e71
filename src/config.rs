use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::ConfigError;

/// 播放器配置，创建 Player 时固定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// 记录型曲目中保存路径/URL 的字段名
    #[serde(default = "default_source_field")]
    pub source_field: String,
    /// 缓存目录
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// 是否把远程曲目边播边写入缓存
    #[serde(default)]
    pub cache: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            source_field: default_source_field(),
            download_dir: default_download_dir(),
            cache: false,
        }
    }
}

fn default_source_field() -> String {
    "src".to_owned()
}

fn default_download_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(env::temp_dir)
}

impl PlayerConfig {
    /// 默认值叠加 `SEQPLAY_*` 环境变量
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(field) = env::var("SEQPLAY_SRC_FIELD")
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            cfg.source_field = field;
        }
        if let Some(dir) = env::var_os("SEQPLAY_DOWNLOADS").filter(|s| !s.is_empty()) {
            cfg.download_dir = PathBuf::from(dir);
        }
        if let Ok(v) = env::var("SEQPLAY_CACHE") {
            cfg.cache = parse_flag(&v);
        }
        cfg
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_field.trim().is_empty() {
            return Err(ConfigError::InvalidValue("source_field 不能为空".to_owned()));
        }
        if self.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("download_dir 不能为空".to_owned()));
        }
        Ok(())
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn try_load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
    let bytes = fs::read(path)?;
    let cfg: PlayerConfig = serde_json::from_slice(&bytes)?;
    cfg.validate()?;
    Ok(cfg)
}

/// 读取 JSON 配置；文件缺失或损坏时回退到默认值
pub fn load_config(path: &Path) -> PlayerConfig {
    match try_load_config(path) {
        Ok(cfg) => cfg,
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            PlayerConfig::default()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "配置文件无效，使用默认配置");
            PlayerConfig::default()
        }
    }
}

pub fn save_config(path: &Path, cfg: &PlayerConfig) -> Result<(), ConfigError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let bytes = serde_json::to_vec_pretty(cfg)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.persist(path).map_err(|e| ConfigError::Io(e.error))?;
    Ok(())
}
