//! 供宿主程序使用的 tracing 初始化：按天滚动的日志文件 + EnvFilter

use directories::BaseDirs;
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE: &str = "seqplay.log";
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";

/// 持有期间后台写日志线程保持运行，丢弃时刷盘
pub struct LogGuard(#[allow(dead_code)] Option<WorkerGuard>);

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// 日志目录，缺省为本地数据目录下的 `seqplay/logs`
    pub dir: Option<PathBuf>,
    /// 过滤表达式，缺省读 `RUST_LOG`
    pub filter: Option<String>,
}

pub fn default_log_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_local_dir().join("seqplay").join("logs"))
        .unwrap_or_else(fallback_log_dir)
}

fn fallback_log_dir() -> PathBuf {
    std::env::temp_dir().join("seqplay-logs")
}

fn build_filter(filter: Option<&str>) -> EnvFilter {
    match filter {
        Some(s) if !s.trim().is_empty() => EnvFilter::new(s),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

/// 已有全局 subscriber 时不会覆盖它
pub fn init(cfg: LogConfig) -> LogGuard {
    let log_dir = cfg.dir.unwrap_or_else(default_log_dir);
    let log_dir = match fs::create_dir_all(&log_dir) {
        Ok(()) => log_dir,
        Err(e) => {
            eprintln!("日志目录不可用 {}: {e}", log_dir.display());
            fallback_log_dir()
        }
    };
    let _ = fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_writer);

    let installed = tracing_subscriber::registry()
        .with(build_filter(cfg.filter.as_deref()))
        .with(file_layer)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(log_dir = %log_dir.display(), "tracing 已初始化");
    }

    LogGuard(Some(guard))
}
