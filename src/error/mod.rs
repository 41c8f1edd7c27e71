//! 统一错误处理模块
//!
//! 播放链路、控制操作与配置加载各自有结构化的错误类型。

mod config;
mod control;
mod player;

pub use config::ConfigError;
pub use control::ControlError;
pub use player::{PlayerError, SharedError};
