//! 播放状态与回调
//!
//! 状态只有一个字段，负载跟随变体；每个状态种类最多注册一个回调。

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::SharedError;
use crate::playlist::Track;

pub type StatusHandler = Arc<dyn Fn(&Status) + Send + Sync>;

#[derive(Debug, Clone)]
pub enum Status {
    Ready,
    Playing(Track),
    /// 负载为正在缓存的 URL
    Downloading(String),
    PlayEnd(Track),
    Error(SharedError),
    /// 调用方自定义的状态
    Custom {
        name: String,
        payload: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Ready,
    Playing,
    Downloading,
    PlayEnd,
    Error,
    Custom(String),
}

impl Status {
    pub fn custom(name: impl Into<String>, payload: Option<Value>) -> Self {
        Status::Custom {
            name: name.into(),
            payload,
        }
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            Status::Ready => StatusKind::Ready,
            Status::Playing(_) => StatusKind::Playing,
            Status::Downloading(_) => StatusKind::Downloading,
            Status::PlayEnd(_) => StatusKind::PlayEnd,
            Status::Error(_) => StatusKind::Error,
            Status::Custom { name, .. } => StatusKind::Custom(name.clone()),
        }
    }

    pub fn track(&self) -> Option<&Track> {
        match self {
            Status::Playing(t) | Status::PlayEnd(t) => Some(t),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SharedError> {
        match self {
            Status::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl StatusKind {
    pub fn name(&self) -> &str {
        match self {
            StatusKind::Ready => "ready",
            StatusKind::Playing => "playing",
            StatusKind::Downloading => "downloading",
            StatusKind::PlayEnd => "playend",
            StatusKind::Error => "error",
            StatusKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct HubState {
    status: Status,
    handlers: HashMap<StatusKind, StatusHandler>,
}

/// 状态的唯一写入点
pub struct StatusHub {
    inner: Mutex<HubState>,
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubState {
                status: Status::Ready,
                handlers: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> Status {
        self.lock().status.clone()
    }

    pub fn kind(&self) -> StatusKind {
        self.lock().status.kind()
    }

    /// 覆盖同一种类之前的回调，返回被替换的那个
    pub fn on(&self, kind: StatusKind, handler: StatusHandler) -> Option<StatusHandler> {
        self.lock().handlers.insert(kind, handler)
    }

    pub fn has_handler(&self, kind: &StatusKind) -> bool {
        self.lock().handlers.contains_key(kind)
    }

    /// 更新状态后同步调用对应回调；回调在锁外执行，可以回调播放器
    pub fn change_status(&self, status: Status) -> StatusKind {
        let kind = status.kind();
        let handler = {
            let mut st = self.lock();
            st.status = status.clone();
            st.handlers.get(&kind).cloned()
        };
        tracing::debug!(status = %kind, "状态变更");
        if let Some(handler) = handler {
            handler(&status);
        }
        kind
    }
}
