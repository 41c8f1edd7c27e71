use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 播放列表中的一个条目：裸路径/URL，或者一条记录（来源字段可配置，默认 `src`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackRef {
    Path(String),
    Record(Map<String, Value>),
}

impl TrackRef {
    /// 取出路径或 URL；记录缺少该字段或字段不是字符串时返回 None
    pub fn source<'a>(&'a self, field: &str) -> Option<&'a str> {
        match self {
            TrackRef::Path(p) => Some(p.as_str()),
            TrackRef::Record(map) => map.get(field).and_then(Value::as_str),
        }
    }
}

impl From<String> for TrackRef {
    fn from(s: String) -> Self {
        TrackRef::Path(s)
    }
}

impl From<&str> for TrackRef {
    fn from(s: &str) -> Self {
        TrackRef::Path(s.to_owned())
    }
}

impl From<Map<String, Value>> for TrackRef {
    fn from(map: Map<String, Value>) -> Self {
        TrackRef::Record(map)
    }
}

/// 播放列表内的曲目，`id` 为加入列表时的位置
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: usize,
    pub reference: TrackRef,
}

impl Track {
    pub fn source<'a>(&'a self, field: &str) -> Option<&'a str> {
        self.reference.source(field)
    }
}

pub fn is_remote(src: &str) -> bool {
    let head = src.get(..8).unwrap_or(src).to_ascii_lowercase();
    head.starts_with("http://") || head.starts_with("https://")
}
