//! 控制操作的前置条件错误
//!
//! 这些不是故障：调用方在错误的时机发起了操作，播放器状态保持不变。

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("播放列表为空")]
    EmptyPlaylist,

    #[error("当前不在播放状态")]
    NotPlaying,

    #[error("已经是最后一首")]
    NoNextTrack,

    #[error("没有正在输出的曲目")]
    NothingPlaying,
}
