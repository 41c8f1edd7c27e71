//! 顺序播放音频列表，远程曲目可边播边缓存到本地
//!
//! ```no_run
//! use seqplay::{Player, PlayerConfig, Status, StatusKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let player = Player::new(["intro.mp3", "https://example.com/a.mp3"], PlayerConfig::from_env())?;
//! player.on(StatusKind::Playing, |s: &Status| {
//!     if let Some(track) = s.track() {
//!         println!("正在播放 #{}", track.id);
//!     }
//! });
//! player.play(None, None)?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod logging;
pub mod player;
pub mod playlist;
pub mod source;
pub mod status;

pub use config::{PlayerConfig, load_config, save_config};
pub use error::{ConfigError, ControlError, PlayerError, SharedError};
pub use player::{OnDone, Player, PlayerBuilder};
pub use playlist::{Track, TrackRef};
pub use status::{Status, StatusKind};
