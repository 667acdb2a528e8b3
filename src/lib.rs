//! Supervise an MPlayer process and control it through its slave-mode
//! protocol.
//!
//! ```no_run
//! use mplayer_slave::{MplayerClient, PlayerConfig};
//!
//! # async fn example() -> Result<(), mplayer_slave::PlayerError> {
//! let player = MplayerClient::spawn(&PlayerConfig::default());
//! player.await_ready().await?;
//! player.play("/music/sample.flac", false).await?;
//! println!("{:?}", player.get_track_infos().await?);
//! player.exit().await?;
//! # Ok(())
//! # }
//! ```

mod config;
pub mod mplayer;

pub use config::{default_config_path, ConfigError, PlayerConfig};
pub use mplayer::{
  ExitReport, MplayerClient, PlayerError, PlayerEvent, PlayerState, Progress, Status, TrackInfo,
};
