//! MPlayer slave-mode module - spawns an external MPlayer and drives it over
//! its standard streams.
//!
//! Architecture:
//! - `process.rs` - MPlayer binary detection, spawning and interrupt delivery
//! - `stdio.rs` - Ordered command writer and line readers over the child's stdio
//! - `protocol.rs` - Command lines and classification of output into signals
//! - `state.rs` - Playback state machine fed by those signals
//! - `query.rs` - Single-flight, timeout-bounded ad hoc queries
//! - `info.rs` - Track metadata and progress extractions
//! - `client.rs` - High-level client with the public operations and events

mod client;
mod error;
mod info;
mod process;
mod protocol;
mod query;
mod state;
mod stdio;

pub use client::{MplayerClient, PlayerEvent};
pub use error::PlayerError;
pub use info::{Progress, TrackInfo};
pub use process::{find_mplayer, ExitReport};
pub use protocol::{classify, Command, Signal, Stream};
pub use state::{PlayerState, Status};
