//! Player error types.

use std::time::Duration;

use thiserror::Error;

use super::state::Status;

/// Errors surfaced by [`MplayerClient`](super::MplayerClient) operations.
///
/// Cloneable so the same error can be handed to every waiter and carried in
/// events.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlayerError {
  #[error("Failed to spawn MPlayer: {0}")]
  Spawn(String),

  #[error("MPlayer is not running")]
  NotRunning,

  #[error("MPlayer exited")]
  Exited,

  #[error("Property unknown: {0}")]
  PropertyUnknown(String),

  #[error("Property unavailable: {0}")]
  PropertyUnavailable(String),

  #[error("Query timed out after {0:?}")]
  QueryTimeout(Duration),

  #[error("Timed out after {timeout:?} waiting for {what}")]
  WaitTimeout { what: &'static str, timeout: Duration },

  #[error("Failed to load file: {0}")]
  LoadFailed(String),

  #[error("Interrupted: player is now {0}")]
  Interrupted(Status),

  #[error("Invalid command: {0}")]
  InvalidCommand(String),
}
