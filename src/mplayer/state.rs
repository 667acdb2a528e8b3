//! Playback state machine driven by classified output signals.

use std::fmt;

use super::protocol::Signal;

/// Caller-facing playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Stopped,
  Playing,
  Paused,
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Status::Stopped => "stopped",
      Status::Playing => "playing",
      Status::Paused => "paused",
    })
  }
}

/// Full lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
  /// Spawned, banner not seen yet.
  Uninitialized,
  /// Banner seen, nothing played yet.
  Ready,
  Playing,
  Paused,
  Stopped,
  /// Process gone (or never started). Terminal.
  Exited,
}

impl PlayerState {
  pub fn status(self) -> Status {
    match self {
      PlayerState::Playing => Status::Playing,
      PlayerState::Paused => Status::Paused,
      _ => Status::Stopped,
    }
  }

  /// Whether the engine has been ready at some point and is still alive.
  pub fn is_ready(self) -> bool {
    !matches!(self, PlayerState::Uninitialized | PlayerState::Exited)
  }
}

/// A state change applied by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub from: PlayerState,
  pub to: PlayerState,
}

impl Transition {
  /// The new status, if the caller-facing status changed.
  pub fn status_change(&self) -> Option<Status> {
    let to = self.to.status();
    (self.from.status() != to).then_some(to)
  }
}

/// Owns every state transition of a session.
#[derive(Debug)]
pub struct StateMachine {
  state: PlayerState,
}

impl StateMachine {
  pub fn new() -> Self {
    Self {
      state: PlayerState::Uninitialized,
    }
  }

  pub fn state(&self) -> PlayerState {
    self.state
  }

  pub fn status(&self) -> Status {
    self.state.status()
  }

  /// Apply a classified signal. Returns the transition, if any.
  pub fn apply(&mut self, signal: &Signal) -> Option<Transition> {
    use PlayerState::*;

    let next = match (self.state, signal) {
      (Exited, _) => return None,
      (_, Signal::SpawnError(_)) => Exited,
      (Uninitialized, Signal::Ready) => Ready,
      (Uninitialized, _) => return None,
      (_, Signal::PlaybackStarted) => Playing,
      (_, Signal::PausedChanged(true)) => Paused,
      // A resume answer can trail an explicit stop; it must not revive playback.
      (Playing | Paused, Signal::PausedChanged(false)) => Playing,
      _ => return None,
    };

    self.transition(next)
  }

  /// Stop is never acknowledged by the engine, so it is applied on issue.
  pub fn stop(&mut self) -> Option<Transition> {
    match self.state {
      PlayerState::Playing | PlayerState::Paused => self.transition(PlayerState::Stopped),
      _ => None,
    }
  }

  /// Process exit observed.
  pub fn exit(&mut self) -> Option<Transition> {
    self.transition(PlayerState::Exited)
  }

  fn transition(&mut self, next: PlayerState) -> Option<Transition> {
    if next == self.state {
      return None;
    }
    let from = self.state;
    self.state = next;
    log::debug!("Player state: {:?} -> {:?}", from, next);
    Some(Transition { from, to: next })
  }
}

impl Default for StateMachine {
  fn default() -> Self {
    Self::new()
  }
}
