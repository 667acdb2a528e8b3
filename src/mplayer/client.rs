//! High-level MPlayer client: session lifecycle and playback commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use parking_lot::Mutex;
use tokio::process::Child;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::error::PlayerError;
use super::info::{Progress, ProgressQuery, PropertyQuery, TrackInfo, TrackInfoQuery};
use super::process::{send_interrupt, spawn_mplayer, ExitReport, ProcessError};
use super::protocol::{classify, Command, Signal, Stream};
use super::query::{QueryCoordinator, QuerySlot};
use super::state::{PlayerState, StateMachine, Status};
use super::stdio::{spawn_reader, CommandChannel, OutputLine};
use crate::config::PlayerConfig;

const EVENT_CAPACITY: usize = 64;

/// Events published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
  /// The engine accepts commands, or failed before it could.
  Ready { error: Option<PlayerError> },
  /// A file started playing, or failed to load.
  Playing { error: Option<PlayerError> },
  StatusChange { status: Status },
  Error { error: PlayerError },
  Exited { report: ExitReport },
}

/// What a pending operation is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
  Ready,
  PlaybackStarted,
  Paused,
  Resumed,
}

/// Single-use completion handle for one operation.
struct Waiter {
  expect: Expect,
  tx: oneshot::Sender<Result<(), PlayerError>>,
}

/// Session state guarded by one lock.
struct Shared {
  machine: StateMachine,
  waiters: Vec<Waiter>,
  /// Why the session ended before becoming ready, if it did.
  failure: Option<PlayerError>,
}

impl Shared {
  fn register(&mut self, expect: Expect) -> oneshot::Receiver<Result<(), PlayerError>> {
    // Waiters whose caller timed out or went away.
    self.waiters.retain(|w| !w.tx.is_closed());
    let (tx, rx) = oneshot::channel();
    self.waiters.push(Waiter { expect, tx });
    rx
  }

  fn resolve(&mut self, expect: Expect, result: Result<(), PlayerError>) {
    let (matched, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
      .into_iter()
      .partition(|w| w.expect == expect);
    self.waiters = rest;
    for waiter in matched {
      let _ = waiter.tx.send(result.clone());
    }
  }

  fn fail_all(&mut self, err: &PlayerError) {
    for waiter in self.waiters.drain(..) {
      let _ = waiter.tx.send(Err(err.clone()));
    }
  }

  /// Error for operations attempted on an ended session.
  fn ended_error(&self) -> PlayerError {
    self.failure.clone().unwrap_or(PlayerError::Exited)
  }
}

/// State shared by the client and its background tasks.
struct Core {
  shared: Mutex<Shared>,
  slot: Arc<Mutex<QuerySlot>>,
  events: broadcast::Sender<PlayerEvent>,
}

impl Core {
  fn new(slot: Arc<Mutex<QuerySlot>>) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      shared: Mutex::new(Shared {
        machine: StateMachine::new(),
        waiters: Vec::new(),
        failure: None,
      }),
      slot,
      events,
    }
  }

  fn emit(&self, events: Vec<PlayerEvent>) {
    for event in events {
      // No subscribers is fine.
      let _ = self.events.send(event);
    }
  }

  /// Apply one classified signal read as `text`. Returns true when the
  /// engine just became ready.
  fn handle(&self, signal: Signal, text: &str) -> bool {
    let mut events = Vec::new();
    let mut became_ready = false;
    // A marker line can also be the answer a pending query waits for
    // (`ANS_pause=yes`, a file name containing the banner text).
    let marker = !matches!(signal, Signal::RawLine(_) | Signal::SpawnError(_));

    {
      let mut shared = self.shared.lock();
      let was_ready = shared.machine.state().is_ready();
      let transition = shared.machine.apply(&signal);

      match signal {
        Signal::Ready => {
          if transition.is_some() {
            log::info!("MPlayer is ready");
            became_ready = true;
            shared.resolve(Expect::Ready, Ok(()));
            events.push(PlayerEvent::Ready { error: None });
          }
        }
        Signal::PlaybackStarted => {
          shared.resolve(Expect::PlaybackStarted, Ok(()));
          events.push(PlayerEvent::Playing { error: None });
        }
        Signal::LoadFailed(detail) => {
          log::warn!("MPlayer failed to load file: {}", detail);
          let error = PlayerError::LoadFailed(detail);
          shared.resolve(Expect::PlaybackStarted, Err(error.clone()));
          events.push(PlayerEvent::Playing {
            error: Some(error.clone()),
          });
          events.push(PlayerEvent::Error { error });
        }
        Signal::PausedChanged(true) => {
          shared.resolve(Expect::Paused, Ok(()));
        }
        Signal::PausedChanged(false) => {
          if shared.machine.status() == Status::Playing {
            shared.resolve(Expect::Resumed, Ok(()));
          }
        }
        Signal::PropertyError(name) => {
          // Queries are failed by the stdout answer; this is only reported.
          let error = PlayerError::PropertyUnknown(name);
          log::warn!("MPlayer: {}", error);
          if !was_ready {
            shared.resolve(Expect::Ready, Err(error.clone()));
            events.push(PlayerEvent::Ready {
              error: Some(error.clone()),
            });
          }
          events.push(PlayerEvent::Error { error });
        }
        Signal::SpawnError(detail) => {
          let error = PlayerError::Spawn(detail);
          shared.failure = Some(error.clone());
          shared.fail_all(&error);
          self.slot.lock().close(error.clone());
          events.push(PlayerEvent::Ready {
            error: Some(error.clone()),
          });
          events.push(PlayerEvent::Error { error });
        }
        Signal::RawLine(text) => {
          if !self.slot.lock().push_line(&text) {
            log::debug!("Unsolicited MPlayer output: {}", text);
          }
        }
      }

      if marker {
        self.slot.lock().push_line(text);
      }

      if let Some(status) = transition.and_then(|t| t.status_change()) {
        events.push(PlayerEvent::StatusChange { status });
      }
    }

    self.emit(events);
    became_ready
  }

  /// Process exit observed: end the session and release every waiter.
  fn on_exit(&self, report: ExitReport) {
    let mut events = Vec::new();
    {
      let mut shared = self.shared.lock();
      let transition = shared.machine.exit();
      shared.fail_all(&PlayerError::Exited);
      self.slot.lock().close(PlayerError::Exited);
      if let Some(status) = transition.and_then(|t| t.status_change()) {
        events.push(PlayerEvent::StatusChange { status });
      }
    }
    events.push(PlayerEvent::Exited { report });
    self.emit(events);
  }
}

/// A supervised MPlayer session.
///
/// Dropping the client interrupts the engine.
pub struct MplayerClient {
  core: Arc<Core>,
  queries: QueryCoordinator,
  channel: CommandChannel,
  interrupt: CancellationToken,
  exit_rx: watch::Receiver<Option<ExitReport>>,
  pid: Option<u32>,
  wait_timeout: Option<Duration>,
}

impl MplayerClient {
  /// Spawn the engine and start supervising it.
  ///
  /// Never fails directly: a spawn failure ends the session and is reported
  /// by [`await_ready`](Self::await_ready) and as an error event. Must be
  /// called from within a Tokio runtime.
  pub fn spawn(config: &PlayerConfig) -> Self {
    let (exit_tx, exit_rx) = watch::channel(None);
    let slot = Arc::new(Mutex::new(QuerySlot::new()));
    let core = Arc::new(Core::new(slot.clone()));
    let queries = QueryCoordinator::new(slot, config.poll_interval(), config.query_timeout());
    let interrupt = CancellationToken::new();

    let (channel, pid) = match spawn_mplayer(config.executable.as_deref(), &config.args) {
      Ok(mut child) => {
        let pid = child.id();
        let channel = match child.stdin.take() {
          Some(stdin) => CommandChannel::spawn(stdin).0,
          None => CommandChannel::closed(),
        };

        let (line_tx, line_rx) = async_channel::unbounded();
        if let Some(stdout) = child.stdout.take() {
          spawn_reader(stdout, Stream::Stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
          spawn_reader(stderr, Stream::Stderr, line_tx);
        }

        tokio::spawn(dispatch_loop(
          core.clone(),
          channel.clone(),
          config.volume,
          line_rx,
        ));
        tokio::spawn(supervise(
          child,
          interrupt.clone(),
          config.exit_grace(),
          core.clone(),
          channel.clone(),
          exit_tx,
        ));

        (channel, pid)
      }
      Err(e) => {
        log::error!("{}", e);
        let detail = match e {
          ProcessError::SpawnFailed(io) => io.to_string(),
          other => other.to_string(),
        };
        core.handle(Signal::SpawnError(detail), "");
        (CommandChannel::closed(), None)
      }
    };

    Self {
      core,
      queries,
      channel,
      interrupt,
      exit_rx,
      pid,
      wait_timeout: config.wait_timeout(),
    }
  }

  /// Process id of the engine, if it was spawned.
  pub fn pid(&self) -> Option<u32> {
    self.pid
  }

  /// Subscribe to session events.
  pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
    self.core.events.subscribe()
  }

  /// Current caller-facing status.
  pub fn status(&self) -> Status {
    self.core.shared.lock().machine.status()
  }

  /// Current lifecycle state.
  pub fn state(&self) -> PlayerState {
    self.core.shared.lock().machine.state()
  }

  /// Wait until the engine accepts commands.
  pub async fn await_ready(&self) -> Result<(), PlayerError> {
    let rx = {
      let mut shared = self.core.shared.lock();
      match shared.machine.state() {
        PlayerState::Uninitialized => shared.register(Expect::Ready),
        PlayerState::Exited => return Err(shared.ended_error()),
        _ => return Ok(()),
      }
    };
    self.wait("the engine to become ready", rx).await
  }

  /// Load a file and wait for playback to start.
  ///
  /// With `append`, the file is added to the playlist instead. If something
  /// is already playing, no start will be reported for it, so this returns
  /// once the command is queued.
  pub async fn play(&self, path: impl AsRef<Path>, append: bool) -> Result<(), PlayerError> {
    let path = path.as_ref().to_string_lossy();
    let cmd = Command::loadfile(&path, append)?;
    log::info!("Loading file: {} (append: {})", path, append);

    let rx = {
      let mut shared = self.core.shared.lock();
      match shared.machine.state() {
        PlayerState::Exited => return Err(shared.ended_error()),
        PlayerState::Playing | PlayerState::Paused if append => None,
        _ => Some(shared.register(Expect::PlaybackStarted)),
      }
    };

    self.channel.send(&cmd)?;
    match rx {
      Some(rx) => self.wait("playback to start", rx).await,
      None => Ok(()),
    }
  }

  /// Pause playback. Succeeds immediately if already paused.
  pub async fn pause(&self) -> Result<(), PlayerError> {
    let rx = {
      let mut shared = self.core.shared.lock();
      match shared.machine.state() {
        PlayerState::Paused => return Ok(()),
        PlayerState::Exited => return Err(shared.ended_error()),
        _ => shared.register(Expect::Paused),
      }
    };

    self.channel.send(&Command::ForcePause)?;
    self.wait("the engine to pause", rx).await
  }

  /// Resume playback. Succeeds immediately if playing or stopped.
  pub async fn resume(&self) -> Result<(), PlayerError> {
    let rx = {
      let mut shared = self.core.shared.lock();
      match shared.machine.state() {
        PlayerState::Exited => return Err(shared.ended_error()),
        state if state.status() != Status::Paused => return Ok(()),
        _ => shared.register(Expect::Resumed),
      }
    };

    self.channel.send(&Command::TogglePause)?;
    // Unpausing prints nothing; asking for the pause property is what
    // produces the marker.
    self.channel.send(&Command::GetProperty("pause".to_string()))?;
    self.wait("the engine to resume", rx).await
  }

  /// Stop playback. The engine never confirms a stop, so the status changes
  /// as soon as the command is queued.
  pub fn stop(&self) -> Result<(), PlayerError> {
    let transition = {
      let mut shared = self.core.shared.lock();
      if shared.machine.status() == Status::Stopped {
        return Ok(());
      }
      self.channel.send(&Command::Stop)?;
      let transition = shared.machine.stop();
      let interrupted = PlayerError::Interrupted(Status::Stopped);
      shared.resolve(Expect::Paused, Err(interrupted.clone()));
      shared.resolve(Expect::Resumed, Err(interrupted));
      transition
    };

    if let Some(status) = transition.and_then(|t| t.status_change()) {
      self.core.emit(vec![PlayerEvent::StatusChange { status }]);
    }
    Ok(())
  }

  /// Metadata of the current track.
  pub async fn get_track_infos(&self) -> Result<TrackInfo, PlayerError> {
    self.queries.run(&self.channel, &TrackInfoQuery).await
  }

  /// Position and length of the current track.
  pub async fn get_progress(&self) -> Result<Progress, PlayerError> {
    self.queries.run(&self.channel, &ProgressQuery).await
  }

  /// Raw value of any engine property.
  pub async fn get_property(&self, name: &str) -> Result<String, PlayerError> {
    Command::get_property(name)?;
    self.queries.run(&self.channel, &PropertyQuery::new(name)).await
  }

  /// Set the volume (0-100).
  pub fn set_volume(&self, volume: f64) -> Result<(), PlayerError> {
    if !(0.0..=100.0).contains(&volume) {
      return Err(PlayerError::InvalidCommand(format!(
        "volume out of range: {}",
        volume
      )));
    }
    self.channel.send(&Command::Volume(volume))
  }

  /// Interrupt the engine and wait until its exit is observed.
  pub async fn exit(&self) -> Result<ExitReport, PlayerError> {
    if let Some(report) = *self.exit_rx.borrow() {
      return Ok(report);
    }

    match self.await_ready().await {
      Ok(()) | Err(PlayerError::Exited) => {}
      Err(e) => return Err(e),
    }

    log::info!("Exiting MPlayer");
    self.interrupt.cancel();

    let mut exit_rx = self.exit_rx.clone();
    let report = *exit_rx
      .wait_for(|r| r.is_some())
      .await
      .map_err(|_| PlayerError::Exited)?;
    Ok(report.unwrap_or_default())
  }

  async fn wait(
    &self,
    what: &'static str,
    rx: oneshot::Receiver<Result<(), PlayerError>>,
  ) -> Result<(), PlayerError> {
    let outcome = match self.wait_timeout {
      Some(timeout) => tokio::time::timeout(timeout, rx)
        .await
        .map_err(|_| PlayerError::WaitTimeout { what, timeout })?,
      None => rx.await,
    };
    // Sender dropped without an answer: the session is gone.
    outcome.unwrap_or(Err(PlayerError::Exited))
  }
}

impl Drop for MplayerClient {
  fn drop(&mut self) {
    self.interrupt.cancel();
  }
}

/// Classify output lines in arrival order and apply them to the session.
async fn dispatch_loop(
  core: Arc<Core>,
  channel: CommandChannel,
  volume: Option<f64>,
  line_rx: Receiver<OutputLine>,
) {
  while let Ok(line) = line_rx.recv().await {
    let signal = classify(line.stream, &line.text);
    if core.handle(signal, &line.text) {
      if let Some(volume) = volume {
        if let Err(e) = channel.send(&Command::Volume(volume)) {
          log::warn!("Failed to apply initial volume {}: {}", volume, e);
        }
      }
    }
  }
  log::debug!("MPlayer output closed");
}

/// Own the child until it exits; deliver the interrupt when asked to.
async fn supervise(
  mut child: Child,
  interrupt: CancellationToken,
  grace: Duration,
  core: Arc<Core>,
  channel: CommandChannel,
  exit_tx: watch::Sender<Option<ExitReport>>,
) {
  let status = tokio::select! {
    status = child.wait() => status,
    _ = interrupt.cancelled() => {
      if let Err(e) = send_interrupt(&mut child) {
        log::warn!("Failed to interrupt MPlayer: {}", e);
      }
      match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
          log::warn!("MPlayer still running {:?} after interrupt, killing it", grace);
          if let Err(e) = child.start_kill() {
            log::error!("kill() failed: {}", e);
          }
          child.wait().await
        }
      }
    }
  };

  let report = match status {
    Ok(status) => {
      log::info!("MPlayer process exited with: {}", status);
      ExitReport::from(status)
    }
    Err(e) => {
      log::error!("wait() failed: {}", e);
      ExitReport::default()
    }
  };

  channel.close();
  core.on_exit(report);
  let _ = exit_tx.send(Some(report));
}
