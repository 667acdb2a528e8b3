//! Single-flight ad hoc queries over the unframed output stream.
//!
//! The protocol has no request ids, so an answer is recognised only by its
//! marker and by the guarantee that at most one query is in flight. While a
//! query is pending, the dispatcher routes every unclassified output line
//! into its [`QuerySlot`]; the coordinator polls that buffer and hands the
//! accumulated text to the query's extraction until it completes, fails, or
//! the deadline passes.
//!
//! Only stdout answers can fail a query. The matching stderr message travels
//! on another pipe and may arrive after the next query has started.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};

use super::error::PlayerError;
use super::protocol::Command;
use super::stdio::CommandChannel;

const ANSWER_ERROR: &str = "ANS_ERROR=";
const PROPERTY_UNKNOWN: &str = "ANS_ERROR=PROPERTY_UNKNOWN";

/// Outcome of running an extraction over the text accumulated so far.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
  /// Every expected answer is in.
  Complete(T),
  /// Usable, but more answers may still arrive.
  Partial(T),
  /// Nothing usable yet.
  Incomplete,
  /// The engine rejected the query.
  Failed(PlayerError),
}

/// An ad hoc query: the commands to send and how to read their answers.
pub trait Extract {
  type Output;

  /// What is being queried, for error reporting.
  fn label(&self) -> String;

  fn commands(&self) -> Vec<Command>;

  fn extract(&self, text: &str) -> Extraction<Self::Output>;
}

/// In-flight query state written by the dispatcher.
#[derive(Debug, Default)]
struct PendingQuery {
  buffer: String,
  failure: Option<PlayerError>,
}

/// The one slot a pending query occupies.
#[derive(Debug, Default)]
pub struct QuerySlot {
  pending: Option<PendingQuery>,
  closed: Option<PlayerError>,
}

impl QuerySlot {
  pub fn new() -> Self {
    Self::default()
  }

  #[cfg(test)]
  fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Append an answer line. Returns false when no query is pending.
  pub fn push_line(&mut self, line: &str) -> bool {
    match self.pending.as_mut() {
      Some(pending) => {
        pending.buffer.push_str(line);
        pending.buffer.push('\n');
        true
      }
      None => false,
    }
  }

  /// Record a failure for the pending query. The first one wins.
  fn fail(&mut self, err: PlayerError) -> bool {
    match self.pending.as_mut() {
      Some(pending) => {
        pending.failure.get_or_insert(err);
        true
      }
      None => false,
    }
  }

  /// Fail the pending query and refuse new ones.
  pub fn close(&mut self, err: PlayerError) {
    self.fail(err.clone());
    self.closed.get_or_insert(err);
  }

  fn open(&mut self) -> Result<(), PlayerError> {
    if let Some(err) = &self.closed {
      return Err(err.clone());
    }
    self.pending = Some(PendingQuery::default());
    Ok(())
  }

  /// Move out the text that arrived since the last call, and any failure.
  fn drain(&mut self) -> (String, Option<PlayerError>) {
    match self.pending.as_mut() {
      Some(pending) => (
        std::mem::take(&mut pending.buffer),
        pending.failure.take(),
      ),
      None => (String::new(), None),
    }
  }
}

/// Clears the slot however the query ends, including cancellation.
struct SlotGuard<'a> {
  slot: &'a Mutex<QuerySlot>,
}

impl Drop for SlotGuard<'_> {
  fn drop(&mut self) {
    self.slot.lock().pending = None;
  }
}

/// Runs one query at a time against a session.
pub struct QueryCoordinator {
  gate: tokio::sync::Mutex<()>,
  slot: Arc<Mutex<QuerySlot>>,
  poll_interval: Duration,
  timeout: Duration,
}

impl QueryCoordinator {
  pub fn new(slot: Arc<Mutex<QuerySlot>>, poll_interval: Duration, timeout: Duration) -> Self {
    Self {
      gate: tokio::sync::Mutex::new(()),
      slot,
      poll_interval,
      timeout,
    }
  }

  /// Issue the query's commands and resolve its answer.
  ///
  /// A query issued while another is pending waits for it to resolve.
  pub async fn run<Q: Extract>(
    &self,
    channel: &CommandChannel,
    query: &Q,
  ) -> Result<Q::Output, PlayerError> {
    let _turn = self.gate.lock().await;

    self.slot.lock().open()?;
    let _guard = SlotGuard { slot: &self.slot };

    for cmd in query.commands() {
      channel.send(&cmd)?;
    }

    let deadline = Instant::now() + self.timeout;
    let mut ticker = tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut accumulated = String::new();

    loop {
      ticker.tick().await;

      let (fresh, failure) = self.slot.lock().drain();
      if let Some(err) = failure {
        log::warn!("MPlayer query failed: {}", err);
        return Err(err);
      }
      let quiet = fresh.is_empty();
      accumulated.push_str(&fresh);

      if accumulated.contains(PROPERTY_UNKNOWN) {
        log::warn!("MPlayer doesn't know property: {}", query.label());
        return Err(PlayerError::PropertyUnknown(query.label()));
      }

      let timed_out = Instant::now() >= deadline;
      match query.extract(&accumulated) {
        Extraction::Complete(value) => return Ok(value),
        Extraction::Partial(value) if quiet || timed_out => return Ok(value),
        Extraction::Failed(err) => return Err(err),
        _ if timed_out => {
          log::warn!("MPlayer query timed out after {:?}", self.timeout);
          return Err(PlayerError::QueryTimeout(self.timeout));
        }
        _ => {}
      }
    }
  }
}

/// Value of the first `key` answer in `text`, e.g. `ANS_LENGTH=` -> `"12.00"`.
pub(crate) fn answer<'a>(text: &'a str, key: &str) -> Option<&'a str> {
  text
    .lines()
    .find_map(|line| line.find(key).map(|idx| line[idx + key.len()..].trim()))
}

/// Number of lines answering one of `keys`, or reporting an answer error.
pub(crate) fn answer_count(text: &str, keys: &[&str]) -> usize {
  text
    .lines()
    .filter(|line| line.contains(ANSWER_ERROR) || keys.iter().any(|k| line.contains(k)))
    .count()
}

/// The kind reported by an `ANS_ERROR=` line, if any.
pub(crate) fn answer_error(text: &str) -> Option<&str> {
  answer(text, ANSWER_ERROR)
}

/// Strip the single quotes around a string answer.
pub(crate) fn unquote(value: &str) -> &str {
  value
    .strip_prefix('\'')
    .and_then(|v| v.strip_suffix('\''))
    .unwrap_or(value)
}
