//! Line I/O over the engine's standard streams.
//!
//! Commands are queued on a channel and written by a single writer task, so
//! they reach the engine in issue order. Output is read line by line by one
//! reader task per stream and forwarded, tagged with its stream, to the
//! session dispatcher.

use async_channel::{Receiver, Sender};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

use super::error::PlayerError;
use super::protocol::{Command, Stream};

/// Writer channel message.
enum WriteMessage {
  Command(String),
  Close,
}

/// One line of engine output.
#[derive(Debug, Clone)]
pub struct OutputLine {
  pub stream: Stream,
  pub text: String,
}

/// Ordered, fire-and-forget command writer.
#[derive(Clone)]
pub struct CommandChannel {
  write_tx: Sender<WriteMessage>,
}

impl CommandChannel {
  /// Start the writer task on the given stdin.
  pub fn spawn<W>(writer: W) -> (Self, JoinHandle<()>)
  where
    W: AsyncWrite + Send + Unpin + 'static,
  {
    let (write_tx, write_rx) = async_channel::unbounded();
    let handle = tokio::spawn(writer_loop(writer, write_rx));
    (Self { write_tx }, handle)
  }

  /// A channel with no engine behind it; every send fails.
  pub fn closed() -> Self {
    let (write_tx, write_rx) = async_channel::unbounded();
    write_rx.close();
    Self { write_tx }
  }

  /// Queue a command. Returns once queued, not once written.
  pub fn send(&self, cmd: &Command) -> Result<(), PlayerError> {
    let line = cmd.to_line();
    log::debug!("Queueing MPlayer command: {}", line);
    self
      .write_tx
      .try_send(WriteMessage::Command(line))
      .map_err(|_| PlayerError::NotRunning)
  }

  /// Stop the writer task after already queued commands are written.
  pub fn close(&self) {
    let _ = self.write_tx.try_send(WriteMessage::Close);
  }
}

async fn writer_loop<W: AsyncWrite + Unpin>(mut writer: W, write_rx: Receiver<WriteMessage>) {
  log::debug!("MPlayer writer loop started");

  while let Ok(msg) = write_rx.recv().await {
    match msg {
      WriteMessage::Command(line) => {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
          log::error!("MPlayer stdin write error: {}", e);
          break;
        }
        if let Err(e) = writer.write_all(b"\n").await {
          log::error!("MPlayer stdin write newline error: {}", e);
          break;
        }
        if let Err(e) = writer.flush().await {
          log::error!("MPlayer stdin flush error: {}", e);
          break;
        }
        log::debug!("MPlayer command written: {}", line);
      }
      WriteMessage::Close => {
        log::debug!("MPlayer writer closing");
        break;
      }
    }
  }

  write_rx.close();
}

/// Start a reader task forwarding every line of `reader` to `line_tx`.
pub fn spawn_reader<R>(reader: R, stream: Stream, line_tx: Sender<OutputLine>) -> JoinHandle<()>
where
  R: AsyncRead + Send + Unpin + 'static,
{
  tokio::spawn(reader_loop(reader, stream, line_tx))
}

/// Split engine output into lines. A bare `\r` also ends a line: the pause
/// banner is terminated by one and nothing follows it while paused.
async fn reader_loop<R: AsyncRead + Unpin>(reader: R, stream: Stream, line_tx: Sender<OutputLine>) {
  let mut buf_reader = BufReader::new(reader);
  let mut pending = Vec::new();

  loop {
    let available = match buf_reader.fill_buf().await {
      Ok(available) => available,
      Err(e) => {
        log::error!("MPlayer {:?} read error: {}", stream, e);
        break;
      }
    };
    if available.is_empty() {
      log::debug!("MPlayer {:?} closed", stream);
      forward(stream, &pending, &line_tx).await;
      break;
    }

    match available.iter().position(|&b| b == b'\n' || b == b'\r') {
      Some(end) => {
        pending.extend_from_slice(&available[..end]);
        buf_reader.consume(end + 1);
        if !forward(stream, &pending, &line_tx).await {
          break;
        }
        pending.clear();
      }
      None => {
        let len = available.len();
        pending.extend_from_slice(available);
        buf_reader.consume(len);
      }
    }
  }
}

/// Send one line to the dispatcher. Returns false once nobody listens.
async fn forward(stream: Stream, raw: &[u8], line_tx: &Sender<OutputLine>) -> bool {
  // Tags are not guaranteed to be UTF-8.
  let text = String::from_utf8_lossy(raw);
  if text.trim().is_empty() {
    return true;
  }
  log::debug!("MPlayer {:?}: {}", stream, text);
  let line = OutputLine {
    stream,
    text: text.into_owned(),
  };
  line_tx.send(line).await.is_ok()
}
