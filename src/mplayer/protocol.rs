//! MPlayer slave-mode protocol: command lines and output classification.
//!
//! Reference: http://www.mplayerhq.hu/DOCS/tech/slave.txt

use super::error::PlayerError;

/// Printed once in the startup banner.
const READY_MARKER: &str = "MPlayer";
const PLAYBACK_STARTED_MARKER: &str = "Starting playback...";
const PAUSE_BANNER: &str = "=====  PAUSE  =====";
const PAUSED_ANSWER: &str = "ANS_pause=yes";
const RESUMED_ANSWER: &str = "ANS_pause=no";
/// Prefix of every query answer.
const ANSWER_PREFIX: &str = "ANS_";
/// Written to stderr by `get_property` for a property the engine doesn't know.
const PROPERTY_ERROR_MARKER: &str = "Failed to get value of property";
const LOAD_FAILURE_MARKERS: &[&str] = &[
  "File not found: ",
  "Failed to recognize file format",
  "No stream found to handle url",
];

/// Prefix that keeps the engine paused while a command is processed.
const KEEP_PAUSED: &str = "pausing_keep_force";

/// Origin of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
  Stdout,
  Stderr,
}

/// Semantic unit classified from one line of engine output.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
  /// Startup banner seen; the engine accepts commands.
  Ready,
  /// A file started playing.
  PlaybackStarted,
  /// Pause state reported by the engine.
  PausedChanged(bool),
  /// The engine reported a property it can't read (stderr).
  PropertyError(String),
  /// The engine could not open the requested file.
  LoadFailed(String),
  /// The process could not be started.
  SpawnError(String),
  /// Anything else, query answers included; kept for answer scraping.
  RawLine(String),
}

/// Classify a single line read from the given stream.
pub fn classify(stream: Stream, line: &str) -> Signal {
  // Answers echo tags and file names, which may contain any marker text.
  if stream == Stream::Stdout && line.trim_start().starts_with(ANSWER_PREFIX) {
    return classify_answer(line);
  }
  if LOAD_FAILURE_MARKERS.iter().any(|m| line.contains(m)) {
    return Signal::LoadFailed(line.trim().to_string());
  }

  match stream {
    Stream::Stdout => classify_stdout(line),
    Stream::Stderr => classify_stderr(line),
  }
}

fn classify_answer(line: &str) -> Signal {
  if line.contains(PAUSED_ANSWER) {
    Signal::PausedChanged(true)
  } else if line.contains(RESUMED_ANSWER) {
    Signal::PausedChanged(false)
  } else {
    Signal::RawLine(line.to_string())
  }
}

fn classify_stdout(line: &str) -> Signal {
  if line.contains(PLAYBACK_STARTED_MARKER) {
    Signal::PlaybackStarted
  } else if line.contains(PAUSE_BANNER) {
    Signal::PausedChanged(true)
  } else if line.contains(READY_MARKER) {
    Signal::Ready
  } else {
    Signal::RawLine(line.to_string())
  }
}

fn classify_stderr(line: &str) -> Signal {
  match line.find(PROPERTY_ERROR_MARKER) {
    Some(idx) => {
      let name = line[idx + PROPERTY_ERROR_MARKER.len()..]
        .trim()
        .trim_end_matches('.')
        .trim_matches('\'');
      if name.is_empty() {
        Signal::PropertyError("unknown".to_string())
      } else {
        Signal::PropertyError(name.to_string())
      }
    }
    None => Signal::RawLine(line.to_string()),
  }
}

/// Command written to the engine's stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  /// Load a file, replacing the current one or appending to the playlist.
  LoadFile { path: String, append: bool },
  /// Pause, leaving the engine paused if it already is.
  ForcePause,
  /// Toggle pause.
  TogglePause,
  /// Stop playback and go idle.
  Stop,
  /// Query the value of a named property.
  GetProperty(String),
  GetMetaArtist,
  GetMetaAlbum,
  GetMetaTitle,
  GetFileName,
  GetPercentPos,
  GetTimePos,
  GetTimeLength,
  /// Set the absolute volume (0-100).
  Volume(f64),
}

impl Command {
  /// Load a file for playback.
  pub fn loadfile(path: &str, append: bool) -> Result<Self, PlayerError> {
    if path.contains(&['\n', '\r'][..]) {
      return Err(PlayerError::InvalidCommand(format!(
        "path contains a line break: {:?}",
        path
      )));
    }
    Ok(Command::LoadFile {
      path: path.to_string(),
      append,
    })
  }

  /// Query a property by name.
  pub fn get_property(name: &str) -> Result<Self, PlayerError> {
    if name.is_empty() || name.contains(char::is_whitespace) {
      return Err(PlayerError::InvalidCommand(format!(
        "invalid property name: {:?}",
        name
      )));
    }
    Ok(Command::GetProperty(name.to_string()))
  }

  /// Render the command as a protocol line, without the terminator.
  pub fn to_line(&self) -> String {
    match self {
      Command::LoadFile { path, append } => {
        let quoted = quote(path);
        if *append {
          format!("loadfile {} 1", quoted)
        } else {
          format!("loadfile {}", quoted)
        }
      }
      Command::ForcePause => format!("{} pause", KEEP_PAUSED),
      Command::TogglePause => "pause".to_string(),
      Command::Stop => "stop".to_string(),
      Command::GetProperty(name) => format!("{} get_property {}", KEEP_PAUSED, name),
      Command::GetMetaArtist => format!("{} get_meta_artist", KEEP_PAUSED),
      Command::GetMetaAlbum => format!("{} get_meta_album", KEEP_PAUSED),
      Command::GetMetaTitle => format!("{} get_meta_title", KEEP_PAUSED),
      Command::GetFileName => format!("{} get_file_name", KEEP_PAUSED),
      Command::GetPercentPos => format!("{} get_percent_pos", KEEP_PAUSED),
      Command::GetTimePos => format!("{} get_time_pos", KEEP_PAUSED),
      Command::GetTimeLength => format!("{} get_time_length", KEEP_PAUSED),
      Command::Volume(v) => format!("{} volume {} 1", KEEP_PAUSED, v),
    }
  }
}

fn quote(value: &str) -> String {
  let mut out = String::with_capacity(value.len() + 2);
  out.push('"');
  for c in value.chars() {
    if c == '"' || c == '\\' {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('"');
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_banner_is_ready() {
    let line = "MPlayer 1.5-12.2.0 (C) 2000-2022 MPlayer Team";
    assert_eq!(classify(Stream::Stdout, line), Signal::Ready);
  }

  #[test]
  fn test_playback_and_pause_markers() {
    assert_eq!(
      classify(Stream::Stdout, "Starting playback..."),
      Signal::PlaybackStarted
    );
    assert_eq!(
      classify(Stream::Stdout, "  =====  PAUSE  =====\r"),
      Signal::PausedChanged(true)
    );
    assert_eq!(
      classify(Stream::Stdout, "ANS_pause=yes"),
      Signal::PausedChanged(true)
    );
    assert_eq!(
      classify(Stream::Stdout, "ANS_pause=no"),
      Signal::PausedChanged(false)
    );
  }

  #[test]
  fn test_property_error_name_extraction() {
    let signal = classify(
      Stream::Stderr,
      "Failed to get value of property 'bogus'.",
    );
    assert_eq!(signal, Signal::PropertyError("bogus".to_string()));
  }

  #[test]
  fn test_property_error_marker_only_on_stderr() {
    let line = "Failed to get value of property 'bogus'.";
    assert_eq!(
      classify(Stream::Stdout, line),
      Signal::RawLine(line.to_string())
    );
  }

  #[test]
  fn test_load_failure() {
    let signal = classify(Stream::Stdout, "File not found: '/nope.flac'");
    assert!(matches!(signal, Signal::LoadFailed(d) if d.contains("/nope.flac")));
  }

  #[test]
  fn test_answers_are_raw_lines() {
    for line in ["ANS_META_ARTIST='Best Band Ever'", "ANS_ERROR=PROPERTY_UNKNOWN"] {
      assert_eq!(
        classify(Stream::Stdout, line),
        Signal::RawLine(line.to_string())
      );
    }
  }

  #[test]
  fn test_answers_never_carry_other_markers() {
    for line in [
      "ANS_META_TITLE='MPlayer Blues'",
      "ANS_FILENAME='MPlayer.flac'",
      "ANS_META_ALBUM='Starting playback...'",
      "ANS_META_ARTIST='File not found: '",
    ] {
      assert_eq!(
        classify(Stream::Stdout, line),
        Signal::RawLine(line.to_string())
      );
    }
  }

  #[test]
  fn test_loadfile_rendering() {
    let cmd = Command::loadfile(r#"/music/a "b"\c.flac"#, false).unwrap();
    assert_eq!(cmd.to_line(), r#"loadfile "/music/a \"b\"\\c.flac""#);

    let cmd = Command::loadfile("/music/next.flac", true).unwrap();
    assert_eq!(cmd.to_line(), r#"loadfile "/music/next.flac" 1"#);
  }

  #[test]
  fn test_loadfile_rejects_line_breaks() {
    assert!(matches!(
      Command::loadfile("/music/a\nstop", false),
      Err(PlayerError::InvalidCommand(_))
    ));
  }

  #[test]
  fn test_queries_keep_pause_state() {
    assert_eq!(
      Command::GetTimePos.to_line(),
      "pausing_keep_force get_time_pos"
    );
    assert_eq!(
      Command::get_property("pause").unwrap().to_line(),
      "pausing_keep_force get_property pause"
    );
    assert_eq!(Command::TogglePause.to_line(), "pause");
    assert_eq!(Command::Volume(42.5).to_line(), "pausing_keep_force volume 42.5 1");
  }
}
