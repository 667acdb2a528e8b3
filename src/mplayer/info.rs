//! Typed query results and the extractions that produce them.

use serde::Serialize;

use super::error::PlayerError;
use super::protocol::Command;
use super::query::{answer, answer_count, answer_error, unquote, Extract, Extraction};

const ARTIST: &str = "ANS_META_ARTIST=";
const ALBUM: &str = "ANS_META_ALBUM=";
const TITLE: &str = "ANS_META_TITLE=";
const FILE_NAME: &str = "ANS_FILENAME=";
const PERCENT: &str = "ANS_PERCENT_POSITION=";
const TIME: &str = "ANS_TIME_POSITION=";
const LENGTH: &str = "ANS_LENGTH=";

/// Metadata of the current track. Missing tags are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrackInfo {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub artist: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub album: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file: Option<String>,
}

/// Playback progress. A value the engine did not report is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
  /// Position in percent of the track.
  pub percent: f64,
  /// Position in seconds.
  pub time: f64,
  /// Track length in seconds.
  pub total: f64,
}

impl Progress {
  /// Whether every field was reported.
  pub fn is_complete(&self) -> bool {
    !(self.percent.is_nan() || self.time.is_nan() || self.total.is_nan())
  }
}

fn text_answer(text: &str, key: &str) -> Option<String> {
  answer(text, key)
    .map(unquote)
    .filter(|v| !v.is_empty())
    .map(str::to_string)
}

fn number_answer(text: &str, key: &str) -> f64 {
  answer(text, key)
    .and_then(|v| v.parse::<f64>().ok())
    .unwrap_or(f64::NAN)
}

fn finish<T>(answered: usize, expected: usize, value: T) -> Extraction<T> {
  if answered >= expected {
    Extraction::Complete(value)
  } else if answered > 0 {
    Extraction::Partial(value)
  } else {
    Extraction::Incomplete
  }
}

/// Artist, album, title and file name of the current track.
pub struct TrackInfoQuery;

impl Extract for TrackInfoQuery {
  type Output = TrackInfo;

  fn label(&self) -> String {
    "track metadata".to_string()
  }

  fn commands(&self) -> Vec<Command> {
    vec![
      Command::GetMetaArtist,
      Command::GetMetaAlbum,
      Command::GetMetaTitle,
      Command::GetFileName,
    ]
  }

  fn extract(&self, text: &str) -> Extraction<TrackInfo> {
    let keys = [ARTIST, ALBUM, TITLE, FILE_NAME];
    let info = TrackInfo {
      artist: text_answer(text, ARTIST),
      album: text_answer(text, ALBUM),
      title: text_answer(text, TITLE),
      file: text_answer(text, FILE_NAME),
    };
    finish(answer_count(text, &keys), keys.len(), info)
  }
}

/// Percent position, time position and length of the current track.
pub struct ProgressQuery;

impl Extract for ProgressQuery {
  type Output = Progress;

  fn label(&self) -> String {
    "playback progress".to_string()
  }

  fn commands(&self) -> Vec<Command> {
    vec![
      Command::GetPercentPos,
      Command::GetTimePos,
      Command::GetTimeLength,
    ]
  }

  fn extract(&self, text: &str) -> Extraction<Progress> {
    let keys = [PERCENT, TIME, LENGTH];
    let progress = Progress {
      percent: number_answer(text, PERCENT),
      time: number_answer(text, TIME),
      total: number_answer(text, LENGTH),
    };
    finish(answer_count(text, &keys), keys.len(), progress)
  }
}

/// Raw value of a single named property.
pub struct PropertyQuery {
  name: String,
  key: String,
}

impl PropertyQuery {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      key: format!("ANS_{}=", name),
    }
  }
}

impl Extract for PropertyQuery {
  type Output = String;

  fn label(&self) -> String {
    self.name.clone()
  }

  fn commands(&self) -> Vec<Command> {
    vec![Command::GetProperty(self.name.clone())]
  }

  fn extract(&self, text: &str) -> Extraction<String> {
    if let Some(value) = answer(text, &self.key) {
      return Extraction::Complete(unquote(value).to_string());
    }
    match answer_error(text) {
      Some(kind) => Extraction::Failed(PlayerError::PropertyUnavailable(format!(
        "{} ({})",
        self.name, kind
      ))),
      None => Extraction::Incomplete,
    }
  }
}
