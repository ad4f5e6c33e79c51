//! Error types for the usermerge-codec crate.

use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Where in an export a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
  /// 1-based line of a line-delimited export.
  Line(usize),
  /// 1-based element of a JSON array.
  Element(usize),
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Position::Line(n) => write!(f, "line {n}"),
      Position::Element(n) => write!(f, "element {n}"),
    }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// The file is not a recognized container and not UTF-8 text, or the
  /// container itself is corrupt.
  #[error("cannot decode {}: {reason}", path.display())]
  Decode { path: PathBuf, reason: String },

  #[error("failed to read line {line}: {source}")]
  Read {
    line:   usize,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed record at {position}: {reason}")]
  RecordParse { position: Position, reason: String },

  #[error(
    "unrecognized hash export shape: expected an array or an object wrapping \
     one, found {found}"
  )]
  Schema { found: String },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  /// Line or element the error points at, if any.
  pub fn position(&self) -> Option<Position> {
    match self {
      Error::RecordParse { position, .. } => Some(*position),
      Error::Read { line, .. } => Some(Position::Line(*line)),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
