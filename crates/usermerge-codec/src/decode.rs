//! Record decoding for both exports.
//!
//! Profiles are line-delimited JSON and decoded lazily, one line at a time,
//! so the profile export never has to sit in memory whole. Hash exports are
//! one JSON document: a bare array, or an object wrapping the array under a
//! conventional field name. Line-delimited hash exports are accepted too.

use std::{
  io::{BufRead, Cursor},
  path::PathBuf,
};

use serde_json::Value;
use tracing::debug;
use usermerge_core::{Fields, HashRecord, ProfileRecord};

use crate::error::{Error, Position, Result};

const UTF8_BOM: char = '\u{feff}';

// ─── Profiles ────────────────────────────────────────────────────────────────

/// Lazy iterator over the records of a profile export.
///
/// Blank lines are skipped. The first error ends the stream: a malformed
/// profile export means the wrong file was supplied, so there is no
/// partial-success mode.
///
/// A stream that knows its source file reports read failures (corrupt gzip,
/// invalid UTF-8) as [`Error::Decode`] naming that file.
pub struct ProfileStream<R> {
  reader:  R,
  source:  Option<PathBuf>,
  buf:     String,
  line:    usize,
  skipped: usize,
  done:    bool,
}

/// Decode a profile export from `reader`.
pub fn decode_profiles<R: BufRead>(reader: R) -> ProfileStream<R> {
  ProfileStream {
    reader,
    source: None,
    buf: String::new(),
    line: 0,
    skipped: 0,
    done: false,
  }
}

/// Decode a profile export held in memory.
pub fn decode_profiles_str(text: &str) -> ProfileStream<Cursor<&[u8]>> {
  decode_profiles(Cursor::new(text.as_bytes()))
}

impl<R> ProfileStream<R> {
  /// Attribute read failures to the file at `path`.
  pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
    self.source = Some(path.into());
    self
  }

  /// Lines consumed so far.
  pub fn lines_read(&self) -> usize { self.line }

  /// Blank lines skipped so far.
  pub fn skipped_blank_lines(&self) -> usize { self.skipped }
}

impl<R: BufRead> Iterator for ProfileStream<R> {
  type Item = Result<ProfileRecord>;

  fn next(&mut self) -> Option<Self::Item> {
    while !self.done {
      self.buf.clear();
      match self.reader.read_line(&mut self.buf) {
        Ok(0) => self.done = true,
        Ok(_) => {
          self.line += 1;
          let mut text = self.buf.as_str();
          if self.line == 1 {
            text = text.trim_start_matches(UTF8_BOM);
          }
          let text = text.trim();
          if text.is_empty() {
            debug!(line = self.line, "skipping blank line");
            self.skipped += 1;
            continue;
          }
          let parsed = parse_object(text, Position::Line(self.line));
          self.done = parsed.is_err();
          return Some(parsed.map(|fields| ProfileRecord::new(self.line, fields)));
        }
        Err(source) => {
          self.done = true;
          let line = self.line + 1;
          return Some(Err(match &self.source {
            Some(path) => Error::Decode {
              path:   path.clone(),
              reason: format!("stream failed at line {line}: {source}"),
            },
            None => Error::Read { line, source },
          }));
        }
      }
    }
    None
  }
}

// ─── Hashes ──────────────────────────────────────────────────────────────────

/// Decode a hash export.
///
/// `envelope_fields` are tried in order (case-insensitively) when the
/// document is an object; the first one holding an array is the record
/// collection.
pub fn decode_hashes(text: &str, envelope_fields: &[String]) -> Result<Vec<HashRecord>> {
  // Untrimmed, so reported line numbers match the file.
  let body = text.trim_start_matches(UTF8_BOM);
  let trimmed = body.trim();
  if trimmed.is_empty() {
    return Ok(Vec::new());
  }

  match serde_json::from_str::<Value>(body) {
    Ok(Value::Array(items)) => from_elements(items),
    Ok(Value::Object(mut obj)) => {
      let wrapped = envelope_fields.iter().find_map(|wanted| {
        obj
          .iter()
          .find(|(name, value)| name.eq_ignore_ascii_case(wanted) && value.is_array())
          .map(|(name, _)| name.clone())
      });
      match wrapped.and_then(|name| obj.remove(&name).map(|v| (name, v))) {
        Some((name, Value::Array(items))) => {
          debug!(envelope = %name, "hash export wrapped in an envelope");
          from_elements(items)
        }
        _ => Err(Error::Schema {
          found: format!(
            "an object without any of the fields [{}] holding an array",
            envelope_fields.join(", ")
          ),
        }),
      }
    }
    Ok(other) => Err(Error::Schema {
      found: kind_of(&other).to_string(),
    }),
    Err(e) if trimmed.starts_with('{') && trimmed.lines().nth(1).is_some() => {
      debug!(error = %e, "hash export is not one JSON document, decoding by line");
      decode_hash_lines(body)
    }
    Err(e) => Err(Error::RecordParse {
      position: Position::Line(e.line()),
      reason:   e.to_string(),
    }),
  }
}

fn from_elements(items: Vec<Value>) -> Result<Vec<HashRecord>> {
  items
    .into_iter()
    .enumerate()
    .map(|(i, item)| match item {
      Value::Object(fields) => Ok(HashRecord::new(i + 1, fields)),
      other => Err(Error::RecordParse {
        position: Position::Element(i + 1),
        reason:   format!("expected a JSON object, found {}", kind_of(&other)),
      }),
    })
    .collect()
}

fn decode_hash_lines(body: &str) -> Result<Vec<HashRecord>> {
  let mut records = Vec::new();
  for (i, line) in body.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let fields = parse_object(line, Position::Line(i + 1))?;
    records.push(HashRecord::new(i + 1, fields));
  }
  Ok(records)
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn parse_object(text: &str, position: Position) -> Result<Fields> {
  match serde_json::from_str::<Value>(text) {
    Ok(Value::Object(fields)) => Ok(fields),
    Ok(other) => Err(Error::RecordParse {
      position,
      reason: format!("expected a JSON object, found {}", kind_of(&other)),
    }),
    Err(e) => Err(Error::RecordParse {
      position,
      reason: e.to_string(),
    }),
  }
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}
