//! Output writer: one JSON array, written once.
//!
//! The destination import wants a single array rather than line-delimited
//! JSON, so the full collection is materialized before anything is written.
//! Every byte written is also fed through SHA-256, giving a digest that
//! identifies the output across runs.

use std::io::{self, BufWriter, Write};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteStyle {
  /// Two-space indentation.
  #[default]
  Pretty,
  Compact,
}

/// What [`write`] emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
  pub records: usize,
  pub bytes:   u64,
  /// Lowercase hex SHA-256 of the emitted bytes.
  pub sha256:  String,
}

/// Hashes and counts everything passing through to `inner`.
struct DigestWriter<W> {
  inner:  W,
  hasher: Sha256,
  bytes:  u64,
}

impl<W: Write> Write for DigestWriter<W> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let n = self.inner.write(buf)?;
    self.hasher.update(&buf[..n]);
    self.bytes += n as u64;
    Ok(n)
  }

  fn flush(&mut self) -> io::Result<()> { self.inner.flush() }
}

/// Serialize `records` as one JSON array (plus a trailing newline) to `sink`.
pub fn write<T, W>(records: &[T], sink: W, style: WriteStyle) -> Result<WriteReport>
where
  T: Serialize,
  W: Write,
{
  let mut out = DigestWriter {
    inner:  BufWriter::new(sink),
    hasher: Sha256::new(),
    bytes:  0,
  };
  match style {
    WriteStyle::Pretty => serde_json::to_writer_pretty(&mut out, records)?,
    WriteStyle::Compact => serde_json::to_writer(&mut out, records)?,
  }
  out.write_all(b"\n")?;
  out.flush()?;

  Ok(WriteReport {
    records: records.len(),
    bytes:   out.bytes,
    sha256:  hex::encode(out.hasher.finalize()),
  })
}
