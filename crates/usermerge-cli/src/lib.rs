//! The usermerge pipeline: read both exports, join them, write one import
//! file.
//!
//! The hash export is read and indexed first; the profile export is then
//! streamed line by line through the join. Nothing is written until the join
//! has finished, so a fatal error never leaves a partial output behind.

pub mod settings;
pub mod summary;

#[cfg(test)]
mod tests;

use std::{io::Write, path::Path};

use anyhow::Context as _;
use tracing::{info, warn};
use usermerge_codec::{
  ContainerFormat, WriteReport, WriteStyle, decode_hashes, read_as_text_or_blobs,
  write,
};
use usermerge_core::{JoinOutcome, MergeSettings, join};

pub use settings::load_settings;
pub use summary::RunSummary;

/// A completed join, ready to be written.
#[derive(Debug)]
pub struct Merged {
  pub outcome:             JoinOutcome,
  pub profile_format:      ContainerFormat,
  pub hash_format:         ContainerFormat,
  pub skipped_blank_lines: usize,
}

impl Merged {
  /// Write the merged array to `sink`.
  pub fn write_to<W: Write>(&self, sink: W, style: WriteStyle) -> anyhow::Result<WriteReport> {
    let report =
      write(&self.outcome.records, sink, style).context("failed to write merged output")?;
    info!(records = report.records, bytes = report.bytes, "wrote merged output");
    Ok(report)
  }

  pub fn summary(&self, output: WriteReport) -> RunSummary {
    RunSummary {
      profile_format: self.profile_format,
      hash_format: self.hash_format,
      skipped_blank_lines: self.skipped_blank_lines,
      diagnostics: self.outcome.diagnostics.clone(),
      output,
    }
  }
}

/// Output style selected by the settings.
pub fn write_style(settings: &MergeSettings) -> WriteStyle {
  if settings.pretty {
    WriteStyle::Pretty
  } else {
    WriteStyle::Compact
  }
}

/// Read both exports and join them.
pub fn merge(
  profile_path: &Path,
  hash_path: &Path,
  settings: &MergeSettings,
) -> anyhow::Result<Merged> {
  let plan = settings.plan().context("invalid merge settings")?;

  let hash_context = || format!("hash export {}", hash_path.display());
  let hash_content = read_as_text_or_blobs(hash_path).with_context(hash_context)?;
  let hash_format = hash_content.format();
  let hash_text = hash_content.into_single_text().with_context(hash_context)?;
  let hashes =
    decode_hashes(&hash_text, &settings.envelope_fields).with_context(hash_context)?;
  drop(hash_text);
  info!(path = %hash_path.display(), format = %hash_format, records = hashes.len(), "decoded hash export");
  if hashes.is_empty() {
    warn!(path = %hash_path.display(), "hash export contains no records");
  }
  let index = plan.index(hashes);

  let profile_context = || format!("profile export {}", profile_path.display());
  let profile_content = read_as_text_or_blobs(profile_path).with_context(profile_context)?;
  let profile_format = profile_content.format();
  let mut profiles = profile_content
    .into_profiles()
    .with_context(profile_context)?;
  info!(path = %profile_path.display(), format = %profile_format, "streaming profile export");

  let outcome = join(&plan, &mut profiles, &index).with_context(profile_context)?;
  if outcome.records.is_empty() {
    warn!(path = %profile_path.display(), "profile export contains no records");
  }

  Ok(Merged {
    outcome,
    profile_format,
    hash_format,
    skipped_blank_lines: profiles.skipped_blank_lines(),
  })
}

/// Merge both exports and write the result to `sink`.
pub fn run<W: Write>(
  profile_path: &Path,
  hash_path: &Path,
  settings: &MergeSettings,
  sink: W,
) -> anyhow::Result<RunSummary> {
  let merged = merge(profile_path, hash_path, settings)?;
  let report = merged.write_to(sink, write_style(settings))?;
  Ok(merged.summary(report))
}
