//! End-of-run summary, written to stderr after a successful merge.

use std::fmt;

use usermerge_codec::{ContainerFormat, WriteReport};
use usermerge_core::JoinDiagnostics;

/// Unmatched accounts listed by name before the rest are summarized.
const LISTED_ACCOUNTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
  pub profile_format:      ContainerFormat,
  pub hash_format:         ContainerFormat,
  pub skipped_blank_lines: usize,
  pub diagnostics:         JoinDiagnostics,
  pub output:              WriteReport,
}

impl fmt::Display for RunSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let d = &self.diagnostics;
    let profiles = format!("profiles ({})", self.profile_format);
    let hashes = format!("hash records ({})", self.hash_format);

    writeln!(f, "usermerge summary")?;
    writeln!(f, "  {profiles:<26}{:>8}", d.profiles)?;
    writeln!(f, "  {:<26}{:>8}", "matched", d.matched)?;
    writeln!(f, "  {:<26}{:>8}  (password reset required)", "unmatched", d.unmatched)?;
    writeln!(f, "    {:<24}{:>8}", "without any key", d.unjoinable)?;
    writeln!(f, "  {:<26}{:>8}", "other connection", d.foreign_connection)?;
    writeln!(f, "  {hashes:<26}{:>8}", d.hash_records)?;
    writeln!(f, "    {:<24}{:>8}  (dropped)", "orphaned", d.orphan_hashes)?;
    writeln!(f, "    {:<24}{:>8}", "duplicate keys", d.duplicate_hashes)?;
    writeln!(f, "    {:<24}{:>8}", "without any key", d.keyless_hashes)?;
    writeln!(f, "  {:<26}{:>8}", "blank lines skipped", self.skipped_blank_lines)?;
    if !d.unmatched_accounts.is_empty() {
      writeln!(f, "  accounts without a password hash:")?;
      for account in d.unmatched_accounts.iter().take(LISTED_ACCOUNTS) {
        writeln!(f, "    {account}")?;
      }
      let rest = d.unmatched_accounts.len().saturating_sub(LISTED_ACCOUNTS);
      if rest > 0 {
        writeln!(f, "    ... and {rest} more")?;
      }
    }
    write!(
      f,
      "  output: {} records, {} bytes, sha256 {}",
      self.output.records, self.output.bytes, self.output.sha256
    )
  }
}
