//! `usermerge`: merge a user profile export with a password hash export into
//! one bulk-import file.
//!
//! # Usage
//!
//! ```text
//! usermerge users.ndjson.gz hashes.zip > import.json
//! usermerge --hash-layout flat -o import.json users.ndjson hashes.json
//! ```
//!
//! The merged JSON array goes to stdout (or `--output`); logs and the run
//! summary go to stderr.

use std::{fs::File, io, path::PathBuf};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use usermerge_core::HashLayout;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
  name = "usermerge",
  version,
  about = "Merge a user profile export with a password hash export"
)]
struct Cli {
  /// Profile export: one JSON object per line, optionally gzip-compressed.
  profile_export: PathBuf,

  /// Password hash export: a JSON document, optionally inside a zip archive.
  hash_export: PathBuf,

  /// TOML file with merge settings.
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Write the merged array to FILE instead of stdout.
  #[arg(short, long, value_name = "FILE")]
  output: Option<PathBuf>,

  /// How matched hash records are attached.
  #[arg(long, value_enum)]
  hash_layout: Option<LayoutArg>,

  /// Emit compact JSON instead of two-space indentation.
  #[arg(long)]
  compact: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LayoutArg {
  /// `password_hash` holds the hash record without identity fields.
  Nested,
  /// `password_hash` holds only the hash string.
  Flat,
}

impl From<LayoutArg> for HashLayout {
  fn from(arg: LayoutArg) -> Self {
    match arg {
      LayoutArg::Nested => HashLayout::Nested,
      LayoutArg::Flat => HashLayout::Flat,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
  // Logs go to stderr; stdout carries only the merged array.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let mut settings = usermerge_cli::load_settings(cli.config.as_deref())?;
  if let Some(layout) = cli.hash_layout {
    settings.hash_layout = layout.into();
  }
  if cli.compact {
    settings.pretty = false;
  }
  let style = usermerge_cli::write_style(&settings);

  let merged = usermerge_cli::merge(&cli.profile_export, &cli.hash_export, &settings)?;

  // The output file is only created once the join has succeeded.
  let report = match &cli.output {
    Some(path) => {
      let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
      merged.write_to(file, style)?
    }
    None => merged.write_to(io::stdout().lock(), style)?,
  };

  eprintln!("{}", merged.summary(report));
  Ok(())
}
