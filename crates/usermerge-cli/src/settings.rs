//! Merge settings loading.
//!
//! Layers, lowest priority first: built-in defaults, the optional TOML file
//! given with `--config`, then `USERMERGE_*` environment variables. Command
//! line flags are applied on top by the binary.

use std::path::Path;

use anyhow::Context as _;
use config::{Config, Environment, File, FileFormat};
use usermerge_core::MergeSettings;

/// Environment variable prefix (`USERMERGE_HASH_LAYOUT=flat`, …).
pub const ENV_PREFIX: &str = "USERMERGE";

pub fn load_settings(path: Option<&Path>) -> anyhow::Result<MergeSettings> {
  let mut builder = Config::builder();
  if let Some(path) = path {
    builder = builder.add_source(
      File::from(path.to_path_buf())
        .format(FileFormat::Toml)
        .required(true),
    );
  }
  let settings: MergeSettings = builder
    .add_source(Environment::with_prefix(ENV_PREFIX))
    .build()
    .context("failed to read merge settings")?
    .try_deserialize()
    .context("failed to deserialise merge settings")?;

  settings.validate().context("invalid merge settings")?;
  Ok(settings)
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;
  use usermerge_core::HashLayout;

  use super::*;

  #[test]
  fn toml_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("usermerge.toml");
    std::fs::write(
      &path,
      r#"
hash_layout     = "flat"
email_fields    = ["email", "contact_email"]
user_id_prefix  = ""

[aliases]
login = "username"
"#,
    )
    .unwrap();

    let settings = load_settings(Some(&path)).unwrap();
    assert_eq!(settings.hash_layout, HashLayout::Flat);
    assert_eq!(settings.email_fields, vec!["email", "contact_email"]);
    assert_eq!(settings.user_id_prefix, "");
    assert_eq!(settings.aliases.get("login").map(String::as_str), Some("username"));
    // Untouched keys keep their defaults.
    assert_eq!(settings.user_id_fields, vec!["user_id", "id", "_id"]);
  }

  #[test]
  fn missing_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = load_settings(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(format!("{err:#}").contains("failed to read merge settings"));
  }

  #[test]
  fn invalid_settings_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "user_id_fields = []\nemail_fields = []\n").unwrap();
    let err = load_settings(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("no join key fields"));
  }
}
