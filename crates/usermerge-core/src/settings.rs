//! Merge settings, deserialised from the optional TOML config file and
//! `USERMERGE_*` environment variables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
  error::{Error, Result},
  join::MergePlan,
  key::{KeyCandidate, KeyExtractor},
  normalize::Normalizer,
  record::{KeyKind, PASSWORD_HASH_FIELD},
};

/// How a matched hash record is attached to the merged output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashLayout {
  /// `password_hash` is the hash record minus identity fields, verbatim.
  #[default]
  Nested,
  /// `password_hash` is just the hash string (Auth0 bulk import shape).
  Flat,
}

/// Every knob a merge run understands. All fields have defaults matching the
/// Auth0 export/import formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
  /// User id candidates, highest priority first.
  pub user_id_fields:    Vec<String>,
  /// Email candidates, tried after every user id candidate.
  pub email_fields:      Vec<String>,
  /// Provider prefix stripped from user ids (`auth0|abc` → `abc`). Empty
  /// disables stripping.
  pub user_id_prefix:    String,
  /// Names of the array field wrapping a hash export object.
  pub envelope_fields:   Vec<String>,
  /// Hash value fields, used by [`HashLayout::Flat`].
  pub hash_value_fields: Vec<String>,
  pub hash_layout:       HashLayout,
  /// Extra `source → destination` field translations.
  pub aliases:           BTreeMap<String, String>,
  /// Two-space indented output instead of compact.
  pub pretty:            bool,
}

impl Default for MergeSettings {
  fn default() -> Self {
    Self {
      user_id_fields:    strings(&["user_id", "id", "_id"]),
      email_fields:      strings(&["email"]),
      user_id_prefix:    "auth0|".to_string(),
      envelope_fields:   strings(&["users", "records", "data", "items", "results"]),
      hash_value_fields: strings(&["passwordHash", "password_hash", "hash"]),
      hash_layout:       HashLayout::Nested,
      aliases:           BTreeMap::new(),
      pretty:            true,
    }
  }
}

impl MergeSettings {
  pub fn validate(&self) -> Result<()> {
    if self.user_id_fields.is_empty() && self.email_fields.is_empty() {
      return Err(Error::NoKeyFields);
    }
    let lists: [(&'static str, &[String]); 4] = [
      ("user_id_fields", &self.user_id_fields),
      ("email_fields", &self.email_fields),
      ("envelope_fields", &self.envelope_fields),
      ("hash_value_fields", &self.hash_value_fields),
    ];
    for (name, list) in lists {
      if list.iter().any(|f| f.trim().is_empty()) {
        return Err(Error::EmptyFieldName(name));
      }
    }
    for (from, to) in &self.aliases {
      if from.trim().is_empty() || to.trim().is_empty() {
        return Err(Error::EmptyFieldName("aliases"));
      }
      if to.eq_ignore_ascii_case(PASSWORD_HASH_FIELD) {
        return Err(Error::ReservedAlias {
          from: from.clone(),
          to:   to.clone(),
        });
      }
    }
    Ok(())
  }

  /// Candidates in priority order: every user id field, then every email
  /// field.
  pub fn key_candidates(&self) -> Vec<KeyCandidate> {
    let ids = self
      .user_id_fields
      .iter()
      .map(|f| KeyCandidate::new(f.clone(), KeyKind::UserId));
    let emails = self
      .email_fields
      .iter()
      .map(|f| KeyCandidate::new(f.clone(), KeyKind::Email));
    ids.chain(emails).collect()
  }

  pub fn key_extractor(&self) -> KeyExtractor {
    KeyExtractor::new(self.key_candidates(), self.prefix())
  }

  pub fn normalizer(&self) -> Normalizer { Normalizer::new(&self.aliases, self.prefix()) }

  /// Validate and assemble the pieces a join needs.
  pub fn plan(&self) -> Result<MergePlan> {
    self.validate()?;
    Ok(MergePlan::new(
      self.key_extractor(),
      self.normalizer(),
      self.hash_layout,
      self.hash_value_fields.clone(),
    ))
  }

  fn prefix(&self) -> Option<String> {
    (!self.user_id_prefix.is_empty()).then(|| self.user_id_prefix.clone())
  }
}

fn strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}
