//! Record types flowing through a merge run.
//!
//! Profile and hash records are kept as raw JSON objects: neither export has a
//! fixed schema, so field access goes through the [`crate::key`] and
//! [`crate::normalize`] lookups rather than typed structs.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Field name the hash block is attached under in merged output.
pub const PASSWORD_HASH_FIELD: &str = "password_hash";

/// A JSON object as decoded from either export.
pub type Fields = Map<String, Value>;

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// One account from the profile export.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
  /// 1-based line number in the profile export.
  pub line:   usize,
  pub fields: Fields,
}

impl ProfileRecord {
  pub fn new(line: usize, fields: Fields) -> Self { Self { line, fields } }
}

/// One password hash entry from the hash export.
///
/// Algorithm parameters (salt, cost factors, …) are carried verbatim and never
/// interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct HashRecord {
  /// 1-based position in the hash export (array element or NDJSON line).
  pub position: usize,
  pub fields:   Fields,
}

impl HashRecord {
  pub fn new(position: usize, fields: Fields) -> Self {
    Self { position, fields }
  }
}

// ─── Join key ────────────────────────────────────────────────────────────────

/// Which identity space a [`JoinKey`] belongs to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
  UserId,
  Email,
}

impl KeyKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      KeyKind::UserId => "user_id",
      KeyKind::Email => "email",
    }
  }
}

/// Normalized identity value used only for matching; never written out.
///
/// Keys of different kinds never compare equal, so a numeric user id can not
/// accidentally match an email local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
  pub kind:  KeyKind,
  pub value: String,
}

impl JoinKey {
  pub fn new(kind: KeyKind, value: impl Into<String>) -> Self {
    Self {
      kind,
      value: value.into(),
    }
  }
}

impl fmt::Display for JoinKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind.as_str(), self.value)
  }
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// A profile in destination schema, with the hash block attached when a hash
/// record matched.
///
/// Serializes as a single JSON object with keys in sorted order; the hash
/// block appears under [`PASSWORD_HASH_FIELD`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedRecord {
  pub fields:        BTreeMap<String, Value>,
  pub password_hash: Option<Value>,
}

impl MergedRecord {
  /// `false` means the destination will require a password reset for this
  /// account.
  pub fn is_matched(&self) -> bool { self.password_hash.is_some() }

  pub fn get(&self, field: &str) -> Option<&Value> {
    if field == PASSWORD_HASH_FIELD {
      return self.password_hash.as_ref();
    }
    self.fields.get(field)
  }

  /// Convert to a plain JSON value, hash block included.
  pub fn into_value(self) -> Value {
    let mut map: Fields = self.fields.into_iter().collect();
    if let Some(hash) = self.password_hash {
      map.insert(PASSWORD_HASH_FIELD.to_string(), hash);
    }
    Value::Object(map)
  }
}

impl Serialize for MergedRecord {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut entries: BTreeMap<&str, &Value> =
      self.fields.iter().map(|(k, v)| (k.as_str(), v)).collect();
    if let Some(hash) = &self.password_hash {
      entries.insert(PASSWORD_HASH_FIELD, hash);
    }
    entries.serialize(serializer)
  }
}
