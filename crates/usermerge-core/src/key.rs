//! Join key extraction.
//!
//! The two exports disagree on field naming and casing (`Email` vs `email`,
//! `Id` vs `_id`), so a key is found by walking an ordered list of candidate
//! fields with case-insensitive name matching. The first usable value wins.

use serde_json::Value;

use crate::record::{Fields, JoinKey, KeyKind};

/// One candidate field for key extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCandidate {
  pub field: String,
  pub kind:  KeyKind,
}

impl KeyCandidate {
  pub fn new(field: impl Into<String>, kind: KeyKind) -> Self {
    Self {
      field: field.into(),
      kind,
    }
  }
}

/// Extract the highest-priority join key from `fields`.
///
/// Returns `None` when no candidate yields a usable value; such records are
/// unjoinable and go down the unmatched path.
pub fn extract_key(fields: &Fields, priority: &[KeyCandidate]) -> Option<JoinKey> {
  priority
    .iter()
    .find_map(|c| candidate_value(fields, c, None).map(|v| JoinKey::new(c.kind, v)))
}

/// Ordered candidate list plus the user id normalization applied to every
/// `UserId` value.
#[derive(Debug, Clone)]
pub struct KeyExtractor {
  candidates:     Vec<KeyCandidate>,
  user_id_prefix: Option<String>,
}

impl KeyExtractor {
  pub fn new(candidates: Vec<KeyCandidate>, user_id_prefix: Option<String>) -> Self {
    let user_id_prefix = user_id_prefix
      .map(|p| p.to_lowercase())
      .filter(|p| !p.is_empty());
    Self {
      candidates,
      user_id_prefix,
    }
  }

  pub fn candidates(&self) -> &[KeyCandidate] { &self.candidates }

  /// The first usable key in priority order.
  pub fn first_key(&self, fields: &Fields) -> Option<JoinKey> {
    self.candidates.iter().find_map(|c| self.key_for(fields, c))
  }

  /// Every usable key in priority order, without repeats.
  pub fn keys(&self, fields: &Fields) -> Vec<JoinKey> {
    let mut keys: Vec<JoinKey> = Vec::new();
    for candidate in &self.candidates {
      if let Some(key) = self.key_for(fields, candidate)
        && !keys.contains(&key)
      {
        keys.push(key);
      }
    }
    keys
  }

  /// Whether `name` is one of the candidate identity fields.
  pub fn is_identity_field(&self, name: &str) -> bool {
    self
      .candidates
      .iter()
      .any(|c| c.field.eq_ignore_ascii_case(name))
  }

  fn key_for(&self, fields: &Fields, candidate: &KeyCandidate) -> Option<JoinKey> {
    let prefix = match candidate.kind {
      KeyKind::UserId => self.user_id_prefix.as_deref(),
      KeyKind::Email => None,
    };
    candidate_value(fields, candidate, prefix).map(|v| JoinKey::new(candidate.kind, v))
  }
}

/// Strip every leading repetition of `prefix` (ASCII case-insensitive).
pub(crate) fn strip_provider_prefix<'a>(value: &'a str, prefix: &str) -> &'a str {
  if prefix.is_empty() {
    return value;
  }
  let mut rest = value;
  while let Some(head) = rest.get(..prefix.len())
    && head.eq_ignore_ascii_case(prefix)
  {
    rest = &rest[prefix.len()..];
  }
  rest
}

fn candidate_value(
  fields:    &Fields,
  candidate: &KeyCandidate,
  prefix:    Option<&str>,
) -> Option<String> {
  fields
    .iter()
    .filter(|(name, _)| name.eq_ignore_ascii_case(&candidate.field))
    .find_map(|(_, value)| usable_text(value, prefix))
}

/// Strings, numbers and `{"$oid": "…"}` wrappers are usable; everything else
/// is skipped. The result is trimmed and case-folded.
fn usable_text(value: &Value, prefix: Option<&str>) -> Option<String> {
  let raw = match value {
    Value::String(s) => s.clone(),
    Value::Number(n) => n.to_string(),
    Value::Object(obj) => obj.get("$oid")?.as_str()?.to_string(),
    _ => return None,
  };
  let folded = raw.trim().to_lowercase();
  let folded = match prefix {
    Some(p) => strip_provider_prefix(&folded, p).trim().to_string(),
    None => folded,
  };
  (!folded.is_empty()).then_some(folded)
}
