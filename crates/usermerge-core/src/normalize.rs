//! Export-to-import schema normalization.
//!
//! Field names are translated through a fixed table (matched ignoring case,
//! spaces, hyphens and underscores, so `Email Verified`, `emailVerified` and
//! `email_verified` all land on `email_verified`). Unknown fields pass through
//! under their original name. Metadata blocks are restructured into nested
//! objects where the shape is unambiguous.

use std::collections::{BTreeMap, HashMap, HashSet, btree_map::Entry};

use serde_json::{Map, Value};
use tracing::debug;

use crate::{
  key::strip_provider_prefix,
  record::{MergedRecord, PASSWORD_HASH_FIELD, ProfileRecord},
};

/// Field names of the destination import schema. Each also names itself, so
/// already-normalized records are left alone.
const DESTINATION_FIELDS: &[&str] = &[
  "email",
  "email_verified",
  "given_name",
  "family_name",
  "name",
  "nickname",
  "picture",
  "username",
  "phone_number",
  "phone_verified",
  "blocked",
  "connection",
  "created_at",
  "updated_at",
  "user_id",
  "user_metadata",
  "app_metadata",
];

/// Source spellings that do not fold onto a destination name.
const SOURCE_ALIASES: &[(&str, &str)] = &[("id", "user_id")];

/// Destination fields whose `"true"` / `"false"` strings become booleans.
const BOOLEAN_FIELDS: &[&str] = &["email_verified", "phone_verified", "blocked"];

/// Destination fields holding free-form nested objects.
const METADATA_BLOCKS: &[&str] = &["user_metadata", "app_metadata"];

/// Lowercase and drop spaces, hyphens and underscores.
fn fold_field_name(name: &str) -> String {
  name
    .chars()
    .filter(|c| !matches!(c, ' ' | '-' | '_'))
    .flat_map(char::to_lowercase)
    .collect()
}

/// Maps profile export records onto the destination schema.
#[derive(Debug, Clone)]
pub struct Normalizer {
  table:          HashMap<String, String>,
  user_id_prefix: Option<String>,
}

impl Default for Normalizer {
  fn default() -> Self { Self::new(&BTreeMap::new(), Some("auth0|".to_string())) }
}

impl Normalizer {
  /// `aliases` extend the built-in table (`source → destination`); they win
  /// over built-in entries with the same folded source name.
  pub fn new(aliases: &BTreeMap<String, String>, user_id_prefix: Option<String>) -> Self {
    let mut table = HashMap::new();
    for dest in DESTINATION_FIELDS {
      table.insert(fold_field_name(dest), dest.to_string());
    }
    for (from, to) in SOURCE_ALIASES {
      table.insert(fold_field_name(from), to.to_string());
    }
    for (from, to) in aliases {
      table.insert(fold_field_name(to), to.clone());
      table.insert(fold_field_name(from), to.clone());
    }
    Self {
      table,
      user_id_prefix: user_id_prefix.filter(|p| !p.is_empty()),
    }
  }

  /// Destination name for a source field, if the table knows it.
  pub fn destination_name(&self, source: &str) -> Option<&str> {
    self.table.get(&fold_field_name(source)).map(String::as_str)
  }

  /// Translate one profile record into an unmatched [`MergedRecord`].
  pub fn normalize(&self, record: ProfileRecord) -> MergedRecord {
    let line = record.line;
    let mut out: BTreeMap<String, Value> = BTreeMap::new();
    // Destination names already claimed by a field spelled exactly that way.
    let mut exact: HashSet<String> = HashSet::new();
    let mut dotted: Vec<Dotted> = Vec::new();

    for (name, value) in record.fields {
      // Only a matched hash record may fill this slot.
      if fold_field_name(&name) == fold_field_name(PASSWORD_HASH_FIELD) {
        debug!(line, field = %name, "dropping profile field that shadows the hash block");
        continue;
      }
      if let Some(d) = self.split_dotted(&name) {
        dotted.push(Dotted { original: name, value, ..d });
        continue;
      }
      let Some(dest) = self.destination_name(&name).map(str::to_string) else {
        out.insert(name, value);
        continue;
      };
      let is_exact = name == dest;
      match out.entry(dest.clone()) {
        Entry::Vacant(slot) => {
          slot.insert(value);
          if is_exact {
            exact.insert(dest);
          }
        }
        Entry::Occupied(mut slot) => {
          if is_exact && !exact.contains(&dest) {
            debug!(line, field = %dest, "destination-form field replaces translated value");
            slot.insert(value);
            exact.insert(dest);
          } else {
            debug!(line, field = %name, destination = %dest, "dropping field that collides with an earlier one");
          }
        }
      }
    }

    self.fix_values(&mut out);
    fold_metadata(&mut out, dotted, line);

    MergedRecord {
      fields:        out,
      password_hash: None,
    }
  }

  /// `User Metadata.plan` → (`user_metadata`, `plan`).
  fn split_dotted(&self, name: &str) -> Option<Dotted> {
    let (head, rest) = name.split_once('.')?;
    let block = self.destination_name(head)?;
    if rest.is_empty() || !METADATA_BLOCKS.contains(&block) {
      return None;
    }
    Some(Dotted {
      block:    block.to_string(),
      key:      rest.to_string(),
      original: String::new(),
      value:    Value::Null,
    })
  }

  fn fix_values(&self, out: &mut BTreeMap<String, Value>) {
    if let Some(prefix) = &self.user_id_prefix
      && let Some(Value::String(id)) = out.get_mut("user_id")
    {
      let stripped = strip_provider_prefix(id, prefix);
      if stripped.len() != id.len() {
        *id = stripped.to_string();
      }
    }

    for field in BOOLEAN_FIELDS {
      if let Some(value) = out.get_mut(*field)
        && let Some(flag) = value.as_str().and_then(parse_bool)
      {
        *value = Value::Bool(flag);
      }
    }

    for block in METADATA_BLOCKS {
      if let Some(value) = out.get_mut(*block)
        && let Some(Value::Object(parsed)) =
          value.as_str().and_then(|s| serde_json::from_str::<Value>(s).ok())
      {
        *value = Value::Object(parsed);
      }
    }
  }
}

struct Dotted {
  block:    String,
  key:      String,
  original: String,
  value:    Value,
}

/// Fold dotted metadata fields into their nested block. A key already present
/// in the nested object wins. When the block exists but is not an object the
/// dotted field is kept verbatim.
fn fold_metadata(out: &mut BTreeMap<String, Value>, dotted: Vec<Dotted>, line: usize) {
  for d in dotted {
    let block = out
      .entry(d.block.clone())
      .or_insert_with(|| Value::Object(Map::new()));
    match block {
      Value::Object(obj) => {
        if obj.contains_key(&d.key) {
          debug!(line, field = %d.original, "nested metadata value wins over dotted field");
        } else {
          obj.insert(d.key, d.value);
        }
      }
      _ => {
        out.insert(d.original, d.value);
      }
    }
  }
}

fn parse_bool(s: &str) -> Option<bool> {
  match s.trim().to_ascii_lowercase().as_str() {
    "true" => Some(true),
    "false" => Some(false),
    _ => None,
  }
}
