//! Join engine: index hash records by key, then merge each profile in order.
//!
//! The engine never fails on data skew. Unmatched profiles, orphaned hashes
//! and duplicate hash keys are counted in [`JoinDiagnostics`]; only an error
//! coming out of the profile stream aborts a join.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  key::KeyExtractor,
  normalize::Normalizer,
  record::{Fields, HashRecord, JoinKey, MergedRecord, ProfileRecord},
  settings::HashLayout,
};

/// Field naming the destination user store, in both exports.
const CONNECTION_FIELD: &str = "connection";

// ─── Diagnostics ─────────────────────────────────────────────────────────────

/// Non-fatal data-quality counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinDiagnostics {
  pub profiles:           usize,
  pub matched:            usize,
  pub unmatched:          usize,
  /// Profiles with no usable key at all; a subset of `unmatched`.
  pub unjoinable:         usize,
  pub hash_records:       usize,
  /// Indexed hash records no profile selected. Dropped from the output.
  pub orphan_hashes:      usize,
  /// Hash records displaced by a later record with the same key.
  pub duplicate_hashes:   usize,
  /// Hash records without any usable key; never indexed.
  pub keyless_hashes:     usize,
  /// Profiles whose `connection` differs from the hash export's database.
  pub foreign_connection: usize,
  /// Label of every unmatched profile (first key, or its line number).
  pub unmatched_accounts: Vec<String>,
}

/// Output of [`join`].
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
  pub records:     Vec<MergedRecord>,
  pub diagnostics: JoinDiagnostics,
}

// ─── Hash index ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct IndexedHash {
  record: HashRecord,
  keys:   Vec<JoinKey>,
}

/// Hash records addressable by every key they yield.
///
/// Last write wins: when a record yields a key that is already indexed, the
/// earlier record is removed from the index entirely and counted as a
/// duplicate.
#[derive(Debug, Default)]
pub struct HashIndex {
  slots:      Vec<Option<IndexedHash>>,
  by_key:     HashMap<JoinKey, usize>,
  total:      usize,
  duplicates: usize,
  keyless:    usize,
  connection: Option<String>,
}

impl HashIndex {
  pub fn build<I>(hashes: I, extractor: &KeyExtractor) -> Self
  where
    I: IntoIterator<Item = HashRecord>,
  {
    let mut index = Self::default();
    for record in hashes {
      index.insert(record, extractor);
    }
    info!(
      indexed = index.len(),
      duplicates = index.duplicates,
      keyless = index.keyless,
      "built hash index"
    );
    index
  }

  fn insert(&mut self, record: HashRecord, extractor: &KeyExtractor) {
    self.total += 1;
    let keys = extractor.keys(&record.fields);
    if keys.is_empty() {
      debug!(position = record.position, "hash record has no usable key");
      self.keyless += 1;
      return;
    }
    if self.connection.is_none() {
      self.connection = text_field(&record.fields, CONNECTION_FIELD);
    }

    let slot = self.slots.len();
    let displaced: BTreeSet<usize> =
      keys.iter().filter_map(|k| self.by_key.get(k).copied()).collect();
    for prev in displaced {
      if let Some(old) = self.slots[prev].take() {
        for key in &old.keys {
          if self.by_key.get(key) == Some(&prev) {
            self.by_key.remove(key);
          }
        }
        debug!(
          discarded = old.record.position,
          kept = record.position,
          "duplicate hash key, later record wins"
        );
        self.duplicates += 1;
      }
    }

    for key in &keys {
      self.by_key.insert(key.clone(), slot);
    }
    self.slots.push(Some(IndexedHash { record, keys }));
  }

  fn lookup(&self, key: &JoinKey) -> Option<(usize, &HashRecord)> {
    let slot = *self.by_key.get(key)?;
    self.slots[slot].as_ref().map(|h| (slot, &h.record))
  }

  /// Record currently indexed under `key`.
  pub fn get(&self, key: &JoinKey) -> Option<&HashRecord> {
    self.lookup(key).map(|(_, r)| r)
  }

  /// Live (non-displaced) records.
  pub fn len(&self) -> usize { self.slots.iter().flatten().count() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  pub fn duplicates(&self) -> usize { self.duplicates }

  pub fn keyless(&self) -> usize { self.keyless }

  /// Database connection name, from the first hash record that names one.
  pub fn connection(&self) -> Option<&str> { self.connection.as_deref() }
}

// ─── Merge plan ──────────────────────────────────────────────────────────────

/// Everything a join needs besides the records themselves. Built from
/// [`crate::MergeSettings::plan`].
#[derive(Debug, Clone)]
pub struct MergePlan {
  extractor:         KeyExtractor,
  normalizer:        Normalizer,
  layout:            HashLayout,
  hash_value_fields: Vec<String>,
}

impl MergePlan {
  pub fn new(
    extractor: KeyExtractor,
    normalizer: Normalizer,
    layout: HashLayout,
    hash_value_fields: Vec<String>,
  ) -> Self {
    Self {
      extractor,
      normalizer,
      layout,
      hash_value_fields,
    }
  }

  pub fn extractor(&self) -> &KeyExtractor { &self.extractor }

  pub fn normalizer(&self) -> &Normalizer { &self.normalizer }

  pub fn index<I>(&self, hashes: I) -> HashIndex
  where
    I: IntoIterator<Item = HashRecord>,
  {
    HashIndex::build(hashes, &self.extractor)
  }

  /// The part of a hash record attached to its merged profile.
  fn hash_block(&self, record: &HashRecord) -> Value {
    let block: Fields = record
      .fields
      .iter()
      .filter(|(name, _)| !self.extractor.is_identity_field(name))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();

    match self.layout {
      HashLayout::Nested => Value::Object(block),
      HashLayout::Flat => {
        let hash = self.hash_value_fields.iter().find_map(|wanted| {
          block
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .and_then(|(_, v)| v.as_str())
        });
        match hash {
          Some(h) => Value::String(h.to_string()),
          None => {
            warn!(
              position = record.position,
              "hash record has no hash value field; attaching the nested block"
            );
            Value::Object(block)
          }
        }
      }
    }
  }
}

// ─── Join ────────────────────────────────────────────────────────────────────

/// Merge `profiles` against `index`, preserving profile order.
///
/// Every profile yields exactly one [`MergedRecord`]. The first `Err` from
/// `profiles` aborts the join and is returned unchanged.
pub fn join<I, E>(plan: &MergePlan, profiles: I, index: &HashIndex) -> Result<JoinOutcome, E>
where
  I: IntoIterator<Item = Result<ProfileRecord, E>>,
{
  let mut diagnostics = JoinDiagnostics {
    hash_records: index.total,
    duplicate_hashes: index.duplicates,
    keyless_hashes: index.keyless,
    ..JoinDiagnostics::default()
  };
  let mut selected = vec![false; index.slots.len()];
  let mut records = Vec::new();

  for profile in profiles {
    let profile = profile?;
    let line = profile.line;
    diagnostics.profiles += 1;

    let keys = plan.extractor.keys(&profile.fields);
    let hit = keys
      .iter()
      .find_map(|k| index.lookup(k).map(|(slot, record)| (k, slot, record)));
    let mut merged = plan.normalizer.normalize(profile);

    if let Some(db) = index.connection()
      && let Some(Value::String(conn)) = merged.fields.get(CONNECTION_FIELD)
      && conn != db
    {
      diagnostics.foreign_connection += 1;
    }

    match hit {
      Some((key, slot, record)) => {
        debug!(line, %key, hash = record.position, "matched");
        merged.password_hash = Some(plan.hash_block(record));
        selected[slot] = true;
        diagnostics.matched += 1;
      }
      None => {
        let label = keys
          .first()
          .map(|k| k.value.clone())
          .unwrap_or_else(|| format!("line {line}"));
        if keys.is_empty() {
          diagnostics.unjoinable += 1;
        }
        warn!(line, account = %label, "no password hash for profile");
        diagnostics.unmatched += 1;
        diagnostics.unmatched_accounts.push(label);
      }
    }
    records.push(merged);
  }

  diagnostics.orphan_hashes = index
    .slots
    .iter()
    .zip(&selected)
    .filter(|(slot, used)| slot.is_some() && !**used)
    .count();

  info!(
    profiles = diagnostics.profiles,
    matched = diagnostics.matched,
    unmatched = diagnostics.unmatched,
    orphans = diagnostics.orphan_hashes,
    "join complete"
  );

  Ok(JoinOutcome {
    records,
    diagnostics,
  })
}

fn text_field(fields: &Fields, name: &str) -> Option<String> {
  fields
    .iter()
    .find(|(k, _)| k.eq_ignore_ascii_case(name))
    .and_then(|(_, v)| v.as_str())
    .map(str::to_string)
}
