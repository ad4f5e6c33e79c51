//! Error types for `usermerge-core`.

use thiserror::Error;

/// Rejected merge settings. Record-level problems are never errors here; they
/// are counted in [`crate::join::JoinDiagnostics`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("no join key fields configured (user_id_fields and email_fields are both empty)")]
  NoKeyFields,

  #[error("alias {from:?} -> {to:?} targets the reserved field \"password_hash\"")]
  ReservedAlias { from: String, to: String },

  #[error("empty field name in {0}")]
  EmptyFieldName(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
