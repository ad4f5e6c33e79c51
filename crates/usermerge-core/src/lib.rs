//! Record model and join engine for merging a user-profile export with a
//! password-hash export.
//!
//! This crate does no I/O. Decoding the exports and writing the merged array
//! live in `usermerge-codec`; the pipeline is wired together by
//! `usermerge-cli`.
//!
//! # Quick start
//!
//! ```
//! use serde_json::json;
//! use usermerge_core::{HashRecord, MergeSettings, ProfileRecord, join};
//!
//! let plan = MergeSettings::default().plan().unwrap();
//! let hashes = [HashRecord::new(1, json!({ "email": "A@X.com", "hash": "abc" })
//!   .as_object().unwrap().clone())];
//! let index = plan.index(hashes);
//!
//! let profile = ProfileRecord::new(1, json!({ "Email": "a@x.com" })
//!   .as_object().unwrap().clone());
//! let outcome = join::<_, std::convert::Infallible>(&plan, [Ok(profile)], &index).unwrap();
//! assert!(outcome.records[0].is_matched());
//! ```

pub mod error;
pub mod join;
pub mod key;
pub mod normalize;
pub mod record;
pub mod settings;


pub use error::{Error, Result};
pub use join::{HashIndex, JoinDiagnostics, JoinOutcome, MergePlan, join};
pub use key::{KeyCandidate, KeyExtractor, extract_key};
pub use normalize::Normalizer;
pub use record::{
  Fields, HashRecord, JoinKey, KeyKind, MergedRecord, PASSWORD_HASH_FIELD,
  ProfileRecord,
};
pub use settings::{HashLayout, MergeSettings};
