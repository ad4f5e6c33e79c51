//! File-format plumbing for usermerge.
//!
//! Reads export containers (gzip, zip or plain), decodes profile and hash
//! records into [`usermerge_core`] types, and writes the merged array. Pure
//! synchronous; everything the join itself decides lives in the core crate.
//!
//! # Quick start
//!
//! ```no_run
//! use usermerge_codec::{WriteStyle, decode_hashes, decode_profiles, read_as_text_or_blobs, write};
//! use usermerge_core::{MergeSettings, join};
//!
//! let settings = MergeSettings::default();
//! let plan = settings.plan().unwrap();
//!
//! let hash_text = read_as_text_or_blobs("hashes.zip")?.into_single_text()?;
//! let index = plan.index(decode_hashes(&hash_text, &settings.envelope_fields)?);
//!
//! let profiles = decode_profiles(read_as_text_or_blobs("users.ndjson.gz")?.into_reader()?);
//! let outcome = join(&plan, profiles, &index)?;
//! write(&outcome.records, std::io::stdout().lock(), WriteStyle::Pretty)?;
//! # Ok::<(), usermerge_codec::Error>(())
//! ```

pub mod container;
pub mod decode;
pub mod error;
pub mod write;

pub use container::{Blob, ContainerFormat, Content, read_as_text_or_blobs};
pub use decode::{ProfileStream, decode_hashes, decode_profiles, decode_profiles_str};
pub use error::{Error, Position, Result};
pub use write::{WriteReport, WriteStyle, write};
