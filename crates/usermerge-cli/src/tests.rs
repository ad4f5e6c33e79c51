//! End-to-end runs over export files written to a temporary directory.

use std::{
  io::{Cursor, Write},
  path::{Path, PathBuf},
};

use flate2::{Compression, write::GzEncoder};
use serde_json::{Value, json};
use tempfile::TempDir;
use usermerge_codec::ContainerFormat;
use usermerge_core::{HashLayout, MergeSettings};
use zip::{ZipWriter, write::FileOptions};

use crate::{merge, run};

const PROFILES: &str = concat!(
  r#"{"Id":"auth0|6001","Email":"ada@example.com","Email Verified":true,"Given Name":"Ada","Name":"Ada Lovelace","Connection":"Username-Password-Authentication"}"#,
  "\n",
  r#"{"Id":"google-oauth2|777","Email":"grace@gmail.com","Email Verified":true,"Name":"Grace Hopper","Connection":"google-oauth2"}"#,
  "\n",
  "\n",
  r#"{"Id":"auth0|6003","Email":"Alan@Example.com","Email Verified":false,"Name":"Alan Turing","Connection":"Username-Password-Authentication"}"#,
  "\n",
);

fn hash_export() -> Value {
  json!([
    {
      "_id": { "$oid": "6001" },
      "email": "ada@example.com",
      "email_verified": true,
      "passwordHash": "$2b$10$ada",
      "connection": "Username-Password-Authentication",
    },
    {
      "_id": { "$oid": "6003" },
      "email": "alan@example.com",
      "email_verified": false,
      "passwordHash": "$2b$10$alan",
      "connection": "Username-Password-Authentication",
    },
    {
      "_id": { "$oid": "6099" },
      "email": "gone@example.com",
      "passwordHash": "$2b$10$gone",
      "connection": "Username-Password-Authentication",
    },
  ])
}

struct Fixture {
  dir: TempDir,
}

impl Fixture {
  fn new() -> Self {
    Self {
      dir: TempDir::new().unwrap(),
    }
  }

  fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
    let path = self.dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
  }

  fn gzip(&self, name: &str, text: &str) -> PathBuf {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    self.file(name, &enc.finish().unwrap())
  }

  fn zip(&self, name: &str, members: &[(&str, &str)]) -> PathBuf {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (member, text) in members {
      writer.start_file(*member, FileOptions::default()).unwrap();
      writer.write_all(text.as_bytes()).unwrap();
    }
    let bytes = writer.finish().unwrap().into_inner();
    self.file(name, &bytes)
  }
}

fn run_to_value(
  profiles: &Path,
  hashes: &Path,
  settings: &MergeSettings,
) -> (Value, crate::RunSummary) {
  let mut out = Vec::new();
  let summary = run(profiles, hashes, settings, &mut out).unwrap();
  (serde_json::from_slice(&out).unwrap(), summary)
}

#[test]
fn gzip_profiles_and_zipped_hashes_merge() {
  let fx = Fixture::new();
  let profiles = fx.gzip("users.ndjson.gz", PROFILES);
  let hash_text = hash_export().to_string();
  let hashes = fx.zip("hashes.zip", &[("hashes.json", hash_text.as_str())]);

  let (output, summary) = run_to_value(&profiles, &hashes, &MergeSettings::default());

  let records = output.as_array().unwrap();
  assert_eq!(records.len(), 3);
  assert_eq!(records[0]["user_id"], json!("6001"));
  assert_eq!(records[0]["email"], json!("ada@example.com"));
  assert_eq!(records[0]["given_name"], json!("Ada"));
  assert_eq!(records[0]["password_hash"], json!({
    "email_verified": true,
    "passwordHash": "$2b$10$ada",
    "connection": "Username-Password-Authentication",
  }));
  assert_eq!(records[1]["user_id"], json!("google-oauth2|777"));
  assert!(records[1].get("password_hash").is_none());
  assert_eq!(records[2]["email"], json!("Alan@Example.com"));
  assert_eq!(records[2]["password_hash"]["passwordHash"], json!("$2b$10$alan"));

  assert_eq!(summary.profile_format, ContainerFormat::Gzip);
  assert_eq!(summary.hash_format, ContainerFormat::Zip);
  assert_eq!(summary.skipped_blank_lines, 1);
  let d = &summary.diagnostics;
  assert_eq!((d.profiles, d.matched, d.unmatched), (3, 2, 1));
  assert_eq!(d.orphan_hashes, 1);
  assert_eq!(d.foreign_connection, 1);
  assert_eq!(d.unmatched_accounts, vec!["google-oauth2|777".to_string()]);
}

#[test]
fn flat_layout_matches_auth0_import_shape() {
  let fx = Fixture::new();
  let profiles = fx.file("users.ndjson", PROFILES.as_bytes());
  let hashes = fx.file("hashes.json", hash_export().to_string().as_bytes());
  let settings = MergeSettings {
    hash_layout: HashLayout::Flat,
    ..MergeSettings::default()
  };

  let (output, _) = run_to_value(&profiles, &hashes, &settings);
  assert_eq!(output[0]["password_hash"], json!("$2b$10$ada"));
  assert_eq!(output[2]["password_hash"], json!("$2b$10$alan"));
}

#[test]
fn compressed_and_plain_inputs_produce_identical_output() {
  let fx = Fixture::new();
  let hash_text = hash_export().to_string();

  let mut plain = Vec::new();
  let plain_summary = run(
    &fx.file("u.ndjson", PROFILES.as_bytes()),
    &fx.file("h.json", hash_text.as_bytes()),
    &MergeSettings::default(),
    &mut plain,
  )
  .unwrap();

  let mut packed = Vec::new();
  let packed_summary = run(
    &fx.gzip("u.gz", PROFILES),
    &fx.zip("h.zip", &[("h.json", hash_text.as_str())]),
    &MergeSettings::default(),
    &mut packed,
  )
  .unwrap();

  assert_eq!(plain, packed);
  assert_eq!(plain_summary.output.sha256, packed_summary.output.sha256);
}

#[test]
fn wrapped_and_line_delimited_hash_exports_are_equivalent() {
  let fx = Fixture::new();
  let profiles = fx.file("u.ndjson", PROFILES.as_bytes());
  let bare = fx.file("bare.json", hash_export().to_string().as_bytes());
  let wrapped = fx.file(
    "wrapped.json",
    json!({ "users": hash_export() }).to_string().as_bytes(),
  );
  let lines: String = hash_export()
    .as_array()
    .unwrap()
    .iter()
    .map(|h| format!("{h}\n"))
    .collect();
  let ndjson = fx.file("lines.json", lines.as_bytes());

  let (a, _) = run_to_value(&profiles, &bare, &MergeSettings::default());
  let (b, _) = run_to_value(&profiles, &wrapped, &MergeSettings::default());
  let (c, _) = run_to_value(&profiles, &ndjson, &MergeSettings::default());
  assert_eq!(a, b);
  assert_eq!(a, c);
}

#[test]
fn malformed_profile_line_aborts_without_output() {
  let fx = Fixture::new();
  let profiles = fx.file(
    "u.ndjson",
    b"{\"email\":\"a@x.com\"}\n{\"email\":\"b@x.com\"}\n{\"email\": oops}\n{\"email\":\"d@x.com\"}\n",
  );
  let hashes = fx.file("h.json", b"[]");

  let mut out = Vec::new();
  let err = run(&profiles, &hashes, &MergeSettings::default(), &mut out).unwrap_err();
  let message = format!("{err:#}");
  assert!(message.contains("line 3"), "{message}");
  assert!(message.contains("u.ndjson"), "{message}");
  assert!(out.is_empty());
}

#[test]
fn unreadable_profile_export_is_named() {
  let fx = Fixture::new();
  let hashes = fx.file("h.json", b"[]");

  let err = merge(fx.dir.path(), &hashes, &MergeSettings::default()).unwrap_err();
  let message = format!("{err:#}");
  assert!(message.starts_with("profile export"), "{message}");
  assert!(message.contains(&fx.dir.path().display().to_string()), "{message}");
}

#[test]
fn corrupt_gzip_profile_export_is_a_decode_error() {
  let fx = Fixture::new();
  let profiles = fx.file("u.gz", &[0x1f, 0x8b, 0xff, 0xff, 0x00, 0x01, 0x02, 0x03]);
  let hashes = fx.file("h.json", b"[]");

  let mut out = Vec::new();
  let err = run(&profiles, &hashes, &MergeSettings::default(), &mut out).unwrap_err();
  let decode = err
    .chain()
    .find_map(|e| e.downcast_ref::<usermerge_codec::Error>())
    .unwrap();
  assert!(matches!(decode, usermerge_codec::Error::Decode { .. }), "{decode}");
  assert!(format!("{err:#}").contains("u.gz"), "{err:#}");
  assert!(out.is_empty());
}

#[test]
fn zip_with_several_files_is_rejected() {
  let fx = Fixture::new();
  let profiles = fx.file("u.ndjson", PROFILES.as_bytes());
  let hashes = fx.zip("h.zip", &[("a.json", "[]"), ("b.json", "[]")]);

  let err = merge(&profiles, &hashes, &MergeSettings::default()).unwrap_err();
  let message = format!("{err:#}");
  assert!(message.contains("h.zip"), "{message}");
  assert!(message.contains("exactly one file"), "{message}");
}

#[test]
fn unrecognized_hash_shape_names_the_file() {
  let fx = Fixture::new();
  let profiles = fx.file("u.ndjson", PROFILES.as_bytes());
  let hashes = fx.file("h.json", b"{\"meta\": {\"count\": 3}}");

  let err = merge(&profiles, &hashes, &MergeSettings::default()).unwrap_err();
  let message = format!("{err:#}");
  assert!(message.contains("hash export"), "{message}");
  assert!(message.contains("h.json"), "{message}");
  assert!(message.contains("unrecognized hash export shape"), "{message}");
}

#[test]
fn empty_profile_export_writes_empty_array() {
  let fx = Fixture::new();
  let profiles = fx.file("u.ndjson", b"\n\n");
  let hashes = fx.file("h.json", hash_export().to_string().as_bytes());

  let (output, summary) = run_to_value(&profiles, &hashes, &MergeSettings::default());
  assert_eq!(output, json!([]));
  assert_eq!(summary.diagnostics.orphan_hashes, 3);
  assert_eq!(summary.skipped_blank_lines, 2);
}
