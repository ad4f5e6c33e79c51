//! Container sniffing for export files.
//!
//! Exports arrive gzip-compressed, zipped, or already extracted by hand. The
//! format is decided from the leading magic bytes, never from the file
//! extension, and callers get one [`Content`] value either way.

use std::{
  fmt,
  fs::File,
  io::{BufRead, BufReader, Cursor, Read},
  path::{Path, PathBuf},
};

use flate2::read::MultiGzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::{
  decode::{ProfileStream, decode_profiles},
  error::{Error, Result},
};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const UTF8_BOM: &str = "\u{feff}";

/// Archive members macOS Finder adds alongside the real content.
const ZIP_RESOURCE_FORK_DIR: &str = "__MACOSX/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
  Gzip,
  Zip,
  Plain,
}

impl fmt::Display for ContainerFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      ContainerFormat::Gzip => "gzip",
      ContainerFormat::Zip => "zip",
      ContainerFormat::Plain => "plain text",
    })
  }
}

/// Decide the container format from the first bytes of a file.
pub fn sniff(prefix: &[u8]) -> ContainerFormat {
  if prefix.starts_with(GZIP_MAGIC) {
    ContainerFormat::Gzip
  } else if prefix.starts_with(ZIP_MAGIC) || prefix.starts_with(ZIP_EMPTY_MAGIC) {
    ContainerFormat::Zip
  } else {
    ContainerFormat::Plain
  }
}

/// One decoded archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
  pub name: String,
  pub text: String,
}

/// Decoded content of an export file.
pub enum Content {
  /// A gzip or plain file, exposed as a buffered stream. UTF-8 validity is
  /// checked as lines are pulled.
  Text {
    path:   PathBuf,
    format: ContainerFormat,
    reader: Box<dyn BufRead>,
  },
  /// Every file member of a zip archive, fully decoded.
  Blobs { path: PathBuf, blobs: Vec<Blob> },
}

impl fmt::Debug for Content {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Content::Text { path, format, .. } => f
        .debug_struct("Text")
        .field("path", path)
        .field("format", format)
        .finish_non_exhaustive(),
      Content::Blobs { path, blobs } => f
        .debug_struct("Blobs")
        .field("path", path)
        .field("blobs", blobs)
        .finish(),
    }
  }
}

impl Content {
  pub fn path(&self) -> &Path {
    match self {
      Content::Text { path, .. } | Content::Blobs { path, .. } => path,
    }
  }

  pub fn format(&self) -> ContainerFormat {
    match self {
      Content::Text { format, .. } => *format,
      Content::Blobs { .. } => ContainerFormat::Zip,
    }
  }

  /// A line reader over the content. An archive must hold exactly one file.
  pub fn into_reader(self) -> Result<Box<dyn BufRead>> {
    match self {
      Content::Text { reader, .. } => Ok(reader),
      Content::Blobs { path, blobs } => {
        let blob = single_blob(&path, blobs)?;
        Ok(Box::new(Cursor::new(blob.text.into_bytes())))
      }
    }
  }

  /// A profile stream over the content. Read failures inside the stream name
  /// this file.
  pub fn into_profiles(self) -> Result<ProfileStream<Box<dyn BufRead>>> {
    let path = self.path().to_path_buf();
    Ok(decode_profiles(self.into_reader()?).with_source(path))
  }

  /// The whole content as one string. An archive must hold exactly one file.
  pub fn into_single_text(self) -> Result<String> {
    match self {
      Content::Text {
        path, mut reader, ..
      } => {
        let mut text = String::new();
        reader
          .read_to_string(&mut text)
          .map_err(|e| Error::Decode {
            path,
            reason: e.to_string(),
          })?;
        Ok(strip_bom(text))
      }
      Content::Blobs { path, blobs } => Ok(single_blob(&path, blobs)?.text),
    }
  }
}

/// Open `path` and expose its decoded content.
pub fn read_as_text_or_blobs(path: impl AsRef<Path>) -> Result<Content> {
  let path = path.as_ref().to_path_buf();
  let file = File::open(&path).map_err(|e| Error::Decode {
    path:   path.clone(),
    reason: e.to_string(),
  })?;
  let mut reader = BufReader::new(file);
  let prefix = reader.fill_buf().map_err(|e| Error::Decode {
    path:   path.clone(),
    reason: e.to_string(),
  })?;
  let format = sniff(prefix);

  if format == ContainerFormat::Plain
    && let Err(e) = std::str::from_utf8(prefix)
    && e.error_len().is_some()
  {
    return Err(Error::Decode {
      path,
      reason: format!(
        "not a gzip or zip container and not UTF-8 text (invalid byte at offset {})",
        e.valid_up_to()
      ),
    });
  }
  debug!(path = %path.display(), %format, "sniffed container");

  match format {
    ContainerFormat::Gzip => Ok(Content::Text {
      path,
      format,
      reader: Box::new(BufReader::new(MultiGzDecoder::new(reader))),
    }),
    ContainerFormat::Plain => Ok(Content::Text {
      path,
      format,
      reader: Box::new(reader),
    }),
    ContainerFormat::Zip => {
      let blobs = read_zip_members(&path, reader)?;
      Ok(Content::Blobs { path, blobs })
    }
  }
}

fn read_zip_members(path: &Path, reader: BufReader<File>) -> Result<Vec<Blob>> {
  let zip_err = |e: zip::result::ZipError| Error::Decode {
    path:   path.to_path_buf(),
    reason: format!("corrupt zip archive: {e}"),
  };
  let mut archive = ZipArchive::new(reader).map_err(zip_err)?;
  let mut blobs = Vec::new();

  for i in 0..archive.len() {
    let mut member = archive.by_index(i).map_err(zip_err)?;
    let name = member.name().to_string();
    if member.is_dir() || name.starts_with(ZIP_RESOURCE_FORK_DIR) {
      continue;
    }
    let mut bytes = Vec::new();
    member.read_to_end(&mut bytes).map_err(|e| Error::Decode {
      path:   path.to_path_buf(),
      reason: format!("cannot extract {name}: {e}"),
    })?;
    let text = String::from_utf8(bytes).map_err(|_| Error::Decode {
      path:   path.to_path_buf(),
      reason: format!("archive member {name} is not UTF-8 text"),
    })?;
    debug!(member = %name, bytes = text.len(), "extracted archive member");
    blobs.push(Blob {
      name,
      text: strip_bom(text),
    });
  }
  Ok(blobs)
}

fn single_blob(path: &Path, mut blobs: Vec<Blob>) -> Result<Blob> {
  if blobs.len() != 1 {
    return Err(Error::Decode {
      path:   path.to_path_buf(),
      reason: format!(
        "archive should contain exactly one file, found {}",
        blobs.len()
      ),
    });
  }
  Ok(blobs.remove(0))
}

fn strip_bom(text: String) -> String {
  match text.strip_prefix(UTF8_BOM) {
    Some(rest) => rest.to_string(),
    None => text,
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use flate2::{Compression, write::GzEncoder};
  use tempfile::TempDir;
  use zip::{ZipWriter, write::FileOptions};

  use super::*;

  fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
  }

  fn gzip(text: &str) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap()
  }

  fn zip_of(members: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, text) in members {
      writer.start_file(*name, FileOptions::default()).unwrap();
      writer.write_all(text.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
  }

  fn read_all(content: Content) -> String {
    let mut text = String::new();
    content.into_reader().unwrap().read_to_string(&mut text).unwrap();
    text
  }

  #[test]
  fn sniff_by_magic_bytes() {
    assert_eq!(sniff(&[0x1f, 0x8b, 0x08]), ContainerFormat::Gzip);
    assert_eq!(sniff(b"PK\x03\x04rest"), ContainerFormat::Zip);
    assert_eq!(sniff(b"PK\x05\x06"), ContainerFormat::Zip);
    assert_eq!(sniff(b"{\"a\":1}"), ContainerFormat::Plain);
    assert_eq!(sniff(b""), ContainerFormat::Plain);
  }

  #[test]
  fn gzip_is_decompressed_regardless_of_extension() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "users.json", &gzip("{\"a\":1}\n"));
    let content = read_as_text_or_blobs(&path).unwrap();
    assert_eq!(content.format(), ContainerFormat::Gzip);
    assert_eq!(read_all(content), "{\"a\":1}\n");
  }

  #[test]
  fn plain_text_passes_through() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "users.json.gz", b"{\"a\":1}\n");
    let content = read_as_text_or_blobs(&path).unwrap();
    assert_eq!(content.format(), ContainerFormat::Plain);
    assert_eq!(read_all(content), "{\"a\":1}\n");
  }

  #[test]
  fn zip_members_become_blobs() {
    let dir = TempDir::new().unwrap();
    let bytes = zip_of(&[
      ("hashes.json", "[]"),
      ("__MACOSX/._hashes.json", "\u{0}\u{5}"),
    ]);
    let path = write_file(&dir, "hashes.zip", &bytes);
    let content = read_as_text_or_blobs(&path).unwrap();
    let Content::Blobs { blobs, .. } = &content else {
      panic!("expected blobs, got {content:?}")
    };
    assert_eq!(blobs, &vec![Blob {
      name: "hashes.json".to_string(),
      text: "[]".to_string(),
    }]);
    assert_eq!(content.into_single_text().unwrap(), "[]");
  }

  #[test]
  fn zip_with_two_files_is_not_a_single_text() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "h.zip", &zip_of(&[("a.json", "[]"), ("b.json", "[]")]));
    let err = read_as_text_or_blobs(&path)
      .unwrap()
      .into_single_text()
      .unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
    assert!(err.to_string().contains("exactly one file, found 2"));
  }

  #[test]
  fn binary_junk_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "junk.bin", &[0xff, 0xfe, 0x00, 0xc3, 0x28]);
    let err = read_as_text_or_blobs(&path).unwrap_err();
    assert!(matches!(err, Error::Decode { .. }), "{err}");
  }

  #[test]
  fn bom_is_removed_from_single_text() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "h.json", "\u{feff}[1]".as_bytes());
    let text = read_as_text_or_blobs(&path)
      .unwrap()
      .into_single_text()
      .unwrap();
    assert_eq!(text, "[1]");
  }

  #[test]
  fn unreadable_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let err = read_as_text_or_blobs(dir.path()).unwrap_err();
    assert!(matches!(err, Error::Decode { .. }), "{err}");
    assert!(err.to_string().contains(&dir.path().display().to_string()), "{err}");
  }

  #[test]
  fn corrupt_gzip_profile_stream_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "u.gz", &[0x1f, 0x8b, 0xff, 0xff, 0x00, 0x01, 0x02, 0x03]);
    let content = read_as_text_or_blobs(&path).unwrap();
    assert_eq!(content.format(), ContainerFormat::Gzip);
    let err = content.into_profiles().unwrap().next().unwrap().unwrap_err();
    assert!(matches!(err, Error::Decode { .. }), "{err}");
    assert!(err.to_string().contains("u.gz"), "{err}");
  }

  #[test]
  fn invalid_utf8_past_the_prefix_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let mut bytes = b"{\"a\":1}\n".repeat(2000);
    bytes.extend_from_slice(b"{\"a\":\"\xff\"}\n");
    let path = write_file(&dir, "u.ndjson", &bytes);
    let results: Vec<_> = read_as_text_or_blobs(&path)
      .unwrap()
      .into_profiles()
      .unwrap()
      .collect();
    assert_eq!(results.len(), 2001);
    let err = results[2000].as_ref().unwrap_err();
    assert!(matches!(err, Error::Decode { .. }), "{err}");
    assert!(err.to_string().contains("line 2001"), "{err}");
  }

  #[test]
  fn missing_file_names_the_path() {
    let err = read_as_text_or_blobs("/definitely/not/here.ndjson").unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.ndjson"));
  }
}
