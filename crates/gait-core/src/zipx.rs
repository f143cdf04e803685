// crates/gait-core/src/zipx.rs
// ============================================================================
// Module: Deterministic Archives
// Description: Byte-stable zip writing and plain zip reading.
// Purpose: Make archive bytes a function of the entry set alone.
// Dependencies: zip
// ============================================================================

//! ## Overview
//! Archive bytes depend only on the `{path, data, mode}` triples: entries
//! are sorted by path, timestamps are pinned to the DOS epoch
//! (1980-01-01T00:00:00Z), modes normalize to 0o755 or 0o644, paths use
//! forward slashes, and the method is DEFLATE. An empty entry set yields
//! zero output bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use std::path::Path;

use thiserror::Error;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::FileOptions;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A single archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Entry path inside the archive (forward slashes after normalization).
    pub path: String,
    /// Entry payload bytes.
    pub data: Vec<u8>,
    /// Unix mode bits; 0 and non-executable modes normalize to 0o644.
    pub mode: u32,
}

/// Errors raised while writing or reading archives.
#[derive(Debug, Error)]
pub enum ZipxError {
    /// Underlying zip container error.
    #[error("zip container: {0}")]
    Container(#[from] zip::result::ZipError),
    /// Archive I/O failed.
    #[error("archive io: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Writes a byte-stable zip over the provided entries.
///
/// # Errors
///
/// Returns [`ZipxError`] when the container or the writer fails.
pub fn write_deterministic_zip<W: Write + Seek>(
    writer: W,
    entries: &[ZipEntry],
) -> Result<(), ZipxError> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut sorted: Vec<&ZipEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut zip = ZipWriter::new(writer);
    for entry in sorted {
        // zip::DateTime::default() is the DOS epoch, 1980-01-01T00:00:00.
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(normalize_mode(entry.mode));
        zip.start_file(entry.path.replace('\\', "/"), options)?;
        zip.write_all(&entry.data)?;
    }
    zip.finish()?;
    Ok(())
}

/// Normalizes a unix mode to 0o755 when any execute bit is set, else 0o644.
const fn normalize_mode(mode: u32) -> u32 {
    if mode & 0o111 != 0 { 0o755 } else { 0o644 }
}

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Reads all archive entries into a path-ordered map.
///
/// # Errors
///
/// Returns [`ZipxError`] when the file cannot be opened or the container is
/// malformed.
pub fn read_zip_entries(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, ZipxError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut out = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut data)?;
        out.insert(entry.name().to_string(), data);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn entry(path: &str, data: &[u8], mode: u32) -> ZipEntry {
        ZipEntry {
            path: path.to_string(),
            data: data.to_vec(),
            mode,
        }
    }

    #[test]
    fn empty_input_writes_zero_bytes() {
        let mut buf = Cursor::new(Vec::new());
        write_deterministic_zip(&mut buf, &[]).expect("write empty");
        assert!(buf.into_inner().is_empty());
    }

    #[test]
    fn output_is_independent_of_entry_order() {
        let a = entry("a.json", b"{}", 0);
        let b = entry("b.json", b"[]", 0o644);

        let mut first = Cursor::new(Vec::new());
        write_deterministic_zip(&mut first, &[a.clone(), b.clone()]).expect("write first");
        let mut second = Cursor::new(Vec::new());
        write_deterministic_zip(&mut second, &[b, a]).expect("write second");

        assert_eq!(first.into_inner(), second.into_inner());
    }

    #[test]
    fn repeated_writes_are_byte_identical() {
        let entries = vec![entry("run.json", b"{\"run_id\":\"r\"}", 0o755)];
        let mut first = Cursor::new(Vec::new());
        write_deterministic_zip(&mut first, &entries).expect("write first");
        let mut second = Cursor::new(Vec::new());
        write_deterministic_zip(&mut second, &entries).expect("write second");
        assert_eq!(first.into_inner(), second.into_inner());
    }

    #[test]
    fn backslash_paths_normalize_to_forward_slashes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("archive.zip");
        let file = std::fs::File::create(&path).expect("create");
        write_deterministic_zip(file, &[entry("sub\\inner.json", b"{}", 0)]).expect("write");

        let entries = read_zip_entries(&path).expect("read");
        assert!(entries.contains_key("sub/inner.json"));
    }

    #[test]
    fn round_trip_preserves_entry_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("archive.zip");
        let file = std::fs::File::create(&path).expect("create");
        write_deterministic_zip(
            file,
            &[entry("manifest.json", br#"{"run_id":"run_demo"}"#, 0)],
        )
        .expect("write");

        let entries = read_zip_entries(&path).expect("read");
        assert_eq!(
            entries.get("manifest.json").map(Vec::as_slice),
            Some(br#"{"run_id":"run_demo"}"#.as_slice())
        );
    }
}
