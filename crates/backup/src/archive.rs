//! ZIP layout of a database snapshot archive.
//!
//! ```text
//! db.sqlite3          the database snapshot
//! assets/<name>/...   optional auxiliary files
//! ```

use crate::error::BackupError;
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Entry name of the database inside an archive.
pub const DATABASE_ENTRY: &str = "db.sqlite3";

/// Directory prefix of auxiliary files inside an archive.
pub const ASSETS_PREFIX: &str = "assets";

/// First 16 bytes of every SQLite 3 database file.
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
const DATABASE_EXTENSIONS: [&str; 3] = [".sqlite3", ".db", ".sqlite"];

pub fn is_sqlite(bytes: &[u8]) -> bool {
    bytes.starts_with(SQLITE_HEADER)
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Packs a database snapshot and the given asset paths into a ZIP.
///
/// Each asset path may be a file or a directory; it is stored under
/// `assets/<file name>/`. Missing asset paths are skipped with a warning.
pub fn build_archive(database: &[u8], assets: &[PathBuf]) -> Result<Vec<u8>, BackupError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(DATABASE_ENTRY, options())?;
    writer.write_all(database)?;

    for asset in assets {
        let Some(name) = asset.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %asset.display(), "Skipping asset without a usable name.");
            continue;
        };
        if !asset.exists() {
            tracing::warn!(path = %asset.display(), "Skipping missing asset.");
            continue;
        }
        add_path(&mut writer, asset, &format!("{ASSETS_PREFIX}/{name}"))?;
    }

    Ok(writer.finish()?.into_inner())
}

fn add_path(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    path: &Path,
    entry: &str,
) -> Result<(), BackupError> {
    if path.is_dir() {
        let mut children: Vec<_> = fs::read_dir(path)?.collect::<Result<_, _>>()?;
        children.sort_by_key(|c| c.file_name());
        for child in children {
            let child_name = child.file_name();
            let Some(child_name) = child_name.to_str() else {
                continue;
            };
            add_path(writer, &child.path(), &format!("{entry}/{child_name}"))?;
        }
    } else {
        writer.start_file(entry, options())?;
        writer.write_all(&fs::read(path)?)?;
    }
    Ok(())
}

/// Picks the database entry: `db.sqlite3` if present (at any depth), else
/// the first entry with a database file extension.
fn find_database_entry<R: Read + Seek>(archive: &ZipArchive<R>) -> Option<String> {
    let names: Vec<&str> = (0..archive.len())
        .filter_map(|i| archive.name_for_index(i))
        .filter(|name| !name.ends_with('/'))
        .collect();

    let file_name = |entry: &str| entry.rsplit('/').next().unwrap_or(entry).to_string();
    if let Some(name) = names.iter().find(|n| file_name(n) == DATABASE_ENTRY) {
        return Some(name.to_string());
    }
    names
        .iter()
        .find(|n| {
            let lower = n.to_lowercase();
            DATABASE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        })
        .map(|n| n.to_string())
}

/// Reads at most `limit` bytes of an archive entry. The declared size of an
/// entry is not trusted; a larger stream is rejected once it passes `limit`.
pub(crate) fn read_capped<R: Read>(
    reader: R,
    limit: u64,
    entry: &str,
) -> Result<Vec<u8>, BackupError> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| BackupError::Validation(format!("corrupt entry '{entry}': {e}")))?;
    if bytes.len() as u64 > limit {
        return Err(too_large(entry, limit));
    }
    Ok(bytes)
}

fn too_large(entry: &str, limit: u64) -> BackupError {
    BackupError::Validation(format!("'{entry}' is larger than the {limit} byte limit"))
}

/// Returns the database bytes carried by an uploaded payload.
///
/// Accepts a raw SQLite file or a ZIP holding one, no larger than `limit`
/// bytes once unpacked. Fails with `BackupError::Validation` for anything
/// else.
pub fn extract_database(payload: &[u8], limit: u64) -> Result<Vec<u8>, BackupError> {
    if is_sqlite(payload) {
        if payload.len() as u64 > limit {
            return Err(too_large("upload", limit));
        }
        return Ok(payload.to_vec());
    }
    if !payload.starts_with(ZIP_MAGIC) {
        return Err(BackupError::Validation(
            "expected a ZIP archive or a SQLite database file".to_string(),
        ));
    }

    let mut archive = ZipArchive::new(Cursor::new(payload))
        .map_err(|e| BackupError::Validation(format!("corrupt ZIP archive: {e}")))?;
    let entry = find_database_entry(&archive).ok_or_else(|| {
        BackupError::Validation(
            "the archive contains no database (db.sqlite3, *.sqlite3, *.db, *.sqlite)".to_string(),
        )
    })?;

    let file = archive
        .by_name(&entry)
        .map_err(|e| BackupError::Validation(format!("cannot open '{entry}': {e}")))?;
    let bytes = read_capped(file, limit, &entry)?;

    if !is_sqlite(&bytes) {
        return Err(BackupError::Validation(format!(
            "'{entry}' is not a SQLite database"
        )));
    }
    tracing::debug!(entry = %entry, bytes = bytes.len(), "Database entry extracted.");
    Ok(bytes)
}

/// Names of all entries in a ZIP, in archive order.
pub fn entry_names(archive: &[u8]) -> Result<Vec<String>, BackupError> {
    let archive = ZipArchive::new(Cursor::new(archive))?;
    Ok((0..archive.len())
        .filter_map(|i| archive.name_for_index(i).map(str::to_string))
        .collect())
}
