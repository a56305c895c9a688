//! Loading and storing memory snapshots on disk.
//!
//! The encoding is picked from the file name: `*.json` is the JSON page table, anything else is
//! the binary page table. A trailing `.gz` gzips either encoding.

use anyhow::{Context, Result};
use cannonball_memory::Memory;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::{
    fs,
    io::{Read, Write},
    path::Path,
};

/// The encoding of a snapshot's page table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SnapshotFormat {
    /// The binary page table.
    Binary,
    /// The JSON page table.
    Json,
}

/// Returns the encoding of the snapshot at `path`, and whether it is gzipped.
pub(crate) fn snapshot_kind(path: &Path) -> (SnapshotFormat, bool) {
    let compressed = path.extension().is_some_and(|ext| ext == "gz");
    let inner = if compressed { path.file_stem().map(Path::new) } else { Some(path) };
    let format = match inner.and_then(Path::extension) {
        Some(ext) if ext == "json" => SnapshotFormat::Json,
        _ => SnapshotFormat::Binary,
    };
    (format, compressed)
}

/// Compresses a byte slice using gzip.
pub(crate) fn compress_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Decompresses a gzipped byte slice.
pub(crate) fn decompress_bytes(compressed_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed_bytes);
    let mut decompressed_bytes = Vec::with_capacity(compressed_bytes.len());
    decoder.read_to_end(&mut decompressed_bytes)?;
    Ok(decompressed_bytes)
}

/// Loads a memory snapshot from `path`.
pub(crate) fn load_snapshot(path: &Path) -> Result<Memory> {
    let (format, compressed) = snapshot_kind(path);
    tracing::info!(target: "cannonball-cli::snapshot", "Loading {:?} snapshot @ {}", format, path.display());

    let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let raw = if compressed { decompress_bytes(&raw)? } else { raw };

    let memory = match format {
        SnapshotFormat::Json => serde_json::from_slice(&raw)?,
        SnapshotFormat::Binary => Memory::deserialize_binary(raw.as_slice())?,
    };
    tracing::info!(target: "cannonball-cli::snapshot", "Loaded snapshot with {} pages ({})", memory.page_count(), memory.usage());
    Ok(memory)
}

/// Writes `memory` as a snapshot to `path`.
pub(crate) fn write_snapshot(path: &Path, memory: &Memory) -> Result<()> {
    let (format, compressed) = snapshot_kind(path);
    tracing::info!(target: "cannonball-cli::snapshot", "Writing {:?} snapshot @ {}", format, path.display());

    let mut encoded = Vec::with_capacity(memory.usage_raw() as usize);
    match format {
        SnapshotFormat::Json => serde_json::to_writer(&mut encoded, memory)?,
        SnapshotFormat::Binary => memory.serialize_binary(&mut encoded)?,
    }
    let encoded = if compressed { compress_bytes(&encoded)? } else { encoded };

    fs::write(path, encoded).with_context(|| format!("Failed to write {}", path.display()))
}
