//! Lineage Tiered Storage + Delta Compression (spec §4.11): HOT/WARM/COLD
//! entry storage with trust/age-driven migration, and a delta-compressed
//! snapshot chain per capsule.

mod delta;
mod error;
mod tier;

pub use delta::{
    CompressionStats, DeltaCompressor, DiffEntry, DiffOperation, LineageDiff, LineageSnapshot,
};
pub use error::LineageError;
pub use tier::{LineageEntry, MigrationReport, StorageTier, TierConfig, TierStats, TieredLineageStorage};

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

pub(crate) fn compress_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).expect("writing to an in-memory encoder never fails");
    encoder.finish().expect("finishing an in-memory encoder never fails")
}

pub(crate) fn decompress_bytes(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
