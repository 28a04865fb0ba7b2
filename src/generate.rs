//! Deterministic payload files for the benchmark catalog.
//!
//! Payload content is pseudo-random so neither the ledger transport nor the
//! content store can compress it away. Each file is cut into fixed-size
//! blocks and every block draws from its own ChaCha8 stream seeded from the
//! master seed and the block index, so blocks can be filled in parallel and
//! the same seed always reproduces the same bytes.

use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::catalog::{file_name_for, parse_size_label};

/// Bytes per independently seeded block.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Blocks generated in parallel before being flushed to disk.
const BLOCKS_PER_BATCH: usize = 64;

#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Size labels such as `100KB` or `5MB`.
    pub sizes: Vec<String>,
    /// Random seed for deterministic generation.
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct GeneratedPayload {
    pub path: PathBuf,
    pub size: u64,
}

fn per_block_seed(master_seed: u64, index: usize) -> u64 {
    master_seed
        .wrapping_add(index as u64)
        .wrapping_mul(0x517cc1b727220a95)
}

fn fill_block(seed: u64, index: usize, len: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(per_block_seed(seed, index));
    let mut block = vec![0u8; len];
    rng.fill_bytes(&mut block);
    block
}

fn block_len(size: u64, index: usize) -> usize {
    let start = index as u64 * BLOCK_SIZE as u64;
    (size - start).min(BLOCK_SIZE as u64) as usize
}

fn block_count(size: u64) -> usize {
    size.div_ceil(BLOCK_SIZE as u64) as usize
}

/// Whole payload in memory. Prefer [`write_payload_streaming`] for large sizes.
pub fn payload_bytes(size: u64, seed: u64) -> Vec<u8> {
    (0..block_count(size))
        .into_par_iter()
        .map(|i| fill_block(seed, i, block_len(size, i)))
        .collect::<Vec<_>>()
        .concat()
}

/// Write a payload of `size` bytes without holding it all in memory; peak
/// memory is bounded by one batch of blocks.
pub fn write_payload_streaming<P: AsRef<Path>>(path: P, size: u64, seed: u64) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(BLOCK_SIZE, file);

    let blocks = block_count(size);
    let mut start = 0usize;
    while start < blocks {
        let end = (start + BLOCKS_PER_BATCH).min(blocks);

        // Range is an IndexedParallelIterator; collect preserves order.
        let batch: Vec<Vec<u8>> = (start..end)
            .into_par_iter()
            .map(|i| fill_block(seed, i, block_len(size, i)))
            .collect();

        for block in &batch {
            writer.write_all(block)?;
        }
        start = end;
    }

    writer.flush()?;
    Ok(())
}

/// Write `file_<label>.bin` under `dir` for every configured size.
pub fn generate_payloads<P: AsRef<Path>>(dir: P, config: &GenerateConfig) -> io::Result<Vec<GeneratedPayload>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut out = Vec::with_capacity(config.sizes.len());
    for label in &config.sizes {
        let size = parse_size_label(label).map_err(io::Error::other)?;
        let path = dir.join(file_name_for(label));
        write_payload_streaming(&path, size, config.seed)?;
        out.push(GeneratedPayload { path, size });
    }
    Ok(out)
}
