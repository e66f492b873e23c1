//! Fixed-width bloom codec with sectored single-hash probing.
//!
//! Each indexed value contributes exactly four set bits, one per quarter
//! of the filter ("sector"). All four probe positions are carved from a
//! single seeded 32-bit hash, one byte at a time, so encoding a value
//! costs one hash evaluation regardless of filter width. Probes drawn
//! from disjoint sectors keep bit clustering low.
//!
//! Approximate false-positive rates at width 128:
//! 10 values: 2.15e-6, 20 values: 3.19e-5, 30 values: 1.50e-4.
//!
//! Containment is byte-wise superset: a needle matches a haystack iff
//! every bit set in the needle is also set in the haystack. The empty
//! value set encodes to the all-zero filter, which every haystack
//! contains.

use xxhash_rust::xxh32::xxh32;

use crate::format::{FilterWidth, HASH_SEED};

/// Number of sectors per filter (one probe bit each).
const SECTORS: usize = 4;

/// Derive probe positions from a 32-bit hash.
///
/// Sector `s` consumes hash byte `s` as a bit position within the
/// sector's first 256 bits. Returns (sector, bit position) pairs.
fn probe_positions(mut hash: u32) -> [(usize, u8); SECTORS] {
    let mut probes = [(0usize, 0u8); SECTORS];
    for (sector, probe) in probes.iter_mut().enumerate() {
        *probe = (sector, (hash & 0xFF) as u8);
        hash >>= 8;
    }
    probes
}

/// Fixed-width bloom filter over a multi-valued attribute set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    width: FilterWidth,
    bytes: Vec<u8>,
}

impl BloomFilter {
    /// Create an empty (all-zero) filter.
    pub fn new(width: FilterWidth) -> Self {
        Self {
            width,
            bytes: vec![0u8; width.bytes()],
        }
    }

    /// Encode a list of values into a fresh filter.
    pub fn from_values<V: AsRef<[u8]>>(width: FilterWidth, values: &[V]) -> Self {
        let mut filter = Self::new(width);
        for value in values {
            filter.insert(value.as_ref());
        }
        filter
    }

    /// Insert a single value (sets one bit per sector).
    pub fn insert(&mut self, value: &[u8]) {
        let sector_bytes = self.width.sector_bytes();
        let hash = xxh32(value, HASH_SEED);
        for (sector, pos) in probe_positions(hash) {
            let byte = sector * sector_bytes + (pos as usize) / 8;
            self.bytes[byte] |= 1 << (pos % 8);
        }
    }

    /// Test whether every bit set in `needle` is also set in `self`.
    ///
    /// Both filters must share a width; the all-zero needle is contained
    /// in every haystack.
    pub fn contains(&self, needle: &BloomFilter) -> bool {
        debug_assert_eq!(self.width, needle.width, "filter width mismatch");
        self.bytes
            .iter()
            .zip(&needle.bytes)
            .all(|(h, n)| h & n == *n)
    }

    /// Whether no bits are set (the encoding of the empty value set).
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    /// Filter width.
    pub fn width(&self) -> FilterWidth {
        self.width
    }

    /// Raw filter bytes (length = width).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
