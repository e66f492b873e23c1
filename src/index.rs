//! Bloom index handle and operations.
//!
//! `BloomIndex` owns the file descriptor and mapping for one index file
//! and provides the full operation set: `append` (bulk fast path),
//! `insert` (upsert by primary key), `delete` (tombstoning), `lookup`
//! (superset query), `sync`, `stat`, `close`.
//!
//! The handle is single-threaded and single-writer. Sharing one file
//! between handles or processes is undefined: both would map it shared
//! and mutate the header without seeing each other's record counter.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bloom::BloomFilter;
use crate::error::{IndexError, Result};
use crate::format::{FilterWidth, IndexHeader, HEADER_SIZE, PK_SIZE, RECORDS_PER_PAGE};
use crate::pager::{read_u32_at, Pager};

// ── Open Helpers ───────────────────────────────────────────────────

/// Read up to a full header, tolerating short reads. Returns bytes read.
fn read_header_bytes(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Derive the tombstone count by scanning PK columns for zero keys
/// within the occupied slot range. Plain reads; the mapping stays
/// unallocated until the first page access.
fn scan_tombstones(
    file: &mut File,
    width: FilterWidth,
    records: u32,
    total_pages: usize,
) -> Result<u32> {
    if records == 0 {
        return Ok(0);
    }
    let page_size = width.page_size();
    let mut pk_column = vec![0u8; PK_SIZE * RECORDS_PER_PAGE];
    let mut remaining = records as usize;
    let mut deleted = 0u32;
    for page in 0..total_pages {
        if remaining == 0 {
            break;
        }
        file.seek(SeekFrom::Start((HEADER_SIZE + page * page_size) as u64))?;
        file.read_exact(&mut pk_column)?;
        let slots = remaining.min(RECORDS_PER_PAGE);
        for r in 0..slots {
            if read_u32_at(&pk_column, r * PK_SIZE) == 0 {
                deleted += 1;
            }
        }
        remaining -= slots;
    }
    Ok(deleted)
}

// ── Stats ──────────────────────────────────────────────────────────

/// Snapshot of index counters and geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub version: u8,
    /// Live records (occupied slots minus tombstones).
    pub records: u32,
    pub pages: usize,
    pub records_per_page: usize,
    /// Filter width in bytes.
    pub bloom_size: usize,
    pub page_size: usize,
    /// File size including the one-byte growth sentinel.
    pub size: u64,
}

// ── BloomIndex ─────────────────────────────────────────────────────

/// Open handle on a single-file bloom index.
#[derive(Debug)]
pub struct BloomIndex {
    header: IndexHeader,
    deleted: u32,
    dirty: bool,
    pager: Pager,
}

impl BloomIndex {
    /// Open an index file, creating it if absent (mode 0600 on unix).
    ///
    /// An existing file must carry the expected magic, version, and the
    /// same filter width the caller requests.
    pub fn open(path: impl AsRef<Path>, width: FilterWidth) -> Result<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(path.as_ref())?;

        let mut buf = [0u8; HEADER_SIZE];
        let n = read_header_bytes(&mut file, &mut buf)?;

        let header = if n == 0 {
            let header = IndexHeader::new(width);
            header.write_to(&mut file)?;
            header
        } else if n < HEADER_SIZE {
            return Err(IndexError::InvalidFormat("Header truncated".into()));
        } else {
            let header = IndexHeader::from_bytes(&buf)?;
            if header.format != width {
                return Err(IndexError::FormatMismatch {
                    file: header.format as u16,
                    requested: width as u16,
                });
            }
            header
        };

        let total_pages = if header.records == 0 {
            0
        } else {
            header.records as usize / RECORDS_PER_PAGE + 1
        };
        let deleted = scan_tombstones(&mut file, header.format, header.records, total_pages)?;

        Ok(Self {
            header,
            deleted,
            dirty: false,
            pager: Pager::new(file, width, total_pages),
        })
    }

    /// Filter width of this index.
    pub fn width(&self) -> FilterWidth {
        self.header.format
    }

    /// Occupied slots, tombstones included.
    pub fn records(&self) -> u32 {
        self.header.records
    }

    /// Current tombstone count.
    pub fn deleted(&self) -> u32 {
        self.deleted
    }

    /// Append a record at the end of the index without checking whether
    /// the PK already exists. Duplicate PKs produce duplicate entries;
    /// intended for bulk rebuild from an authoritative source.
    pub fn append<V: AsRef<[u8]>>(&mut self, pk: u32, values: &[V]) -> Result<()> {
        if pk == 0 {
            return Err(IndexError::ReservedPk);
        }
        if values.is_empty() {
            return Err(IndexError::EmptyValues);
        }
        let filter = BloomFilter::from_values(self.header.format, values);
        let offset = self.allocate_slot()?;
        self.pager.write_slot(offset, pk, filter.as_bytes());
        self.dirty = true;
        Ok(())
    }

    /// Insert or update the value set for a PK.
    ///
    /// An existing record is overwritten in place; otherwise a tombstone
    /// slot is reused when available, else a new slot is allocated at
    /// the end.
    pub fn insert<V: AsRef<[u8]>>(&mut self, pk: u32, values: &[V]) -> Result<()> {
        if pk == 0 {
            return Err(IndexError::ReservedPk);
        }
        if values.is_empty() {
            return Err(IndexError::EmptyValues);
        }
        let filter = BloomFilter::from_values(self.header.format, values);

        let offset = match self.seek_pk(pk)? {
            Some(offset) => offset,
            None if self.deleted > 0 => match self.seek_pk(0)? {
                Some(offset) => {
                    self.deleted -= 1;
                    offset
                }
                None => {
                    tracing::warn!(
                        deleted = self.deleted,
                        "tombstone count set but no tombstone slot found"
                    );
                    self.deleted = 0;
                    self.allocate_slot()?
                }
            },
            None => self.allocate_slot()?,
        };

        self.pager.write_slot(offset, pk, filter.as_bytes());
        self.dirty = true;
        Ok(())
    }

    /// Delete a PK. Returns `Ok(false)` when the PK is absent. The slot
    /// becomes a tombstone (PK 0, all-zero filter) available for reuse
    /// by a future `insert`; `records` is not decremented.
    pub fn delete(&mut self, pk: u32) -> Result<bool> {
        if pk == 0 {
            return Err(IndexError::ReservedPk);
        }
        match self.seek_pk(pk)? {
            None => Ok(false),
            Some(offset) => {
                let tombstone = BloomFilter::new(self.header.format);
                self.pager.write_slot(offset, 0, tombstone.as_bytes());
                self.deleted += 1;
                self.dirty = true;
                Ok(true)
            }
        }
    }

    /// Return the PKs of all records whose indexed values are a superset
    /// of `values`, in (page, offset) order. False positives are
    /// possible within the codec's error rate; false negatives are not.
    ///
    /// An empty query encodes to the all-zero filter and matches every
    /// live record.
    pub fn lookup<V: AsRef<[u8]>>(&mut self, values: &[V]) -> Result<Vec<u32>> {
        let query = BloomFilter::from_values(self.header.format, values);
        let mut result = Vec::new();

        for page in 0..self.pager.total_pages() {
            self.pager.load_page(page)?;
            let mut matches = [true; RECORDS_PER_PAGE];

            for (b, &qb) in query.as_bytes().iter().enumerate() {
                if qb == 0 {
                    continue; // stripe cannot exclude any record
                }
                let stripe = self.pager.stripe(b);
                for (m, &cell) in matches.iter_mut().zip(stripe) {
                    if cell & qb != qb {
                        *m = false;
                    }
                }
            }

            for (r, &hit) in matches.iter().enumerate() {
                if hit {
                    let pk = self.pager.pk_at(r);
                    if pk != 0 {
                        result.push(pk);
                    }
                }
            }
        }

        Ok(result)
    }

    /// Flush the active page and header to disk (best-effort durability).
    /// Returns the occupied slot count.
    pub fn sync(&mut self) -> Result<u32> {
        if self.pager.is_mapped() {
            self.pager.write_header(&self.header.to_bytes());
            self.pager.sync()?;
        }
        self.dirty = false;
        Ok(self.header.records)
    }

    /// Sync and release the handle. Dropping without `close` performs a
    /// best-effort sync that swallows errors.
    pub fn close(mut self) -> Result<()> {
        self.sync()?;
        Ok(())
    }

    /// Snapshot counters and geometry.
    pub fn stat(&self) -> IndexStats {
        let page_size = self.header.format.page_size();
        IndexStats {
            version: self.header.version,
            records: self.header.records - self.deleted,
            pages: self.pager.total_pages(),
            records_per_page: RECORDS_PER_PAGE,
            bloom_size: self.header.format.bytes(),
            page_size,
            size: (HEADER_SIZE + page_size * self.pager.total_pages() + 1) as u64,
        }
    }

    // ── Internal ───────────────────────────────────────────────────

    /// Scan pages in order for a PK. On a hit the matching page is left
    /// active and the slot offset returned; first match wins.
    fn seek_pk(&mut self, pk: u32) -> Result<Option<usize>> {
        for page in 0..self.pager.total_pages() {
            self.pager.load_page(page)?;
            for r in 0..RECORDS_PER_PAGE {
                if self.pager.pk_at(r) == pk {
                    return Ok(Some(r));
                }
            }
        }
        Ok(None)
    }

    /// Claim the next slot at the end of the index, growing the file
    /// when the record lands on a fresh page. The slot's page is left
    /// active.
    fn allocate_slot(&mut self) -> Result<usize> {
        let records = self.header.records as usize;
        let page = records / RECORDS_PER_PAGE;
        let offset = records % RECORDS_PER_PAGE;
        self.pager.load_page(page)?;
        self.header.records += 1;
        Ok(offset)
    }
}

impl Drop for BloomIndex {
    fn drop(&mut self) {
        if self.dirty {
            let _ = self.sync();
        }
    }
}
