//! Memory-mapped page storage.
//!
//! An index file is the 12-byte header followed by fixed-size pages. One
//! shared read/write mapping covers the whole file; a cursor selects the
//! active page whose columns are addressable. Growth is append-only at
//! page granularity: asking for a page past the end extends the file by
//! seeking to the new page's end and writing a single zero byte, then
//! remapping on the next access.
//!
//! Within a page the PK column (`u32` × 512) comes first, then one
//! 512-byte stripe per filter byte: byte `b` of record `r` lives at page
//! offset `2048 + b·512 + r`. Lookup tests one query byte against a whole
//! stripe at a time, which is the point of the layout.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use memmap2::{MmapMut, MmapOptions};

use crate::error::Result;
use crate::format::{FilterWidth, HEADER_SIZE, PK_SIZE, RECORDS_PER_PAGE};

/// Read u32 from byte slice at offset (little-endian).
#[inline]
pub(crate) fn read_u32_at(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// Paged view over the index file with an active-page cursor.
#[derive(Debug)]
pub struct Pager {
    file: File,
    map: Option<MmapMut>,
    width: FilterWidth,
    total_pages: usize,
    current_page: Option<usize>,
}

impl Pager {
    /// Wrap an opened index file. The mapping stays unallocated until the
    /// first `load_page` call.
    pub fn new(file: File, width: FilterWidth, total_pages: usize) -> Self {
        Self {
            file,
            map: None,
            width,
            total_pages,
            current_page: None,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn current_page(&self) -> Option<usize> {
        self.current_page
    }

    pub fn is_mapped(&self) -> bool {
        self.map.is_some()
    }

    fn page_size(&self) -> usize {
        self.width.page_size()
    }

    /// Make `page` the active page, growing the file when it lies past
    /// the end. Switching away from a previously active page flushes
    /// that page's range first.
    pub fn load_page(&mut self, page: usize) -> Result<()> {
        if self.current_page == Some(page) {
            return Ok(());
        }
        if let (Some(prev), Some(map)) = (self.current_page, self.map.as_ref()) {
            map.flush_range(HEADER_SIZE + prev * self.page_size(), self.page_size())?;
        }
        if page >= self.total_pages {
            self.grow_to(page + 1)?;
        }
        self.ensure_mapped()?;
        self.current_page = Some(page);
        Ok(())
    }

    /// Extend the file to cover pages `[0, new_total)` by writing a zero
    /// byte at the new end offset. Unmaps; the next access remaps.
    fn grow_to(&mut self, new_total: usize) -> Result<()> {
        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        let end = HEADER_SIZE + new_total * self.page_size();
        self.file.seek(SeekFrom::Start(end as u64))?;
        self.file.write_all(&[0u8])?;
        self.total_pages = new_total;
        tracing::debug!(pages = new_total, "extended index file");
        Ok(())
    }

    fn ensure_mapped(&mut self) -> Result<()> {
        if self.map.is_some() {
            return Ok(());
        }
        let len = HEADER_SIZE + self.total_pages * self.page_size();
        if self.file.metadata()?.len() < len as u64 {
            // Reopened file whose trailing page only reaches the growth
            // sentinel; extend so the mapping is fully file-backed. The
            // new bytes are zero, i.e. reserved slots.
            self.file.set_len(len as u64)?;
            tracing::debug!(len, "extended index file to full page boundary");
        }
        let map = unsafe { MmapOptions::new().len(len).map_mut(&self.file)? };
        self.map = Some(map);
        Ok(())
    }

    /// Flush the active page and the header region. No-op before the
    /// first page access.
    pub fn sync(&self) -> Result<()> {
        let Some(map) = self.map.as_ref() else {
            return Ok(());
        };
        if let Some(page) = self.current_page {
            map.flush_range(HEADER_SIZE + page * self.page_size(), self.page_size())?;
        }
        map.flush_range(0, HEADER_SIZE)?;
        Ok(())
    }

    /// Copy header bytes into the mapped file. No-op before the first
    /// page access (the header can only change alongside page writes).
    pub fn write_header(&mut self, bytes: &[u8; HEADER_SIZE]) {
        if let Some(map) = self.map.as_mut() {
            map[..HEADER_SIZE].copy_from_slice(bytes);
        }
    }

    // ── Active page column access ──────────────────────────────────

    fn active(&self) -> (&[u8], usize) {
        let page = self.current_page.expect("no active page");
        let map = self.map.as_ref().expect("page accessed before load");
        (map, HEADER_SIZE + page * self.page_size())
    }

    /// Primary key of the slot at `offset` in the active page.
    pub fn pk_at(&self, offset: usize) -> u32 {
        debug_assert!(offset < RECORDS_PER_PAGE);
        let (map, start) = self.active();
        read_u32_at(map, start + offset * PK_SIZE)
    }

    /// The stripe holding filter byte `byte` of every record in the
    /// active page (exactly `RECORDS_PER_PAGE` bytes).
    pub fn stripe(&self, byte: usize) -> &[u8] {
        debug_assert!(byte < self.width.bytes());
        let (map, start) = self.active();
        let stripe_start = start + PK_SIZE * RECORDS_PER_PAGE + byte * RECORDS_PER_PAGE;
        &map[stripe_start..stripe_start + RECORDS_PER_PAGE]
    }

    /// Write a slot in the active page: PK into the key column, filter
    /// bytes scattered across the stripes.
    pub fn write_slot(&mut self, offset: usize, pk: u32, filter: &[u8]) {
        debug_assert!(offset < RECORDS_PER_PAGE);
        debug_assert_eq!(filter.len(), self.width.bytes());
        let page_size = self.page_size();
        let page = self.current_page.expect("no active page");
        let map = self.map.as_mut().expect("page accessed before load");
        let start = HEADER_SIZE + page * page_size;

        let pk_start = start + offset * PK_SIZE;
        map[pk_start..pk_start + PK_SIZE].copy_from_slice(&pk.to_le_bytes());

        let stripes = start + PK_SIZE * RECORDS_PER_PAGE;
        for (b, &byte) in filter.iter().enumerate() {
            map[stripes + b * RECORDS_PER_PAGE + offset] = byte;
        }
    }
}
