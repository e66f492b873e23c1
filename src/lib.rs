//! Single-file bloom filter index for superset queries.
//!
//! Maps 32-bit primary keys to fixed-width bloom filters summarizing a
//! multi-valued attribute set, and answers "which PKs index a superset
//! of these values" by AND-scanning a bit-sliced page layout. Built as a
//! coarse filter in front of an authoritative store: false positives are
//! possible and bounded, false negatives are not.
//!
//! ```no_run
//! use bloomfile::{BloomIndex, FilterWidth};
//!
//! # fn main() -> bloomfile::Result<()> {
//! let mut index = BloomIndex::open("products.bfi", FilterWidth::W128)?;
//! index.insert(1, &["red", "cotton", "shirt"])?;
//! index.insert(2, &["red", "leather", "boot"])?;
//!
//! // every PK whose values contain both "red" and "cotton"
//! let hits = index.lookup(&["red", "cotton"])?;
//! assert_eq!(hits, vec![1]);
//! index.close()?;
//! # Ok(())
//! # }
//! ```

pub mod bloom;
pub mod error;
pub mod format;
pub mod index;
mod pager;

pub use bloom::BloomFilter;
pub use error::{IndexError, Result};
pub use format::FilterWidth;
pub use index::{BloomIndex, IndexStats};
