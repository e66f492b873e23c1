//! Integration test: core operation semantics.
//!
//! Validates that:
//! - insert/lookup round-trips (no false negatives, superset matching)
//! - upsert replaces old values in place
//! - delete tombstones a slot and a later insert reuses it
//! - the index grows by whole pages and results keep insertion order
//! - stripe pruning never changes the match set

use bloomfile::{BloomFilter, BloomIndex, FilterWidth};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_index(dir: &TempDir, name: &str) -> BloomIndex {
    BloomIndex::open(dir.path().join(name), FilterWidth::W128).unwrap()
}

// ---------------------------------------------------------------------------
// Tests: Insert and Lookup
// ---------------------------------------------------------------------------

#[test]
fn single_insert_and_lookup() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "t1.bfi");

    index.insert(1, &["alpha", "beta", "gamma"]).unwrap();
    index.sync().unwrap();

    assert_eq!(index.lookup(&["beta"]).unwrap(), vec![1]);
    assert_eq!(index.lookup(&["alpha", "gamma"]).unwrap(), vec![1]);
    assert_eq!(index.lookup(&["delta"]).unwrap(), Vec::<u32>::new());
    assert_eq!(index.stat().records, 1);
}

#[test]
fn lookup_requires_superset_of_query() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "superset.bfi");

    index.insert(1, &["red", "cotton", "shirt"]).unwrap();
    index.insert(2, &["red", "leather", "boot"]).unwrap();

    assert_eq!(index.lookup(&["red"]).unwrap(), vec![1, 2]);
    assert_eq!(index.lookup(&["red", "cotton"]).unwrap(), vec![1]);
    assert_eq!(
        index.lookup(&["red", "cotton", "boot"]).unwrap(),
        Vec::<u32>::new()
    );
}

#[test]
fn no_false_negatives_across_many_records() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "many.bfi");

    for pk in 1..=50u32 {
        let values: Vec<String> = (0..5).map(|v| format!("r{}-f{}", pk, v)).collect();
        index.insert(pk, &values).unwrap();
    }

    for pk in 1..=50u32 {
        // any subset of the indexed values must match
        let hits = index.lookup(&[format!("r{}-f3", pk)]).unwrap();
        assert!(hits.contains(&pk), "missing pk {}", pk);
        let hits = index
            .lookup(&[format!("r{}-f0", pk), format!("r{}-f4", pk)])
            .unwrap();
        assert!(hits.contains(&pk), "missing pk {} on pair query", pk);
    }
}

// ---------------------------------------------------------------------------
// Tests: Upsert
// ---------------------------------------------------------------------------

#[test]
fn upsert_replaces_old_values() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "upsert.bfi");

    index.insert(7, &["x", "y"]).unwrap();
    index.insert(7, &["z"]).unwrap();

    assert_eq!(index.lookup(&["x"]).unwrap(), Vec::<u32>::new());
    assert_eq!(index.lookup(&["z"]).unwrap(), vec![7]);
    assert_eq!(index.stat().records, 1);
}

#[test]
fn repeated_upsert_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "idem.bfi");

    index.insert(5, &["a", "b"]).unwrap();
    let after_first = index.stat().records;
    index.insert(5, &["a", "b"]).unwrap();
    index.insert(5, &["a", "b"]).unwrap();

    assert_eq!(index.stat().records, after_first);
    assert_eq!(index.lookup(&["a"]).unwrap(), vec![5]);
}

// ---------------------------------------------------------------------------
// Tests: Delete and Tombstone Reuse
// ---------------------------------------------------------------------------

#[test]
fn delete_then_reuse_slot() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "reuse.bfi");

    index.insert(1, &["a"]).unwrap();
    index.insert(2, &["b"]).unwrap();
    assert!(index.delete(1).unwrap());
    index.insert(3, &["c"]).unwrap();

    assert_eq!(index.lookup(&["a"]).unwrap(), Vec::<u32>::new());
    assert_eq!(index.lookup(&["b"]).unwrap(), vec![2]);
    assert!(index.lookup(&["c"]).unwrap().contains(&3));
    assert_eq!(index.stat().records, 2);
    // the second insert reused the tombstone: no new slot
    assert_eq!(index.records(), 2);
    assert_eq!(index.deleted(), 0);
}

#[test]
fn delete_missing_pk_reports_absent() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "missing.bfi");

    index.insert(1, &["a"]).unwrap();
    assert!(!index.delete(42).unwrap());
    assert_eq!(index.stat().records, 1);
}

#[test]
fn deleted_pk_never_emitted() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "emit.bfi");

    for pk in 1..=10u32 {
        index
            .insert(pk, &["shared".to_string(), format!("own-{}", pk)])
            .unwrap();
    }
    index.delete(4).unwrap();
    index.delete(9).unwrap();

    let hits = index.lookup(&["shared"]).unwrap();
    assert_eq!(hits, vec![1, 2, 3, 5, 6, 7, 8, 10]);
    assert!(!hits.contains(&0));
}

// ---------------------------------------------------------------------------
// Tests: Page Growth and Ordering
// ---------------------------------------------------------------------------

#[test]
fn cross_page_growth() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("growth.bfi");
    let mut index = BloomIndex::open(&path, FilterWidth::W128).unwrap();

    for pk in 1..=600u32 {
        index.append(pk, &[format!("v{}", pk)]).unwrap();
    }

    let stats = index.stat();
    assert_eq!(stats.records, 600);
    assert_eq!(stats.pages, 2);
    // header + two pages + growth sentinel
    assert_eq!(stats.size, (12 + 2 * 67_584 + 1) as u64);

    assert_eq!(index.lookup(&["v300"]).unwrap(), vec![300]);
    assert_eq!(index.lookup(&["v513"]).unwrap(), vec![513]);
    index.close().unwrap();

    assert_eq!(
        std::fs::metadata(&path).unwrap().len(),
        (12 + 2 * 67_584 + 1) as u64
    );
}

#[test]
fn lookup_keeps_insertion_order() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "order.bfi");

    for pk in [40u32, 10, 30, 20] {
        index.insert(pk, &["common"]).unwrap();
    }

    assert_eq!(index.lookup(&["common"]).unwrap(), vec![40, 10, 30, 20]);
}

// ---------------------------------------------------------------------------
// Tests: Wide Filters (W256)
// ---------------------------------------------------------------------------

#[test]
fn wide_filter_full_lifecycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wide.bfi");

    {
        let mut index = BloomIndex::open(&path, FilterWidth::W256).unwrap();
        index.insert(1, &["alpha", "beta", "gamma"]).unwrap();
        index.insert(2, &["alpha", "delta"]).unwrap();
        index.insert(3, &["epsilon"]).unwrap();

        assert_eq!(index.lookup(&["alpha"]).unwrap(), vec![1, 2]);
        assert_eq!(index.lookup(&["alpha", "beta"]).unwrap(), vec![1]);

        // upsert and tombstone reuse behave the same at the wide width
        index.insert(2, &["zeta"]).unwrap();
        assert_eq!(index.lookup(&["delta"]).unwrap(), Vec::<u32>::new());
        assert!(index.delete(3).unwrap());
        index.insert(4, &["eta"]).unwrap();
        assert_eq!(index.records(), 3);
        assert_eq!(index.deleted(), 0);

        let stats = index.stat();
        assert_eq!(stats.bloom_size, 256);
        assert_eq!(stats.page_size, 133_120);
        assert_eq!(stats.size, (12 + 133_120 + 1) as u64);
        index.close().unwrap();
    }

    let mut index = BloomIndex::open(&path, FilterWidth::W256).unwrap();
    assert_eq!(index.stat().records, 3);
    assert_eq!(index.lookup(&["alpha"]).unwrap(), vec![1, 2]);
    assert_eq!(index.lookup(&["zeta"]).unwrap(), vec![2]);
    assert!(index.lookup(&["eta"]).unwrap().contains(&4));
    assert_eq!(index.lookup(&["epsilon"]).unwrap(), Vec::<u32>::new());
}

// ---------------------------------------------------------------------------
// Tests: Pruning Equivalence
// ---------------------------------------------------------------------------

/// The zero-byte stripe skip must not change the match set: the scan
/// result equals direct filter containment over every record.
#[test]
fn stripe_pruning_matches_direct_containment() {
    let dir = TempDir::new().unwrap();
    let mut index = open_index(&dir, "prune.bfi");

    let mut stored: Vec<(u32, Vec<String>)> = Vec::new();
    for pk in 1..=80u32 {
        let values: Vec<String> = (0..(pk % 7 + 1)).map(|v| format!("tag-{}", (pk + v) % 23)).collect();
        index.insert(pk, &values).unwrap();
        stored.push((pk, values));
    }

    for query in [vec!["tag-5".to_string()], vec!["tag-5".into(), "tag-6".into()], vec!["tag-19".into()]] {
        let needle = BloomFilter::from_values(FilterWidth::W128, &query);
        let expected: Vec<u32> = stored
            .iter()
            .filter(|(_, values)| {
                BloomFilter::from_values(FilterWidth::W128, values).contains(&needle)
            })
            .map(|(pk, _)| *pk)
            .collect();

        assert_eq!(index.lookup(&query).unwrap(), expected, "query {:?}", query);
    }
}
