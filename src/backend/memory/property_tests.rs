//! Property-Based Tests for the Memory Store
//!
//! Uses proptest to check the command semantics the cache layer relies on.

use proptest::prelude::*;

use super::store::MemoryStore;
use crate::backend::{glob_match, TxOp};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;

// == Strategies ==
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}:[a-z0-9_]{1,16}"
}

fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,128}"
}

#[derive(Debug, Clone)]
enum StoreOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| StoreOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| StoreOp::Get { key }),
        valid_key_strategy().prop_map(|key| StoreOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Stored values read back unchanged before their TTL elapses.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        let mut store = MemoryStore::new(TEST_MAX_ENTRIES);

        store.set(key.clone(), value.clone(), Some(3600));

        prop_assert_eq!(store.get(&key), Some(value));
    }

    // Deleted keys read as absent, never as an error.
    #[test]
    fn prop_delete_then_absent(key in valid_key_strategy(), value in valid_value_strategy()) {
        let mut store = MemoryStore::new(TEST_MAX_ENTRIES);

        store.set(key.clone(), value, None);
        prop_assert_eq!(store.delete(std::slice::from_ref(&key)), 1);
        prop_assert_eq!(store.get(&key), None);
    }

    // Hit and miss counters match what the reads observed.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(store_op_strategy(), 1..50)) {
        let mut store = MemoryStore::new(TEST_MAX_ENTRIES);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                StoreOp::Set { key, value } => store.set(key, value, None),
                StoreOp::Get { key } => match store.get(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
                StoreOp::Delete { key } => {
                    store.delete(&[key]);
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.total_entries, store.len());
    }

    // The store never holds more keys than its capacity.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec((valid_key_strategy(), valid_value_strategy()), 1..200)
    ) {
        let max_entries = 50;
        let mut store = MemoryStore::new(max_entries);

        for (key, value) in entries {
            store.set(key, value, None);
            prop_assert!(store.len() <= max_entries);
        }
    }

    // KEYS returns exactly the stored keys the glob accepts.
    #[test]
    fn prop_keys_agree_with_glob(
        stored in prop::collection::hash_set(valid_key_strategy(), 1..30),
        prefix in "[a-z]{1,2}"
    ) {
        let mut store = MemoryStore::new(TEST_MAX_ENTRIES);
        for key in &stored {
            store.set(key.clone(), "v".to_string(), None);
        }

        let pattern = format!("{}*", prefix);
        let mut expected: Vec<String> = stored
            .iter()
            .filter(|key| glob_match(&pattern, key))
            .cloned()
            .collect();
        expected.sort();

        prop_assert_eq!(store.keys(&pattern), expected);
    }

    // A delete-only transaction removes every targeted key and nothing else.
    #[test]
    fn prop_transaction_removes_only_targets(
        stored in prop::collection::hash_set(valid_key_strategy(), 2..30),
        take in 1usize..30
    ) {
        let mut store = MemoryStore::new(TEST_MAX_ENTRIES);
        let stored: Vec<String> = stored.into_iter().collect();
        for key in &stored {
            store.set(key.clone(), "v".to_string(), None);
        }

        let split = take.min(stored.len() - 1);
        let (targets, survivors) = stored.split_at(split);
        let ops = targets.iter().map(|key| TxOp::Del { key: key.clone() }).collect();

        prop_assert_eq!(store.apply(ops), targets.len() as u64);
        for key in targets {
            prop_assert_eq!(store.get(key), None);
        }
        for key in survivors {
            prop_assert!(store.get(key).is_some());
        }
    }
}
