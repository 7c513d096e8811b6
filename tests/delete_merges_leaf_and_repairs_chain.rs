// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

use reedkv::config::RegistryConfig;
use reedkv::dispatcher::{Dispatcher, Entry};
use reedkv::registry::Registry;

/// Deleting a key that underflows a leaf merges it with its left sibling;
/// the leaf chain must still enumerate every surviving key in order
/// afterward, with the deleted leaf's record file gone.
#[test]
fn delete_merges_leaf_and_repairs_chain() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::open(RegistryConfig::new().root(dir.path())).unwrap();
    let dispatcher = Dispatcher::new(registry);
    dispatcher.create_dataset("s2", 4).unwrap();

    for key in 1..=9 {
        dispatcher
            .bulk_insert("s2", &[Entry { key, line: format!("line{key}") }])
            .unwrap();
    }

    dispatcher.delete_key("s2", 4).unwrap();
    assert!(dispatcher.search("s2", 4).is_err());

    let remaining = dispatcher.range("s2", 1, 9).unwrap();
    let keys: Vec<i32> = remaining.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![1, 2, 3, 5, 6, 7, 8, 9]);
}
