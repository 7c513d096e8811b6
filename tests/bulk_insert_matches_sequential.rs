// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

use reedkv::config::RegistryConfig;
use reedkv::dispatcher::{Dispatcher, Entry};
use reedkv::registry::Registry;

/// Bulk-inserting N items produces the same final state as N sequential
/// inserts of the same items in the same order.
#[test]
fn bulk_insert_matches_sequential_inserts() {
    let dir = tempfile::tempdir().unwrap();
    let bulk_registry = Registry::open(RegistryConfig::new().root(dir.path().join("bulk"))).unwrap();
    let seq_registry = Registry::open(RegistryConfig::new().root(dir.path().join("seq"))).unwrap();
    let bulk_dispatcher = Dispatcher::new(bulk_registry);
    let seq_dispatcher = Dispatcher::new(seq_registry);
    bulk_dispatcher.create_dataset("d", 4).unwrap();
    seq_dispatcher.create_dataset("d", 4).unwrap();

    let entries: Vec<Entry> = (1..=40)
        .map(|key| Entry { key, line: format!("v{key}") })
        .collect();

    bulk_dispatcher.bulk_insert("d", &entries).unwrap();
    for entry in &entries {
        seq_dispatcher
            .bulk_insert("d", std::slice::from_ref(entry))
            .unwrap();
    }

    let bulk_range = bulk_dispatcher.range("d", 1, 40).unwrap();
    let seq_range = seq_dispatcher.range("d", 1, 40).unwrap();
    assert_eq!(bulk_range, seq_range);
}
