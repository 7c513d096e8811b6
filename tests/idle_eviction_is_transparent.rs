// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

use reedkv::config::RegistryConfig;
use reedkv::dispatcher::{Dispatcher, Entry};
use reedkv::registry::Registry;
use std::time::Duration;

/// Once a tree has sat idle past the registry's configured timeout, the
/// background evictor unloads it from memory; a subsequent search still
/// succeeds by transparently reloading from disk.
#[test]
fn idle_eviction_is_transparent_to_later_access() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::open(
        RegistryConfig::new()
            .root(dir.path())
            .idle_timeout(Duration::from_millis(50))
            .eviction_interval(Duration::from_millis(10)),
    )
    .unwrap();
    let dispatcher = Dispatcher::new(registry);
    dispatcher.create_dataset("s5", 4).unwrap();
    for key in 1..=100 {
        dispatcher
            .bulk_insert("s5", &[Entry { key, line: format!("v{key}") }])
            .unwrap();
    }

    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(dispatcher.search("s5", 50).unwrap(), "v50");
}
