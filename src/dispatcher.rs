// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The operation surface a network front end would sit on top of.
//!
//! [`Dispatcher`] is the crate's entire answer to "how would a caller
//! reach this store": six typed operations, each enforcing the size caps
//! a wire adapter is expected to recognize before work reaches the tree
//! engine. No listener, parser, or router is built here or anywhere else
//! in the crate; a front end wires its own transport to these methods and
//! maps [`crate::error::ErrorKind`] to whatever status vocabulary it
//! speaks.

use crate::config::Order;
use crate::error::{Error, Result};
use crate::registry::Registry;
use std::sync::Arc;

/// Maximum number of entries accepted by a single [`Dispatcher::bulk_insert`]
/// call.
pub const MAX_BULK_ENTRIES: usize = 50;

/// Maximum size, in bytes, of a single record's line.
pub const MAX_LINE_BYTES: usize = 1024;

/// Maximum total size, in bytes, of a single request's payload.
pub const MAX_REQUEST_BYTES: usize = 60 * 1024;

/// A single `(key, line)` pair submitted to [`Dispatcher::bulk_insert`].
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: i32,
    pub line: String,
}

/// Thin, typed front end over a [`Registry`], standing in for the
/// network-facing adapter this crate does not implement.
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Creates a new, empty dataset with the given B+ tree order.
    pub fn create_dataset(&self, name: &str, order: u16) -> Result<()> {
        let order = Order::new(order)?;
        self.registry.create_dataset(name, order)
    }

    /// Deletes a dataset and all of its records.
    pub fn delete_dataset(&self, name: &str) -> Result<()> {
        self.registry.delete_dataset(name)
    }

    /// Upserts up to [`MAX_BULK_ENTRIES`] entries into `name` in one call,
    /// rejecting the whole batch if any size cap is exceeded before any
    /// entry reaches the tree engine.
    pub fn bulk_insert(&self, name: &str, entries: &[Entry]) -> Result<()> {
        self.validate_bulk(entries)?;
        for entry in entries {
            self.registry.insert(name, entry.key, &entry.line)?;
        }
        Ok(())
    }

    fn validate_bulk(&self, entries: &[Entry]) -> Result<()> {
        if entries.len() > MAX_BULK_ENTRIES {
            return Err(Error::RequestTooLarge {
                reason: format!(
                    "{} entries exceeds the per-request cap of {MAX_BULK_ENTRIES}",
                    entries.len()
                ),
            });
        }
        let mut total = 0usize;
        for entry in entries {
            let line_bytes = entry.line.len();
            if line_bytes > MAX_LINE_BYTES {
                return Err(Error::RequestTooLarge {
                    reason: format!(
                        "entry for key {} is {line_bytes} bytes, exceeds the {MAX_LINE_BYTES}-byte cap",
                        entry.key
                    ),
                });
            }
            total += line_bytes;
        }
        if total > MAX_REQUEST_BYTES {
            return Err(Error::RequestTooLarge {
                reason: format!(
                    "request body is {total} bytes, exceeds the {MAX_REQUEST_BYTES}-byte envelope cap"
                ),
            });
        }
        Ok(())
    }

    /// Looks up a single key.
    pub fn search(&self, name: &str, key: i32) -> Result<String> {
        self.registry.search(name, key)
    }

    /// Scans `[lo, hi]` inclusive, in ascending key order.
    pub fn range(&self, name: &str, lo: i32, hi: i32) -> Result<Vec<(i32, String)>> {
        self.registry.range(name, lo, hi)
    }

    /// Deletes a single key.
    pub fn delete_key(&self, name: &str, key: i32) -> Result<()> {
        self.registry.delete_key(name, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use serial_test::serial;

    fn dispatcher() -> (tempfile::TempDir, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(RegistryConfig::new().root(dir.path())).unwrap();
        (dir, Dispatcher::new(registry))
    }

    #[test]
    #[serial]
    fn full_operation_surface_roundtrip() {
        let (_dir, dispatcher) = dispatcher();
        dispatcher.create_dataset("widgets", 4).unwrap();
        dispatcher
            .bulk_insert(
                "widgets",
                &[
                    Entry { key: 1, line: "a".into() },
                    Entry { key: 2, line: "b".into() },
                ],
            )
            .unwrap();
        assert_eq!(dispatcher.search("widgets", 1).unwrap(), "a");
        assert_eq!(dispatcher.range("widgets", 1, 2).unwrap().len(), 2);
        dispatcher.delete_key("widgets", 1).unwrap();
        assert!(dispatcher.search("widgets", 1).is_err());
        dispatcher.delete_dataset("widgets").unwrap();
    }

    #[test]
    #[serial]
    fn bulk_insert_rejects_too_many_entries() {
        let (_dir, dispatcher) = dispatcher();
        dispatcher.create_dataset("widgets", 4).unwrap();
        let entries: Vec<Entry> = (0..(MAX_BULK_ENTRIES as i32 + 1))
            .map(|key| Entry { key, line: "x".into() })
            .collect();
        assert!(matches!(
            dispatcher.bulk_insert("widgets", &entries),
            Err(Error::RequestTooLarge { .. })
        ));
    }

    #[test]
    #[serial]
    fn bulk_insert_rejects_oversized_line() {
        let (_dir, dispatcher) = dispatcher();
        dispatcher.create_dataset("widgets", 4).unwrap();
        let huge = "x".repeat(MAX_LINE_BYTES + 1);
        assert!(matches!(
            dispatcher.bulk_insert("widgets", &[Entry { key: 1, line: huge }]),
            Err(Error::RequestTooLarge { .. })
        ));
    }

    #[test]
    #[serial]
    fn create_dataset_rejects_invalid_order() {
        let (_dir, dispatcher) = dispatcher();
        assert!(matches!(
            dispatcher.create_dataset("widgets", 2),
            Err(Error::InvalidOrder { order: 2 })
        ));
    }
}
