// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! `reedkv` is a disk-backed, multi-dataset B+ tree key/value store.
//!
//! A *dataset* is an independent B+ tree, each with its own on-disk
//! directory: an `index.json` structural document, a `meta.json` recording
//! the tree's order, and a `data/` directory holding one record file per
//! leaf. [`registry::Registry`] lazily loads and idly evicts dataset trees;
//! [`dispatcher::Dispatcher`] is the typed operation surface a network
//! front end (out of scope for this crate) would sit on top of.
//!
//! ```no_run
//! use reedkv::config::{Order, RegistryConfig};
//! use reedkv::registry::Registry;
//! use reedkv::dispatcher::{Dispatcher, Entry};
//!
//! let registry = Registry::open(RegistryConfig::new().root("./data")).unwrap();
//! let dispatcher = Dispatcher::new(registry);
//! dispatcher.create_dataset("widgets", 32).unwrap();
//! dispatcher
//!     .bulk_insert("widgets", &[Entry { key: 1, line: "first widget".into() }])
//!     .unwrap();
//! assert_eq!(dispatcher.search("widgets", 1).unwrap(), "first widget");
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod node;
pub mod persist;
pub mod registry;
pub mod rfs;
pub mod tree;

pub use config::{Order, RegistryConfig};
pub use dispatcher::{Dispatcher, Entry};
pub use error::{Error, ErrorKind, Result};
pub use registry::Registry;
pub use tree::Tree;
