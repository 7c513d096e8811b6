// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The dataset registry: a bounded, process-wide table mapping dataset
//! names to lazily-loaded trees, with idle eviction and an opt-in
//! inter-process advisory lock per dataset.
//!
//! The table itself is guarded by a single [`Mutex`]; per-tree operations
//! clone out the `Arc<Mutex<Tree>>` handle and release the table lock
//! before taking the tree's own lock, so a slow operation on one dataset
//! never blocks lookups on another.

use crate::config::{Order, RegistryConfig};
use crate::error::{Error, Result};
use crate::persist;
use crate::rfs::RecordFileStore;
use crate::tree::Tree;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const DATASETS_FILE: &str = "datasets.txt";
const META_FILE: &str = "meta.json";
const INDEX_FILE: &str = "index.json";

#[derive(Serialize, Deserialize)]
struct DatasetMeta {
    order: u16,
}

struct DatasetEntry {
    dir: PathBuf,
    order: Order,
    tree: Option<Arc<Mutex<Tree>>>,
    last_access: Instant,
}

/// Process-wide table of datasets, lazily loading and evicting trees.
pub struct Registry {
    config: RegistryConfig,
    table: Mutex<HashMap<String, DatasetEntry>>,
    stop_evictor: Arc<AtomicBool>,
    evictor: Mutex<Option<JoinHandle<()>>>,
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: name.to_string(),
        })
    }
}

impl Registry {
    /// Opens (or creates) the registry root, reading `datasets.txt` for
    /// previously known dataset names without loading any tree eagerly,
    /// and starts the background evictor thread.
    pub fn open(config: RegistryConfig) -> Result<Arc<Self>> {
        fs::create_dir_all(&config.root).map_err(Error::io("open_registry", &config.root))?;

        let mut table = HashMap::new();
        for name in read_dataset_names(&config.root)? {
            let dir = config.root.join(&name);
            let order = read_meta(&dir)?.order;
            table.insert(
                name,
                DatasetEntry {
                    dir,
                    order: Order::new(order)?,
                    tree: None,
                    last_access: Instant::now(),
                },
            );
        }

        let registry = Arc::new(Self {
            config: config.clone(),
            table: Mutex::new(table),
            stop_evictor: Arc::new(AtomicBool::new(false)),
            evictor: Mutex::new(None),
        });

        let handle = spawn_evictor(Arc::clone(&registry));
        *registry.evictor.lock().unwrap() = Some(handle);
        Ok(registry)
    }

    /// Creates a new, empty dataset. Fails if `name` already exists, is
    /// invalid, or the table is at capacity.
    pub fn create_dataset(&self, name: &str, order: Order) -> Result<()> {
        validate_name(name)?;
        let mut table = self.table.lock().unwrap();
        if table.contains_key(name) {
            return Err(Error::DatasetAlreadyExists {
                name: name.to_string(),
            });
        }
        if table.len() >= self.config.capacity {
            return Err(Error::RegistryFull {
                capacity: self.config.capacity,
            });
        }

        let dir = self.config.root.join(name);
        fs::create_dir_all(&dir).map_err(Error::io("create_dataset", &dir))?;
        write_meta(&dir, order.value())?;

        let rfs = RecordFileStore::new(dir.join("data"))?;
        let tree = Tree::new(order, rfs)?;
        persist::save(&tree, &dir.join(INDEX_FILE))?;
        append_dataset_name(&self.config.root, name)?;

        table.insert(
            name.to_string(),
            DatasetEntry {
                dir,
                order,
                tree: Some(Arc::new(Mutex::new(tree))),
                last_access: Instant::now(),
            },
        );
        log::info!(target: "reedkv::registry", "created dataset '{name}'");
        Ok(())
    }

    /// Removes a dataset and its entire on-disk directory.
    pub fn delete_dataset(&self, name: &str) -> Result<()> {
        let mut table = self.table.lock().unwrap();
        let entry = table
            .remove(name)
            .ok_or_else(|| Error::DatasetNotFound {
                name: name.to_string(),
            })?;
        fs::remove_dir_all(&entry.dir).map_err(Error::io("delete_dataset", &entry.dir))?;
        remove_dataset_name(&self.config.root, name)?;
        log::info!(target: "reedkv::registry", "deleted dataset '{name}'");
        Ok(())
    }

    /// Resolves `name` to a loaded tree handle, loading it from disk on
    /// first access. The table lock is held only long enough to clone the
    /// `Arc` or finish the load; it is never held during a tree operation.
    pub fn resolve(&self, name: &str) -> Result<Arc<Mutex<Tree>>> {
        {
            let mut table = self.table.lock().unwrap();
            let entry = table
                .get_mut(name)
                .ok_or_else(|| Error::DatasetNotFound {
                    name: name.to_string(),
                })?;
            entry.last_access = Instant::now();
            if let Some(tree) = &entry.tree {
                return Ok(Arc::clone(tree));
            }
        }

        // Load outside the table lock so a slow disk read never blocks
        // other datasets' lookups.
        let (dir, order) = {
            let table = self.table.lock().unwrap();
            let entry = table.get(name).ok_or_else(|| Error::DatasetNotFound {
                name: name.to_string(),
            })?;
            (entry.dir.clone(), entry.order)
        };
        let rfs = RecordFileStore::new(dir.join("data"))?;
        let tree = persist::load(&dir.join(INDEX_FILE), order, rfs)?;
        let handle = Arc::new(Mutex::new(tree));

        let mut table = self.table.lock().unwrap();
        let entry = table.get_mut(name).ok_or_else(|| Error::DatasetNotFound {
            name: name.to_string(),
        })?;
        entry.tree = Some(Arc::clone(&handle));
        entry.last_access = Instant::now();
        log::debug!(target: "reedkv::registry", "loaded dataset '{name}' from disk");
        Ok(handle)
    }

    fn dataset_dir(&self, name: &str) -> Result<PathBuf> {
        let table = self.table.lock().unwrap();
        table
            .get(name)
            .map(|e| e.dir.clone())
            .ok_or_else(|| Error::DatasetNotFound {
                name: name.to_string(),
            })
    }

    /// Inserts `(key, line)` into `name`, persisting the index afterward.
    pub fn insert(&self, name: &str, key: i32, line: &str) -> Result<()> {
        let handle = self.resolve(name)?;
        let dir = self.dataset_dir(name)?;
        let mut tree = handle.lock().unwrap();
        tree.insert(key, line)?;
        persist::save(&tree, &dir.join(INDEX_FILE))
    }

    /// Deletes `key` from `name`, persisting the index afterward.
    pub fn delete_key(&self, name: &str, key: i32) -> Result<()> {
        let handle = self.resolve(name)?;
        let dir = self.dataset_dir(name)?;
        let mut tree = handle.lock().unwrap();
        tree.delete(key)?;
        persist::save(&tree, &dir.join(INDEX_FILE))
    }

    /// Looks up `key` in `name`.
    pub fn search(&self, name: &str, key: i32) -> Result<String> {
        let handle = self.resolve(name)?;
        let tree = handle.lock().unwrap();
        tree.search(key)
    }

    /// Scans `name` for keys in `[lo, hi]`.
    pub fn range(&self, name: &str, lo: i32, hi: i32) -> Result<Vec<(i32, String)>> {
        let handle = self.resolve(name)?;
        let tree = handle.lock().unwrap();
        tree.range(lo, hi)
    }

    /// True dataset names currently known to the registry.
    pub fn dataset_names(&self) -> Vec<String> {
        self.table.lock().unwrap().keys().cloned().collect()
    }

    fn evict_idle(&self) {
        let mut table = self.table.lock().unwrap();
        for (name, entry) in table.iter_mut() {
            let Some(tree) = &entry.tree else { continue };
            let idle = entry.last_access.elapsed() >= self.config.idle_timeout;
            // Sole ownership (table's own Arc) means nobody else is mid-operation.
            if idle && Arc::strong_count(tree) == 1 {
                entry.tree = None;
                log::debug!(target: "reedkv::registry", "evicted idle dataset '{name}'");
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.stop_evictor.store(true, Ordering::SeqCst);
        if let Some(handle) = self.evictor.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn spawn_evictor(registry: Arc<Registry>) -> JoinHandle<()> {
    let interval = registry.config.eviction_interval;
    let stop = Arc::clone(&registry.stop_evictor);
    let tick = Duration::from_millis(20).min(interval);
    std::thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            let mut waited = Duration::ZERO;
            while waited < interval {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::sleep(tick);
                waited += tick;
            }
            registry.evict_idle();
        }
    })
}

fn read_dataset_names(root: &Path) -> Result<Vec<String>> {
    let path = root.join(DATASETS_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(&path).map_err(Error::io("read_datasets_file", &path))?;
    BufReader::new(file)
        .lines()
        .filter(|l| l.as_ref().map(|s| !s.is_empty()).unwrap_or(true))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::io("read_datasets_file", &path))
}

fn append_dataset_name(root: &Path, name: &str) -> Result<()> {
    let path = root.join(DATASETS_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(Error::io("append_dataset_name", &path))?;
    writeln!(file, "{name}").map_err(Error::io("append_dataset_name", &path))
}

fn remove_dataset_name(root: &Path, name: &str) -> Result<()> {
    let path = root.join(DATASETS_FILE);
    let mut names = read_dataset_names(root)?;
    names.retain(|n| n != name);

    let mut temp =
        tempfile::NamedTempFile::new_in(root).map_err(Error::io("remove_dataset_name", &path))?;
    for n in &names {
        writeln!(temp, "{n}").map_err(Error::io("remove_dataset_name", &path))?;
    }
    temp.persist(&path)
        .map_err(|e| Error::io("remove_dataset_name", &path)(e.error))
}

fn write_meta(dir: &Path, order: u16) -> Result<()> {
    let path = dir.join(META_FILE);
    let rendered = serde_json::to_string(&DatasetMeta { order })?;
    fs::write(&path, rendered).map_err(Error::io("write_meta", &path))
}

fn read_meta(dir: &Path) -> Result<DatasetMeta> {
    let path = dir.join(META_FILE);
    let raw = fs::read_to_string(&path).map_err(Error::io("read_meta", &path))?;
    Ok(serde_json::from_str(&raw)?)
}

/// RAII inter-process advisory lock for a single dataset directory,
/// opt-in for deployments running more than one reedkv process against
/// the same root. Not taken by [`Registry`] itself; callers that need
/// cross-process mutual exclusion acquire one around their own
/// critical section.
pub struct DatasetLock {
    file: File,
}

impl DatasetLock {
    /// Attempts to acquire an exclusive lock on `<dir>/.lock`, retrying
    /// until `timeout` elapses.
    pub fn acquire(dir: &Path, timeout: Duration) -> Result<Self> {
        let path = dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(Error::io("acquire_dataset_lock", &path))?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file }),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(source) => return Err(Error::io("acquire_dataset_lock", &path)(source)),
            }
        }
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config(root: &Path) -> RegistryConfig {
        RegistryConfig::new()
            .root(root)
            .idle_timeout(Duration::from_millis(50))
            .eviction_interval(Duration::from_millis(10))
    }

    #[test]
    #[serial]
    fn create_insert_search_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(config(dir.path())).unwrap();
        registry.create_dataset("widgets", Order::new(4).unwrap()).unwrap();
        registry.insert("widgets", 1, "first widget").unwrap();
        assert_eq!(registry.search("widgets", 1).unwrap(), "first widget");
    }

    #[test]
    #[serial]
    fn create_duplicate_dataset_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(config(dir.path())).unwrap();
        registry.create_dataset("widgets", Order::new(4).unwrap()).unwrap();
        assert!(matches!(
            registry.create_dataset("widgets", Order::new(4).unwrap()),
            Err(Error::DatasetAlreadyExists { .. })
        ));
    }

    #[test]
    #[serial]
    fn resolve_unknown_dataset_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(config(dir.path())).unwrap();
        assert!(matches!(
            registry.search("ghost", 1),
            Err(Error::DatasetNotFound { .. })
        ));
    }

    #[test]
    #[serial]
    fn delete_dataset_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(config(dir.path())).unwrap();
        registry.create_dataset("widgets", Order::new(4).unwrap()).unwrap();
        registry.delete_dataset("widgets").unwrap();
        assert!(!dir.path().join("widgets").exists());
        assert!(matches!(
            registry.search("widgets", 1),
            Err(Error::DatasetNotFound { .. })
        ));
    }

    #[test]
    #[serial]
    fn reopen_discovers_datasets_without_loading_trees() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = Registry::open(config(dir.path())).unwrap();
            registry.create_dataset("widgets", Order::new(4).unwrap()).unwrap();
            registry.insert("widgets", 7, "seven").unwrap();
        }
        let registry = Registry::open(config(dir.path())).unwrap();
        assert_eq!(registry.dataset_names(), vec!["widgets".to_string()]);
        assert_eq!(registry.search("widgets", 7).unwrap(), "seven");
    }

    #[test]
    #[serial]
    fn idle_tree_is_evicted_and_reloaded_transparently() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(config(dir.path())).unwrap();
        registry.create_dataset("widgets", Order::new(4).unwrap()).unwrap();
        registry.insert("widgets", 1, "one").unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(registry.search("widgets", 1).unwrap(), "one");
    }

    #[test]
    #[serial]
    fn invalid_dataset_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(config(dir.path())).unwrap();
        assert!(matches!(
            registry.create_dataset("", Order::new(4).unwrap()),
            Err(Error::InvalidName { .. })
        ));
        assert!(matches!(
            registry.create_dataset("has/slash", Order::new(4).unwrap()),
            Err(Error::InvalidName { .. })
        ));
    }

    #[test]
    fn dataset_lock_excludes_concurrent_acquire() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        let _first = DatasetLock::acquire(dir.path(), Duration::from_millis(50)).unwrap();
        let second = DatasetLock::acquire(dir.path(), Duration::from_millis(50));
        assert!(second.is_err());
    }
}
