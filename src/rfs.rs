// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Record File Store: durable, ordered `(key -> line)` storage per leaf.
//!
//! Each leaf owns exactly one record file at `<dataset>/data/<file_id>.dat`,
//! a sequence of `"<key>\t<line>\n"` lines sorted ascending by key with at
//! most one line per key. All in-place mutations go through the
//! temp-and-rename idiom (write full contents to `<path>.tmp`, rename over
//! the original): best-effort atomicity, no fsync, consistent with the
//! crate's non-goal of crash-consistent durability.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Owns the `data/` directory for a single dataset.
#[derive(Debug, Clone)]
pub struct RecordFileStore {
    dir: PathBuf,
}

struct Entry {
    key: i32,
    line: String,
}

impl RecordFileStore {
    /// Binds to `dir` (typically `<dataset>/data`), creating it if absent.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(Error::io("create_record_dir", &dir))?;
        Ok(Self { dir })
    }

    fn path(&self, file_id: &str) -> PathBuf {
        self.dir.join(format!("{file_id}.dat"))
    }

    /// Creates an empty record file for a freshly created leaf.
    pub fn create_file(&self, file_id: &str) -> Result<()> {
        let path = self.path(file_id);
        File::create(&path).map_err(Error::io("create_file", &path))?;
        log::trace!(target: "reedkv::rfs", "created record file {file_id}");
        Ok(())
    }

    fn read_entries(&self, file_id: &str) -> Result<Vec<Entry>> {
        let path = self.path(file_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(Error::io("read_entries", &path))?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(Error::io("read_entries", &path))?;
            if line.is_empty() {
                continue;
            }
            let Some((key_part, rest)) = line.split_once('\t') else {
                continue;
            };
            let key: i32 = key_part
                .parse()
                .map_err(|_| Error::RecordFileMissing {
                    file_id: file_id.to_string(),
                })?;
            entries.push(Entry {
                key,
                line: rest.to_string(),
            });
        }
        Ok(entries)
    }

    fn write_entries(&self, file_id: &str, entries: &[Entry]) -> Result<()> {
        let path = self.path(file_id);
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(Error::io("write_entries", &path))?;
        {
            let handle = temp.as_file_mut();
            for entry in entries {
                writeln!(handle, "{}\t{}", entry.key, entry.line)
                    .map_err(Error::io("write_entries", &path))?;
            }
            handle.flush().map_err(Error::io("write_entries", &path))?;
        }
        temp.persist(&path)
            .map_err(|e| Error::io("write_entries", &path)(e.error))?;
        Ok(())
    }

    /// Upserts `(key, line)`: inserts in sorted order, replacing any
    /// existing entry for `key`. Normalizes `line` to carry no embedded
    /// newline (trailing `\n` is added by the writer).
    pub fn write_line(&self, file_id: &str, key: i32, line: &str) -> Result<()> {
        let line = line.trim_end_matches('\n');
        let mut entries = self.read_entries(file_id)?;
        entries.retain(|e| e.key != key);
        let idx = entries.partition_point(|e| e.key < key);
        entries.insert(
            idx,
            Entry {
                key,
                line: line.to_string(),
            },
        );
        self.write_entries(file_id, &entries)?;
        log::trace!(target: "reedkv::rfs", "write_line file={file_id} key={key}");
        Ok(())
    }

    /// Reads the line associated with `key`, without the key/tab prefix.
    pub fn read_line(&self, file_id: &str, key: i32) -> Result<String> {
        let entries = self.read_entries(file_id)?;
        entries
            .into_iter()
            .find(|e| e.key == key)
            .map(|e| e.line)
            .ok_or(Error::KeyNotFound { key })
    }

    /// Removes every entry whose key is in `keys`. Removes the file
    /// entirely if it becomes empty.
    pub fn delete_lines(&self, file_id: &str, keys: &[i32]) -> Result<()> {
        let mut entries = self.read_entries(file_id)?;
        entries.retain(|e| !keys.contains(&e.key));
        if entries.is_empty() {
            let path = self.path(file_id);
            if path.exists() {
                fs::remove_file(&path).map_err(Error::io("delete_lines", &path))?;
            }
        } else {
            self.write_entries(file_id, &entries)?;
        }
        log::trace!(
            target: "reedkv::rfs",
            "delete_lines file={file_id} count={}",
            keys.len()
        );
        Ok(())
    }

    /// Copies each of `keys` from `src` to `dst` (sorted upsert), then
    /// removes them from `src`. Used by leaf splits to migrate the upper
    /// half of a leaf's records to its new sibling.
    pub fn move_lines(&self, src: &str, dst: &str, keys: &[i32]) -> Result<()> {
        let src_entries = self.read_entries(src)?;
        let moving: Vec<&Entry> = src_entries.iter().filter(|e| keys.contains(&e.key)).collect();

        let mut dst_entries = self.read_entries(dst)?;
        for entry in &moving {
            dst_entries.retain(|e| e.key != entry.key);
            let idx = dst_entries.partition_point(|e| e.key < entry.key);
            dst_entries.insert(
                idx,
                Entry {
                    key: entry.key,
                    line: entry.line.clone(),
                },
            );
        }
        self.write_entries(dst, &dst_entries)?;
        self.delete_lines(src, keys)?;
        log::trace!(
            target: "reedkv::rfs",
            "move_lines src={src} dst={dst} count={}",
            keys.len()
        );
        Ok(())
    }

    /// Upserts every entry of `giver` into `taker`, then removes `giver`.
    /// Used when an underflowing leaf merges into a sibling.
    pub fn merge_files(&self, taker: &str, giver: &str) -> Result<()> {
        let giver_entries = self.read_entries(giver)?;
        let mut taker_entries = self.read_entries(taker)?;
        for entry in giver_entries {
            taker_entries.retain(|e| e.key != entry.key);
            let idx = taker_entries.partition_point(|e| e.key < entry.key);
            taker_entries.insert(idx, entry);
        }
        self.write_entries(taker, &taker_entries)?;
        let giver_path = self.path(giver);
        if giver_path.exists() {
            fs::remove_file(&giver_path).map_err(Error::io("merge_files", &giver_path))?;
        }
        log::trace!(target: "reedkv::rfs", "merge_files taker={taker} giver={giver}");
        Ok(())
    }

    /// True iff the file is absent or holds zero lines.
    pub fn is_empty(&self, file_id: &str) -> Result<bool> {
        Ok(self.read_entries(file_id)?.is_empty())
    }

    /// Removes a leaf's backing file outright (used when a leaf is freed
    /// by a merge rather than emptied by deletes).
    pub fn remove_file(&self, file_id: &str) -> Result<()> {
        let path = self.path(file_id);
        if path.exists() {
            fs::remove_file(&path).map_err(Error::io("remove_file", &path))?;
        }
        Ok(())
    }

    /// Reads every `(key, line)` pair in ascending order, for persistence
    /// round-trip tests and range scans that have already narrowed to a
    /// single file.
    pub fn read_all(&self, file_id: &str) -> Result<Vec<(i32, String)>> {
        Ok(self
            .read_entries(file_id)?
            .into_iter()
            .map(|e| (e.key, e.line))
            .collect())
    }

    /// The directory this store is bound to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
