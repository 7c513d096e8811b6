// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The B+ tree engine: search, insert, delete, and range scan over an
//! arena of [`Node`]s, coupled to a [`RecordFileStore`] for the actual
//! key/value payloads.
//!
//! Nodes are addressed by [`NodeId`] into `Tree::nodes`, a `Vec<Option<Node>>`
//! with a free list for reuse after a merge frees a slot. `Tree` never hands
//! out a `NodeId` for a slot that is `None`.

use crate::config::Order;
use crate::error::{Error, Result};
use crate::node::{Node, NodeId};
use crate::rfs::RecordFileStore;
use uuid::Uuid;

/// An order-`T` B+ tree over `i32` keys, backed by a [`RecordFileStore`]
/// for record payloads.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    free_list: Vec<NodeId>,
    root: NodeId,
    order: Order,
    rfs: RecordFileStore,
}

impl Tree {
    /// Creates a tree with a single empty leaf as root, allocating that
    /// leaf's record file.
    pub fn new(order: Order, rfs: RecordFileStore) -> Result<Self> {
        let file_id = Uuid::new_v4().to_string();
        rfs.create_file(&file_id)?;
        let root_node = Node::new_leaf(file_id, order.value());
        Ok(Self {
            nodes: vec![Some(root_node)],
            free_list: Vec::new(),
            root: 0,
            order,
            rfs,
        })
    }

    /// Reconstructs a tree from an already-populated arena (used by
    /// [`crate::persist`] when loading `index.json`).
    pub(crate) fn from_parts(
        nodes: Vec<Option<Node>>,
        root: NodeId,
        order: Order,
        rfs: RecordFileStore,
    ) -> Self {
        Self {
            nodes,
            free_list: Vec::new(),
            root,
            order,
            rfs,
        }
    }

    #[must_use]
    pub fn order(&self) -> Order {
        self.order
    }

    #[must_use]
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes[id].as_ref().expect("dangling NodeId in arena")
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id].as_mut().expect("dangling NodeId in arena")
    }

    /// Iterates over every live `(NodeId, &Node)` pair, in arena order.
    pub(crate) fn iter_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|n| (id, n)))
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.nodes[id] = None;
        self.free_list.push(id);
    }

    fn descend_to_leaf(&self, key: i32) -> NodeId {
        let mut current = self.root;
        while !self.node(current).is_leaf {
            let idx = self.node(current).child_index(key);
            current = self.node(current).children[idx];
        }
        current
    }

    /// Looks up the record stored under `key`.
    pub fn search(&self, key: i32) -> Result<String> {
        let leaf_id = self.descend_to_leaf(key);
        let leaf = self.node(leaf_id);
        leaf.key_search(key).map_err(|_| Error::KeyNotFound { key })?;
        self.rfs.read_line(leaf.file_id.as_ref().unwrap(), key)
    }

    /// Returns every `(key, line)` pair with `lo <= key <= hi`, in
    /// ascending order, walking the leaf chain from the first qualifying
    /// leaf.
    pub fn range(&self, lo: i32, hi: i32) -> Result<Vec<(i32, String)>> {
        if lo > hi {
            return Err(Error::InvalidRange { lo, hi });
        }
        let mut results = Vec::new();
        let mut current = Some(self.descend_to_leaf(lo));
        while let Some(leaf_id) = current {
            let leaf = self.node(leaf_id);
            let file_id = leaf.file_id.clone().unwrap();
            for &key in &leaf.keys {
                if key > hi {
                    return Ok(results);
                }
                if key >= lo {
                    results.push((key, self.rfs.read_line(&file_id, key)?));
                }
            }
            current = leaf.next;
        }
        Ok(results)
    }

    /// Upserts `(key, line)`. Writes the record before touching the key
    /// array, so a crash between the two leaves the tree referencing a
    /// record that is already on disk (see the record-before-structure
    /// ordering rule).
    pub fn insert(&mut self, key: i32, line: &str) -> Result<()> {
        let leaf_id = self.descend_to_leaf(key);
        let file_id = self.node(leaf_id).file_id.clone().unwrap();
        let is_new = self.node(leaf_id).key_search(key).is_err();
        self.rfs.write_line(&file_id, key, line)?;
        if is_new {
            self.node_mut(leaf_id).insert_key_sorted(key);
        }
        if self.node(leaf_id).is_overfull(self.order.value()) {
            self.split_and_propagate(leaf_id)?;
        }
        Ok(())
    }

    /// Deletes `key`, returning [`Error::KeyNotFound`] if absent.
    pub fn delete(&mut self, key: i32) -> Result<()> {
        let leaf_id = self.descend_to_leaf(key);
        let idx = self
            .node(leaf_id)
            .key_search(key)
            .map_err(|_| Error::KeyNotFound { key })?;
        let file_id = self.node(leaf_id).file_id.clone().unwrap();
        self.rfs.delete_lines(&file_id, &[key])?;
        self.node_mut(leaf_id).remove_at(idx);
        self.fix_ancestor_separator(leaf_id, key);

        if leaf_id == self.root {
            return Ok(());
        }
        if self.node(leaf_id).is_underfull(self.order.min_keys()) {
            self.rebalance(leaf_id)?;
        }
        Ok(())
    }

    /// Walks upward from `leaf_id` through every ancestor reached by a
    /// position-0 (leftmost-child) edge, since none of those levels carry a
    /// separator for this leaf at all. The first ancestor reached by a
    /// non-leftmost edge is the one whose separator can equal `deleted_key`
    /// (that separator was copied down from this leaf's old minimum when
    /// some earlier split first introduced it at that level); if it does,
    /// replace it with the leaf's new minimum key. Stops at the root without
    /// effect if every edge on the way up was position 0.
    fn fix_ancestor_separator(&mut self, leaf_id: NodeId, deleted_key: i32) {
        let new_min = self.node(leaf_id).keys.first().copied();
        let mut child_id = leaf_id;
        loop {
            let Some(parent_id) = self.node(child_id).parent else {
                return;
            };
            let pos = self
                .node(parent_id)
                .children
                .iter()
                .position(|&c| c == child_id)
                .expect("node must be a child of its recorded parent");
            if pos > 0 {
                if self.node(parent_id).keys[pos - 1] == deleted_key {
                    if let Some(new_min) = new_min {
                        self.node_mut(parent_id).keys[pos - 1] = new_min;
                    }
                }
                return;
            }
            child_id = parent_id;
        }
    }

    fn split_and_propagate(&mut self, node_id: NodeId) -> Result<()> {
        let mut current = node_id;
        loop {
            let (separator, new_id) = if self.node(current).is_leaf {
                self.split_leaf(current)?
            } else {
                self.split_internal(current)?
            };
            log::debug!(
                target: "reedkv::tree",
                "split node={current} -> new={new_id} separator={separator}"
            );

            match self.node(current).parent {
                Some(parent_id) => {
                    self.node_mut(new_id).parent = Some(parent_id);
                    self.node_mut(parent_id).insert_separator(separator, new_id);
                    if self.node(parent_id).is_overfull(self.order.value()) {
                        current = parent_id;
                        continue;
                    }
                    break;
                }
                None => {
                    let mut new_root = Node::new_internal(self.order.value());
                    new_root.keys.push(separator);
                    new_root.children = vec![current, new_id];
                    let new_root_id = self.push_node(new_root);
                    self.node_mut(current).parent = Some(new_root_id);
                    self.node_mut(new_id).parent = Some(new_root_id);
                    self.root = new_root_id;
                    log::debug!(target: "reedkv::tree", "new root {new_root_id}");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Splits an overfull leaf in place; returns `(separator, new_leaf_id)`
    /// where `separator` is the new leaf's minimum key. An RFS failure here
    /// is propagated as an `Err` rather than a panic: this runs with the
    /// dataset's tree mutex held, and a panic would poison it, bricking
    /// every later operation on the dataset rather than just this one.
    fn split_leaf(&mut self, leaf_id: NodeId) -> Result<(i32, NodeId)> {
        let mid = self.node(leaf_id).keys.len() / 2;
        let new_file_id = Uuid::new_v4().to_string();
        self.rfs.create_file(&new_file_id)?;

        let moved_keys: Vec<i32> = self.node_mut(leaf_id).keys.split_off(mid);
        let old_file_id = self.node(leaf_id).file_id.clone().unwrap();
        self.rfs.move_lines(&old_file_id, &new_file_id, &moved_keys)?;

        let separator = moved_keys[0];
        let mut new_leaf = Node::new_leaf(new_file_id, self.order.value());
        new_leaf.keys = moved_keys;
        new_leaf.next = self.node(leaf_id).next;
        let new_id = self.push_node(new_leaf);
        self.node_mut(leaf_id).next = Some(new_id);
        Ok((separator, new_id))
    }

    /// Splits an overfull internal node in place; returns `(separator,
    /// new_node_id)` where `separator` is promoted to the parent. Returns
    /// `Result` to match `split_leaf`'s signature even though this path has
    /// no I/O of its own to fail.
    fn split_internal(&mut self, node_id: NodeId) -> Result<(i32, NodeId)> {
        let mid = self.node(node_id).keys.len() / 2;
        let right_keys = self.node_mut(node_id).keys.split_off(mid + 1);
        let separator = self.node_mut(node_id).keys.pop().unwrap();
        let right_children = self.node_mut(node_id).children.split_off(mid + 1);

        let mut new_node = Node::new_internal(self.order.value());
        new_node.keys = right_keys;
        new_node.children = right_children.clone();
        let new_id = self.push_node(new_node);
        for child in right_children {
            self.node_mut(child).parent = Some(new_id);
        }
        Ok((separator, new_id))
    }

    fn rebalance(&mut self, node_id: NodeId) -> Result<()> {
        let Some(parent_id) = self.node(node_id).parent else {
            return Ok(());
        };
        let pos = self
            .node(parent_id)
            .children
            .iter()
            .position(|&c| c == node_id)
            .expect("node must be a child of its recorded parent");

        if pos > 0 {
            let left_id = self.node(parent_id).children[pos - 1];
            if self.node(left_id).n() > self.order.min_keys() as usize {
                self.borrow_from_left(node_id, left_id, parent_id, pos)?;
                return Ok(());
            }
        }
        if pos + 1 < self.node(parent_id).children.len() {
            let right_id = self.node(parent_id).children[pos + 1];
            if self.node(right_id).n() > self.order.min_keys() as usize {
                self.borrow_from_right(node_id, right_id, parent_id, pos)?;
                return Ok(());
            }
        }

        if pos > 0 {
            let left_id = self.node(parent_id).children[pos - 1];
            self.merge_nodes(left_id, node_id, parent_id, pos - 1)?;
        } else {
            let right_id = self.node(parent_id).children[pos + 1];
            self.merge_nodes(node_id, right_id, parent_id, pos)?;
        }

        if parent_id == self.root {
            if self.node(parent_id).n() == 0 {
                let only_child = self.node(parent_id).children[0];
                self.node_mut(only_child).parent = None;
                self.root = only_child;
                self.free_node(parent_id);
                log::debug!(target: "reedkv::tree", "root demoted to {only_child}");
            }
        } else if self.node(parent_id).is_underfull(self.order.min_keys()) {
            self.rebalance(parent_id)?;
        }
        Ok(())
    }

    fn borrow_from_left(
        &mut self,
        node_id: NodeId,
        left_id: NodeId,
        parent_id: NodeId,
        pos: usize,
    ) -> Result<()> {
        if self.node(node_id).is_leaf {
            let borrowed_key = *self.node(left_id).keys.last().unwrap();
            let left_file = self.node(left_id).file_id.clone().unwrap();
            let node_file = self.node(node_id).file_id.clone().unwrap();
            self.rfs.move_lines(&left_file, &node_file, &[borrowed_key])?;
            self.node_mut(left_id).keys.pop();
            self.node_mut(node_id).keys.insert(0, borrowed_key);
            self.node_mut(parent_id).keys[pos - 1] = borrowed_key;
        } else {
            let borrowed_key = self.node_mut(left_id).keys.pop().unwrap();
            let borrowed_child = self.node_mut(left_id).children.pop().unwrap();
            let separator = self.node(parent_id).keys[pos - 1];
            self.node_mut(node_id).keys.insert(0, separator);
            self.node_mut(node_id).children.insert(0, borrowed_child);
            self.node_mut(borrowed_child).parent = Some(node_id);
            self.node_mut(parent_id).keys[pos - 1] = borrowed_key;
        }
        log::debug!(target: "reedkv::tree", "borrow_from_left node={node_id} left={left_id}");
        Ok(())
    }

    fn borrow_from_right(
        &mut self,
        node_id: NodeId,
        right_id: NodeId,
        parent_id: NodeId,
        pos: usize,
    ) -> Result<()> {
        if self.node(node_id).is_leaf {
            let borrowed_key = self.node(right_id).keys[0];
            let right_file = self.node(right_id).file_id.clone().unwrap();
            let node_file = self.node(node_id).file_id.clone().unwrap();
            self.rfs.move_lines(&right_file, &node_file, &[borrowed_key])?;
            self.node_mut(right_id).keys.remove(0);
            self.node_mut(node_id).keys.push(borrowed_key);
            let new_min = self.node(right_id).keys[0];
            self.node_mut(parent_id).keys[pos] = new_min;
        } else {
            let separator = self.node(parent_id).keys[pos];
            let borrowed_key = self.node_mut(right_id).keys.remove(0);
            let borrowed_child = self.node_mut(right_id).children.remove(0);
            self.node_mut(node_id).keys.push(separator);
            self.node_mut(node_id).children.push(borrowed_child);
            self.node_mut(borrowed_child).parent = Some(node_id);
            self.node_mut(parent_id).keys[pos] = borrowed_key;
        }
        log::debug!(target: "reedkv::tree", "borrow_from_right node={node_id} right={right_id}");
        Ok(())
    }

    /// Merges `right_id` into `left_id`, removing the separator at
    /// `parent.keys[sep_idx]` and the `right_id` edge from `parent`.
    fn merge_nodes(
        &mut self,
        left_id: NodeId,
        right_id: NodeId,
        parent_id: NodeId,
        sep_idx: usize,
    ) -> Result<()> {
        if self.node(left_id).is_leaf {
            let left_file = self.node(left_id).file_id.clone().unwrap();
            let right_file = self.node(right_id).file_id.clone().unwrap();
            self.rfs.merge_files(&left_file, &right_file)?;
            let right_keys = self.node(right_id).keys.clone();
            self.node_mut(left_id).keys.extend(right_keys);
            let right_next = self.node(right_id).next;
            self.node_mut(left_id).next = right_next;
        } else {
            let separator = self.node(parent_id).keys[sep_idx];
            let right_keys = self.node(right_id).keys.clone();
            let right_children = self.node(right_id).children.clone();
            self.node_mut(left_id).keys.push(separator);
            self.node_mut(left_id).keys.extend(right_keys);
            for &child in &right_children {
                self.node_mut(child).parent = Some(left_id);
            }
            self.node_mut(left_id).children.extend(right_children);
        }
        self.node_mut(parent_id).keys.remove(sep_idx);
        self.node_mut(parent_id).children.remove(sep_idx + 1);
        self.free_node(right_id);
        log::debug!(target: "reedkv::tree", "merge left={left_id} right={right_id}");
        Ok(())
    }
}
