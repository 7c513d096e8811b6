// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! `index.json` serialization: the on-disk tree shape is a recursive tree
//! of nested objects, not the arena's flat `Vec<Node>` + index edges. This
//! module owns the JSON DTO and the conversions to and from
//! [`crate::tree::Tree`]'s arena representation.

use crate::config::Order;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::rfs::RecordFileStore;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// On-disk shape of a single node, nested recursively for internal nodes.
///
/// Field names match the record-file vocabulary used elsewhere in the
/// crate: a leaf carries `file_id`, an internal node carries `children`.
/// Exactly one of the two is present for a given `is_leaf` value; see
/// [`NodeJson::validate`].
#[derive(Debug, Serialize, Deserialize)]
struct NodeJson {
    is_leaf: bool,
    n: usize,
    keys: Vec<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<NodeJson>>,
}

impl NodeJson {
    fn validate(&self, path: &Path) -> Result<()> {
        if self.keys.len() != self.n {
            return Err(Error::IndexCorrupted {
                path: path.to_path_buf(),
                reason: format!("n={} but keys.len()={}", self.n, self.keys.len()),
            });
        }
        if self.is_leaf {
            if self.file_id.is_none() {
                return Err(Error::IndexCorrupted {
                    path: path.to_path_buf(),
                    reason: "leaf node missing file_id".into(),
                });
            }
        } else {
            let children = self.children.as_ref().ok_or_else(|| Error::IndexCorrupted {
                path: path.to_path_buf(),
                reason: "internal node missing children".into(),
            })?;
            if children.len() != self.n + 1 {
                return Err(Error::ChildCountMismatch {
                    expected: self.n + 1,
                    actual: children.len(),
                });
            }
        }
        Ok(())
    }
}

/// Writes `tree`'s whole structure to `path` via the temp-and-rename idiom,
/// matching the record file store's atomicity contract.
pub fn save(tree: &Tree, path: &Path) -> Result<()> {
    let root_json = to_json(tree, tree.root_id());
    let rendered = serde_json::to_string_pretty(&root_json)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp =
        tempfile::NamedTempFile::new_in(dir).map_err(Error::io("save_index", path))?;
    use std::io::Write;
    temp.write_all(rendered.as_bytes())
        .map_err(Error::io("save_index", path))?;
    temp.persist(path)
        .map_err(|e| Error::io("save_index", path)(e.error))?;
    log::trace!(target: "reedkv::persist", "saved index to {}", path.display());
    Ok(())
}

/// Loads a tree from `path`, reconstructing the arena and parent/next
/// back-references by walking the nested JSON document.
pub fn load(path: &Path, order: Order, rfs: RecordFileStore) -> Result<Tree> {
    let raw = fs::read_to_string(path).map_err(Error::io("load_index", path))?;
    let root_json: NodeJson = serde_json::from_str(&raw)?;

    let mut nodes = Vec::new();
    let mut leaf_ids = Vec::new();
    let root_id = from_json(&root_json, None, path, &mut nodes, &mut leaf_ids)?;

    for pair in leaf_ids.windows(2) {
        nodes[pair[0]].as_mut().unwrap().next = Some(pair[1]);
    }

    let nodes: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
    log::trace!(target: "reedkv::persist", "loaded index from {}", path.display());
    Ok(Tree::from_parts(nodes, root_id, order, rfs))
}

fn to_json(tree: &Tree, node_id: crate::node::NodeId) -> NodeJson {
    let node = tree.node(node_id);
    if node.is_leaf {
        NodeJson {
            is_leaf: true,
            n: node.n(),
            keys: node.keys.clone(),
            file_id: node.file_id.clone(),
            children: None,
        }
    } else {
        let children = node
            .children
            .iter()
            .map(|&child_id| to_json(tree, child_id))
            .collect();
        NodeJson {
            is_leaf: false,
            n: node.n(),
            keys: node.keys.clone(),
            file_id: None,
            children: Some(children),
        }
    }
}

fn from_json(
    json: &NodeJson,
    parent: Option<crate::node::NodeId>,
    path: &Path,
    nodes: &mut Vec<Node>,
    leaf_ids: &mut Vec<crate::node::NodeId>,
) -> Result<crate::node::NodeId> {
    json.validate(path)?;

    if json.is_leaf {
        let node = Node {
            is_leaf: true,
            keys: json.keys.clone(),
            children: Vec::new(),
            file_id: json.file_id.clone(),
            next: None,
            parent,
        };
        nodes.push(node);
        let id = nodes.len() - 1;
        leaf_ids.push(id);
        return Ok(id);
    }

    let node = Node {
        is_leaf: false,
        keys: json.keys.clone(),
        children: Vec::new(),
        file_id: None,
        next: None,
        parent,
    };
    nodes.push(node);
    let id = nodes.len() - 1;

    let mut child_ids = Vec::new();
    for child_json in json.children.as_ref().unwrap() {
        child_ids.push(from_json(child_json, Some(id), path, nodes, leaf_ids)?);
    }
    nodes[id].children = child_ids;
    Ok(id)
}
