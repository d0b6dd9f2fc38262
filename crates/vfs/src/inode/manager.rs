//! Id-indexed table over the built tree.

use std::collections::HashMap;
use std::sync::Arc;

use super::dir::VirtualDirectory;
use super::types::{Node, NodeId, NodeKind, VirtualNode};

/// Read-only index from node id to node.
///
/// Built once from a finished tree. Every entry shares the tree's `Arc`s, so
/// the table adds no copies of any subtree and needs no locking.
#[derive(Debug)]
pub struct NodeTable {
    /// Root directory.
    root: Arc<VirtualDirectory>,
    /// All reachable nodes by id, root included.
    nodes: HashMap<NodeId, Node>,
}

impl NodeTable {
    /// Index every node reachable from `root`.
    ///
    /// # Arguments
    /// * `root` - Root of a built tree
    pub fn new(root: Arc<VirtualDirectory>) -> Self {
        let mut nodes: HashMap<NodeId, Node> = HashMap::new();
        let mut pending: Vec<Arc<VirtualDirectory>> = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            for file in dir.files() {
                nodes.insert(file.id(), Node::File(file.clone()));
            }
            for child in dir.dirs() {
                pending.push(child.clone());
            }
            nodes.insert(dir.id(), Node::Directory(dir));
        }

        Self { root, nodes }
    }

    /// Get the root directory.
    pub fn root(&self) -> &Arc<VirtualDirectory> {
        &self.root
    }

    /// Get a node by id.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a node as a directory.
    pub fn get_dir(&self, id: NodeId) -> Option<&Arc<VirtualDirectory>> {
        self.get(id)?.as_dir()
    }

    /// Total number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is always present.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of directories, root included.
    pub fn directory_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.kind() == NodeKind::Directory)
            .count()
    }

    /// Number of files.
    pub fn file_count(&self) -> usize {
        self.len() - self.directory_count()
    }
}
