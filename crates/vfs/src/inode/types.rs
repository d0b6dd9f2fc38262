//! Core node types and traits.

use std::sync::Arc;

pub use s3fuse_model::{NodeId, MAX_NODE_ID, ROOT_ID};

use super::dir::VirtualDirectory;
use super::file::VirtualFile;

/// FUSE inode number of the root directory (always 1 per FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// Read-only directory permissions (r-xr-xr-x).
pub const READ_ONLY_DIR_PERMS: u16 = 0o555;

/// Read-only file permissions (r--r--r--).
pub const READ_ONLY_FILE_PERMS: u16 = 0o444;

/// Map a manifest node id to a FUSE inode number.
///
/// The manifest root is id 0 while FUSE reserves inode 1 for the root, so
/// every id is shifted by one. Manifest loading rejects ids above
/// `MAX_NODE_ID`, so the shift never wraps for a loaded node.
pub fn ino_from_id(id: NodeId) -> u64 {
    id.wrapping_add(1)
}

/// Map a FUSE inode number back to a manifest node id.
///
/// # Returns
/// None for inode 0, which FUSE never assigns.
pub fn id_from_ino(ino: u64) -> Option<NodeId> {
    ino.checked_sub(1)
}

/// Type of node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Directory.
    Directory,
    /// Regular file backed by a remote URL.
    File,
}

/// Common trait for directory and file nodes.
pub trait VirtualNode: Send + Sync + std::fmt::Debug {
    /// Get the node id.
    fn id(&self) -> NodeId;

    /// Get the parent node id. The root is its own parent.
    fn parent_id(&self) -> NodeId;

    /// Get the entry name.
    fn name(&self) -> &str;

    /// Get the node kind.
    fn kind(&self) -> NodeKind;

    /// Get the permissions (POSIX mode bits).
    fn permissions(&self) -> u16 {
        match self.kind() {
            NodeKind::Directory => READ_ONLY_DIR_PERMS,
            NodeKind::File => READ_ONLY_FILE_PERMS,
        }
    }
}

/// Shared reference to a node of the built tree.
///
/// Cloning a `Node` clones an `Arc`, never the subtree behind it.
#[derive(Debug, Clone)]
pub enum Node {
    Directory(Arc<VirtualDirectory>),
    File(Arc<VirtualFile>),
}

impl Node {
    /// View the node through the common trait.
    pub fn as_node(&self) -> &dyn VirtualNode {
        match self {
            Node::Directory(d) => &**d,
            Node::File(f) => &**f,
        }
    }

    /// Get the node id.
    pub fn id(&self) -> NodeId {
        self.as_node().id()
    }

    /// Get the entry name.
    pub fn name(&self) -> &str {
        self.as_node().name()
    }

    /// Get the node kind.
    pub fn kind(&self) -> NodeKind {
        self.as_node().kind()
    }

    /// Get the directory if this node is one.
    pub fn as_dir(&self) -> Option<&Arc<VirtualDirectory>> {
        match self {
            Node::Directory(d) => Some(d),
            Node::File(_) => None,
        }
    }

    /// Get the file if this node is one.
    pub fn as_file(&self) -> Option<&Arc<VirtualFile>> {
        match self {
            Node::Directory(_) => None,
            Node::File(f) => Some(f),
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Node id of the entry.
    pub id: NodeId,
    /// Entry name.
    pub name: String,
    /// Entry kind.
    pub kind: NodeKind,
}
