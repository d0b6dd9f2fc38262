//! Node primitives for the virtual filesystem.
//!
//! This module provides the immutable directory/file tree built from a
//! manifest, and an id-indexed table over it for inode-addressed access.

mod dir;
mod file;
mod manager;
mod types;

pub use dir::VirtualDirectory;
pub use file::VirtualFile;
pub use manager::NodeTable;
pub use types::{
    id_from_ino, ino_from_id, DirEntry, Node, NodeId, NodeKind, VirtualNode, READ_ONLY_DIR_PERMS,
    READ_ONLY_FILE_PERMS, MAX_NODE_ID, ROOT_ID, ROOT_INODE,
};
