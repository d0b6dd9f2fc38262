//! Protocol-independent filesystem operations.
//!
//! `RemoteVfs` holds the built tree and the fetcher. It answers root, attr,
//! lookup and readdir directly from the immutable tree, and opens read
//! sessions through the fetcher. The FUSE binding is a thin layer over it.

use std::sync::Arc;
use std::time::SystemTime;

use s3fuse_model::Manifest;
use s3fuse_storage::UrlFetcher;

use crate::builder::build_from_manifest;
use crate::error::VfsError;
use crate::inode::{
    DirEntry, Node, NodeId, NodeKind, NodeTable, VirtualDirectory, VirtualFile, VirtualNode,
};
use crate::options::VfsOptions;
use crate::session::RemoteReadSession;

/// Attributes of a node as reported to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    /// Node id.
    pub id: NodeId,
    /// Node kind.
    pub kind: NodeKind,
    /// Permission bits.
    pub perm: u16,
    /// Always 0: remote sizes are not known before reading.
    pub size: u64,
    /// Link count.
    pub nlink: u32,
    /// Mount time, used for every timestamp.
    pub mtime: SystemTime,
}

/// Read-only filesystem over a manifest of remote files.
pub struct RemoteVfs {
    nodes: NodeTable,
    fetcher: Arc<dyn UrlFetcher>,
    options: VfsOptions,
    mounted_at: SystemTime,
}

impl RemoteVfs {
    /// Create a VFS over an already built node table.
    ///
    /// # Arguments
    /// * `nodes` - Built tree
    /// * `fetcher` - Transport used to open file URLs
    /// * `options` - VFS configuration
    pub fn new(nodes: NodeTable, fetcher: Arc<dyn UrlFetcher>, options: VfsOptions) -> Self {
        Self {
            nodes,
            fetcher,
            options,
            mounted_at: SystemTime::now(),
        }
    }

    /// Build the tree from a manifest and create a VFS over it.
    pub fn from_manifest(
        manifest: &Manifest,
        fetcher: Arc<dyn UrlFetcher>,
        options: VfsOptions,
    ) -> Result<Self, VfsError> {
        let nodes: NodeTable = build_from_manifest(manifest)?;
        Ok(Self::new(nodes, fetcher, options))
    }

    /// Get the root directory as a node.
    pub fn root(&self) -> Node {
        Node::Directory(self.nodes.root().clone())
    }

    /// Get the id index.
    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Get the options.
    pub fn options(&self) -> &VfsOptions {
        &self.options
    }

    /// Get the fetcher.
    pub fn fetcher(&self) -> &Arc<dyn UrlFetcher> {
        &self.fetcher
    }

    /// Attributes of a node.
    pub fn attr(&self, node: &Node) -> NodeAttr {
        let kind: NodeKind = node.kind();
        NodeAttr {
            id: node.id(),
            kind,
            perm: node.as_node().permissions(),
            size: 0,
            nlink: match kind {
                NodeKind::Directory => 2,
                NodeKind::File => 1,
            },
            mtime: self.mounted_at,
        }
    }

    /// Resolve a relative path below `dir`.
    ///
    /// `name` is split on `/` and empty components are skipped, so `"a//b/"`
    /// resolves like `"a/b"`. A trailing slash still requires the last node to
    /// be a directory. At each step directories are searched before files.
    ///
    /// # Arguments
    /// * `dir` - Directory to start from
    /// * `name` - Single name or slash-separated path
    ///
    /// # Returns
    /// The resolved node, `NotADirectory` if a file is followed by more
    /// components or by a trailing slash, or `NotFound`.
    pub fn lookup(&self, dir: &Arc<VirtualDirectory>, name: &str) -> Result<Node, VfsError> {
        let mut current: Node = Node::Directory(dir.clone());
        let mut walked: Vec<&str> = Vec::new();

        for component in name.split('/').filter(|c| !c.is_empty()) {
            let parent: Arc<VirtualDirectory> = match &current {
                Node::Directory(d) => d.clone(),
                Node::File(_) => {
                    return Err(VfsError::NotADirectory {
                        path: walked.join("/"),
                    })
                }
            };
            walked.push(component);
            current = parent
                .find_child(component)
                .ok_or_else(|| VfsError::NotFound {
                    path: walked.join("/"),
                })?;
        }

        if name.ends_with('/') && current.kind() == NodeKind::File {
            return Err(VfsError::NotADirectory {
                path: walked.join("/"),
            });
        }

        tracing::debug!(dir = dir.id(), name, found = current.id(), "lookup");
        Ok(current)
    }

    /// Resolve a path from the root.
    pub fn lookup_path(&self, path: &str) -> Result<Node, VfsError> {
        self.lookup(self.nodes.root(), path)
    }

    /// List the immediate children of a directory.
    pub fn readdir(&self, dir: &VirtualDirectory) -> Vec<DirEntry> {
        dir.entries()
    }

    /// Start a read session on a file.
    pub async fn open(&self, file: &VirtualFile) -> Result<RemoteReadSession, VfsError> {
        RemoteReadSession::open(self.fetcher.as_ref(), file, &self.options).await
    }
}
