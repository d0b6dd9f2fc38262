//! File node implementation.

use super::types::{NodeId, NodeKind, VirtualNode};

/// File node whose content lives at a remote URL.
///
/// The URL is opaque: it is handed to the fetcher unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    /// Node id.
    id: NodeId,
    /// Parent directory id.
    parent_id: NodeId,
    /// File name.
    name: String,
    /// Remote locator.
    url: String,
}

impl VirtualFile {
    /// Create a new file node.
    ///
    /// # Arguments
    /// * `id` - Node id
    /// * `parent_id` - Parent directory id
    /// * `name` - File name
    /// * `url` - Remote locator of the content
    pub fn new(id: NodeId, parent_id: NodeId, name: String, url: String) -> Self {
        Self {
            id,
            parent_id,
            name,
            url,
        }
    }

    /// Get the remote locator.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl VirtualNode for VirtualFile {
    fn id(&self) -> NodeId {
        self.id
    }

    fn parent_id(&self) -> NodeId {
        self.parent_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::File
    }
}
