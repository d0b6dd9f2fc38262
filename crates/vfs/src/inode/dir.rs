//! Directory node implementation.

use std::fmt;
use std::sync::Arc;

use super::file::VirtualFile;
use super::types::{DirEntry, Node, NodeId, NodeKind, VirtualNode};

/// Directory node. Children are fixed at construction.
///
/// Child directories and child files are kept in separate lists, each in
/// ascending id order. Sibling names are not required to be unique; name
/// resolution searches directories before files and takes the first match.
pub struct VirtualDirectory {
    /// Node id.
    id: NodeId,
    /// Parent directory id.
    parent_id: NodeId,
    /// Directory name.
    name: String,
    /// Child directories.
    dirs: Vec<Arc<VirtualDirectory>>,
    /// Child files.
    files: Vec<Arc<VirtualFile>>,
}

impl VirtualDirectory {
    /// Create a new directory node.
    ///
    /// # Arguments
    /// * `id` - Node id
    /// * `parent_id` - Parent directory id (the root passes its own id)
    /// * `name` - Directory name
    /// * `dirs` - Child directories
    /// * `files` - Child files
    pub fn new(
        id: NodeId,
        parent_id: NodeId,
        name: String,
        dirs: Vec<Arc<VirtualDirectory>>,
        files: Vec<Arc<VirtualFile>>,
    ) -> Self {
        Self {
            id,
            parent_id,
            name,
            dirs,
            files,
        }
    }

    /// Get the child directories.
    pub fn dirs(&self) -> &[Arc<VirtualDirectory>] {
        &self.dirs
    }

    /// Get the child files.
    pub fn files(&self) -> &[Arc<VirtualFile>] {
        &self.files
    }

    /// Find an immediate child by exact (case-sensitive) name.
    ///
    /// # Arguments
    /// * `name` - Single path segment
    ///
    /// # Returns
    /// The first matching child directory, else the first matching child file.
    pub fn find_child(&self, name: &str) -> Option<Node> {
        if let Some(dir) = self.dirs.iter().find(|d| d.name == name) {
            return Some(Node::Directory(dir.clone()));
        }
        self.files
            .iter()
            .find(|f| f.name() == name)
            .map(|f| Node::File(f.clone()))
    }

    /// List immediate children: directories first, then files.
    pub fn entries(&self) -> Vec<DirEntry> {
        let dirs = self.dirs.iter().map(|d| DirEntry {
            id: d.id,
            name: d.name.clone(),
            kind: NodeKind::Directory,
        });
        let files = self.files.iter().map(|f| DirEntry {
            id: f.id(),
            name: f.name().to_string(),
            kind: NodeKind::File,
        });
        dirs.chain(files).collect()
    }

    /// Number of immediate children.
    pub fn len(&self) -> usize {
        self.dirs.len() + self.files.len()
    }

    /// Check if the directory has no children.
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Line<'a> {
            Dir(&'a VirtualDirectory, usize),
            Files(&'a VirtualDirectory, usize),
        }

        let mut stack: Vec<Line<'_>> = vec![Line::Dir(self, 0)];
        while let Some(line) = stack.pop() {
            match line {
                Line::Dir(dir, depth) => {
                    let slash: &str = if dir.name.ends_with('/') { "" } else { "/" };
                    writeln!(f, "{}{}{} [{}]", "  ".repeat(depth), dir.name, slash, dir.id)?;
                    stack.push(Line::Files(dir, depth));
                    for child in dir.dirs.iter().rev() {
                        stack.push(Line::Dir(child.as_ref(), depth + 1));
                    }
                }
                Line::Files(dir, depth) => {
                    let indent: String = "  ".repeat(depth + 1);
                    for file in &dir.files {
                        writeln!(f, "{}{} [{}] -> {}", indent, file.name(), file.id(), file.url())?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Indented tree listing, one node per line.
impl fmt::Display for VirtualDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f)
    }
}

/// Shallow: children are summarized by count.
impl fmt::Debug for VirtualDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDirectory")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("name", &self.name)
            .field("dirs", &self.dirs.len())
            .field("files", &self.files.len())
            .finish()
    }
}

/// Unlinks owned subdirectories one at a time so dropping a deep tree does
/// not recurse once per level.
impl Drop for VirtualDirectory {
    fn drop(&mut self) {
        let mut pending: Vec<Arc<VirtualDirectory>> = std::mem::take(&mut self.dirs);
        while let Some(dir) = pending.pop() {
            if let Ok(mut owned) = Arc::try_unwrap(dir) {
                pending.append(&mut owned.dirs);
            }
        }
    }
}

impl VirtualNode for VirtualDirectory {
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
        NodeKind::Directory
    }
}
