//! Builder for constructing the VFS tree from a manifest.
//!
//! The manifest is flat: every record names its parent by id. The builder
//! first checks every parent chain for cycles, then materializes the tree
//! from the root down, assembling each directory once its subdirectories
//! exist. Records that cannot be reached from the root
//! (orphans, descendants of orphans, records parented to a file) are dropped
//! and logged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use s3fuse_model::{Manifest, NodeId, NodeRecord, ROOT_ID};

use crate::error::VfsError;
use crate::inode::{NodeTable, VirtualDirectory, VirtualFile};

/// Build the node table from a manifest.
///
/// # Arguments
/// * `manifest` - Validated manifest
///
/// # Returns
/// A table indexing every node reachable from the root.
pub fn build_from_manifest(manifest: &Manifest) -> Result<NodeTable, VfsError> {
    let root: Arc<VirtualDirectory> = build_tree(manifest)?;
    let table: NodeTable = NodeTable::new(root);
    tracing::info!(
        directories = table.directory_count(),
        files = table.file_count(),
        dropped = manifest.len() - table.len(),
        "built tree from manifest"
    );
    Ok(table)
}

/// Materialize the directory tree rooted at the manifest root.
///
/// # Arguments
/// * `manifest` - Validated manifest
///
/// # Returns
/// The root directory, or `VfsError::Cycle` if any parent chain loops.
pub fn build_tree(manifest: &Manifest) -> Result<Arc<VirtualDirectory>, VfsError> {
    check_cycles(manifest)?;

    let mut visited: HashSet<NodeId> = HashSet::new();
    let root: Arc<VirtualDirectory> = build_dirs(manifest, manifest.root(), &mut visited)?;

    for record in manifest.records() {
        if visited.contains(&record.id) {
            continue;
        }
        match record.parent_id {
            Some(parent) if manifest.contains(parent) => tracing::warn!(
                id = record.id,
                parent,
                name = %record.name,
                "dropping record not reachable from root"
            ),
            _ => tracing::warn!(
                id = record.id,
                parent = ?record.parent_id,
                name = %record.name,
                "dropping orphan record"
            ),
        }
    }

    Ok(root)
}

/// Walk every parent chain and fail on the first loop.
///
/// A chain ends at the root, at a parent id that does not exist, or at a
/// record already known to end. The root's own parent is not followed.
fn check_cycles(manifest: &Manifest) -> Result<(), VfsError> {
    let mut settled: HashSet<NodeId> = HashSet::new();
    settled.insert(ROOT_ID);

    for record in manifest.records() {
        let mut on_path: Vec<NodeId> = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut current: Option<&NodeRecord> = Some(record);

        while let Some(node) = current {
            if settled.contains(&node.id) {
                break;
            }
            if !seen.insert(node.id) {
                return Err(VfsError::Cycle { id: node.id });
            }
            on_path.push(node.id);
            current = node.parent_id.and_then(|parent| manifest.get(parent));
        }

        settled.extend(on_path);
    }

    Ok(())
}

enum Visit<'a> {
    /// First time the directory is seen: queue its subdirectories.
    Enter(&'a NodeRecord),
    /// Every subdirectory is built: assemble the directory itself.
    Leave(&'a NodeRecord),
}

/// Build directories bottom-up with an explicit stack, so nesting depth is
/// bounded by memory rather than by the thread's stack.
fn build_dirs(
    manifest: &Manifest,
    root: &NodeRecord,
    visited: &mut HashSet<NodeId>,
) -> Result<Arc<VirtualDirectory>, VfsError> {
    let mut built: HashMap<NodeId, Arc<VirtualDirectory>> = HashMap::new();
    let mut stack: Vec<Visit<'_>> = vec![Visit::Enter(root)];

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(record) => {
                if !visited.insert(record.id) {
                    return Err(VfsError::Cycle { id: record.id });
                }
                stack.push(Visit::Leave(record));
                for child in manifest.children_of(record.id) {
                    if child.is_directory {
                        stack.push(Visit::Enter(child));
                    }
                }
            }
            Visit::Leave(record) => {
                let directory: VirtualDirectory = assemble(manifest, record, &mut built, visited)?;
                built.insert(record.id, Arc::new(directory));
            }
        }
    }

    built
        .remove(&root.id)
        .ok_or(VfsError::Cycle { id: root.id })
}

fn assemble(
    manifest: &Manifest,
    record: &NodeRecord,
    built: &mut HashMap<NodeId, Arc<VirtualDirectory>>,
    visited: &mut HashSet<NodeId>,
) -> Result<VirtualDirectory, VfsError> {
    let mut dirs: Vec<Arc<VirtualDirectory>> = Vec::new();
    let mut files: Vec<Arc<VirtualFile>> = Vec::new();

    for child in manifest.children_of(record.id) {
        if child.is_directory {
            let dir: Arc<VirtualDirectory> = built
                .remove(&child.id)
                .ok_or(VfsError::Cycle { id: child.id })?;
            dirs.push(dir);
        } else {
            if !visited.insert(child.id) {
                return Err(VfsError::Cycle { id: child.id });
            }
            files.push(Arc::new(VirtualFile::new(
                child.id,
                record.id,
                child.name.clone(),
                child.url.clone().unwrap_or_default(),
            )));
        }
    }

    let parent_id: NodeId = if record.is_root() {
        ROOT_ID
    } else {
        record.parent_id.unwrap_or(ROOT_ID)
    };

    Ok(VirtualDirectory::new(
        record.id,
        parent_id,
        record.name.clone(),
        dirs,
        files,
    ))
}
