//! Error types for the VFS crate.

use std::fmt;

use s3fuse_model::{ManifestError, NodeId};
use s3fuse_storage::StorageError;

use crate::executor::ExecutorError;

/// Errors that can occur during VFS operations.
#[derive(Debug)]
pub enum VfsError {
    /// Manifest could not be loaded or has no root.
    Manifest(ManifestError),

    /// A parent chain in the manifest loops back on itself.
    Cycle { id: NodeId },

    /// No entry with this name.
    NotFound { path: String },

    /// A path component resolved to a file but more components follow.
    NotADirectory { path: String },

    /// Open was attempted on something that is not a file.
    NotAFile(NodeId),

    /// No node with this id.
    NodeNotFound(NodeId),

    /// Remote fetch could not be started.
    Fetch { url: String, source: StorageError },

    /// Remote stream failed mid-read.
    Stream { url: String, source: StorageError },

    /// A read asked for an offset other than the session cursor.
    SequentialityViolation { expected: u64, actual: u64 },

    /// The session was already released.
    Released { url: String },

    /// No open handle with this id.
    BadHandle(u64),

    /// Async executor unavailable or operation timed out.
    Executor(ExecutorError),

    /// Mount operation failed.
    MountFailed(String),

    /// Read-only filesystem.
    ReadOnly,

    /// The kernel passed a negative read offset.
    InvalidOffset(i64),
}

impl VfsError {
    /// Errno to report to the kernel for this error.
    #[cfg(feature = "fuse")]
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::NotFound { .. } | VfsError::NodeNotFound(_) => libc::ENOENT,
            VfsError::NotADirectory { .. } => libc::ENOTDIR,
            VfsError::NotAFile(_) => libc::EISDIR,
            VfsError::SequentialityViolation { .. } => libc::ESPIPE,
            VfsError::BadHandle(_) | VfsError::Released { .. } => libc::EBADF,
            VfsError::ReadOnly => libc::EROFS,
            VfsError::InvalidOffset(_) => libc::EINVAL,
            VfsError::Executor(ExecutorError::Timeout { .. }) => libc::ETIMEDOUT,
            VfsError::Executor(ExecutorError::Cancelled) => libc::EINTR,
            VfsError::Manifest(_)
            | VfsError::Cycle { .. }
            | VfsError::Fetch { .. }
            | VfsError::Stream { .. }
            | VfsError::Executor(_)
            | VfsError::MountFailed(_) => libc::EIO,
        }
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::Manifest(e) => write!(f, "Manifest error: {}", e),
            VfsError::Cycle { id } => write!(f, "Cycle in parent chain at node {}", id),
            VfsError::NotFound { path } => write!(f, "No such entry: {}", path),
            VfsError::NotADirectory { path } => write!(f, "Not a directory: {}", path),
            VfsError::NotAFile(id) => write!(f, "Not a file: {}", id),
            VfsError::NodeNotFound(id) => write!(f, "Node not found: {}", id),
            VfsError::Fetch { url, source } => write!(f, "Fetch failed for {}: {}", url, source),
            VfsError::Stream { url, source } => {
                write!(f, "Read failed for {}: {}", url, source)
            }
            VfsError::SequentialityViolation { expected, actual } => write!(
                f,
                "Non-sequential read: expected offset {}, got {}",
                expected, actual
            ),
            VfsError::Released { url } => write!(f, "Session already released: {}", url),
            VfsError::BadHandle(fh) => write!(f, "Unknown file handle: {}", fh),
            VfsError::Executor(e) => write!(f, "Executor error: {}", e),
            VfsError::MountFailed(msg) => write!(f, "Mount failed: {}", msg),
            VfsError::ReadOnly => write!(f, "Read-only filesystem"),
            VfsError::InvalidOffset(offset) => write!(f, "Invalid read offset: {}", offset),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Manifest(e) => Some(e),
            VfsError::Fetch { source, .. } | VfsError::Stream { source, .. } => Some(source),
            VfsError::Executor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ManifestError> for VfsError {
    fn from(e: ManifestError) -> Self {
        VfsError::Manifest(e)
    }
}

impl From<ExecutorError> for VfsError {
    fn from(e: ExecutorError) -> Self {
        VfsError::Executor(e)
    }
}
