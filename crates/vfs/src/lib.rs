//! Read-only virtual filesystem over a flat manifest of remote files.
//!
//! The manifest lists every node with its parent id; files carry a URL. The
//! tree is built once at startup and never changes. Opening a file starts a
//! streaming fetch of its URL; reads consume that stream forward-only.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: FUSE Interface (fuser::Filesystem impl, S3Fuse)
//! Layer 2: VFS Operations (RemoteVfs: root, attr, lookup, readdir, open)
//! Layer 1: Primitives (NodeTable, RemoteReadSession, HandleTable, AsyncExecutor)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use s3fuse_model::Manifest;
//! use s3fuse_storage::{HttpFetcher, HttpSettings};
//! use s3fuse_vfs::{mount, RemoteVfs, S3Fuse, VfsOptions};
//!
//! let manifest = Manifest::from_path("manifest.json")?;
//! let fetcher = Arc::new(HttpFetcher::new(HttpSettings::default())?);
//! let vfs = RemoteVfs::from_manifest(&manifest, fetcher, VfsOptions::default())?;
//! mount(S3Fuse::new(vfs)?, "/mnt/remote".as_ref())?;
//! ```

pub mod builder;
pub mod error;
pub mod executor;
pub mod handle;
pub mod inode;
pub mod options;
pub mod session;
pub mod vfs;

#[cfg(feature = "fuse")]
pub mod fuse;

pub use builder::{build_from_manifest, build_tree};
pub use error::VfsError;
pub use executor::{AsyncExecutor, ExecutorConfig, ExecutorError};
pub use handle::{HandleTable, OpenFileInfo};
pub use inode::{DirEntry, Node, NodeId, NodeKind, NodeTable, VirtualDirectory, VirtualFile};
pub use inode::{ROOT_ID, ROOT_INODE};
pub use options::{VfsOptions, DEFAULT_READ_BUFFER_SIZE};
pub use session::{ReadChunk, RemoteReadSession};
pub use vfs::{NodeAttr, RemoteVfs};

#[cfg(feature = "fuse")]
pub use fuse::{mount, spawn_mount, S3Fuse};
