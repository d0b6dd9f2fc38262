//! FUSE filesystem implementation.
//!
//! Metadata callbacks (lookup, getattr, readdir) answer from the in-memory
//! tree on the FUSE thread. Callbacks that touch a remote stream (open, read,
//! release) hand their work and the reply to the executor and return at once,
//! so a stalled stream never holds up requests on other handles.

#[cfg(feature = "fuse")]
mod impl_fuse {
    use std::ffi::OsStr;
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};

    use fuser::{
        FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory,
        ReplyEmpty, ReplyEntry, ReplyOpen, Request,
    };

    use crate::executor::{AsyncExecutor, ExecutorError};
    use crate::handle::{HandleTable, OpenFileInfo, OpenHandle};
    use crate::inode::{
        id_from_ino, ino_from_id, Node, NodeKind, VirtualDirectory, VirtualFile, VirtualNode,
    };
    use crate::options::VfsOptions;
    use crate::session::RemoteReadSession;
    use crate::vfs::{NodeAttr, RemoteVfs};
    use crate::VfsError;

    /// Bypass the page cache: sizes are reported as 0, so cached reads would
    /// be clamped to nothing.
    pub const FOPEN_DIRECT_IO: u32 = 1 << 0;

    /// The file is a forward-only stream.
    pub const FOPEN_NONSEEKABLE: u32 = 1 << 2;

    /// Read-only FUSE filesystem serving remote files.
    pub struct S3Fuse {
        /// Tree and fetcher.
        vfs: Arc<RemoteVfs>,
        /// Open file handles.
        handles: Arc<HandleTable>,
        /// Runs fetches on behalf of the sync callbacks.
        executor: AsyncExecutor,
        uid: u32,
        gid: u32,
    }

    impl S3Fuse {
        /// Create the FUSE adapter over a VFS.
        ///
        /// # Arguments
        /// * `vfs` - Built VFS
        pub fn new(vfs: RemoteVfs) -> Result<Self, VfsError> {
            let executor: AsyncExecutor = AsyncExecutor::new(vfs.options().executor.clone())?;
            Ok(Self {
                vfs: Arc::new(vfs),
                handles: Arc::new(HandleTable::new()),
                executor,
                uid: unsafe { libc::getuid() },
                gid: unsafe { libc::getgid() },
            })
        }

        /// Get the underlying VFS.
        pub fn vfs(&self) -> &RemoteVfs {
            &self.vfs
        }

        /// Snapshot of currently open files.
        pub fn open_files(&self) -> Vec<OpenFileInfo> {
            self.handles.open_files()
        }

        /// Convert node attributes to FUSE file attributes.
        fn to_file_attr(&self, attr: &NodeAttr) -> FileAttr {
            let kind: FileType = file_type(attr.kind);
            FileAttr {
                ino: ino_from_id(attr.id),
                size: attr.size,
                blocks: 0,
                atime: attr.mtime,
                mtime: attr.mtime,
                ctime: attr.mtime,
                crtime: UNIX_EPOCH,
                kind,
                perm: attr.perm,
                nlink: attr.nlink,
                uid: self.uid,
                gid: self.gid,
                rdev: 0,
                blksize: 512,
                flags: 0,
            }
        }

        fn ttl(&self) -> Duration {
            self.vfs.options().attr_ttl()
        }
    }

    fn file_type(kind: NodeKind) -> FileType {
        match kind {
            NodeKind::Directory => FileType::Directory,
            NodeKind::File => FileType::RegularFile,
        }
    }

    /// Resolve an inode to its node.
    fn node_for(vfs: &RemoteVfs, ino: u64) -> Result<&Node, VfsError> {
        match id_from_ino(ino) {
            Some(id) => vfs.nodes().get(id).ok_or(VfsError::NodeNotFound(id)),
            None => Err(VfsError::NotFound {
                path: format!("inode {}", ino),
            }),
        }
    }

    fn dir_for(vfs: &RemoteVfs, ino: u64) -> Result<&Arc<VirtualDirectory>, VfsError> {
        match node_for(vfs, ino)? {
            Node::Directory(d) => Ok(d),
            Node::File(f) => Err(VfsError::NotADirectory {
                path: f.name().to_string(),
            }),
        }
    }

    /// The file to open for `ino`, refusing directories and write access.
    fn open_target(vfs: &RemoteVfs, ino: u64, flags: i32) -> Result<Arc<VirtualFile>, VfsError> {
        let file: Arc<VirtualFile> = match node_for(vfs, ino)? {
            Node::File(f) => f.clone(),
            Node::Directory(d) => return Err(VfsError::NotAFile(d.id())),
        };
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(VfsError::ReadOnly);
        }
        Ok(file)
    }

    /// The handle and offset for a read on `(ino, fh)`.
    fn read_target(
        handles: &HandleTable,
        ino: u64,
        fh: u64,
        offset: i64,
    ) -> Result<(Arc<OpenHandle>, u64), VfsError> {
        let id = id_from_ino(ino).ok_or(VfsError::BadHandle(fh))?;
        let handle: Arc<OpenHandle> = handles.handle_for(fh, id)?;
        let offset: u64 = u64::try_from(offset).map_err(|_| VfsError::InvalidOffset(offset))?;
        Ok((handle, offset))
    }

    fn settle<T>(result: Result<Result<T, VfsError>, ExecutorError>) -> Result<T, VfsError> {
        result.map_err(VfsError::from).and_then(|inner| inner)
    }

    /// One line of a directory listing.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct ListingEntry {
        ino: u64,
        kind: FileType,
        name: String,
    }

    /// Full listing of `dir`: `.`, `..`, then its children.
    ///
    /// The root's `..` is the root itself.
    fn directory_listing(vfs: &RemoteVfs, ino: u64, dir: &VirtualDirectory) -> Vec<ListingEntry> {
        let mut entries: Vec<ListingEntry> = vec![
            ListingEntry {
                ino,
                kind: FileType::Directory,
                name: ".".to_string(),
            },
            ListingEntry {
                ino: ino_from_id(dir.parent_id()),
                kind: FileType::Directory,
                name: "..".to_string(),
            },
        ];
        entries.extend(vfs.readdir(dir).into_iter().map(|entry| ListingEntry {
            ino: ino_from_id(entry.id),
            kind: file_type(entry.kind),
            name: entry.name,
        }));
        entries
    }

    /// Entries after `offset`, each paired with the offset that resumes after it.
    fn listing_from(
        entries: &[ListingEntry],
        offset: i64,
    ) -> impl Iterator<Item = (i64, &ListingEntry)> + '_ {
        let skip: usize = usize::try_from(offset).unwrap_or(0);
        entries
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, entry)| ((i + 1) as i64, entry))
    }

    impl Filesystem for S3Fuse {
        fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
            let name_str: &str = match name.to_str() {
                Some(n) => n,
                None => {
                    reply.error(libc::ENOENT);
                    return;
                }
            };

            let found: Result<Node, VfsError> =
                dir_for(&self.vfs, parent).and_then(|dir| self.vfs.lookup(dir, name_str));
            match found {
                Ok(node) => {
                    let attr: NodeAttr = self.vfs.attr(&node);
                    reply.entry(&self.ttl(), &self.to_file_attr(&attr), 0);
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
            match node_for(&self.vfs, ino) {
                Ok(node) => {
                    let attr: NodeAttr = self.vfs.attr(node);
                    reply.attr(&self.ttl(), &self.to_file_attr(&attr));
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        fn readdir(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            mut reply: ReplyDirectory,
        ) {
            let dir: &Arc<VirtualDirectory> = match dir_for(&self.vfs, ino) {
                Ok(d) => d,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let entries: Vec<ListingEntry> = directory_listing(&self.vfs, ino, dir);
            for (next, entry) in listing_from(&entries, offset) {
                if reply.add(entry.ino, next, entry.kind, &entry.name) {
                    break;
                }
            }
            reply.ok();
        }

        fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
            let file: Arc<VirtualFile> = match open_target(&self.vfs, ino, flags) {
                Ok(f) => f,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let vfs: Arc<RemoteVfs> = self.vfs.clone();
            let handles: Arc<HandleTable> = self.handles.clone();
            let open_file: Arc<VirtualFile> = file.clone();
            // A reply dropped unsent is answered with EIO by fuser.
            let queued = self.executor.spawn(
                async move { vfs.open(&open_file).await },
                move |result: Result<Result<RemoteReadSession, VfsError>, ExecutorError>| {
                    match settle(result) {
                        Ok(session) => {
                            let fh: u64 = handles.insert(file.clone(), session);
                            tracing::debug!(ino, fh, url = file.url(), "open");
                            reply.opened(fh, FOPEN_DIRECT_IO | FOPEN_NONSEEKABLE);
                        }
                        Err(e) => {
                            tracing::error!(ino, url = file.url(), error = %e, "open failed");
                            reply.error(e.errno());
                        }
                    }
                },
            );
            if let Err(e) = queued {
                tracing::error!(ino, error = %e, "could not queue open");
            }
        }

        fn read(
            &mut self,
            _req: &Request,
            ino: u64,
            fh: u64,
            offset: i64,
            size: u32,
            _flags: i32,
            _lock: Option<u64>,
            reply: ReplyData,
        ) {
            let (handle, offset) = match read_target(&self.handles, ino, fh, offset) {
                Ok(target) => target,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let queued = self.executor.spawn(
                async move { handle.read(offset, size as usize).await },
                move |result: Result<Result<Vec<u8>, VfsError>, ExecutorError>| {
                    match settle(result) {
                        Ok(data) => reply.data(&data),
                        Err(e) => {
                            tracing::error!(ino, fh, offset, error = %e, "read failed");
                            reply.error(e.errno());
                        }
                    }
                },
            );
            if let Err(e) = queued {
                tracing::error!(ino, fh, error = %e, "could not queue read");
            }
        }

        fn release(
            &mut self,
            _req: &Request,
            _ino: u64,
            fh: u64,
            _flags: i32,
            _lock: Option<u64>,
            _flush: bool,
            reply: ReplyEmpty,
        ) {
            match self.handles.detach(fh) {
                Some(handle) => {
                    // Dropping the handle on a failed spawn closes the stream too.
                    let queued = self
                        .executor
                        .spawn(async move { handle.close().await }, |_| {});
                    if let Err(e) = queued {
                        tracing::warn!(fh, error = %e, "release fell back to dropping the handle");
                    }
                    tracing::debug!(fh, "release");
                }
                None => tracing::debug!(fh, "release of unknown handle"),
            }
            reply.ok();
        }

        fn destroy(&mut self) {
            let handles: Arc<HandleTable> = self.handles.clone();
            match self
                .executor
                .block_on(async move { handles.release_all().await })
            {
                Ok(n) => tracing::info!(released = n, "unmounting"),
                Err(e) => tracing::warn!(error = %e, "could not release open handles"),
            }
            self.executor.cancel_all();
        }
    }

    fn mount_options(options: &VfsOptions) -> Vec<MountOption> {
        vec![
            MountOption::RO,
            MountOption::FSName(options.fs_name.clone()),
            MountOption::AutoUnmount,
        ]
    }

    /// Mount a read-only VFS and block until it is unmounted.
    ///
    /// # Arguments
    /// * `fs` - The filesystem to mount
    /// * `mountpoint` - Path to mount at
    pub fn mount(fs: S3Fuse, mountpoint: &std::path::Path) -> Result<(), VfsError> {
        let options: Vec<MountOption> = mount_options(fs.vfs().options());
        tracing::info!(mountpoint = %mountpoint.display(), "mounting");
        fuser::mount2(fs, mountpoint, &options).map_err(|e| VfsError::MountFailed(e.to_string()))
    }

    /// Spawn a read-only VFS mount in the background.
    ///
    /// # Arguments
    /// * `fs` - The filesystem to mount
    /// * `mountpoint` - Path to mount at
    ///
    /// # Returns
    /// Background session handle. Dropping it unmounts.
    pub fn spawn_mount(
        fs: S3Fuse,
        mountpoint: &std::path::Path,
    ) -> Result<fuser::BackgroundSession, VfsError> {
        let options: Vec<MountOption> = mount_options(fs.vfs().options());
        tracing::info!(mountpoint = %mountpoint.display(), "mounting in background");
        fuser::spawn_mount2(fs, mountpoint, &options)
            .map_err(|e| VfsError::MountFailed(e.to_string()))
    }

}

#[cfg(feature = "fuse")]
pub use impl_fuse::{mount, spawn_mount, S3Fuse, FOPEN_DIRECT_IO, FOPEN_NONSEEKABLE};
