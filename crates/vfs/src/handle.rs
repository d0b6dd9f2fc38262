//! Open file handle table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::VfsError;
use crate::inode::{NodeId, VirtualFile, VirtualNode};
use crate::session::{ReadChunk, RemoteReadSession};

/// Information about an open file handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFileInfo {
    /// File handle ID.
    pub handle_id: u64,
    /// Node id of the open file.
    pub id: NodeId,
    /// File name.
    pub name: String,
    /// Remote locator.
    pub url: String,
}

/// One open handle: the file plus its exclusive read session.
#[derive(Debug)]
pub struct OpenHandle {
    /// File this handle reads.
    pub file: Arc<VirtualFile>,
    /// Session, locked for the duration of each read.
    pub session: Mutex<RemoteReadSession>,
    /// Cancelled when the handle is detached; aborts a read that is waiting.
    closed: CancellationToken,
}

impl OpenHandle {
    /// Read the next chunk from the session.
    ///
    /// # Returns
    /// The bytes read, empty at end of stream. A read still waiting when the
    /// handle is detached fails with `Released`.
    pub async fn read(&self, offset: u64, size: usize) -> Result<Vec<u8>, VfsError> {
        let read = async {
            let mut session = self.session.lock().await;
            let chunk: Vec<u8> = match session.read(offset, size).await? {
                ReadChunk::Data(data) => data.to_vec(),
                ReadChunk::EndOfStream => Vec::new(),
            };
            Ok::<Vec<u8>, VfsError>(chunk)
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(VfsError::Released {
                url: self.file.url().to_string(),
            }),
            result = read => result,
        }
    }

    /// Close the stream once no read holds the session.
    ///
    /// # Returns
    /// False if the session was already released.
    pub async fn close(&self) -> bool {
        self.closed.cancel();
        self.session.lock().await.release()
    }

    /// Check if the handle has been detached from its table.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Table of open handles keyed by FUSE file handle.
///
/// The map lock is only held to insert, look up or remove an entry, never
/// across an await. Reads on one handle serialize on that handle's session
/// mutex; different handles proceed independently.
#[derive(Debug)]
pub struct HandleTable {
    handles: RwLock<HashMap<u64, Arc<OpenHandle>>>,
    next_handle: AtomicU64,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    /// Create an empty table. Handle ids start at 1.
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Register a session and allocate a handle id for it.
    ///
    /// # Arguments
    /// * `file` - File the session reads
    /// * `session` - Freshly opened session
    pub fn insert(&self, file: Arc<VirtualFile>, session: RemoteReadSession) -> u64 {
        let fh: u64 = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let handle: Arc<OpenHandle> = Arc::new(OpenHandle {
            file,
            session: Mutex::new(session),
            closed: CancellationToken::new(),
        });
        self.handles.write().insert(fh, handle);
        fh
    }

    /// Look up an open handle.
    pub fn get(&self, fh: u64) -> Option<Arc<OpenHandle>> {
        self.handles.read().get(&fh).cloned()
    }

    /// Look up an open handle that must belong to node `id`.
    ///
    /// # Returns
    /// `BadHandle` if `fh` is unknown or was opened on another node.
    pub fn handle_for(&self, fh: u64, id: NodeId) -> Result<Arc<OpenHandle>, VfsError> {
        match self.get(fh) {
            Some(handle) if handle.file.id() == id => Ok(handle),
            _ => Err(VfsError::BadHandle(fh)),
        }
    }

    /// Remove a handle from the table and abort any read waiting on it,
    /// without waiting for its session lock.
    ///
    /// Later lookups of `fh` fail. The stream stays open until
    /// [`OpenHandle::close`] runs or the last reference is dropped.
    pub fn detach(&self, fh: u64) -> Option<Arc<OpenHandle>> {
        let handle: Arc<OpenHandle> = self.handles.write().remove(&fh)?;
        handle.closed.cancel();
        Some(handle)
    }

    /// Remove a handle and close its stream.
    ///
    /// # Returns
    /// False if the handle was unknown (already released).
    pub async fn release(&self, fh: u64) -> bool {
        match self.detach(fh) {
            Some(handle) => {
                handle.close().await;
                true
            }
            None => false,
        }
    }

    /// Release every remaining handle.
    ///
    /// # Returns
    /// Number of handles released.
    pub async fn release_all(&self) -> usize {
        let drained: Vec<Arc<OpenHandle>> = {
            let mut handles = self.handles.write();
            handles.drain().map(|(_, h)| h).collect()
        };
        for handle in &drained {
            handle.closed.cancel();
        }
        for handle in &drained {
            handle.close().await;
        }
        drained.len()
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    /// Check if no handles are open.
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }

    /// Snapshot of the open handles, ordered by handle id.
    pub fn open_files(&self) -> Vec<OpenFileInfo> {
        let mut files: Vec<OpenFileInfo> = self
            .handles
            .read()
            .iter()
            .map(|(&handle_id, h)| OpenFileInfo {
                handle_id,
                id: h.file.id(),
                name: h.file.name().to_string(),
                url: h.file.url().to_string(),
            })
            .collect();
        files.sort_by_key(|f| f.handle_id);
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::VfsOptions;
    use s3fuse_storage::MemoryFetcher;

    async fn open(fetcher: &MemoryFetcher, file: &Arc<VirtualFile>) -> RemoteReadSession {
        RemoteReadSession::open(fetcher, file, &VfsOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_get_release() {
        let fetcher: MemoryFetcher = MemoryFetcher::new();
        fetcher.insert("mem://a", &b"abc"[..]);
        let file: Arc<VirtualFile> = Arc::new(VirtualFile::new(
            3,
            0,
            "a".to_string(),
            "mem://a".to_string(),
        ));

        let table: HandleTable = HandleTable::new();
        let fh: u64 = table.insert(file.clone(), open(&fetcher, &file).await);
        assert_eq!(fh, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(fh).unwrap().file.id(), 3);
        assert_eq!(fetcher.open_streams(), 1);

        assert!(table.release(fh).await);
        assert!(!table.release(fh).await);
        assert!(table.get(fh).is_none());
        assert!(table.is_empty());
        assert_eq!(fetcher.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_release_all_and_open_files() {
        let fetcher: MemoryFetcher = MemoryFetcher::new();
        fetcher.insert("mem://a", &b"abc"[..]);
        let file: Arc<VirtualFile> = Arc::new(VirtualFile::new(
            3,
            0,
            "a".to_string(),
            "mem://a".to_string(),
        ));

        let table: HandleTable = HandleTable::new();
        let first: u64 = table.insert(file.clone(), open(&fetcher, &file).await);
        let second: u64 = table.insert(file.clone(), open(&fetcher, &file).await);
        assert_ne!(first, second);

        let open_files: Vec<OpenFileInfo> = table.open_files();
        assert_eq!(open_files.len(), 2);
        assert_eq!(open_files[0].handle_id, first);
        assert_eq!(open_files[1].url, "mem://a");

        assert_eq!(table.release_all().await, 2);
        assert!(table.is_empty());
        assert_eq!(fetcher.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_handle_for_checks_node() {
        let fetcher: MemoryFetcher = MemoryFetcher::new();
        fetcher.insert("mem://a", &b"abc"[..]);
        let file: Arc<VirtualFile> = Arc::new(VirtualFile::new(
            3,
            0,
            "a".to_string(),
            "mem://a".to_string(),
        ));

        let table: HandleTable = HandleTable::new();
        let fh: u64 = table.insert(file.clone(), open(&fetcher, &file).await);

        assert_eq!(table.handle_for(fh, 3).unwrap().file.id(), 3);
        assert!(matches!(table.handle_for(fh, 4), Err(VfsError::BadHandle(h)) if h == fh));
        assert!(matches!(table.handle_for(99, 3), Err(VfsError::BadHandle(99))));
    }

    #[tokio::test]
    async fn test_read_until_end_of_stream() {
        let fetcher: MemoryFetcher = MemoryFetcher::new();
        fetcher.insert("mem://a", &b"abc"[..]);
        let file: Arc<VirtualFile> = Arc::new(VirtualFile::new(
            3,
            0,
            "a".to_string(),
            "mem://a".to_string(),
        ));

        let table: HandleTable = HandleTable::new();
        let fh: u64 = table.insert(file.clone(), open(&fetcher, &file).await);
        let handle: Arc<OpenHandle> = table.handle_for(fh, 3).unwrap();

        assert_eq!(handle.read(0, 10).await.unwrap(), b"abc".to_vec());
        assert!(handle.read(3, 10).await.unwrap().is_empty());
        assert!(!handle.is_closed());
    }

    #[tokio::test]
    async fn test_detach_aborts_waiting_read() {
        let fetcher: MemoryFetcher = MemoryFetcher::new();
        fetcher.insert_stalled("mem://slow", &b""[..]);
        let file: Arc<VirtualFile> = Arc::new(VirtualFile::new(
            5,
            0,
            "slow".to_string(),
            "mem://slow".to_string(),
        ));

        let table: Arc<HandleTable> = Arc::new(HandleTable::new());
        let fh: u64 = table.insert(file.clone(), open(&fetcher, &file).await);
        let handle: Arc<OpenHandle> = table.handle_for(fh, 5).unwrap();

        let reader = tokio::spawn(async move { handle.read(0, 10).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        assert!(table.release(fh).await);
        let result: Result<Vec<u8>, VfsError> = reader.await.unwrap();
        assert!(matches!(result, Err(VfsError::Released { .. })));
        assert_eq!(fetcher.open_streams(), 0);
        assert!(matches!(table.handle_for(fh, 5), Err(VfsError::BadHandle(_))));
    }
}
