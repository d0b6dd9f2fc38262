//! Integration tests for the remote read-only VFS.
//!
//! Tests go from a JSON manifest through tree building, path lookup and
//! streaming reads, with content served by the in-memory fetcher.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use s3fuse_model::Manifest;
use s3fuse_storage::MemoryFetcher;
use s3fuse_vfs::inode::VirtualNode;
use s3fuse_vfs::{
    AsyncExecutor, ExecutorConfig, ExecutorError, HandleTable, Node, NodeAttr, NodeKind, ReadChunk,
    RemoteReadSession, RemoteVfs, VfsError, VfsOptions, VirtualFile,
};

// ============================================================================
// Test Infrastructure
// ============================================================================

const README_URL: &str = "https://bucket.example/docs/readme.txt";
const README: &[u8] = b"The quick brown fox jumps over the lazy dog.\n";

const MANIFEST: &str = r#"[
    {"id": 0, "isDirectory": true, "name": "/", "parentId": 0},
    {"id": 1, "isDirectory": true, "name": "docs", "parentId": 0},
    {"id": 2, "isDirectory": false, "name": "readme.txt", "parentId": 1,
     "url": "https://bucket.example/docs/readme.txt"},
    {"id": 3, "isDirectory": false, "name": "broken.bin", "parentId": 1,
     "url": "https://bucket.example/docs/broken.bin"},
    {"id": 4, "isDirectory": false, "name": "gone.bin", "parentId": 0,
     "url": "https://bucket.example/gone.bin"}
]"#;

/// Fetcher serving the fixture manifest's URLs in 7-byte chunks.
fn fetcher() -> Arc<MemoryFetcher> {
    let fetcher: MemoryFetcher = MemoryFetcher::new().with_chunk_size(7);
    fetcher.insert(README_URL, README);
    fetcher.insert_broken("https://bucket.example/docs/broken.bin", &b"partial"[..]);
    fetcher.insert_status("https://bucket.example/gone.bin", 404);
    Arc::new(fetcher)
}

fn vfs_with(fetcher: Arc<MemoryFetcher>, options: VfsOptions) -> RemoteVfs {
    let manifest: Manifest = Manifest::decode(MANIFEST.as_bytes()).unwrap();
    RemoteVfs::from_manifest(&manifest, fetcher, options).unwrap()
}

fn file(vfs: &RemoteVfs, path: &str) -> Arc<VirtualFile> {
    match vfs.lookup_path(path).unwrap() {
        Node::File(f) => f,
        Node::Directory(_) => panic!("{} is a directory", path),
    }
}

/// Outcome of a read handed to `AsyncExecutor::spawn`.
type Spawned = Result<Result<Vec<u8>, VfsError>, ExecutorError>;

/// Read until end of stream with requests of `size` bytes.
async fn read_all(session: &mut RemoteReadSession, size: usize) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    loop {
        let offset: u64 = session.position();
        match session.read(offset, size).await.unwrap() {
            ReadChunk::Data(data) => out.extend_from_slice(data),
            ReadChunk::EndOfStream => return out,
        }
    }
}

// ============================================================================
// Tree and lookup
// ============================================================================

#[test]
fn test_root_and_attributes() {
    let vfs: RemoteVfs = vfs_with(fetcher(), VfsOptions::default());

    let root: Node = vfs.root();
    let attr: NodeAttr = vfs.attr(&root);
    assert_eq!(attr.kind, NodeKind::Directory);
    assert_eq!(attr.perm, 0o555);
    assert_eq!(attr.id, 0);

    let readme: Node = vfs.lookup_path("docs/readme.txt").unwrap();
    let attr: NodeAttr = vfs.attr(&readme);
    assert_eq!(attr.kind, NodeKind::File);
    assert_eq!(attr.perm, 0o444);
    assert_eq!(attr.size, 0);
}

#[test]
fn test_readdir_lists_children_only() {
    let vfs: RemoteVfs = vfs_with(fetcher(), VfsOptions::default());

    let root = vfs.nodes().root().clone();
    let names: Vec<String> = vfs.readdir(&root).into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["docs", "gone.bin"]);

    let docs = vfs.nodes().get_dir(1).unwrap().clone();
    let names: Vec<String> = vfs.readdir(&docs).into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["readme.txt", "broken.bin"]);
}

#[test]
fn test_lookup_paths() {
    let vfs: RemoteVfs = vfs_with(fetcher(), VfsOptions::default());
    let root = vfs.nodes().root().clone();

    assert_eq!(vfs.lookup(&root, "docs/readme.txt").unwrap().id(), 2);
    assert_eq!(vfs.lookup(&root, "/docs//readme.txt").unwrap().id(), 2);
    assert_eq!(vfs.lookup(&root, "docs/").unwrap().id(), 1);
    assert_eq!(vfs.lookup(&root, "").unwrap().id(), 0);

    let docs = vfs.nodes().get_dir(1).unwrap().clone();
    assert_eq!(vfs.lookup(&docs, "readme.txt").unwrap().id(), 2);
}

#[test]
fn test_lookup_through_file_is_not_a_directory() {
    let vfs: RemoteVfs = vfs_with(fetcher(), VfsOptions::default());
    let result: Result<Node, VfsError> = vfs.lookup_path("docs/readme.txt/extra");
    match result {
        Err(VfsError::NotADirectory { path }) => assert_eq!(path, "docs/readme.txt"),
        other => panic!("expected NotADirectory, got {:?}", other),
    }
}

#[test]
fn test_trailing_slash_after_file_is_not_a_directory() {
    let vfs: RemoteVfs = vfs_with(fetcher(), VfsOptions::default());

    for path in ["docs/readme.txt/", "/docs//readme.txt//"] {
        match vfs.lookup_path(path) {
            Err(VfsError::NotADirectory { path }) => assert_eq!(path, "docs/readme.txt"),
            other => panic!("expected NotADirectory for {}, got {:?}", path, other),
        }
    }
}

#[test]
fn test_lookup_missing_at_any_level() {
    let vfs: RemoteVfs = vfs_with(fetcher(), VfsOptions::default());

    assert!(matches!(
        vfs.lookup_path("nope"),
        Err(VfsError::NotFound { .. })
    ));
    assert!(matches!(
        vfs.lookup_path("docs/nope.txt"),
        Err(VfsError::NotFound { .. })
    ));
    assert!(matches!(
        vfs.lookup_path("nope/readme.txt"),
        Err(VfsError::NotFound { .. })
    ));
    assert!(matches!(
        vfs.lookup_path("DOCS/readme.txt"),
        Err(VfsError::NotFound { .. })
    ));
}

#[test]
fn test_orphans_excluded_from_listing() {
    let json: &str = r#"[
        {"id": 0, "isDirectory": true, "name": "/", "parentId": 0},
        {"id": 1, "isDirectory": true, "name": "a", "parentId": 0},
        {"id": 2, "isDirectory": false, "name": "orphan.txt", "parentId": 99, "url": "http://x"}
    ]"#;
    let manifest: Manifest = Manifest::decode(json.as_bytes()).unwrap();
    let vfs: RemoteVfs =
        RemoteVfs::from_manifest(&manifest, fetcher(), VfsOptions::default()).unwrap();

    let root = vfs.nodes().root().clone();
    let entries = vfs.readdir(&root);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "a");
    assert_eq!(entries[0].kind, NodeKind::Directory);
}

#[test]
fn test_legacy_manifest_spelling() {
    let json: &str = r#"[
        {"inode": 0, "isdir": 1, "name": "/", "parent": 0, "url": ""},
        {"inode": 1, "isdir": 1, "name": "docs", "parent": 0, "url": ""},
        {"inode": 2, "isdir": 0, "name": "readme.txt", "parent": 1,
         "url": "https://bucket.example/docs/readme.txt"}
    ]"#;
    let manifest: Manifest = Manifest::decode(json.as_bytes()).unwrap();
    let vfs: RemoteVfs =
        RemoteVfs::from_manifest(&manifest, fetcher(), VfsOptions::default()).unwrap();
    assert_eq!(file(&vfs, "docs/readme.txt").url(), README_URL);
}

#[test]
fn test_cycle_fails_construction() {
    let json: &str = r#"[
        {"id": 0, "isDirectory": true, "name": "/", "parentId": 0},
        {"id": 1, "isDirectory": true, "name": "a", "parentId": 2},
        {"id": 2, "isDirectory": true, "name": "b", "parentId": 1}
    ]"#;
    let manifest: Manifest = Manifest::decode(json.as_bytes()).unwrap();
    let result = RemoteVfs::from_manifest(&manifest, fetcher(), VfsOptions::default());
    assert!(matches!(result, Err(VfsError::Cycle { .. })));
}

// ============================================================================
// Streaming reads
// ============================================================================

#[tokio::test]
async fn test_end_to_end_read() {
    let fetcher: Arc<MemoryFetcher> = fetcher();
    let vfs: RemoteVfs = vfs_with(fetcher.clone(), VfsOptions::default());
    let readme: Arc<VirtualFile> = file(&vfs, "docs/readme.txt");

    let mut session: RemoteReadSession = vfs.open(&readme).await.unwrap();
    assert_eq!(read_all(&mut session, 4096).await, README);
    assert!(session.is_exhausted());

    // Exhausted sessions answer without touching the transport.
    assert_eq!(session.read(0, 10).await.unwrap(), ReadChunk::EndOfStream);
    assert_eq!(fetcher.request_count(), 1);

    assert!(session.release());
}

#[tokio::test]
async fn test_short_reads_reassemble_content() {
    let vfs: RemoteVfs = vfs_with(fetcher(), VfsOptions::default());
    let readme: Arc<VirtualFile> = file(&vfs, "docs/readme.txt");

    let mut session: RemoteReadSession = vfs.open(&readme).await.unwrap();
    assert_eq!(read_all(&mut session, 5).await, README);
}

#[tokio::test]
async fn test_two_opens_are_independent() {
    let fetcher: Arc<MemoryFetcher> = fetcher();
    let vfs: RemoteVfs = vfs_with(fetcher.clone(), VfsOptions::default());
    let readme: Arc<VirtualFile> = file(&vfs, "docs/readme.txt");

    let mut first: RemoteReadSession = vfs.open(&readme).await.unwrap();
    let mut second: RemoteReadSession = vfs.open(&readme).await.unwrap();
    assert_eq!(fetcher.request_count(), 2);
    assert_eq!(fetcher.open_streams(), 2);

    // Advance the first handle; the second still starts at the beginning.
    assert_eq!(
        first.read(0, 100).await.unwrap(),
        ReadChunk::Data(&README[..7])
    );
    assert_eq!(read_all(&mut second, 100).await, README);
    assert_eq!(first.position(), 7);

    first.release();
    assert_eq!(fetcher.open_streams(), 1);
    second.release();
    assert_eq!(fetcher.open_streams(), 0);
}

#[tokio::test]
async fn test_read_larger_than_buffer() {
    let fetcher: MemoryFetcher = MemoryFetcher::new();
    fetcher.insert(README_URL, vec![b'z'; 1000]);
    let vfs: RemoteVfs = vfs_with(
        Arc::new(fetcher),
        VfsOptions::default().with_read_buffer_size(64),
    );
    let readme: Arc<VirtualFile> = file(&vfs, "docs/readme.txt");

    let mut session: RemoteReadSession = vfs.open(&readme).await.unwrap();
    match session.read(0, 1 << 20).await.unwrap() {
        ReadChunk::Data(data) => assert_eq!(data.len(), 64),
        ReadChunk::EndOfStream => panic!("unexpected end of stream"),
    }
    assert!(!session.is_exhausted());
    assert_eq!(read_all(&mut session, 1 << 20).await.len(), 1000 - 64);
}

#[tokio::test]
async fn test_open_non_success_status_is_fetch_error() {
    let vfs: RemoteVfs = vfs_with(fetcher(), VfsOptions::default());
    let gone: Arc<VirtualFile> = file(&vfs, "gone.bin");

    let err: VfsError = vfs.open(&gone).await.unwrap_err();
    assert!(matches!(err, VfsError::Fetch { .. }));
}

#[tokio::test]
async fn test_stream_error_then_release() {
    let fetcher: Arc<MemoryFetcher> = fetcher();
    let vfs: RemoteVfs = vfs_with(fetcher.clone(), VfsOptions::default());
    let broken: Arc<VirtualFile> = file(&vfs, "docs/broken.bin");

    let mut session: RemoteReadSession = vfs.open(&broken).await.unwrap();
    assert_eq!(
        session.read(0, 100).await.unwrap(),
        ReadChunk::Data(b"partial")
    );
    let err: VfsError = session.read(7, 100).await.unwrap_err();
    assert!(matches!(err, VfsError::Stream { .. }));

    assert!(session.release());
    assert!(!session.release());
    assert_eq!(fetcher.open_streams(), 0);
}

#[tokio::test]
async fn test_strict_sequential_mode() {
    let vfs: RemoteVfs = vfs_with(
        fetcher(),
        VfsOptions::default().with_strict_sequential(true),
    );
    let readme: Arc<VirtualFile> = file(&vfs, "docs/readme.txt");

    let mut session: RemoteReadSession = vfs.open(&readme).await.unwrap();
    assert!(matches!(
        session.read(3, 10).await,
        Err(VfsError::SequentialityViolation {
            expected: 0,
            actual: 3
        })
    ));
    assert_eq!(read_all(&mut session, 10).await, README);
}

// ============================================================================
// Handles through the executor
// ============================================================================

#[test]
fn test_handles_via_executor() {
    let fetcher: Arc<MemoryFetcher> = fetcher();
    let vfs: Arc<RemoteVfs> = Arc::new(vfs_with(fetcher.clone(), VfsOptions::default()));
    let handles: Arc<HandleTable> = Arc::new(HandleTable::new());
    let executor: AsyncExecutor =
        AsyncExecutor::new(ExecutorConfig::default().with_worker_threads(2)).unwrap();
    let readme: Arc<VirtualFile> = file(&vfs, "docs/readme.txt");

    let open_vfs: Arc<RemoteVfs> = vfs.clone();
    let open_file: Arc<VirtualFile> = readme.clone();
    let session: RemoteReadSession = executor
        .block_on(async move { open_vfs.open(&open_file).await })
        .unwrap()
        .unwrap();
    let fh: u64 = handles.insert(readme, session);

    let mut content: Vec<u8> = Vec::new();
    loop {
        let handle = handles.get(fh).unwrap();
        let chunk: Option<Vec<u8>> = executor
            .block_on(async move {
                let mut session = handle.session.lock().await;
                let offset: u64 = session.position();
                let chunk: Option<Vec<u8>> = match session.read(offset, 16).await.unwrap() {
                    ReadChunk::Data(data) => Some(data.to_vec()),
                    ReadChunk::EndOfStream => None,
                };
                chunk
            })
            .unwrap();
        match chunk {
            Some(data) => content.extend_from_slice(&data),
            None => break,
        }
    }
    assert_eq!(content, README);

    let table: Arc<HandleTable> = handles.clone();
    assert!(executor.block_on(async move { table.release(fh).await }).unwrap());
    let table: Arc<HandleTable> = handles.clone();
    assert!(!executor.block_on(async move { table.release(fh).await }).unwrap());
    assert_eq!(fetcher.open_streams(), 0);
}

#[test]
fn test_stalled_handle_does_not_block_others() {
    const SLOW_URL: &str = "https://bucket.example/slow.bin";

    let fetcher: Arc<MemoryFetcher> = fetcher();
    fetcher.insert_stalled(SLOW_URL, &b""[..]);
    let vfs: Arc<RemoteVfs> = Arc::new(vfs_with(fetcher.clone(), VfsOptions::default()));
    let handles: Arc<HandleTable> = Arc::new(HandleTable::new());
    let executor: AsyncExecutor =
        AsyncExecutor::new(ExecutorConfig::default().with_worker_threads(2)).unwrap();

    let slow: Arc<VirtualFile> = Arc::new(VirtualFile::new(
        40,
        0,
        "slow.bin".to_string(),
        SLOW_URL.to_string(),
    ));
    let readme: Arc<VirtualFile> = file(&vfs, "docs/readme.txt");

    let mut fhs: Vec<u64> = Vec::new();
    for target in [slow.clone(), readme.clone()] {
        let open_vfs: Arc<RemoteVfs> = vfs.clone();
        let open_file: Arc<VirtualFile> = target.clone();
        let session: RemoteReadSession = executor
            .block_on(async move { open_vfs.open(&open_file).await })
            .unwrap()
            .unwrap();
        fhs.push(handles.insert(target, session));
    }
    let (slow_fh, readme_fh) = (fhs[0], fhs[1]);

    // The slow read is queued and the caller moves on.
    let (slow_tx, slow_rx) = mpsc::channel::<Result<Vec<u8>, VfsError>>();
    let slow_handle = handles.handle_for(slow_fh, 40).unwrap();
    executor
        .spawn(
            async move { slow_handle.read(0, 16).await },
            move |result: Spawned| {
                let _ = slow_tx.send(result.map_err(VfsError::from).and_then(|r| r));
            },
        )
        .unwrap();

    // Another handle streams to the end meanwhile.
    let mut content: Vec<u8> = Vec::new();
    loop {
        let handle = handles.handle_for(readme_fh, readme.id()).unwrap();
        let offset: u64 = content.len() as u64;
        let (tx, rx) = mpsc::channel::<Result<Vec<u8>, VfsError>>();
        executor
            .spawn(async move { handle.read(offset, 16).await }, move |result: Spawned| {
                let _ = tx.send(result.map_err(VfsError::from).and_then(|r| r));
            })
            .unwrap();
        let chunk: Vec<u8> = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        if chunk.is_empty() {
            break;
        }
        content.extend_from_slice(&chunk);
    }
    assert_eq!(content, README);
    assert!(slow_rx.try_recv().is_err());

    // Releasing the slow handle answers its waiting read and closes its stream.
    let detached = handles.detach(slow_fh).unwrap();
    let result: Result<Vec<u8>, VfsError> = slow_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(result, Err(VfsError::Released { .. })));
    assert!(executor.block_on(async move { detached.close().await }).unwrap());

    let table: Arc<HandleTable> = handles.clone();
    assert!(executor.block_on(async move { table.release(readme_fh).await }).unwrap());
    assert!(handles.is_empty());
    assert_eq!(fetcher.open_streams(), 0);
}
