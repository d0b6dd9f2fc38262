//! VFS configuration.

use std::time::Duration;

use crate::executor::ExecutorConfig;

/// Default per-session read buffer (128 KiB, the largest read the kernel
/// issues by default).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 128 * 1024;

/// Default filesystem name shown in the mount table.
pub const DEFAULT_FS_NAME: &str = "s3fuse";

/// Options for the remote read-only VFS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsOptions {
    /// Capacity of each session's read buffer in bytes. Reads are clamped to it.
    pub read_buffer_size: usize,
    /// Reject reads whose offset differs from the session cursor.
    pub strict_sequential: bool,
    /// Attribute and entry TTL handed to the kernel, in seconds.
    pub attr_ttl_secs: u64,
    /// Filesystem name for the mount table.
    pub fs_name: String,
    /// Async executor configuration.
    pub executor: ExecutorConfig,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            strict_sequential: false,
            attr_ttl_secs: 1,
            fs_name: DEFAULT_FS_NAME.to_string(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl VfsOptions {
    /// Set the read buffer capacity (at least one byte).
    ///
    /// # Arguments
    /// * `size` - Buffer capacity in bytes
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Enable or disable the sequential offset check.
    pub fn with_strict_sequential(mut self, strict: bool) -> Self {
        self.strict_sequential = strict;
        self
    }

    /// Set the attribute TTL.
    pub fn with_attr_ttl_secs(mut self, secs: u64) -> Self {
        self.attr_ttl_secs = secs;
        self
    }

    /// Set the filesystem name.
    pub fn with_fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }

    /// Set the executor configuration.
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    /// Attribute TTL as a duration.
    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }
}
