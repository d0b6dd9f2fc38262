//! s3fuse: mount a manifest of remote URLs as a read-only directory tree.
//!
//! Usage:
//!   s3fuse manifest.json /mnt/remote
//!   s3fuse --dump manifest.json
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use s3fuse_model::Manifest;
use s3fuse_storage::{HttpFetcher, HttpSettings};
use s3fuse_vfs::{build_tree, mount, RemoteVfs, S3Fuse, VfsOptions, DEFAULT_READ_BUFFER_SIZE};

/// Mount a manifest of remote files as a read-only filesystem.
#[derive(Parser, Debug)]
#[command(name = "s3fuse", version)]
#[command(about = "Mount a JSON manifest of remote URLs as a read-only FUSE filesystem")]
struct Args {
    /// JSON manifest describing the tree
    manifest: PathBuf,

    /// Directory to mount at
    #[arg(required_unless_present = "dump")]
    mountpoint: Option<PathBuf>,

    /// Print the tree built from the manifest and exit without mounting
    #[arg(long)]
    dump: bool,

    /// Per-handle read buffer in bytes; reads are clamped to it
    #[arg(long, default_value_t = DEFAULT_READ_BUFFER_SIZE)]
    buffer_size: usize,

    /// Reject reads whose offset is not the current stream position
    #[arg(long)]
    strict_sequential: bool,

    /// Connect timeout for remote fetches, in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Filesystem name shown in the mount table
    #[arg(long, default_value = "s3fuse")]
    fs_name: String,
}

impl Args {
    fn vfs_options(&self) -> VfsOptions {
        VfsOptions::default()
            .with_read_buffer_size(self.buffer_size)
            .with_strict_sequential(self.strict_sequential)
            .with_fs_name(self.fs_name.clone())
    }

    fn http_settings(&self) -> HttpSettings {
        HttpSettings::default().with_connect_timeout(Duration::from_secs(self.connect_timeout))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Args::parse())
}

fn run(args: Args) -> Result<()> {
    let manifest: Manifest = load_manifest(&args.manifest)?;

    if args.dump {
        print!("{}", render_tree(&manifest)?);
        return Ok(());
    }

    let mountpoint: PathBuf = args
        .mountpoint
        .clone()
        .context("MOUNTPOINT is required unless --dump is given")?;

    let fetcher: HttpFetcher =
        HttpFetcher::new(args.http_settings()).context("failed to create HTTP client")?;
    let vfs: RemoteVfs = RemoteVfs::from_manifest(&manifest, Arc::new(fetcher), args.vfs_options())
        .context("failed to build filesystem tree")?;
    let fs: S3Fuse = S3Fuse::new(vfs).context("failed to start executor")?;

    tracing::info!(
        manifest = %args.manifest.display(),
        mountpoint = %mountpoint.display(),
        "serving manifest"
    );
    mount(fs, &mountpoint).with_context(|| format!("failed to mount {}", mountpoint.display()))
}

fn load_manifest(path: &std::path::Path) -> Result<Manifest> {
    Manifest::from_path(path).with_context(|| format!("failed to load manifest {}", path.display()))
}

/// Build the tree and render it as an indented listing.
fn render_tree(manifest: &Manifest) -> Result<String> {
    let root = build_tree(manifest).context("failed to build filesystem tree")?;
    Ok(root.to_string())
}
