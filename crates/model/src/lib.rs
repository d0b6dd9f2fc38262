//! Flat node manifest model for the s3fuse virtual filesystem.
//!
//! A manifest is a flat list of node records. Each record names one directory
//! or file, points at its parent by id, and (for files) carries the URL the
//! content is fetched from. The record with id `0` is the root.
//!
//! ```text
//! [
//!   {"id": 0, "isDirectory": true,  "name": "/",          "parentId": 0},
//!   {"id": 1, "isDirectory": true,  "name": "docs",       "parentId": 0},
//!   {"id": 2, "isDirectory": false, "name": "readme.txt", "parentId": 1,
//!    "url": "https://example.com/readme.txt"}
//! ]
//! ```
//!
//! The legacy spelling (`inode`, `isdir` as 0/1, `parent`) is accepted too.

pub mod error;
pub mod record;

mod decode;
mod manifest;

pub use decode::decode_records;
pub use error::ManifestError;
pub use manifest::Manifest;
pub use record::{NodeId, NodeRecord, MAX_NODE_ID, ROOT_ID};
