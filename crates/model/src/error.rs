//! Error types for manifest loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::record::{NodeId, ROOT_ID};

/// Errors that can occur while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Manifest must be an array of nodes or an object with a \"nodes\" array")]
    InvalidDocument,

    #[error("Invalid node {id}: {reason}")]
    InvalidRecord { id: NodeId, reason: String },

    #[error("Duplicate node id: {0}")]
    DuplicateId(NodeId),

    #[error("Manifest has no root node (id {ROOT_ID})")]
    MissingRoot,

    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    /// Whether the document itself (or one of its records) is malformed,
    /// as opposed to being well-formed but structurally unusable.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ManifestError::JsonParse(_)
                | ManifestError::InvalidDocument
                | ManifestError::InvalidRecord { .. }
                | ManifestError::DuplicateId(_)
        )
    }

    pub(crate) fn invalid(id: NodeId, reason: impl Into<String>) -> Self {
        ManifestError::InvalidRecord {
            id,
            reason: reason.into(),
        }
    }
}
