//! Node records as they appear in the manifest.

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a node in the manifest.
pub type NodeId = u64;

/// Id reserved for the root directory.
pub const ROOT_ID: NodeId = 0;

/// Largest accepted id. Kernel inode numbers are `id + 1`, so `u64::MAX`
/// has no inode.
pub const MAX_NODE_ID: NodeId = NodeId::MAX - 1;

/// One flat entry of the manifest.
///
/// Field names follow the canonical spelling (`id`, `isDirectory`,
/// `parentId`); the legacy spelling (`inode`, `isdir`, `parent`) is accepted
/// as an alias when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique node id. `0` is the root.
    #[serde(alias = "inode", alias = "Inode")]
    pub id: NodeId,
    /// Whether this node is a directory. Decodes from a boolean or an integer.
    #[serde(
        rename = "isDirectory",
        alias = "isdir",
        alias = "isDir",
        alias = "IsDir",
        deserialize_with = "deserialize_flag"
    )]
    pub is_directory: bool,
    /// Single path segment.
    #[serde(alias = "Name")]
    pub name: String,
    /// Parent node id. Meaningless for the root. A negative parent in the
    /// manifest decodes as `None`.
    #[serde(
        rename = "parentId",
        alias = "parent",
        alias = "Parent",
        default,
        deserialize_with = "deserialize_parent",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<NodeId>,
    /// Remote locator of the file content. Required for files.
    #[serde(alias = "Url", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl NodeRecord {
    /// Create a directory record.
    pub fn directory(id: NodeId, name: impl Into<String>, parent_id: NodeId) -> Self {
        Self {
            id,
            is_directory: true,
            name: name.into(),
            parent_id: Some(parent_id),
            url: None,
        }
    }

    /// Create a file record.
    pub fn file(
        id: NodeId,
        name: impl Into<String>,
        parent_id: NodeId,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            is_directory: false,
            name: name.into(),
            parent_id: Some(parent_id),
            url: Some(url.into()),
        }
    }

    /// Check if this is the root record.
    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParentRef {
    Id(NodeId),
    Negative(i64),
}

fn deserialize_parent<'de, D>(deserializer: D) -> Result<Option<NodeId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<ParentRef>::deserialize(deserializer)? {
        Some(ParentRef::Id(id)) => Some(id),
        Some(ParentRef::Negative(_)) | None => None,
    })
}
