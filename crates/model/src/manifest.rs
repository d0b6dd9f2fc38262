//! Validated, id-indexed manifest.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::decode::decode_records;
use crate::error::ManifestError;
use crate::record::{NodeId, NodeRecord, MAX_NODE_ID, ROOT_ID};

/// A validated manifest: every record indexed by id, plus a parent → children
/// index built once so tree construction never rescans the whole list.
///
/// Children are listed in ascending id order.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// All records by id.
    records: BTreeMap<NodeId, NodeRecord>,
    /// Parent id → child ids.
    children: HashMap<NodeId, Vec<NodeId>>,
}

impl Manifest {
    /// Decode and validate a manifest from raw JSON bytes.
    ///
    /// # Arguments
    /// * `bytes` - Raw JSON bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ManifestError> {
        Self::from_records(decode_records(bytes)?)
    }

    /// Read, decode and validate a manifest file.
    ///
    /// # Arguments
    /// * `path` - Path of the JSON manifest on local disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path: &Path = path.as_ref();
        let bytes: Vec<u8> = std::fs::read(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(&bytes)
    }

    /// Validate records and build the id and parent indexes.
    ///
    /// # Arguments
    /// * `records` - Flat node records in any order
    pub fn from_records(records: Vec<NodeRecord>) -> Result<Self, ManifestError> {
        let mut by_id: BTreeMap<NodeId, NodeRecord> = BTreeMap::new();

        for record in records {
            validate(&record)?;
            if by_id.contains_key(&record.id) {
                return Err(ManifestError::DuplicateId(record.id));
            }
            by_id.insert(record.id, record);
        }

        match by_id.get(&ROOT_ID) {
            None => return Err(ManifestError::MissingRoot),
            Some(root) if !root.is_directory => {
                return Err(ManifestError::invalid(ROOT_ID, "root must be a directory"))
            }
            Some(_) => {}
        }

        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for record in by_id.values() {
            if record.is_root() {
                continue;
            }
            if let Some(parent) = record.parent_id {
                children.entry(parent).or_default().push(record.id);
            }
        }

        Ok(Self {
            records: by_id,
            children,
        })
    }

    /// Get the root record.
    pub fn root(&self) -> &NodeRecord {
        // Presence is checked in `from_records`.
        &self.records[&ROOT_ID]
    }

    /// Get a record by id.
    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.records.get(&id)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: NodeId) -> bool {
        self.records.contains_key(&id)
    }

    /// Records that declare `id` as their parent, in ascending id order.
    ///
    /// The root is never reported as anyone's child.
    pub fn children_of(&self, id: NodeId) -> impl Iterator<Item = &NodeRecord> + '_ {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(move |child| self.records.get(child))
    }

    /// Iterate all records in ascending id order.
    pub fn records(&self) -> impl Iterator<Item = &NodeRecord> + '_ {
        self.records.values()
    }

    /// Number of records, reachable or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for a validated manifest (the root exists).
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Check the per-record requirements that serde cannot express.
///
/// A non-root record without a parent is kept; it is an orphan and never
/// becomes part of the tree.
fn validate(record: &NodeRecord) -> Result<(), ManifestError> {
    if record.id > MAX_NODE_ID {
        return Err(ManifestError::invalid(record.id, "id has no inode number"));
    }

    if !record.is_directory && record.url.as_deref().map_or(true, str::is_empty) {
        return Err(ManifestError::invalid(record.id, "file node has no url"));
    }

    if record.is_root() {
        return Ok(());
    }

    let name: &str = record.name.as_str();
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(ManifestError::invalid(
            record.id,
            format!("name {:?} is not a single path segment", name),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> NodeRecord {
        NodeRecord::directory(ROOT_ID, "/", ROOT_ID)
    }

    #[test]
    fn test_from_records_indexes_children() {
        let manifest: Manifest = Manifest::from_records(vec![
            NodeRecord::file(3, "b.txt", 0, "http://x/b"),
            root(),
            NodeRecord::directory(1, "a", 0),
            NodeRecord::file(2, "c.txt", 1, "http://x/c"),
        ])
        .unwrap();

        assert_eq!(manifest.len(), 4);
        let root_children: Vec<NodeId> = manifest.children_of(ROOT_ID).map(|r| r.id).collect();
        assert_eq!(root_children, vec![1, 3]);
        let a_children: Vec<NodeId> = manifest.children_of(1).map(|r| r.id).collect();
        assert_eq!(a_children, vec![2]);
        assert_eq!(manifest.children_of(2).count(), 0);
    }

    #[test]
    fn test_root_is_not_its_own_child() {
        let manifest: Manifest = Manifest::from_records(vec![root()]).unwrap();
        assert_eq!(manifest.children_of(ROOT_ID).count(), 0);
        assert_eq!(manifest.root().name, "/");
    }

    #[test]
    fn test_missing_root() {
        let result: Result<Manifest, ManifestError> =
            Manifest::from_records(vec![NodeRecord::directory(1, "a", 0)]);
        let err: ManifestError = result.unwrap_err();
        assert!(matches!(err, ManifestError::MissingRoot));
        assert!(!err.is_parse_error());
    }

    #[test]
    fn test_root_must_be_directory() {
        let result: Result<Manifest, ManifestError> =
            Manifest::from_records(vec![NodeRecord::file(0, "/", 0, "http://x")]);
        assert!(matches!(result, Err(ManifestError::InvalidRecord { id: 0, .. })));
    }

    #[test]
    fn test_duplicate_id() {
        let result: Result<Manifest, ManifestError> = Manifest::from_records(vec![
            root(),
            NodeRecord::directory(1, "a", 0),
            NodeRecord::directory(1, "b", 0),
        ]);
        assert!(matches!(result, Err(ManifestError::DuplicateId(1))));
    }

    #[test]
    fn test_file_without_url() {
        let mut file: NodeRecord = NodeRecord::file(1, "a", 0, "");
        let result: Result<Manifest, ManifestError> =
            Manifest::from_records(vec![root(), file.clone()]);
        assert!(matches!(result, Err(ManifestError::InvalidRecord { id: 1, .. })));

        file.url = None;
        let result: Result<Manifest, ManifestError> = Manifest::from_records(vec![root(), file]);
        assert!(matches!(result, Err(ManifestError::InvalidRecord { id: 1, .. })));
    }

    #[test]
    fn test_name_with_separator() {
        let result: Result<Manifest, ManifestError> =
            Manifest::from_records(vec![root(), NodeRecord::directory(1, "a/b", 0)]);
        assert!(matches!(result, Err(ManifestError::InvalidRecord { id: 1, .. })));

        let result: Result<Manifest, ManifestError> =
            Manifest::from_records(vec![root(), NodeRecord::directory(2, "..", 0)]);
        assert!(matches!(result, Err(ManifestError::InvalidRecord { id: 2, .. })));
    }

    #[test]
    fn test_non_root_without_parent_is_unindexed() {
        let mut dir: NodeRecord = NodeRecord::directory(1, "a", 0);
        dir.parent_id = None;
        let manifest: Manifest = Manifest::from_records(vec![root(), dir]).unwrap();
        assert!(manifest.contains(1));
        assert_eq!(manifest.children_of(ROOT_ID).count(), 0);
    }

    #[test]
    fn test_negative_parents() {
        let json: &str = r#"[
            {"id": 0, "isDirectory": true, "name": "/", "parentId": -1},
            {"id": 1, "isDirectory": false, "name": "kept.txt", "parentId": 0, "url": "http://x/k"},
            {"id": 2, "isDirectory": false, "name": "lost.txt", "parentId": -1, "url": "http://x/l"}
        ]"#;
        let manifest: Manifest = Manifest::decode(json.as_bytes()).unwrap();
        assert_eq!(manifest.root().parent_id, None);
        let root_children: Vec<NodeId> = manifest.children_of(ROOT_ID).map(|r| r.id).collect();
        assert_eq!(root_children, vec![1]);
        assert_eq!(manifest.get(2).unwrap().parent_id, None);
    }

    #[test]
    fn test_max_id_is_rejected() {
        let result: Result<Manifest, ManifestError> = Manifest::from_records(vec![
            root(),
            NodeRecord::directory(u64::MAX, "a", 0),
        ]);
        assert!(matches!(
            result,
            Err(ManifestError::InvalidRecord { id: u64::MAX, .. })
        ));

        let manifest: Manifest = Manifest::from_records(vec![
            root(),
            NodeRecord::directory(MAX_NODE_ID, "a", 0),
        ])
        .unwrap();
        assert!(manifest.contains(MAX_NODE_ID));
    }

    #[test]
    fn test_decode_legacy_document() {
        let json: &str = r#"[
            {"inode": 0, "isdir": 1, "name": "/", "parent": 0, "url": ""},
            {"inode": 1, "isdir": 0, "name": "a.bin", "parent": 0, "url": "http://x/a.bin"}
        ]"#;
        let manifest: Manifest = Manifest::decode(json.as_bytes()).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get(1).unwrap().name, "a.bin");
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"[{"id": 0, "isDirectory": true, "name": "/", "parentId": 0}]"#,
        )
        .unwrap();

        let manifest: Manifest = Manifest::from_path(&path).unwrap();
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Manifest, ManifestError> =
            Manifest::from_path(dir.path().join("nope.json"));
        assert!(matches!(result, Err(ManifestError::Io { .. })));
    }
}
