//! Manifest decoding with document shape detection.

use serde_json::Value;

use crate::error::ManifestError;
use crate::record::NodeRecord;

/// Decode the node records of a manifest document.
///
/// The document is either a bare array of records or an object holding the
/// array under `nodes`.
///
/// # Arguments
/// * `bytes` - Raw JSON bytes
///
/// # Returns
/// The records in document order.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<NodeRecord>, ManifestError> {
    let data: Value = serde_json::from_slice(bytes)?;

    let nodes: Value = match data {
        Value::Array(_) => data,
        Value::Object(mut map) => map
            .remove("nodes")
            .or_else(|| map.remove("Nodes"))
            .ok_or(ManifestError::InvalidDocument)?,
        _ => return Err(ManifestError::InvalidDocument),
    };

    if !nodes.is_array() {
        return Err(ManifestError::InvalidDocument);
    }

    Ok(serde_json::from_value(nodes)?)
}
