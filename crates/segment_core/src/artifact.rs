//! Persisted index artifacts
//!
//! A fitted [`SegmentIndex`] is stored as canonical JSON (object keys
//! sorted recursively, two-space indentation) wrapped in an
//! [`IndexArtifact`] that records a blake3 hash of the index body. Loading
//! re-checks the hash and the index structure, so a restored index is
//! fully functional without re-running the tree-growth oracle.

use serde::{ser::Error as SerdeSerError, Deserialize, Serialize};
use serde_json::{map::Map, ser::PrettyFormatter, Serializer, Value};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::errors::{Result, SegmentError};
use crate::index::SegmentIndex;

/// Artifact format version
pub const ARTIFACT_VERSION: u32 = 1;

/// Recursively sort JSON object keys to obtain a canonical representation.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::with_capacity(entries.len());
            for (key, val) in entries {
                sorted.insert(key, canonicalize(val));
            }

            Value::Object(sorted)
        }
        Value::Array(elements) => Value::Array(elements.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Serialize a value into canonical JSON and write it to the provided writer.
pub fn write_canonical_json<T, W>(mut writer: W, value: &T) -> std::result::Result<(), serde_json::Error>
where
    T: Serialize,
    W: Write,
{
    let canonical_value = canonicalize(serde_json::to_value(value)?);
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut serializer = Serializer::with_formatter(&mut writer, formatter);
    canonical_value.serialize(&mut serializer)?;
    Ok(())
}

/// Serialize a value into canonical JSON and return it as a String.
pub fn canonical_json_string<T>(value: &T) -> std::result::Result<String, serde_json::Error>
where
    T: Serialize,
{
    let mut buffer = Vec::new();
    write_canonical_json(&mut buffer, value)?;
    String::from_utf8(buffer).map_err(|err| SerdeSerError::custom(err.to_string()))
}

/// Blake3 hash of the canonical JSON form, hex encoded
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> std::result::Result<String, serde_json::Error> {
    let json = canonical_json_string(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

/// A stored index plus the metadata needed to verify it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexArtifact {
    pub version: u32,
    /// Unix timestamp (seconds) of artifact creation
    pub created_at: i64,
    /// Hex blake3 hash of the canonical JSON of `index`
    pub index_hash: String,
    pub index: SegmentIndex,
}

impl IndexArtifact {
    pub fn new(index: SegmentIndex) -> Result<Self> {
        let index_hash = canonical_hash_hex(&index)?;
        Ok(Self {
            version: ARTIFACT_VERSION,
            created_at: chrono::Utc::now().timestamp(),
            index_hash,
            index,
        })
    }

    /// Check version, hash and index structure
    pub fn verify(&self) -> Result<()> {
        if self.version != ARTIFACT_VERSION {
            return Err(SegmentError::ValidationFailed(format!(
                "unsupported artifact version: {}",
                self.version
            )));
        }
        let actual = canonical_hash_hex(&self.index)?;
        if actual != self.index_hash {
            return Err(SegmentError::ValidationFailed(format!(
                "index hash mismatch: recorded {}, computed {}",
                self.index_hash, actual
            )));
        }
        self.index.validate()
    }

    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(canonical_json_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.verify()?;
        Ok(artifact)
    }

    /// Save with canonical serialization
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_canonical_json()?)?;
        info!(path = %path.display(), hash = %self.index_hash, "saved segmentation index");
        Ok(())
    }

    /// Load and verify
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let artifact = Self::from_json(&json)?;
        info!(path = %path.display(), hash = %artifact.index_hash, "loaded segmentation index");
        Ok(artifact)
    }
}
