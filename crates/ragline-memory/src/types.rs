use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deterministic chunk identifiers.
const CHUNK_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x1c, 0x52, 0x3e, 0x8a, 0x47, 0x4b, 0x0d, 0x9e, 0x21, 0x3d, 0x70, 0xa5, 0x6b, 0x19, 0xc4,
]);

/// Caller-chosen identifier of a source document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Stable chunk identifier.
///
/// Derived as UUID v5 over the parent document id, chunk position, offsets and
/// text, so re-ingesting identical content reproduces identical ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(Uuid);

impl ChunkId {
    #[must_use]
    pub fn derive(document_id: &DocumentId, position: usize, start: usize, end: usize, text: &str) -> Self {
        let mut name = Vec::with_capacity(document_id.as_str().len() + text.len() + 48);
        name.extend_from_slice(document_id.as_str().as_bytes());
        name.push(0);
        name.extend_from_slice(format!("{position}:{start}:{end}").as_bytes());
        name.push(0);
        name.extend_from_slice(text.as_bytes());
        Self(Uuid::new_v5(&CHUNK_NAMESPACE, &name))
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ChunkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_deterministic() {
        let doc = DocumentId::new("d1");
        let a = ChunkId::derive(&doc, 0, 0, 16, "The sky is blue.");
        let b = ChunkId::derive(&doc, 0, 0, 16, "The sky is blue.");
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_id_depends_on_every_component() {
        let doc = DocumentId::new("d1");
        let base = ChunkId::derive(&doc, 0, 0, 4, "text");
        assert_ne!(base, ChunkId::derive(&DocumentId::new("d2"), 0, 0, 4, "text"));
        assert_ne!(base, ChunkId::derive(&doc, 1, 0, 4, "text"));
        assert_ne!(base, ChunkId::derive(&doc, 0, 1, 5, "text"));
        assert_ne!(base, ChunkId::derive(&doc, 0, 0, 4, "TEXT"));
    }

    #[test]
    fn chunk_id_roundtrips_through_string() {
        let id = ChunkId::derive(&DocumentId::new("d"), 3, 10, 20, "abc");
        let parsed: ChunkId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn chunk_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<ChunkId>().is_err());
    }

    #[test]
    fn document_id_display() {
        assert_eq!(DocumentId::from("docs/a.md").to_string(), "docs/a.md");
    }
}
