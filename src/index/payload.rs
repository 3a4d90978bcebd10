//! Point payload carried alongside each chunk vector

use crate::model::Chunk;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload stored with every vector point.
///
/// Enough to filter and re-rank without a graph round trip; the full chunk
/// row stays in SQLite under `chunk_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub chunk_id: String,
    pub document_id: String,
    pub chapter_id: String,
    pub section_id: String,
    pub subject: String,
    pub content_type: String,
    pub difficulty: f64,
    pub quality: f64,
    #[serde(default)]
    pub concepts: Vec<String>,
    pub page_start: i32,
    pub page_end: i32,
    pub word_count: i32,
    pub created_at: String,
}

impl ChunkPayload {
    pub fn from_chunk(chunk: &Chunk, subject: &str) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            chapter_id: chunk.chapter_id.clone(),
            section_id: chunk.section_id.clone(),
            subject: subject.to_string(),
            content_type: chunk.content_type.clone(),
            difficulty: chunk.difficulty,
            quality: chunk.quality,
            concepts: chunk.concepts(),
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            word_count: chunk.word_count,
            created_at: chunk.created_at.clone(),
        }
    }

    /// Parse a payload back out of the loosely-typed map Qdrant returns
    pub fn from_json_map(map: serde_json::Map<String, Value>) -> Option<Self> {
        serde_json::from_value(Value::Object(map)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChunkMetadata, ChunkingStrategy};

    #[test]
    fn test_payload_roundtrips_through_json_map() {
        let mut chunk = Chunk::new(
            "sec".into(),
            "ch".into(),
            "doc".into(),
            ChunkMetadata::Narrative,
            ChunkingStrategy::ContentAware,
            "some narrative text".into(),
        );
        chunk.set_concepts(&["Quick Sort".to_string()]);
        chunk.difficulty = 0.4;
        chunk.quality = 0.8;

        let payload = ChunkPayload::from_chunk(&chunk, "computer science");
        let value = serde_json::to_value(&payload).unwrap();
        let map = value.as_object().unwrap().clone();
        let parsed = ChunkPayload::from_json_map(map).expect("payload should parse");

        assert_eq!(parsed.chunk_id, chunk.id);
        assert_eq!(parsed.concepts, vec!["Quick Sort".to_string()]);
        assert_eq!(parsed.subject, "computer science");
    }
}
