//! Core data model: the document tree, chunks, and concepts.
//!
//! Rows are stored in SQLite (see `graph::schema`); chunk embedding vectors
//! live in the Qdrant index keyed by `Chunk::point_id`. List-valued fields
//! are persisted as JSON text columns with typed accessors.

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Content type of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Narrative,
    Definition,
    Example,
    Code,
    Exercise,
    Summary,
    Mixed,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Narrative => write!(f, "narrative"),
            ContentType::Definition => write!(f, "definition"),
            ContentType::Example => write!(f, "example"),
            ContentType::Code => write!(f, "code"),
            ContentType::Exercise => write!(f, "exercise"),
            ContentType::Summary => write!(f, "summary"),
            ContentType::Mixed => write!(f, "mixed"),
        }
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "narrative" => Ok(ContentType::Narrative),
            "definition" => Ok(ContentType::Definition),
            "example" => Ok(ContentType::Example),
            "code" => Ok(ContentType::Code),
            "exercise" => Ok(ContentType::Exercise),
            "summary" => Ok(ContentType::Summary),
            "mixed" => Ok(ContentType::Mixed),
            _ => Err(Error::Config(format!("Unknown content type: {}", s))),
        }
    }
}

/// How a chunk's boundaries were chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Structural cues (paragraphs, fences, markers) packed into the window
    ContentAware,
    /// Sentence-boundary packing when no structural cue applies
    Fallback,
}

impl std::fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkingStrategy::ContentAware => write!(f, "content_aware"),
            ChunkingStrategy::Fallback => write!(f, "fallback"),
        }
    }
}

impl FromStr for ChunkingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "content_aware" => Ok(ChunkingStrategy::ContentAware),
            "fallback" => Ok(ChunkingStrategy::Fallback),
            _ => Err(Error::Config(format!("Unknown chunking strategy: {}", s))),
        }
    }
}

/// Concept classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptType {
    Definition,
    Theorem,
    Algorithm,
    Principle,
}

impl std::fmt::Display for ConceptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConceptType::Definition => write!(f, "definition"),
            ConceptType::Theorem => write!(f, "theorem"),
            ConceptType::Algorithm => write!(f, "algorithm"),
            ConceptType::Principle => write!(f, "principle"),
        }
    }
}

impl FromStr for ConceptType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "definition" => Ok(ConceptType::Definition),
            "theorem" => Ok(ConceptType::Theorem),
            "algorithm" => Ok(ConceptType::Algorithm),
            "principle" => Ok(ConceptType::Principle),
            _ => Err(Error::Config(format!("Unknown concept type: {}", s))),
        }
    }
}

/// Per-content-type structured metadata carried by a chunk.
///
/// A closed sum type instead of an open metadata dictionary, so consumers
/// know at compile time which fields exist for which content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChunkMetadata {
    Narrative,
    Definition {
        /// The term being defined, when the marker line names one
        term: Option<String>,
    },
    Example {
        /// Example number when the source enumerates them
        number: Option<u32>,
    },
    Code {
        /// Fence info string, e.g. "rust" or "python"
        language: Option<String>,
    },
    Exercise {
        number: Option<u32>,
    },
    Summary,
    Mixed {
        /// The content types the chunk straddles
        types: Vec<ContentType>,
    },
}

impl ChunkMetadata {
    pub fn content_type(&self) -> ContentType {
        match self {
            ChunkMetadata::Narrative => ContentType::Narrative,
            ChunkMetadata::Definition { .. } => ContentType::Definition,
            ChunkMetadata::Example { .. } => ContentType::Example,
            ChunkMetadata::Code { .. } => ContentType::Code,
            ChunkMetadata::Exercise { .. } => ContentType::Exercise,
            ChunkMetadata::Summary => ContentType::Summary,
            ChunkMetadata::Mixed { .. } => ContentType::Mixed,
        }
    }
}

/// An ingested document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub authors_json: Option<String>,
    pub language: String,
    pub extraction_confidence: f64,
    pub structure_quality: f64,
    pub coherence: f64,
    pub overall_quality: f64,
    pub chapter_count: i32,
    pub chunk_count: i32,
    pub word_count: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    pub fn new(title: String, subject: String, authors: Vec<String>, language: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            subject,
            authors_json: if authors.is_empty() {
                None
            } else {
                serde_json::to_string(&authors).ok()
            },
            language,
            extraction_confidence: 0.0,
            structure_quality: 0.0,
            coherence: 0.0,
            overall_quality: 0.0,
            chapter_count: 0,
            chunk_count: 0,
            word_count: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn authors(&self) -> Vec<String> {
        self.authors_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }
}

/// A chapter within a document, ordered by `seq_index` and linked via `next_id`
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub document_id: String,
    pub seq_index: i32,
    pub title: String,
    pub page_start: i32,
    pub page_end: i32,
    pub keywords_json: Option<String>,
    pub word_count: i32,
    pub chunk_count: i32,
    pub extraction_confidence: f64,
    pub synthetic: bool,
    pub next_id: Option<String>,
    pub created_at: String,
}

impl Chapter {
    pub fn new(document_id: String, seq_index: i32, title: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id,
            seq_index,
            title,
            page_start: 1,
            page_end: 1,
            keywords_json: None,
            word_count: 0,
            chunk_count: 0,
            extraction_confidence: 1.0,
            synthetic: false,
            next_id: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }
}

/// A section within a chapter; `numbering` supports nesting ("2.1.3")
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub chapter_id: String,
    pub document_id: String,
    pub numbering: String,
    pub level: i32,
    pub title: String,
    pub page_start: i32,
    pub page_end: i32,
    pub keywords_json: Option<String>,
    pub word_count: i32,
    pub extraction_confidence: f64,
    pub synthetic: bool,
    pub next_id: Option<String>,
    pub created_at: String,
}

impl Section {
    pub fn new(chapter_id: String, document_id: String, numbering: String, title: String) -> Self {
        let level = numbering.matches('.').count() as i32 + 1;
        Self {
            id: Uuid::new_v4().to_string(),
            chapter_id,
            document_id,
            numbering,
            level,
            title,
            page_start: 1,
            page_end: 1,
            keywords_json: None,
            word_count: 0,
            extraction_confidence: 1.0,
            synthetic: false,
            next_id: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }
}

/// The smallest retrievable unit of content.
///
/// Text is immutable once scored. The embedding vector lives in the vector
/// index under `point_id`; `embedding_model` records which model produced it
/// and must be updated if the vector is regenerated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub section_id: String,
    pub chapter_id: String,
    pub document_id: String,
    pub content_type: String,
    pub strategy: String,
    pub text: String,
    pub content_hash: String,
    pub point_id: String,
    pub embedding_model: Option<String>,
    pub embedding_pending: bool,
    pub difficulty: f64,
    pub quality: f64,
    pub coherence: f64,
    pub confidence: f64,
    pub concepts_json: Option<String>,
    pub prerequisites_json: Option<String>,
    pub metadata_json: Option<String>,
    pub page_start: i32,
    pub page_end: i32,
    pub word_count: i32,
    pub sentence_count: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        section_id: String,
        chapter_id: String,
        document_id: String,
        metadata: ChunkMetadata,
        strategy: ChunkingStrategy,
        text: String,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        let content_hash = blake3::hash(text.as_bytes()).to_hex().to_string();
        // Stable vector point id derived from content hash
        let point_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, content_hash.as_bytes()).to_string();

        Self {
            id: Uuid::new_v4().to_string(),
            section_id,
            chapter_id,
            document_id,
            content_type: metadata.content_type().to_string(),
            strategy: strategy.to_string(),
            text,
            content_hash,
            point_id,
            embedding_model: None,
            embedding_pending: true,
            difficulty: 0.0,
            quality: 0.0,
            coherence: 0.0,
            confidence: 1.0,
            concepts_json: None,
            prerequisites_json: None,
            metadata_json: serde_json::to_string(&metadata).ok(),
            page_start: 1,
            page_end: 1,
            word_count: 0,
            sentence_count: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn get_content_type(&self) -> Result<ContentType> {
        self.content_type.parse()
    }

    pub fn get_strategy(&self) -> Result<ChunkingStrategy> {
        self.strategy.parse()
    }

    pub fn concepts(&self) -> Vec<String> {
        self.concepts_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }

    pub fn set_concepts(&mut self, concepts: &[String]) {
        self.concepts_json = if concepts.is_empty() {
            None
        } else {
            serde_json::to_string(concepts).ok()
        };
    }

    pub fn prerequisites(&self) -> Vec<String> {
        self.prerequisites_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }

    pub fn set_prerequisites(&mut self, prereqs: &[String]) {
        self.prerequisites_json = if prereqs.is_empty() {
            None
        } else {
            serde_json::to_string(prereqs).ok()
        };
    }

    pub fn metadata(&self) -> ChunkMetadata {
        self.metadata_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or(ChunkMetadata::Narrative)
    }
}

/// A named unit of knowledge, deduplicated by normalized name per subject
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub normalized_name: String,
    pub concept_type: String,
    pub subject: String,
    pub difficulty: f64,
    pub importance: f64,
    pub reference_count: i32,
    pub created_at: String,
}

impl Concept {
    pub fn new(name: &str, concept_type: ConceptType, subject: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            normalized_name: normalize_concept_name(name),
            concept_type: concept_type.to_string(),
            subject,
            difficulty: 0.5,
            importance: 0.5,
            reference_count: 0,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn get_type(&self) -> Result<ConceptType> {
        self.concept_type.parse()
    }
}

/// A REQUIRES edge between concepts; the edge set must remain acyclic
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RequiresEdge {
    pub from_concept_id: String,
    pub to_concept_id: String,
    pub strength: f64,
    pub created_at: String,
}

/// A derived SIMILAR_TO edge between chunks, capped top-K per source chunk
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SimilarEdge {
    pub from_chunk_id: String,
    pub to_chunk_id: String,
    pub score: f64,
    pub created_at: String,
}

/// Normalize a concept name for dedup: lowercase, collapsed whitespace
pub fn normalize_concept_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Clamp a score into [0,1]
pub fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_roundtrip() {
        for ct in [
            ContentType::Narrative,
            ContentType::Definition,
            ContentType::Example,
            ContentType::Code,
            ContentType::Exercise,
            ContentType::Summary,
            ContentType::Mixed,
        ] {
            assert_eq!(ct.to_string().parse::<ContentType>().unwrap(), ct);
        }
        assert!("poetry".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_normalize_concept_name() {
        assert_eq!(normalize_concept_name("  Quick   Sort "), "quick sort");
        assert_eq!(normalize_concept_name("Binary Search"), "binary search");
    }

    #[test]
    fn test_chunk_point_id_stable_for_same_text() {
        let a = Chunk::new(
            "s".into(),
            "c".into(),
            "d".into(),
            ChunkMetadata::Narrative,
            ChunkingStrategy::ContentAware,
            "same text".into(),
        );
        let b = Chunk::new(
            "s2".into(),
            "c2".into(),
            "d2".into(),
            ChunkMetadata::Narrative,
            ChunkingStrategy::Fallback,
            "same text".into(),
        );
        assert_eq!(a.point_id, b.point_id);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = ChunkMetadata::Code {
            language: Some("rust".into()),
        };
        let chunk = Chunk::new(
            "s".into(),
            "c".into(),
            "d".into(),
            meta.clone(),
            ChunkingStrategy::ContentAware,
            "fn main() {}".into(),
        );
        assert_eq!(chunk.metadata(), meta);
        assert_eq!(chunk.get_content_type().unwrap(), ContentType::Code);
    }

    #[test]
    fn test_section_level_from_numbering() {
        let s = Section::new("ch".into(), "doc".into(), "2.1.3".into(), "Title".into());
        assert_eq!(s.level, 3);
    }
}
