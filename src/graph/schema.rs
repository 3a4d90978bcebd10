//! SQLite schema for the knowledge graph

/// SQL schema for the graph database.
///
/// Ownership edges (HAS_CHAPTER / HAS_SECTION / HAS_CHUNK) are parent-id
/// columns, which makes the strict-tree invariant structural: a row cannot
/// have two parents. Chunks also carry denormalized chapter/document ids for
/// O(1) ancestor lookup.
pub const SCHEMA_SQL: &str = r#"
-- Documents: one per ingested source, immutable after ingestion completes
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    subject TEXT NOT NULL,
    authors_json TEXT,
    language TEXT NOT NULL,
    extraction_confidence REAL NOT NULL DEFAULT 0,
    structure_quality REAL NOT NULL DEFAULT 0,
    coherence REAL NOT NULL DEFAULT 0,
    overall_quality REAL NOT NULL DEFAULT 0,
    chapter_count INTEGER NOT NULL DEFAULT 0,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    word_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Chapters: ordered by seq_index, linearly linked via next_id
CREATE TABLE IF NOT EXISTS chapters (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    seq_index INTEGER NOT NULL,
    title TEXT NOT NULL,
    page_start INTEGER NOT NULL DEFAULT 1,
    page_end INTEGER NOT NULL DEFAULT 1,
    keywords_json TEXT,
    word_count INTEGER NOT NULL DEFAULT 0,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    extraction_confidence REAL NOT NULL DEFAULT 1,
    synthetic INTEGER NOT NULL DEFAULT 0,
    next_id TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(document_id, seq_index)
);

-- Sections: numbering supports nesting ("2.1.3")
CREATE TABLE IF NOT EXISTS sections (
    id TEXT PRIMARY KEY,
    chapter_id TEXT NOT NULL REFERENCES chapters(id),
    document_id TEXT NOT NULL REFERENCES documents(id),
    numbering TEXT NOT NULL,
    level INTEGER NOT NULL,
    title TEXT NOT NULL,
    page_start INTEGER NOT NULL DEFAULT 1,
    page_end INTEGER NOT NULL DEFAULT 1,
    keywords_json TEXT,
    word_count INTEGER NOT NULL DEFAULT 0,
    extraction_confidence REAL NOT NULL DEFAULT 1,
    synthetic INTEGER NOT NULL DEFAULT 0,
    next_id TEXT,
    created_at TEXT NOT NULL
);

-- Chunks: the retrievable units; vectors live in Qdrant under point_id
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    section_id TEXT NOT NULL REFERENCES sections(id),
    chapter_id TEXT NOT NULL REFERENCES chapters(id),
    document_id TEXT NOT NULL REFERENCES documents(id),
    content_type TEXT NOT NULL,
    strategy TEXT NOT NULL,
    text TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    point_id TEXT NOT NULL,
    embedding_model TEXT,
    embedding_pending INTEGER NOT NULL DEFAULT 1,
    difficulty REAL NOT NULL DEFAULT 0,
    quality REAL NOT NULL DEFAULT 0,
    coherence REAL NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 1,
    concepts_json TEXT,
    prerequisites_json TEXT,
    metadata_json TEXT,
    page_start INTEGER NOT NULL DEFAULT 1,
    page_end INTEGER NOT NULL DEFAULT 1,
    word_count INTEGER NOT NULL DEFAULT 0,
    sentence_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Concepts: deduplicated by normalized name within a subject area
CREATE TABLE IF NOT EXISTS concepts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    normalized_name TEXT NOT NULL,
    concept_type TEXT NOT NULL,
    subject TEXT NOT NULL,
    difficulty REAL NOT NULL DEFAULT 0.5,
    importance REAL NOT NULL DEFAULT 0.5,
    reference_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(subject, normalized_name)
);

-- MENTIONS_CONCEPT: Chunk -> Concept, many-to-many
CREATE TABLE IF NOT EXISTS concept_mentions (
    chunk_id TEXT NOT NULL REFERENCES chunks(id),
    concept_id TEXT NOT NULL REFERENCES concepts(id),
    relevance REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (chunk_id, concept_id)
);

-- REQUIRES: Concept -> Concept, must remain acyclic
CREATE TABLE IF NOT EXISTS requires_edges (
    from_concept_id TEXT NOT NULL REFERENCES concepts(id),
    to_concept_id TEXT NOT NULL REFERENCES concepts(id),
    strength REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (from_concept_id, to_concept_id)
);

-- SIMILAR_TO: Chunk -> Chunk, derived, capped top-K per source chunk
CREATE TABLE IF NOT EXISTS similar_edges (
    from_chunk_id TEXT NOT NULL REFERENCES chunks(id),
    to_chunk_id TEXT NOT NULL REFERENCES chunks(id),
    score REAL NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (from_chunk_id, to_chunk_id)
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_chapters_document ON chapters(document_id);
CREATE INDEX IF NOT EXISTS idx_sections_chapter ON sections(chapter_id);
CREATE INDEX IF NOT EXISTS idx_chunks_section ON chunks(section_id);
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
CREATE INDEX IF NOT EXISTS idx_chunks_point ON chunks(point_id);
CREATE INDEX IF NOT EXISTS idx_chunks_pending ON chunks(embedding_pending);
CREATE INDEX IF NOT EXISTS idx_concepts_subject ON concepts(subject);
CREATE INDEX IF NOT EXISTS idx_mentions_concept ON concept_mentions(concept_id);
CREATE INDEX IF NOT EXISTS idx_requires_to ON requires_edges(to_concept_id);
"#;
