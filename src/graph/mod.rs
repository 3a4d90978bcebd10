//! Graph store over SQLite
//!
//! Persists the Document -> Chapter -> Section -> Chunk tree, Concept nodes,
//! and relationship edges (MENTIONS_CONCEPT, REQUIRES, SIMILAR_TO). Chunk
//! insertion is atomic with its ownership edges; REQUIRES insertion runs a
//! reachability check inside the same transaction and rejects cycles before
//! commit. Embedding vectors live in the Qdrant index, keyed by
//! `Chunk::point_id`.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    normalize_concept_name, Chapter, Chunk, Concept, ConceptType, Document, RequiresEdge, Section,
};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

/// Aggregate counts for health/introspection
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphStats {
    pub documents: i64,
    pub chapters: i64,
    pub sections: i64,
    pub chunks: i64,
    pub pending_chunks: i64,
    pub concepts: i64,
    pub requires_edges: i64,
    pub similar_edges: i64,
}

/// In-memory snapshot of the prerequisite graph for path planning
#[derive(Debug, Clone)]
pub struct PrerequisiteSnapshot {
    pub concepts: Vec<Concept>,
    pub edges: Vec<RequiresEdge>,
}

/// Graph database handle
#[derive(Clone)]
pub struct GraphStore {
    pool: SqlitePool,
}

impl GraphStore {
    /// Connect to the graph database configured in `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        let db_path = &config.paths.db_file;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to graph database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Connect to an in-memory database (tests)
    pub async fn connect_memory() -> Result<Self> {
        // One connection: each in-memory SQLite connection is its own db
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    // ---- tree -----------------------------------------------------------

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (id, title, subject, authors_json, language, \
             extraction_confidence, structure_quality, coherence, overall_quality, \
             chapter_count, chunk_count, word_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.subject)
        .bind(&doc.authors_json)
        .bind(&doc.language)
        .bind(doc.extraction_confidence)
        .bind(doc.structure_quality)
        .bind(doc.coherence)
        .bind(doc.overall_quality)
        .bind(doc.chapter_count)
        .bind(doc.chunk_count)
        .bind(doc.word_count)
        .bind(&doc.created_at)
        .bind(&doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Write back aggregate counts and quality once ingestion completes
    pub async fn finalize_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET extraction_confidence = ?, structure_quality = ?, \
             coherence = ?, overall_quality = ?, chapter_count = ?, chunk_count = ?, \
             word_count = ?, updated_at = ? WHERE id = ?",
        )
        .bind(doc.extraction_confidence)
        .bind(doc.structure_quality)
        .bind(doc.coherence)
        .bind(doc.overall_quality)
        .bind(doc.chapter_count)
        .bind(doc.chunk_count)
        .bind(doc.word_count)
        .bind(Utc::now().to_rfc3339())
        .bind(&doc.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    pub async fn insert_chapter(&self, chapter: &Chapter) -> Result<()> {
        sqlx::query(
            "INSERT INTO chapters (id, document_id, seq_index, title, page_start, page_end, \
             keywords_json, word_count, chunk_count, extraction_confidence, synthetic, \
             next_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chapter.id)
        .bind(&chapter.document_id)
        .bind(chapter.seq_index)
        .bind(&chapter.title)
        .bind(chapter.page_start)
        .bind(chapter.page_end)
        .bind(&chapter.keywords_json)
        .bind(chapter.word_count)
        .bind(chapter.chunk_count)
        .bind(chapter.extraction_confidence)
        .bind(chapter.synthetic)
        .bind(&chapter.next_id)
        .bind(&chapter.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_chapter(&self, id: &str) -> Result<Option<Chapter>> {
        let chapter = sqlx::query_as::<_, Chapter>("SELECT * FROM chapters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chapter)
    }

    pub async fn list_chapters(&self, document_id: &str) -> Result<Vec<Chapter>> {
        let chapters = sqlx::query_as::<_, Chapter>(
            "SELECT * FROM chapters WHERE document_id = ? ORDER BY seq_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chapters)
    }

    pub async fn insert_section(&self, section: &Section) -> Result<()> {
        sqlx::query(
            "INSERT INTO sections (id, chapter_id, document_id, numbering, level, title, \
             page_start, page_end, keywords_json, word_count, extraction_confidence, \
             synthetic, next_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&section.id)
        .bind(&section.chapter_id)
        .bind(&section.document_id)
        .bind(&section.numbering)
        .bind(section.level)
        .bind(&section.title)
        .bind(section.page_start)
        .bind(section.page_end)
        .bind(&section.keywords_json)
        .bind(section.word_count)
        .bind(section.extraction_confidence)
        .bind(section.synthetic)
        .bind(&section.next_id)
        .bind(&section.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_section(&self, id: &str) -> Result<Option<Section>> {
        let section = sqlx::query_as::<_, Section>("SELECT * FROM sections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(section)
    }

    pub async fn list_sections(&self, chapter_id: &str) -> Result<Vec<Section>> {
        let sections = sqlx::query_as::<_, Section>(
            "SELECT * FROM sections WHERE chapter_id = ? ORDER BY numbering",
        )
        .bind(chapter_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sections)
    }

    /// Insert a chunk atomically with its ownership edges: the row commits
    /// only if all three ancestors exist.
    pub async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let section: Option<Section> =
            sqlx::query_as("SELECT * FROM sections WHERE id = ?")
                .bind(&chunk.section_id)
                .fetch_optional(&mut *tx)
                .await?;
        let section = section.ok_or_else(|| Error::SectionNotFound(chunk.section_id.clone()))?;

        if section.chapter_id != chunk.chapter_id || section.document_id != chunk.document_id {
            return Err(Error::Other(format!(
                "Chunk {} ancestor ids disagree with its section's ancestry",
                chunk.id
            )));
        }

        sqlx::query(
            "INSERT INTO chunks (id, section_id, chapter_id, document_id, content_type, \
             strategy, text, content_hash, point_id, embedding_model, embedding_pending, \
             difficulty, quality, coherence, confidence, concepts_json, prerequisites_json, \
             metadata_json, page_start, page_end, word_count, sentence_count, created_at, \
             updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.section_id)
        .bind(&chunk.chapter_id)
        .bind(&chunk.document_id)
        .bind(&chunk.content_type)
        .bind(&chunk.strategy)
        .bind(&chunk.text)
        .bind(&chunk.content_hash)
        .bind(&chunk.point_id)
        .bind(&chunk.embedding_model)
        .bind(chunk.embedding_pending)
        .bind(chunk.difficulty)
        .bind(chunk.quality)
        .bind(chunk.coherence)
        .bind(chunk.confidence)
        .bind(&chunk.concepts_json)
        .bind(&chunk.prerequisites_json)
        .bind(&chunk.metadata_json)
        .bind(chunk.page_start)
        .bind(chunk.page_end)
        .bind(chunk.word_count)
        .bind(chunk.sentence_count)
        .bind(&chunk.created_at)
        .bind(&chunk.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        let chunk = sqlx::query_as::<_, Chunk>("SELECT * FROM chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chunk)
    }

    pub async fn get_chunk_by_point_id(&self, point_id: &str) -> Result<Option<Chunk>> {
        let chunk = sqlx::query_as::<_, Chunk>("SELECT * FROM chunks WHERE point_id = ?")
            .bind(point_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chunk)
    }

    pub async fn list_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let chunks = sqlx::query_as::<_, Chunk>(
            "SELECT * FROM chunks WHERE document_id = ? ORDER BY created_at, id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Chunks persisted without an embedding, awaiting reconciliation
    pub async fn list_pending_chunks(&self) -> Result<Vec<Chunk>> {
        let chunks = sqlx::query_as::<_, Chunk>(
            "SELECT * FROM chunks WHERE embedding_pending = 1 ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Record a successful embedding: clears the pending flag and stamps the
    /// model that produced the vector.
    pub async fn mark_embedded(&self, chunk_id: &str, model: &str) -> Result<()> {
        sqlx::query(
            "UPDATE chunks SET embedding_pending = 0, embedding_model = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(model)
        .bind(Utc::now().to_rfc3339())
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- concepts -------------------------------------------------------

    /// Upsert a concept, deduplicating by normalized name within the subject
    /// area. An existing concept gets its reference count bumped.
    pub async fn upsert_concept(
        &self,
        name: &str,
        concept_type: ConceptType,
        subject: &str,
        difficulty: f64,
    ) -> Result<Concept> {
        let candidate = {
            let mut c = Concept::new(name, concept_type, subject.to_string());
            c.difficulty = difficulty.clamp(0.0, 1.0);
            c.reference_count = 1;
            c
        };

        sqlx::query(
            "INSERT INTO concepts (id, name, normalized_name, concept_type, subject, \
             difficulty, importance, reference_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(subject, normalized_name) \
             DO UPDATE SET reference_count = reference_count + 1, \
             importance = MIN(1.0, importance + 0.01)",
        )
        .bind(&candidate.id)
        .bind(&candidate.name)
        .bind(&candidate.normalized_name)
        .bind(&candidate.concept_type)
        .bind(&candidate.subject)
        .bind(candidate.difficulty)
        .bind(candidate.importance)
        .bind(candidate.reference_count)
        .bind(&candidate.created_at)
        .execute(&self.pool)
        .await?;

        let concept = sqlx::query_as::<_, Concept>(
            "SELECT * FROM concepts WHERE subject = ? AND normalized_name = ?",
        )
        .bind(subject)
        .bind(&candidate.normalized_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(concept)
    }

    pub async fn get_concept(&self, id: &str) -> Result<Option<Concept>> {
        let concept = sqlx::query_as::<_, Concept>("SELECT * FROM concepts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(concept)
    }

    /// Look up a concept by name, optionally scoped to a subject area
    pub async fn find_concept(&self, name: &str, subject: Option<&str>) -> Result<Option<Concept>> {
        let normalized = normalize_concept_name(name);
        let concept = match subject {
            Some(subject) => {
                sqlx::query_as::<_, Concept>(
                    "SELECT * FROM concepts WHERE subject = ? AND normalized_name = ?",
                )
                .bind(subject)
                .bind(&normalized)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Concept>(
                    "SELECT * FROM concepts WHERE normalized_name = ? ORDER BY reference_count DESC",
                )
                .bind(&normalized)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(concept)
    }

    /// Concept names known for a subject area, the chunker's seed vocabulary
    pub async fn concept_vocabulary(&self, subject: &str) -> Result<Vec<String>> {
        let names: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM concepts WHERE subject = ? ORDER BY name")
                .bind(subject)
                .fetch_all(&self.pool)
                .await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    pub async fn add_mention(&self, chunk_id: &str, concept_id: &str, relevance: f64) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO concept_mentions (chunk_id, concept_id, relevance, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(chunk_id)
        .bind(concept_id)
        .bind(relevance.clamp(0.0, 1.0))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Chunks mentioning a concept, with mention relevance
    pub async fn chunks_for_concept(&self, concept_id: &str) -> Result<Vec<(Chunk, f64)>> {
        let mentions: Vec<(String, f64)> = sqlx::query_as(
            "SELECT chunk_id, relevance FROM concept_mentions WHERE concept_id = ?",
        )
        .bind(concept_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(mentions.len());
        for (chunk_id, relevance) in mentions {
            if let Some(chunk) = self.get_chunk(&chunk_id).await? {
                out.push((chunk, relevance));
            }
        }
        Ok(out)
    }

    // ---- REQUIRES edges -------------------------------------------------

    /// Insert a REQUIRES edge, rejecting it if the target can already reach
    /// the source (which would close a cycle). Check and insert share one
    /// transaction so the graph is never observed with the bad edge.
    pub async fn add_requires_edge(
        &self,
        from_concept_id: &str,
        to_concept_id: &str,
        strength: f64,
    ) -> Result<()> {
        if from_concept_id == to_concept_id {
            return Err(Error::CycleRejected {
                from: from_concept_id.to_string(),
                to: to_concept_id.to_string(),
            });
        }

        let mut tx = self.pool.begin().await?;

        let reachable: Option<(i64,)> = sqlx::query_as(
            "WITH RECURSIVE reach(id) AS ( \
                 SELECT to_concept_id FROM requires_edges WHERE from_concept_id = ?1 \
                 UNION \
                 SELECT r.to_concept_id FROM requires_edges r \
                 JOIN reach ON r.from_concept_id = reach.id \
             ) SELECT 1 FROM reach WHERE id = ?2 LIMIT 1",
        )
        .bind(to_concept_id)
        .bind(from_concept_id)
        .fetch_optional(&mut *tx)
        .await?;

        if reachable.is_some() {
            return Err(Error::CycleRejected {
                from: from_concept_id.to_string(),
                to: to_concept_id.to_string(),
            });
        }

        sqlx::query(
            "INSERT OR REPLACE INTO requires_edges (from_concept_id, to_concept_id, strength, \
             created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(from_concept_id)
        .bind(to_concept_id)
        .bind(strength.clamp(0.0, 1.0))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(from = from_concept_id, to = to_concept_id, "REQUIRES edge added");
        Ok(())
    }

    pub async fn list_requires_edges(&self) -> Result<Vec<RequiresEdge>> {
        let edges = sqlx::query_as::<_, RequiresEdge>(
            "SELECT * FROM requires_edges ORDER BY from_concept_id, to_concept_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(edges)
    }

    /// Snapshot of the full prerequisite graph for path planning
    pub async fn load_prerequisite_snapshot(&self) -> Result<PrerequisiteSnapshot> {
        let concepts = sqlx::query_as::<_, Concept>("SELECT * FROM concepts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let edges = self.list_requires_edges().await?;
        Ok(PrerequisiteSnapshot { concepts, edges })
    }

    // ---- SIMILAR_TO edges -----------------------------------------------

    /// Replace a chunk's outgoing SIMILAR_TO edge set wholesale with the
    /// top-K neighbors, in one transaction.
    pub async fn replace_similar_edges(
        &self,
        from_chunk_id: &str,
        neighbors: &[(String, f64)],
        top_k: usize,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM similar_edges WHERE from_chunk_id = ?")
            .bind(from_chunk_id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now().to_rfc3339();
        for (to_chunk_id, score) in neighbors.iter().take(top_k) {
            if to_chunk_id == from_chunk_id {
                continue;
            }
            sqlx::query(
                "INSERT INTO similar_edges (from_chunk_id, to_chunk_id, score, created_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(from_chunk_id)
            .bind(to_chunk_id)
            .bind(score)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_similar_edges(&self, from_chunk_id: &str) -> Result<Vec<(String, f64)>> {
        let edges: Vec<(String, f64)> = sqlx::query_as(
            "SELECT to_chunk_id, score FROM similar_edges WHERE from_chunk_id = ? \
             ORDER BY score DESC",
        )
        .bind(from_chunk_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(edges)
    }

    // ---- stats ----------------------------------------------------------

    pub async fn stats(&self) -> Result<GraphStats> {
        let count = |sql: &'static str| {
            let pool = self.pool.clone();
            async move {
                let (n,): (i64,) = sqlx::query_as(sql).fetch_one(&pool).await?;
                Ok::<i64, Error>(n)
            }
        };

        Ok(GraphStats {
            documents: count("SELECT COUNT(*) FROM documents").await?,
            chapters: count("SELECT COUNT(*) FROM chapters").await?,
            sections: count("SELECT COUNT(*) FROM sections").await?,
            chunks: count("SELECT COUNT(*) FROM chunks").await?,
            pending_chunks: count("SELECT COUNT(*) FROM chunks WHERE embedding_pending = 1")
                .await?,
            concepts: count("SELECT COUNT(*) FROM concepts").await?,
            requires_edges: count("SELECT COUNT(*) FROM requires_edges").await?,
            similar_edges: count("SELECT COUNT(*) FROM similar_edges").await?,
        })
    }
}
