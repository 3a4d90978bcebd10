//! Chunk commands: manual insertion and inspection

use crate::config::Config;
use crate::embed::{EmbedOutcome, Embedder, GuardedService};
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::index::{ChunkPoint, ChunkPayload, VectorIndex};
use crate::model::{Chunk, ChunkMetadata, ChunkingStrategy, ContentType};
use crate::score::score_chunk;
use serde::Serialize;
use uuid::Uuid;

/// Result of a manual chunk insertion
#[derive(Debug, Clone, Serialize)]
pub struct ChunkAddStats {
    pub chunk_id: String,
    pub point_id: String,
    pub quality: f64,
    pub embedding_pending: bool,
}

/// Insert one hand-written chunk under an existing section.
///
/// Goes through the same scoring and embedding path as ingestion; if the
/// embedding service is down the chunk is persisted pending.
#[allow(clippy::too_many_arguments)]
pub async fn cmd_chunk_add(
    store: &GraphStore,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    guard: &GuardedService,
    _config: &Config,
    section_id: &str,
    text: &str,
    content_type: ContentType,
) -> Result<ChunkAddStats> {
    if text.trim().is_empty() {
        return Err(Error::Other("Chunk text is empty".to_string()));
    }

    let section = store
        .get_section(section_id)
        .await?
        .ok_or_else(|| Error::SectionNotFound(section_id.to_string()))?;

    let metadata = metadata_for(content_type);
    let scores = score_chunk(text, &metadata, section.extraction_confidence);

    let mut chunk = Chunk::new(
        section.id.clone(),
        section.chapter_id.clone(),
        section.document_id.clone(),
        metadata,
        ChunkingStrategy::ContentAware,
        text.to_string(),
    );
    chunk.quality = scores.quality;
    chunk.coherence = scores.coherence;
    chunk.confidence = section.extraction_confidence;
    chunk.word_count = text.split_whitespace().count() as i32;
    chunk.page_start = section.page_start;
    chunk.page_end = section.page_end;

    store.insert_chunk(&chunk).await?;

    let subject = store
        .get_document(&section.document_id)
        .await?
        .map(|d| d.subject)
        .unwrap_or_default();

    let outcome = match guard.run(|| embedder.embed(vec![text.to_string()])).await {
        Ok(mut vectors) if !vectors.is_empty() => EmbedOutcome::Embedded(vectors.remove(0)),
        _ => EmbedOutcome::Pending,
    };

    let pending = match outcome {
        EmbedOutcome::Embedded(vector) => {
            index.ensure_collection().await?;
            let point_id = Uuid::parse_str(&chunk.point_id)
                .map_err(|e| Error::Other(format!("Bad point id: {}", e)))?;
            index
                .upsert_points(vec![ChunkPoint {
                    id: point_id,
                    vector,
                    payload: ChunkPayload::from_chunk(&chunk, &subject),
                }])
                .await?;
            store.mark_embedded(&chunk.id, embedder.model_name()).await?;
            false
        }
        EmbedOutcome::Pending => true,
    };

    Ok(ChunkAddStats {
        chunk_id: chunk.id,
        point_id: chunk.point_id,
        quality: chunk.quality,
        embedding_pending: pending,
    })
}

fn metadata_for(content_type: ContentType) -> ChunkMetadata {
    match content_type {
        ContentType::Narrative => ChunkMetadata::Narrative,
        ContentType::Definition => ChunkMetadata::Definition { term: None },
        ContentType::Example => ChunkMetadata::Example { number: None },
        ContentType::Code => ChunkMetadata::Code { language: None },
        ContentType::Exercise => ChunkMetadata::Exercise { number: None },
        ContentType::Summary => ChunkMetadata::Summary,
        ContentType::Mixed => ChunkMetadata::Mixed { types: vec![] },
    }
}

/// Fetch one chunk by id
pub async fn cmd_chunk_get(store: &GraphStore, chunk_id: &str) -> Result<Chunk> {
    store
        .get_chunk(chunk_id)
        .await?
        .ok_or_else(|| Error::ChunkNotFound(chunk_id.to_string()))
}

pub fn print_chunk(chunk: &Chunk) {
    println!("Chunk {}", chunk.id);
    println!("  type: {} ({})", chunk.content_type, chunk.strategy);
    println!(
        "  quality: {:.2}  coherence: {:.2}  difficulty: {:.2}",
        chunk.quality, chunk.coherence, chunk.difficulty
    );
    println!(
        "  pages: {}-{}  words: {}  embedding: {}",
        chunk.page_start,
        chunk.page_end,
        chunk.word_count,
        if chunk.embedding_pending {
            "pending".to_string()
        } else {
            chunk
                .embedding_model
                .clone()
                .unwrap_or_else(|| "indexed".to_string())
        }
    );
    let concepts = chunk.concepts();
    if !concepts.is_empty() {
        println!("  concepts: {}", concepts.join(", "));
    }
    println!("\n{}", chunk.text);
}

pub fn print_chunk_add_stats(stats: &ChunkAddStats) {
    println!("✓ Chunk {} created (quality {:.2})", stats.chunk_id, stats.quality);
    if stats.embedding_pending {
        println!("  embedding pending; run 'syllabus reconcile'");
    }
}
