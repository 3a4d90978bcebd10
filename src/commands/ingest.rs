//! Ingest command: extract, chunk, score, embed, and persist a document

use crate::chunk::Chunker;
use crate::config::Config;
use crate::embed::{embed_guarded, EmbedOutcome, Embedder, GuardedService};
use crate::error::{Error, Result};
use crate::extract::{count_words, extract_structure, merge_small_sections, DocumentMeta};
use crate::graph::GraphStore;
use crate::index::{ChunkPoint, ChunkPayload, VectorIndex};
use crate::model::{Chapter, Chunk, Concept, ConceptType, Document, Section};
use crate::progress::add_progress_bar;
use crate::score::score_chunk;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ingestion summary
#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    pub document_id: String,
    pub title: String,
    pub chapters: usize,
    pub sections: usize,
    pub chunks_created: usize,
    pub chunks_pending: usize,
    pub concepts_touched: usize,
    pub requires_edges_added: usize,
    pub word_count: usize,
    pub extraction_confidence: f64,
    pub overall_quality: f64,
}

/// Caller-supplied document identity
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub title: String,
    pub subject: String,
    pub authors: Vec<String>,
    pub language: String,
}

/// Ingest a text file end to end
#[allow(clippy::too_many_arguments)]
pub async fn cmd_ingest(
    config: &Config,
    store: &GraphStore,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    guard: &GuardedService,
    path: &Path,
    request: IngestRequest,
) -> Result<IngestStats> {
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Err(Error::Extraction(format!(
            "Document {} is empty",
            path.display()
        )));
    }

    index.ensure_collection().await?;

    let meta = DocumentMeta {
        title: request.title.clone(),
        subject: request.subject.clone(),
        authors: request.authors.clone(),
        language: request.language.clone(),
    };

    info!(title = %request.title, "Extracting document structure");
    let extracted = extract_structure(&text, &meta)?;

    let mut document = Document::new(
        request.title.clone(),
        request.subject.clone(),
        request.authors.clone(),
        request.language.clone(),
    );
    document.extraction_confidence = extracted.confidence;
    store.insert_document(&document).await?;

    // Seed vocabulary from concepts already known for this subject
    let vocabulary = store.concept_vocabulary(&request.subject).await?;
    let chunker = Chunker::new(&config.chunk);

    // Build the whole tree in memory first so next_id links can be set
    // before insertion.
    let mut chapters: Vec<Chapter> = Vec::new();
    let mut sections: Vec<Section> = Vec::new();
    let mut chunks: Vec<Chunk> = Vec::new();

    let bar = add_progress_bar(extracted.chapters.len() as u64);
    bar.set_message("Chunking");

    for ext_chapter in &extracted.chapters {
        let mut chapter = Chapter::new(
            document.id.clone(),
            ext_chapter.seq_index,
            ext_chapter.title.clone(),
        );
        chapter.page_start = ext_chapter.page_start;
        chapter.page_end = ext_chapter.page_end;
        chapter.extraction_confidence = ext_chapter.confidence;
        chapter.synthetic = ext_chapter.synthetic;

        let merged =
            merge_small_sections(ext_chapter.sections.clone(), config.chunk.min_section_words);

        for ext_section in &merged {
            let mut section = Section::new(
                chapter.id.clone(),
                document.id.clone(),
                ext_section.numbering.clone(),
                ext_section.title.clone(),
            );
            section.page_start = ext_section.page_start;
            section.page_end = ext_section.page_end;
            section.extraction_confidence = ext_section.confidence;
            section.synthetic = ext_section.synthetic;
            section.word_count = count_words(&ext_section.text) as i32;

            for raw in chunker.chunk_section(&ext_section.text, &vocabulary) {
                let scores = score_chunk(&raw.text, &raw.metadata, ext_section.confidence);
                let mut chunk = Chunk::new(
                    section.id.clone(),
                    chapter.id.clone(),
                    document.id.clone(),
                    raw.metadata.clone(),
                    raw.strategy,
                    raw.text.clone(),
                );
                chunk.word_count = raw.word_count as i32;
                chunk.sentence_count = raw.sentence_count as i32;
                chunk.difficulty = raw.difficulty;
                chunk.quality = scores.quality;
                chunk.coherence = scores.coherence;
                chunk.confidence = ext_section.confidence;
                chunk.page_start = ext_section.page_start;
                chunk.page_end = ext_section.page_end;
                chunk.set_concepts(&raw.concepts);
                chunk.set_prerequisites(&raw.prerequisites);
                chunks.push(chunk);
            }

            sections.push(section);
        }

        chapter.word_count = merged
            .iter()
            .map(|s| count_words(&s.text) as i32)
            .sum();
        chapters.push(chapter);
        bar.inc(1);
    }
    bar.finish_and_clear();

    link_siblings(&mut chapters, &mut sections);

    // Persist the tree: parents before children
    for chapter in &chapters {
        store.insert_chapter(chapter).await?;
    }
    for section in &sections {
        store.insert_section(section).await?;
    }
    for chunk in &chunks {
        store.insert_chunk(chunk).await?;
    }

    debug!(
        chapters = chapters.len(),
        sections = sections.len(),
        chunks = chunks.len(),
        "Tree persisted"
    );

    // Concept upserts, mention edges, and prerequisite edges
    let (concepts_touched, requires_edges_added) =
        register_concepts(store, &chunks, &request.subject).await?;

    // Embed and index
    let chunks_pending = embed_and_index(
        config,
        store,
        index,
        embedder,
        guard,
        &chunks,
        &request.subject,
    )
    .await?;

    // Document-level rollup
    let overall_quality = if chunks.is_empty() {
        0.0
    } else {
        chunks.iter().map(|c| c.quality).sum::<f64>() / chunks.len() as f64
    };
    let coherence = if chunks.is_empty() {
        0.0
    } else {
        chunks.iter().map(|c| c.coherence).sum::<f64>() / chunks.len() as f64
    };

    document.structure_quality = extracted.confidence;
    document.coherence = coherence;
    document.overall_quality = overall_quality;
    document.chapter_count = chapters.len() as i32;
    document.chunk_count = chunks.len() as i32;
    document.word_count = extracted.word_count as i32;
    store.finalize_document(&document).await?;

    Ok(IngestStats {
        document_id: document.id,
        title: document.title,
        chapters: chapters.len(),
        sections: sections.len(),
        chunks_created: chunks.len(),
        chunks_pending,
        concepts_touched,
        requires_edges_added,
        word_count: extracted.word_count,
        extraction_confidence: extracted.confidence,
        overall_quality,
    })
}

/// Set next_id links for reading order within each parent
fn link_siblings(chapters: &mut [Chapter], sections: &mut [Section]) {
    for i in 0..chapters.len().saturating_sub(1) {
        let next = chapters[i + 1].id.clone();
        chapters[i].next_id = Some(next);
    }

    let mut by_chapter: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, section) in sections.iter().enumerate() {
        by_chapter
            .entry(section.chapter_id.clone())
            .or_default()
            .push(i);
    }
    for indices in by_chapter.values() {
        for pair in indices.windows(2) {
            let next = sections[pair[1]].id.clone();
            sections[pair[0]].next_id = Some(next);
        }
    }
}

/// Upsert concepts tagged on chunks, record mentions, and add REQUIRES
/// edges from the chunk's concepts to its prerequisite tags.
async fn register_concepts(
    store: &GraphStore,
    chunks: &[Chunk],
    subject: &str,
) -> Result<(usize, usize)> {
    let mut resolved: HashMap<String, Concept> = HashMap::new();
    let mut edges_added = 0usize;

    for chunk in chunks {
        let concepts = chunk.concepts();
        for name in &concepts {
            let concept = match resolved.get(name) {
                Some(c) => c.clone(),
                None => {
                    let c = store
                        .upsert_concept(name, ConceptType::Definition, subject, chunk.difficulty)
                        .await?;
                    resolved.insert(name.clone(), c.clone());
                    c
                }
            };
            store.add_mention(&chunk.id, &concept.id, 1.0).await?;
        }

        for prereq_name in chunk.prerequisites() {
            let prereq = match resolved.get(&prereq_name) {
                Some(c) => c.clone(),
                None => {
                    let c = store
                        .upsert_concept(&prereq_name, ConceptType::Definition, subject, 0.3)
                        .await?;
                    resolved.insert(prereq_name.clone(), c.clone());
                    c
                }
            };

            for name in &concepts {
                let from = &resolved[name];
                if from.id == prereq.id {
                    continue;
                }
                match store.add_requires_edge(&from.id, &prereq.id, 0.5).await {
                    Ok(()) => edges_added += 1,
                    Err(Error::CycleRejected { from, to }) => {
                        warn!(%from, %to, "Skipping prerequisite edge that would close a cycle");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok((resolved.len(), edges_added))
}

/// Embed chunk texts through the guard, upsert vectors, and derive
/// SIMILAR_TO edges. Returns how many chunks stayed pending.
async fn embed_and_index(
    config: &Config,
    store: &GraphStore,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    guard: &GuardedService,
    chunks: &[Chunk],
    subject: &str,
) -> Result<usize> {
    if chunks.is_empty() {
        return Ok(0);
    }

    let bar = add_progress_bar(chunks.len() as u64);
    bar.set_message("Embedding");

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let outcomes = embed_guarded(
        embedder,
        guard,
        texts,
        config.embedding.batch_size,
        config.embedding.concurrency,
    )
    .await;
    bar.finish_and_clear();

    let mut points = Vec::new();
    let mut embedded: Vec<(String, Vec<f32>)> = Vec::new();
    let mut pending = 0usize;

    for (chunk, outcome) in chunks.iter().zip(outcomes) {
        match outcome {
            EmbedOutcome::Embedded(vector) => {
                store.mark_embedded(&chunk.id, embedder.model_name()).await?;
                let point_id = Uuid::parse_str(&chunk.point_id)
                    .map_err(|e| Error::Other(format!("Bad point id: {}", e)))?;
                points.push(ChunkPoint {
                    id: point_id,
                    vector: vector.clone(),
                    payload: ChunkPayload::from_chunk(chunk, subject),
                });
                embedded.push((chunk.id.clone(), vector));
            }
            EmbedOutcome::Pending => pending += 1,
        }
    }

    if pending > 0 {
        warn!(
            pending,
            "Some chunks were persisted without embeddings; run 'syllabus reconcile' later"
        );
    }

    index.upsert_points(points).await?;

    derive_similar_edges(store, index, &embedded, config.search.similar_top_k).await?;

    Ok(pending)
}

/// For each newly embedded chunk, replace its SIMILAR_TO edge set with the
/// current top-K nearest chunks.
pub(crate) async fn derive_similar_edges(
    store: &GraphStore,
    index: &VectorIndex,
    embedded: &[(String, Vec<f32>)],
    top_k: usize,
) -> Result<()> {
    for (chunk_id, vector) in embedded {
        // One extra so the chunk's own point can be skipped
        let hits = index.search(vector.clone(), top_k + 1, None).await?;

        let mut neighbors = Vec::with_capacity(top_k);
        for hit in hits {
            let Some(payload) = hit.payload else { continue };
            if payload.chunk_id == *chunk_id {
                continue;
            }
            neighbors.push((payload.chunk_id, hit.score as f64));
        }

        store
            .replace_similar_edges(chunk_id, &neighbors, top_k)
            .await?;
    }
    Ok(())
}

/// Plain-text summary printer
pub fn print_ingest_stats(stats: &IngestStats) {
    println!("\n✓ Ingestion complete: {}", stats.title);
    println!("  Document ID: {}", stats.document_id);
    println!("  Chapters: {}", stats.chapters);
    println!("  Sections: {}", stats.sections);
    println!("  Chunks created: {}", stats.chunks_created);
    if stats.chunks_pending > 0 {
        println!(
            "  Chunks pending embedding: {} (run 'syllabus reconcile')",
            stats.chunks_pending
        );
    }
    println!("  Concepts touched: {}", stats.concepts_touched);
    println!("  Prerequisite edges added: {}", stats.requires_edges_added);
    println!("  Words: {}", stats.word_count);
    println!(
        "  Extraction confidence: {:.2}  Overall quality: {:.2}",
        stats.extraction_confidence, stats.overall_quality
    );
}
