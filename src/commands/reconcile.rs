//! Reconcile command: retry embedding for pending chunks

use crate::commands::ingest::derive_similar_edges;
use crate::config::Config;
use crate::embed::{embed_guarded, EmbedOutcome, Embedder, GuardedService};
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::index::{ChunkPoint, ChunkPayload, VectorIndex};
use crate::progress::add_progress_bar;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Reconciliation summary
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileStats {
    pub attempted: usize,
    pub embedded: usize,
    pub still_pending: usize,
}

/// Re-attempt embedding for every chunk persisted without a vector
pub async fn cmd_reconcile(
    config: &Config,
    store: &GraphStore,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    guard: &GuardedService,
) -> Result<ReconcileStats> {
    let pending = store.list_pending_chunks().await?;
    if pending.is_empty() {
        return Ok(ReconcileStats {
            attempted: 0,
            embedded: 0,
            still_pending: 0,
        });
    }

    info!(count = pending.len(), "Reconciling pending chunks");
    index.ensure_collection().await?;

    let bar = add_progress_bar(pending.len() as u64);
    bar.set_message("Reconciling");

    let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
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
    let mut embedded_vectors: Vec<(String, Vec<f32>)> = Vec::new();
    let mut still_pending = 0usize;

    for (chunk, outcome) in pending.iter().zip(outcomes) {
        match outcome {
            EmbedOutcome::Embedded(vector) => {
                let subject = store
                    .get_document(&chunk.document_id)
                    .await?
                    .map(|d| d.subject)
                    .unwrap_or_default();
                store.mark_embedded(&chunk.id, embedder.model_name()).await?;
                let point_id = Uuid::parse_str(&chunk.point_id)
                    .map_err(|e| Error::Other(format!("Bad point id: {}", e)))?;
                points.push(ChunkPoint {
                    id: point_id,
                    vector: vector.clone(),
                    payload: ChunkPayload::from_chunk(chunk, &subject),
                });
                embedded_vectors.push((chunk.id.clone(), vector));
            }
            EmbedOutcome::Pending => still_pending += 1,
        }
    }

    index.upsert_points(points).await?;
    derive_similar_edges(store, index, &embedded_vectors, config.search.similar_top_k).await?;

    Ok(ReconcileStats {
        attempted: pending.len(),
        embedded: embedded_vectors.len(),
        still_pending,
    })
}

pub fn print_reconcile_stats(stats: &ReconcileStats) {
    if stats.attempted == 0 {
        println!("Nothing to reconcile; no chunks are pending.");
        return;
    }
    println!("✓ Reconciliation complete");
    println!("  Attempted: {}", stats.attempted);
    println!("  Embedded: {}", stats.embedded);
    if stats.still_pending > 0 {
        println!("  Still pending: {}", stats.still_pending);
    }
}
