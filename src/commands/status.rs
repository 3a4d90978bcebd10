//! Status command: graph, index, and embedding-service health

use crate::config::Config;
use crate::embed::{BreakerState, GuardedService};
use crate::error::Result;
use crate::graph::{GraphStats, GraphStore};
use crate::index::VectorIndex;
use serde::Serialize;

/// Combined system status
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub graph: GraphStats,
    /// None when Qdrant is unreachable or the collection is missing
    pub index_points: Option<usize>,
    pub collection: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub breaker_state: String,
}

/// Gather status; a down Qdrant degrades to `index_points: None`
pub async fn cmd_status(
    config: &Config,
    store: &GraphStore,
    index: &VectorIndex,
    guard: &GuardedService,
) -> Result<SystemStatus> {
    let graph = store.stats().await?;

    let index_points = match index.collection_exists().await {
        Ok(true) => index.get_stats().await.ok().map(|s| s.points_count),
        _ => None,
    };

    Ok(SystemStatus {
        graph,
        index_points,
        collection: config.collection_name.clone(),
        embedding_model: config.embedding.model.clone(),
        embedding_dimension: config.embedding.dimension,
        breaker_state: guard.breaker_state().to_string(),
    })
}

pub fn print_status(status: &SystemStatus) {
    println!("Knowledge graph:");
    println!("  Documents: {}", status.graph.documents);
    println!("  Chapters: {}", status.graph.chapters);
    println!("  Sections: {}", status.graph.sections);
    println!("  Chunks: {}", status.graph.chunks);
    if status.graph.pending_chunks > 0 {
        println!("  Pending embeddings: {}", status.graph.pending_chunks);
    }
    println!("  Concepts: {}", status.graph.concepts);
    println!("  Prerequisite edges: {}", status.graph.requires_edges);
    println!("  Similarity edges: {}", status.graph.similar_edges);

    println!("\nVector index ({}):", status.collection);
    match status.index_points {
        Some(points) => println!("  Points: {}", points),
        None => println!("  Unreachable or not created"),
    }

    println!(
        "\nEmbedding: {} ({}d), breaker {}",
        status.embedding_model, status.embedding_dimension, status.breaker_state
    );

    if status.breaker_state != BreakerState::Closed.to_string() {
        println!("  ⚠ Embedding service has been failing; new chunks may stay pending");
    }
}
