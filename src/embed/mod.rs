//! Embedding generation
//!
//! An abstraction over embedding backends plus the batched, bounded-
//! concurrency pipeline that ingests chunks through the retry/circuit-
//! breaker guard. Chunks whose calls exhaust retries come back as
//! `Pending` and are persisted without a vector rather than dropped.

mod http_backend;
pub mod retry;

pub use http_backend::*;
pub use retry::{BreakerState, CircuitBreaker, GuardedService, RetryPolicy};

use crate::config::EmbeddingConfig;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::warn;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    let embedder = HttpEmbedder::new(config)?;
    Ok(Box::new(embedder))
}

/// Build the retry/breaker guard for the embedding service
pub fn create_guard(config: &EmbeddingConfig) -> GuardedService {
    GuardedService::new(
        CircuitBreaker::new(
            config.breaker_failure_threshold,
            Duration::from_secs(config.breaker_cooldown_secs),
        ),
        RetryPolicy::new(config.max_attempts, Duration::from_millis(config.backoff_ms)),
    )
}

/// Outcome of one chunk's embedding attempt
#[derive(Debug, Clone)]
pub enum EmbedOutcome {
    Embedded(Vec<f32>),
    /// Service unavailable after retries; persist without a vector
    Pending,
}

impl EmbedOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, EmbedOutcome::Pending)
    }
}

/// Embed `texts` in batches with bounded concurrency, guarded by retry and
/// the circuit breaker. Output order matches input order; a failed batch
/// yields `Pending` for each of its texts.
pub async fn embed_guarded(
    embedder: &dyn Embedder,
    guard: &GuardedService,
    texts: Vec<String>,
    batch_size: usize,
    concurrency: usize,
) -> Vec<EmbedOutcome> {
    let batch_size = batch_size.max(1);
    let total = texts.len();

    let batches: Vec<(usize, Vec<String>)> = texts
        .chunks(batch_size)
        .enumerate()
        .map(|(i, batch)| (i * batch_size, batch.to_vec()))
        .collect();

    let mut outcomes: Vec<EmbedOutcome> = vec![EmbedOutcome::Pending; total];

    let mut results = stream::iter(batches)
        .map(|(start, batch)| async move {
            let len = batch.len();
            let result = guard.run(|| embedder.embed(batch.clone())).await;
            (start, len, result)
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((start, len, result)) = results.next().await {
        match result {
            Ok(vectors) => {
                for (i, vector) in vectors.into_iter().enumerate().take(len) {
                    outcomes[start + i] = EmbedOutcome::Embedded(vector);
                }
            }
            Err(err) => {
                warn!(start, len, error = %err, "Embedding batch failed; marking pending");
            }
        }
    }

    outcomes
}
