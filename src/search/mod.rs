//! Retrieval engine: query expansion, vector search, and re-ranking
//!
//! The vector index proposes candidates; re-ranking is pure and happens
//! here, so its behavior is testable without Qdrant. Expansion failure
//! degrades to the raw query; embedding failure degrades to an empty result
//! set, never an error.

use crate::config::Config;
use crate::embed::{Embedder, GuardedService};
use crate::error::Result;
use crate::expand::QueryExpander;
use crate::index::{ChunkPayload, IndexFilter, VectorIndex};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// How the final query embedding was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// Raw query embedded directly, by request
    Direct,
    /// Query expanded into descriptive sentences before embedding
    Expanded,
    /// A degraded path was taken: expansion failed (raw query used) or
    /// embedding was unavailable (no candidates retrieved)
    Fallback,
}

impl std::fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMethod::Direct => write!(f, "direct"),
            SearchMethod::Expanded => write!(f, "expanded"),
            SearchMethod::Fallback => write!(f, "fallback"),
        }
    }
}

/// Search request options
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_score: f32,
    pub expand: bool,
    /// Keep below-floor chunks in the ranking (penalized) instead of
    /// dropping them
    pub include_low_quality: bool,
    pub subject: Option<String>,
    pub document_id: Option<String>,
    pub content_type: Option<String>,
    pub difficulty_min: Option<f64>,
    pub difficulty_max: Option<f64>,
}

impl SearchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.search.default_limit,
            min_score: config.search.min_score,
            expand: true,
            include_low_quality: false,
            subject: None,
            document_id: None,
            content_type: None,
            difficulty_min: None,
            difficulty_max: None,
        }
    }
}

/// A re-ranked search hit
#[derive(Debug, Clone, Serialize)]
pub struct RankedHit {
    pub chunk_id: String,
    pub point_id: String,
    /// Similarity score after boosts and penalties
    pub score: f32,
    /// Raw vector similarity before adjustment
    pub raw_score: f32,
    pub content_type: String,
    pub difficulty: f64,
    pub quality: f64,
    pub concepts: Vec<String>,
    pub document_id: String,
    pub page_start: i32,
    pub page_end: i32,
}

/// Final search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub method: SearchMethod,
    /// Expanded text when expansion ran, for transparency
    pub expanded: Option<String>,
    pub results: Vec<RankedHit>,
}

/// Side-by-side expanded vs. direct retrieval, for evaluating expansion
#[derive(Debug, Clone, Serialize)]
pub struct CompareOutcome {
    pub expanded: SearchOutcome,
    pub direct: SearchOutcome,
    /// Chunk ids present in expanded results but not direct
    pub only_expanded: Vec<String>,
    /// Chunk ids present in direct results but not expanded
    pub only_direct: Vec<String>,
}

/// Knobs for the pure re-ranking stage
#[derive(Debug, Clone, Copy)]
pub struct RankWeights {
    pub concept_boost: f32,
    pub concept_boost_cap: f32,
    pub quality_floor: f64,
    pub low_quality_penalty: f32,
}

impl RankWeights {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concept_boost: config.search.concept_boost,
            concept_boost_cap: config.search.concept_boost_cap,
            quality_floor: config.search.quality_floor,
            low_quality_penalty: config.search.low_quality_penalty,
        }
    }
}

/// Retrieval engine tying expansion, embedding, the index, and re-ranking
pub struct SearchEngine<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn Embedder,
    guard: &'a GuardedService,
    expander: Option<&'a dyn QueryExpander>,
    weights: RankWeights,
    expansion_sentences: usize,
    /// Candidate multiplier: fetch more than `limit` so re-ranking has room
    overfetch: usize,
}

impl<'a> SearchEngine<'a> {
    pub fn new(
        config: &Config,
        index: &'a VectorIndex,
        embedder: &'a dyn Embedder,
        guard: &'a GuardedService,
        expander: Option<&'a dyn QueryExpander>,
    ) -> Self {
        Self {
            index,
            embedder,
            guard,
            expander,
            weights: RankWeights::from_config(config),
            expansion_sentences: config.expansion.default_sentences,
            overfetch: 3,
        }
    }

    /// Run a search end to end
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchOutcome> {
        let (text, method, expanded) = self.expand_query(query, options).await;

        let vector = match self
            .guard
            .run(|| self.embedder.embed(vec![text.clone()]))
            .await
        {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => {
                warn!("Embedding service returned no vector for query");
                return Ok(empty_outcome(query));
            }
            Err(err) => {
                warn!(error = %err, "Query embedding unavailable; returning empty results");
                return Ok(empty_outcome(query));
            }
        };

        let filter = IndexFilter {
            subject: options.subject.clone(),
            document_id: options.document_id.clone(),
            content_type: options.content_type.clone(),
            difficulty_min: options.difficulty_min,
            difficulty_max: options.difficulty_max,
        };

        let candidates = self
            .index
            .search(vector, options.limit * self.overfetch, Some(filter))
            .await?;

        debug!(
            candidates = candidates.len(),
            method = %method,
            "Re-ranking candidates"
        );

        let hits: Vec<(f32, ChunkPayload, String)> = candidates
            .into_iter()
            .filter_map(|hit| hit.payload.map(|p| (hit.score, p, hit.point_id)))
            .collect();

        let results = rerank(query, hits, options, &self.weights);

        Ok(SearchOutcome {
            query: query.to_string(),
            method,
            expanded,
            results,
        })
    }

    /// Run expanded and direct retrieval side by side
    pub async fn compare(&self, query: &str, options: &SearchOptions) -> Result<CompareOutcome> {
        let expanded_opts = SearchOptions {
            expand: true,
            ..options.clone()
        };
        let direct_opts = SearchOptions {
            expand: false,
            ..options.clone()
        };

        let expanded = self.search(query, &expanded_opts).await?;
        let direct = self.search(query, &direct_opts).await?;

        let expanded_ids: HashSet<&str> =
            expanded.results.iter().map(|r| r.chunk_id.as_str()).collect();
        let direct_ids: HashSet<&str> =
            direct.results.iter().map(|r| r.chunk_id.as_str()).collect();

        let only_expanded = expanded
            .results
            .iter()
            .filter(|r| !direct_ids.contains(r.chunk_id.as_str()))
            .map(|r| r.chunk_id.clone())
            .collect();
        let only_direct = direct
            .results
            .iter()
            .filter(|r| !expanded_ids.contains(r.chunk_id.as_str()))
            .map(|r| r.chunk_id.clone())
            .collect();

        Ok(CompareOutcome {
            expanded,
            direct,
            only_expanded,
            only_direct,
        })
    }

    /// Expand the query if requested; failure falls back to the raw query
    async fn expand_query(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> (String, SearchMethod, Option<String>) {
        if !options.expand {
            return (query.to_string(), SearchMethod::Direct, None);
        }
        let Some(expander) = self.expander else {
            return (query.to_string(), SearchMethod::Direct, None);
        };

        match expander.expand(query, self.expansion_sentences).await {
            Ok(sentences) => {
                // The raw query stays in the embedded text so a drifting
                // expansion cannot pull retrieval away from the user's terms
                let combined = format!("{} {}", query, sentences.join(" "));
                (combined.clone(), SearchMethod::Expanded, Some(combined))
            }
            Err(err) => {
                warn!(error = %err, "Query expansion failed; falling back to the raw query");
                (query.to_string(), SearchMethod::Fallback, None)
            }
        }
    }
}

fn empty_outcome(query: &str) -> SearchOutcome {
    SearchOutcome {
        query: query.to_string(),
        method: SearchMethod::Fallback,
        expanded: None,
        results: Vec::new(),
    }
}

/// Pure re-ranking: quality floor, concept boost, score floor, ordering.
///
/// Below-floor chunks are dropped by default; with `include_low_quality`
/// they stay in, carrying the multiplicative penalty instead.
///
/// Candidates arrive as (raw score, payload, point id). Ordering is
/// deterministic: adjusted score descending, then difficulty ascending, then
/// chunk id ascending.
pub fn rerank(
    query: &str,
    candidates: Vec<(f32, ChunkPayload, String)>,
    options: &SearchOptions,
    weights: &RankWeights,
) -> Vec<RankedHit> {
    let query_terms: HashSet<String> = query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    let mut hits: Vec<RankedHit> = candidates
        .into_iter()
        .filter(|(_, payload, _)| within_difficulty(payload.difficulty, options))
        .filter(|(_, payload, _)| {
            options.include_low_quality || payload.quality >= weights.quality_floor
        })
        .map(|(raw_score, payload, point_id)| {
            let boost = concept_boost(&query_terms, &payload.concepts, weights);
            let mut score = raw_score + boost;
            if payload.quality < weights.quality_floor {
                score *= weights.low_quality_penalty;
            }
            RankedHit {
                chunk_id: payload.chunk_id,
                point_id,
                score,
                raw_score,
                content_type: payload.content_type,
                difficulty: payload.difficulty,
                quality: payload.quality,
                concepts: payload.concepts,
                document_id: payload.document_id,
                page_start: payload.page_start,
                page_end: payload.page_end,
            }
        })
        .filter(|hit| hit.score >= options.min_score)
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.difficulty
                    .partial_cmp(&b.difficulty)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    hits.truncate(options.limit);
    hits
}

/// Additive boost per query term matching a concept tag, capped
fn concept_boost(query_terms: &HashSet<String>, concepts: &[String], weights: &RankWeights) -> f32 {
    let overlap = concepts
        .iter()
        .filter(|concept| {
            concept
                .to_lowercase()
                .split_whitespace()
                .any(|word| query_terms.contains(word))
        })
        .count();
    (overlap as f32 * weights.concept_boost).min(weights.concept_boost_cap)
}

fn within_difficulty(difficulty: f64, options: &SearchOptions) -> bool {
    if let Some(min) = options.difficulty_min {
        if difficulty < min {
            return false;
        }
    }
    if let Some(max) = options.difficulty_max {
        if difficulty > max {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{CircuitBreaker, RetryPolicy};
    use crate::error::Error;
    use async_trait::async_trait;
    use std::time::Duration;

    fn payload(chunk_id: &str, difficulty: f64, quality: f64, concepts: &[&str]) -> ChunkPayload {
        ChunkPayload {
            chunk_id: chunk_id.to_string(),
            document_id: "doc".into(),
            chapter_id: "ch".into(),
            section_id: "sec".into(),
            subject: "cs".into(),
            content_type: "narrative".into(),
            difficulty,
            quality,
            concepts: concepts.iter().map(|c| c.to_string()).collect(),
            page_start: 1,
            page_end: 1,
            word_count: 100,
            created_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    fn options(limit: usize, min_score: f32) -> SearchOptions {
        SearchOptions {
            limit,
            min_score,
            expand: false,
            include_low_quality: false,
            subject: None,
            document_id: None,
            content_type: None,
            difficulty_min: None,
            difficulty_max: None,
        }
    }

    fn weights() -> RankWeights {
        RankWeights {
            concept_boost: 0.05,
            concept_boost_cap: 0.15,
            quality_floor: 0.35,
            low_quality_penalty: 0.5,
        }
    }

    #[test]
    fn test_concept_overlap_boosts_score() {
        let candidates = vec![
            (0.70, payload("a", 0.5, 0.9, &[]), "pa".into()),
            (0.70, payload("b", 0.5, 0.9, &["Quick Sort"]), "pb".into()),
        ];
        let hits = rerank("quick sort pivots", candidates, &options(10, 0.0), &weights());
        assert_eq!(hits[0].chunk_id, "b");
        assert!(hits[0].score > hits[0].raw_score);
    }

    #[test]
    fn test_concept_boost_is_capped() {
        let many = ["Sort", "Pivot", "Partition", "Recursion", "Array"];
        let candidates = vec![(0.70, payload("a", 0.5, 0.9, &many), "pa".into())];
        let hits = rerank(
            "sort pivot partition recursion array",
            candidates,
            &options(10, 0.0),
            &weights(),
        );
        assert!((hits[0].score - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_low_quality_dropped_by_default() {
        let candidates = vec![
            (0.80, payload("low", 0.5, 0.2, &[]), "pl".into()),
            (0.50, payload("ok", 0.5, 0.9, &[]), "po".into()),
        ];
        let hits = rerank("anything", candidates, &options(10, 0.0), &weights());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "ok");
    }

    #[test]
    fn test_low_quality_opted_in_is_penalized() {
        let candidates = vec![
            (0.80, payload("low", 0.5, 0.2, &[]), "pl".into()),
            (0.50, payload("ok", 0.5, 0.9, &[]), "po".into()),
        ];
        let mut opts = options(10, 0.0);
        opts.include_low_quality = true;
        let hits = rerank("anything", candidates, &opts, &weights());
        // 0.80 * 0.5 = 0.40 < 0.50, so the higher-quality chunk still wins
        assert_eq!(hits[0].chunk_id, "ok");
        assert_eq!(hits[1].chunk_id, "low");
    }

    #[test]
    fn test_min_score_cut_applies_after_adjustment() {
        let candidates = vec![
            (0.70, payload("keep", 0.5, 0.9, &[]), "pk".into()),
            (0.70, payload("drop", 0.5, 0.1, &[]), "pd".into()),
        ];
        let mut opts = options(10, 0.65);
        opts.include_low_quality = true;
        let hits = rerank("anything", candidates, &opts, &weights());
        // 0.70 * 0.5 = 0.35 falls below the score floor
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "keep");
    }

    #[test]
    fn test_raising_min_score_never_adds_results() {
        let candidates: Vec<(f32, ChunkPayload, String)> = (0..20)
            .map(|i| {
                (
                    0.5 + (i as f32) * 0.02,
                    payload(&format!("c{i:02}"), 0.5, 0.9, &[]),
                    format!("p{i:02}"),
                )
            })
            .collect();

        let loose = rerank("q", candidates.clone(), &options(50, 0.5), &weights());
        let strict = rerank("q", candidates, &options(50, 0.8), &weights());

        assert!(strict.len() <= loose.len());
        let loose_ids: HashSet<_> = loose.iter().map(|h| h.chunk_id.clone()).collect();
        assert!(strict.iter().all(|h| loose_ids.contains(&h.chunk_id)));
    }

    #[test]
    fn test_difficulty_window_is_a_hard_exclusion() {
        let candidates = vec![
            (0.90, payload("hard", 0.9, 0.9, &[]), "ph".into()),
            (0.70, payload("mid", 0.5, 0.9, &[]), "pm".into()),
        ];
        let mut opts = options(10, 0.0);
        opts.difficulty_max = Some(0.6);
        let hits = rerank("anything", candidates, &opts, &weights());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "mid");
    }

    #[test]
    fn test_tie_break_difficulty_then_id() {
        let candidates = vec![
            (0.70, payload("bbb", 0.4, 0.9, &[]), "p1".into()),
            (0.70, payload("aaa", 0.4, 0.9, &[]), "p2".into()),
            (0.70, payload("ccc", 0.3, 0.9, &[]), "p3".into()),
        ];
        let hits = rerank("anything", candidates, &options(10, 0.0), &weights());
        assert_eq!(hits[0].chunk_id, "ccc"); // lowest difficulty first
        assert_eq!(hits[1].chunk_id, "aaa"); // then id ascending
        assert_eq!(hits[2].chunk_id, "bbb");
    }

    struct NullEmbedder;

    #[async_trait]
    impl Embedder for NullEmbedder {
        async fn embed(&self, texts: Vec<String>) -> crate::error::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "null-test-model"
        }
    }

    struct FailingExpander;

    #[async_trait]
    impl QueryExpander for FailingExpander {
        async fn expand(&self, _query: &str, _n: usize) -> crate::error::Result<Vec<String>> {
            Err(Error::QueryExpansion("expansion service down".to_string()))
        }
    }

    struct StubExpander;

    #[async_trait]
    impl QueryExpander for StubExpander {
        async fn expand(&self, _query: &str, _n: usize) -> crate::error::Result<Vec<String>> {
            Ok(vec![
                "A divide and conquer algorithm partitions around a pivot.".to_string(),
            ])
        }
    }

    fn guard() -> GuardedService {
        GuardedService::new(
            CircuitBreaker::new(5, Duration::from_secs(60)),
            RetryPolicy::new(1, Duration::from_millis(1)),
        )
    }

    async fn index() -> VectorIndex {
        VectorIndex::new("http://127.0.0.1:6334", "test_collection", 3)
            .await
            .expect("client should initialize without connecting")
    }

    #[tokio::test]
    async fn test_expansion_failure_labels_method_fallback() {
        let config = Config::default();
        let index = index().await;
        let embedder = NullEmbedder;
        let guard = guard();
        let expander = FailingExpander;
        let engine = SearchEngine::new(&config, &index, &embedder, &guard, Some(&expander));

        let mut opts = options(10, 0.0);
        opts.expand = true;
        let (text, method, expanded) = engine.expand_query("quick sort", &opts).await;

        assert_eq!(method, SearchMethod::Fallback);
        assert_eq!(text, "quick sort");
        assert!(expanded.is_none());
    }

    #[tokio::test]
    async fn test_skipping_expansion_stays_direct() {
        let config = Config::default();
        let index = index().await;
        let embedder = NullEmbedder;
        let guard = guard();
        let expander = FailingExpander;
        let engine = SearchEngine::new(&config, &index, &embedder, &guard, Some(&expander));

        // Deliberately-direct search is distinguishable from a failed expansion
        let (_, method, _) = engine.expand_query("quick sort", &options(10, 0.0)).await;
        assert_eq!(method, SearchMethod::Direct);
    }

    #[tokio::test]
    async fn test_expanded_text_keeps_the_raw_query() {
        let config = Config::default();
        let index = index().await;
        let embedder = NullEmbedder;
        let guard = guard();
        let expander = StubExpander;
        let engine = SearchEngine::new(&config, &index, &embedder, &guard, Some(&expander));

        let mut opts = options(10, 0.0);
        opts.expand = true;
        let (text, method, expanded) = engine.expand_query("quick sort", &opts).await;

        assert_eq!(method, SearchMethod::Expanded);
        assert!(text.starts_with("quick sort"));
        assert!(text.contains("divide and conquer"));
        assert_eq!(expanded.as_deref(), Some(text.as_str()));
    }

    #[test]
    fn test_limit_truncates_after_ranking() {
        let candidates: Vec<(f32, ChunkPayload, String)> = (0..10)
            .map(|i| {
                (
                    0.9 - (i as f32) * 0.01,
                    payload(&format!("c{i}"), 0.5, 0.9, &[]),
                    format!("p{i}"),
                )
            })
            .collect();
        let hits = rerank("q", candidates, &options(3, 0.0), &weights());
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk_id, "c0");
    }
}
