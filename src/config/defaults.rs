//! Default values for configuration

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default collection name
pub fn default_collection_name() -> String {
    "syllabus_chunks".to_string()
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (must match model)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default embedding service URL
pub fn default_embedding_service_url() -> String {
    std::env::var("SYLLABUS_EMBEDDING_URL").unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default bounded concurrency for embedding-service calls
pub fn default_embedding_concurrency() -> usize {
    4
}

/// Default maximum attempts per embedding call (initial try + retries)
pub fn default_embedding_max_attempts() -> usize {
    5
}

/// Default base backoff delay in milliseconds (doubles per retry)
pub fn default_embedding_backoff_ms() -> u64 {
    200
}

/// Default consecutive-failure count that opens the circuit breaker
pub fn default_breaker_failure_threshold() -> usize {
    5
}

/// Default circuit-breaker cooldown in seconds
pub fn default_breaker_cooldown_secs() -> u64 {
    30
}

/// Default embedding request timeout in seconds
pub fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Default generative expansion service URL
pub fn default_expansion_service_url() -> String {
    std::env::var("SYLLABUS_EXPANSION_URL").unwrap_or_else(|_| "http://127.0.0.1:8998".to_string())
}

/// Default number of expansion sentences when expansion is requested
pub fn default_expansion_sentences() -> usize {
    5
}

/// Default expansion request timeout in seconds
pub fn default_expansion_timeout_secs() -> u64 {
    20
}

/// Default minimum words per chunk
pub fn default_chunk_min_words() -> usize {
    50
}

/// Default maximum words per chunk
pub fn default_chunk_max_words() -> usize {
    500
}

/// Default minimum words for a section to stand on its own
pub fn default_min_section_words() -> usize {
    30
}

/// Default number of search results
pub fn default_search_limit() -> usize {
    20
}

/// Default maximum search results
pub fn default_search_max_limit() -> usize {
    100
}

/// Default minimum similarity score for search candidates
pub fn default_search_min_score() -> f32 {
    0.65
}

/// Default quality floor below which chunks are excluded from ranking
pub fn default_quality_floor() -> f64 {
    0.35
}

/// Default additive boost per overlapping concept tag
pub fn default_concept_boost() -> f32 {
    0.05
}

/// Default cap on the total concept boost
pub fn default_concept_boost_cap() -> f32 {
    0.15
}

/// Default multiplicative penalty for chunks below the quality floor
pub fn default_low_quality_penalty() -> f32 {
    0.5
}

/// Default top-K cap on SIMILAR_TO edges per chunk
pub fn default_similar_top_k() -> usize {
    20
}

/// Default reading speed for time estimates (words per minute)
pub fn default_reading_wpm() -> f64 {
    200.0
}

/// Default time multiplier for exercise chunks
pub fn default_exercise_multiplier() -> f64 {
    1.5
}

/// Default minimum hours attributed to one path segment
pub fn default_min_segment_hours() -> f64 {
    0.1
}
