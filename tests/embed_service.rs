//! Embedding and expansion service tests against a mock HTTP server

use std::time::Duration;
use syllabus::config::{EmbeddingConfig, ExpansionConfig};
use syllabus::embed::{
    embed_guarded, BreakerState, CircuitBreaker, Embedder, GuardedService, HttpEmbedder,
    RetryPolicy,
};
use syllabus::error::Error;
use syllabus::expand::{HttpExpander, QueryExpander};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn embedding_config(url: &str, dimension: usize) -> EmbeddingConfig {
    EmbeddingConfig {
        service_url: url.to_string(),
        dimension,
        ..EmbeddingConfig::default()
    }
}

fn fast_guard(max_attempts: usize, threshold: usize) -> GuardedService {
    GuardedService::new(
        CircuitBreaker::new(threshold, Duration::from_secs(60)),
        RetryPolicy::new(max_attempts, Duration::from_millis(1)),
    )
}

#[tokio::test]
async fn embeds_a_batch_against_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embed/text"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
        })))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(&embedding_config(&server.uri(), 3)).unwrap();
    let vectors = embedder
        .embed(vec!["first".into(), "second".into()])
        .await
        .unwrap();

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn accepts_openai_style_data_responses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embed/text"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"embedding": [1.0, 2.0]}]
        })))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(&embedding_config(&server.uri(), 2)).unwrap();
    let vectors = embedder.embed(vec!["only".into()]).await.unwrap();
    assert_eq!(vectors, vec![vec![1.0, 2.0]]);
}

#[tokio::test]
async fn rejects_vectors_of_the_wrong_dimension() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embed/text"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2]]
        })))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(&embedding_config(&server.uri(), 384)).unwrap();
    let err = embedder.embed(vec!["text".into()]).await.unwrap_err();

    match err {
        Error::DimensionMismatch { expected, got } => {
            assert_eq!(expected, 384);
            assert_eq!(got, 2);
        }
        other => panic!("expected dimension mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn rejects_count_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embed/text"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2, 0.3]]
        })))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(&embedding_config(&server.uri(), 3)).unwrap();
    let err = embedder
        .embed(vec!["one".into(), "two".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
}

#[tokio::test]
async fn outage_exhausts_retries_and_opens_the_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embed/text"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(&embedding_config(&server.uri(), 3)).unwrap();
    // 3 attempts per call, breaker trips at 3 consecutive failures
    let guard = fast_guard(3, 3);

    let err = guard
        .run(|| embedder.embed(vec!["text".into()]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    assert_eq!(guard.breaker_state(), BreakerState::Open);

    // While open the service is not called at all
    let err = guard
        .run(|| embedder.embed(vec!["more".into()]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable(_)));
}

#[tokio::test]
async fn outage_marks_chunks_pending_instead_of_failing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embed/text"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(&embedding_config(&server.uri(), 3)).unwrap();
    let guard = fast_guard(2, 100);

    let outcomes = embed_guarded(
        &embedder,
        &guard,
        vec!["a".into(), "b".into(), "c".into()],
        2,
        2,
    )
    .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_pending()));
}

#[tokio::test]
async fn expander_returns_sentences() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/expand"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sentences": [
                "Quick sort is a divide and conquer sorting algorithm.",
                "It partitions elements around a pivot value.",
                "Average time complexity is O(n log n)."
            ]
        })))
        .mount(&server)
        .await;

    let expander = HttpExpander::new(&ExpansionConfig {
        service_url: server.uri(),
        ..ExpansionConfig::default()
    })
    .unwrap();

    let sentences = expander.expand("quick sort", 3).await.unwrap();
    assert_eq!(sentences.len(), 3);
    assert!(sentences[0].contains("divide and conquer"));
}

#[tokio::test]
async fn expander_failure_is_a_query_expansion_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/expand"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let expander = HttpExpander::new(&ExpansionConfig {
        service_url: server.uri(),
        ..ExpansionConfig::default()
    })
    .unwrap();

    let err = expander.expand("anything", 5).await.unwrap_err();
    assert!(matches!(err, Error::QueryExpansion(_)));
}
