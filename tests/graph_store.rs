//! Graph store integration tests on in-memory SQLite

use syllabus::config::Config;
use syllabus::error::Error;
use syllabus::graph::GraphStore;
use syllabus::model::{
    Chapter, Chunk, ChunkMetadata, ChunkingStrategy, ConceptType, Document, Section,
};

async fn store() -> GraphStore {
    GraphStore::connect_memory().await.expect("in-memory store")
}

async fn seed_tree(store: &GraphStore) -> (Document, Chapter, Section) {
    let doc = Document::new(
        "Algorithms".into(),
        "computer science".into(),
        vec!["A. Author".into()],
        "en".into(),
    );
    store.insert_document(&doc).await.unwrap();

    let chapter = Chapter::new(doc.id.clone(), 1, "Sorting".into());
    store.insert_chapter(&chapter).await.unwrap();

    let section = Section::new(chapter.id.clone(), doc.id.clone(), "1.1".into(), "Quick Sort".into());
    store.insert_section(&section).await.unwrap();

    (doc, chapter, section)
}

fn chunk_under(section: &Section, text: &str) -> Chunk {
    Chunk::new(
        section.id.clone(),
        section.chapter_id.clone(),
        section.document_id.clone(),
        ChunkMetadata::Narrative,
        ChunkingStrategy::ContentAware,
        text.to_string(),
    )
}

#[tokio::test]
async fn file_backed_store_survives_reconnect() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut config = Config::default();
    config.paths.base_dir = temp.path().to_path_buf();
    config.paths.db_file = temp.path().join("graph.db");

    {
        let store = GraphStore::connect(&config).await.unwrap();
        let (doc, _, _) = seed_tree(&store).await;
        assert!(store.get_document(&doc.id).await.unwrap().is_some());
    }

    let reopened = GraphStore::connect(&config).await.unwrap();
    let stats = reopened.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.sections, 1);
}

#[tokio::test]
async fn chunk_insert_requires_existing_section() {
    let store = store().await;
    let (_, chapter, section) = seed_tree(&store).await;

    let mut orphan = chunk_under(&section, "orphan text");
    orphan.section_id = "no-such-section".into();
    orphan.chapter_id = chapter.id.clone();

    let err = store.insert_chunk(&orphan).await.unwrap_err();
    assert!(matches!(err, Error::SectionNotFound(_)));
    assert!(store.get_chunk(&orphan.id).await.unwrap().is_none());
}

#[tokio::test]
async fn chunk_insert_rejects_mismatched_ancestry() {
    let store = store().await;
    let (_, _, section) = seed_tree(&store).await;

    let mut wrong = chunk_under(&section, "wrong parent chain");
    wrong.chapter_id = "some-other-chapter".into();

    assert!(store.insert_chunk(&wrong).await.is_err());
}

#[tokio::test]
async fn pending_chunks_listed_until_marked_embedded() {
    let store = store().await;
    let (_, _, section) = seed_tree(&store).await;

    let chunk = chunk_under(&section, "text awaiting a vector");
    store.insert_chunk(&chunk).await.unwrap();

    let pending = store.list_pending_chunks().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, chunk.id);

    store
        .mark_embedded(&chunk.id, "BAAI/bge-small-en-v1.5")
        .await
        .unwrap();

    assert!(store.list_pending_chunks().await.unwrap().is_empty());
    let reloaded = store.get_chunk(&chunk.id).await.unwrap().unwrap();
    assert!(!reloaded.embedding_pending);
    assert_eq!(
        reloaded.embedding_model.as_deref(),
        Some("BAAI/bge-small-en-v1.5")
    );
}

#[tokio::test]
async fn concept_upsert_deduplicates_by_normalized_name() {
    let store = store().await;

    let first = store
        .upsert_concept("Quick Sort", ConceptType::Algorithm, "cs", 0.6)
        .await
        .unwrap();
    let second = store
        .upsert_concept("quick   sort", ConceptType::Algorithm, "cs", 0.6)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.reference_count, 2);

    // Same name in a different subject is a different concept
    let other = store
        .upsert_concept("Quick Sort", ConceptType::Algorithm, "math", 0.6)
        .await
        .unwrap();
    assert_ne!(first.id, other.id);
}

#[tokio::test]
async fn find_concept_normalizes_lookup() {
    let store = store().await;
    store
        .upsert_concept("Binary Search", ConceptType::Algorithm, "cs", 0.5)
        .await
        .unwrap();

    let found = store
        .find_concept("  binary   SEARCH ", Some("cs"))
        .await
        .unwrap();
    assert!(found.is_some());
    assert_eq!(found.unwrap().name, "Binary Search");
}

#[tokio::test]
async fn direct_cycle_rejected_and_graph_unchanged() {
    let store = store().await;
    let a = store
        .upsert_concept("A", ConceptType::Definition, "cs", 0.5)
        .await
        .unwrap();
    let b = store
        .upsert_concept("B", ConceptType::Definition, "cs", 0.5)
        .await
        .unwrap();

    store.add_requires_edge(&a.id, &b.id, 1.0).await.unwrap();

    let err = store.add_requires_edge(&b.id, &a.id, 1.0).await.unwrap_err();
    assert!(matches!(err, Error::CycleRejected { .. }));

    let edges = store.list_requires_edges().await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from_concept_id, a.id);
}

#[tokio::test]
async fn transitive_cycle_rejected() {
    let store = store().await;
    let a = store
        .upsert_concept("A", ConceptType::Definition, "cs", 0.5)
        .await
        .unwrap();
    let b = store
        .upsert_concept("B", ConceptType::Definition, "cs", 0.5)
        .await
        .unwrap();
    let c = store
        .upsert_concept("C", ConceptType::Definition, "cs", 0.5)
        .await
        .unwrap();

    store.add_requires_edge(&a.id, &b.id, 1.0).await.unwrap();
    store.add_requires_edge(&b.id, &c.id, 1.0).await.unwrap();

    let err = store.add_requires_edge(&c.id, &a.id, 1.0).await.unwrap_err();
    assert!(matches!(err, Error::CycleRejected { .. }));
    assert_eq!(store.list_requires_edges().await.unwrap().len(), 2);
}

#[tokio::test]
async fn self_loop_rejected() {
    let store = store().await;
    let a = store
        .upsert_concept("A", ConceptType::Definition, "cs", 0.5)
        .await
        .unwrap();
    assert!(matches!(
        store.add_requires_edge(&a.id, &a.id, 1.0).await.unwrap_err(),
        Error::CycleRejected { .. }
    ));
}

#[tokio::test]
async fn similar_edges_replaced_wholesale_and_capped() {
    let store = store().await;
    let (_, _, section) = seed_tree(&store).await;

    let source = chunk_under(&section, "source chunk");
    store.insert_chunk(&source).await.unwrap();

    let mut neighbor_ids = Vec::new();
    for i in 0..5 {
        let neighbor = chunk_under(&section, &format!("neighbor {i}"));
        store.insert_chunk(&neighbor).await.unwrap();
        neighbor_ids.push(neighbor.id);
    }

    let first: Vec<(String, f64)> = neighbor_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), 0.9 - i as f64 * 0.1))
        .collect();
    store
        .replace_similar_edges(&source.id, &first, 3)
        .await
        .unwrap();
    assert_eq!(store.list_similar_edges(&source.id).await.unwrap().len(), 3);

    // Replacement wipes the old set
    let second = vec![(neighbor_ids[4].clone(), 0.8)];
    store
        .replace_similar_edges(&source.id, &second, 3)
        .await
        .unwrap();
    let edges = store.list_similar_edges(&source.id).await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].0, neighbor_ids[4]);
}

#[tokio::test]
async fn mentions_feed_chunks_for_concept() {
    let store = store().await;
    let (_, _, section) = seed_tree(&store).await;

    let chunk = chunk_under(&section, "quick sort partitions around a pivot");
    store.insert_chunk(&chunk).await.unwrap();

    let concept = store
        .upsert_concept("Quick Sort", ConceptType::Algorithm, "cs", 0.6)
        .await
        .unwrap();
    store.add_mention(&chunk.id, &concept.id, 0.9).await.unwrap();

    let found = store.chunks_for_concept(&concept.id).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0.id, chunk.id);
    assert!((found[0].1 - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn stats_count_all_node_and_edge_kinds() {
    let store = store().await;
    let (_, _, section) = seed_tree(&store).await;
    let chunk = chunk_under(&section, "counted chunk");
    store.insert_chunk(&chunk).await.unwrap();
    store
        .upsert_concept("Arrays", ConceptType::Definition, "cs", 0.2)
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chapters, 1);
    assert_eq!(stats.sections, 1);
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.pending_chunks, 1);
    assert_eq!(stats.concepts, 1);
}
