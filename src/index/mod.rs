//! Semantic index over chunk vectors, backed by Qdrant.
//!
//! One point per embedded chunk, carrying a [`ChunkPayload`] so search can
//! filter and re-rank without touching SQLite. Pending chunks have no point
//! and therefore cannot surface in search. The handle checks vector
//! dimensions on every write and at collection setup, so a model swap is
//! caught before it poisons the collection.

mod payload;

pub use payload::*;

use crate::config::Config;
use crate::error::{Error, Result};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, Range, ScalarQuantizationBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// A vector point ready for upsert
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkPoint {
    fn to_point_struct(&self) -> Result<PointStruct> {
        let value = serde_json::to_value(&self.payload)?;
        let payload = Payload::try_from(value)
            .map_err(|e| Error::Qdrant(format!("Payload conversion failed: {}", e)))?;
        Ok(PointStruct::new(self.id.to_string(), self.vector.clone(), payload))
    }
}

/// A scored hit from vector search
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub point_id: String,
    pub score: f32,
    pub payload: Option<ChunkPayload>,
}

/// Filter options applied inside Qdrant before scoring
#[derive(Debug, Clone, Default)]
pub struct IndexFilter {
    pub subject: Option<String>,
    pub document_id: Option<String>,
    pub content_type: Option<String>,
    /// Inclusive difficulty window
    pub difficulty_min: Option<f64>,
    pub difficulty_max: Option<f64>,
}

impl IndexFilter {
    fn to_qdrant_filter(&self) -> Option<Filter> {
        let mut must: Vec<Condition> = Vec::new();

        if let Some(ref subject) = self.subject {
            must.push(Condition::matches("subject", subject.clone()));
        }
        if let Some(ref document_id) = self.document_id {
            must.push(Condition::matches("document_id", document_id.clone()));
        }
        if let Some(ref content_type) = self.content_type {
            must.push(Condition::matches("content_type", content_type.clone()));
        }
        if self.difficulty_min.is_some() || self.difficulty_max.is_some() {
            must.push(Condition::range(
                "difficulty",
                Range {
                    gte: self.difficulty_min,
                    lte: self.difficulty_max,
                    gt: None,
                    lt: None,
                },
            ));
        }

        if must.is_empty() {
            return None;
        }

        Some(Filter {
            must,
            should: vec![],
            must_not: vec![],
            min_should: None,
        })
    }
}

/// Collection statistics
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub collection: String,
    pub points_count: usize,
}

/// Qdrant index handle
pub struct VectorIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl VectorIndex {
    /// Open a handle from the configured URL, collection, and dimension
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            &config.collection_name,
            config.embedding.dimension,
        )
        .await
    }

    /// Build a handle for an explicit URL and collection.
    ///
    /// The client is lazy; nothing touches the network until the first call.
    pub async fn new(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        debug!(url, "initializing Qdrant client");

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Ensure the collection exists with the configured vector size.
    ///
    /// An existing collection with a different size is an error, not a
    /// silent mismatch: vectors from a different model must not mix.
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self.client.collection_exists(&self.collection).await?;

        if exists {
            debug!(collection = %self.collection, "collection present, verifying vector size");

            if let Some(size) = self.collection_vector_size().await? {
                if size != self.dimension {
                    return Err(Error::DimensionMismatch {
                        expected: self.dimension,
                        got: size,
                    });
                }
            }
            return Ok(());
        }

        info!(
            collection = %self.collection,
            dimension = self.dimension,
            "creating collection"
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(
                        self.dimension as u64,
                        Distance::Cosine,
                    ))
                    .quantization_config(ScalarQuantizationBuilder::default()),
            )
            .await?;

        info!(collection = %self.collection, "collection created");
        Ok(())
    }

    pub async fn collection_exists(&self) -> Result<bool> {
        let exists = self.client.collection_exists(&self.collection).await?;
        Ok(exists)
    }

    /// Upsert chunk points, validating every vector's dimension first
    pub async fn upsert_points(&self, points: Vec<ChunkPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: mismatch.vector.len(),
            });
        }

        debug!(
            count = points.len(),
            collection = %self.collection,
            "upserting chunk points"
        );

        let point_structs: Vec<PointStruct> = points
            .iter()
            .map(|p| p.to_point_struct())
            .collect::<Result<_>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs))
            .await?;

        Ok(())
    }

    /// Drop the points for chunks that no longer exist in the graph
    pub async fn delete_points(&self, point_ids: &[Uuid]) -> Result<()> {
        if point_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<PointId> = point_ids
            .iter()
            .map(|id| PointId::from(id.to_string()))
            .collect();

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(ids))
            .await?;

        Ok(())
    }

    /// Nearest-neighbor search, with metadata filtering pushed into Qdrant
    pub async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        filter: Option<IndexFilter>,
    ) -> Result<Vec<VectorHit>> {
        if query_vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: query_vector.len(),
            });
        }

        debug!(collection = %self.collection, limit, "running vector search");

        let mut builder = SearchPointsBuilder::new(&self.collection, query_vector, limit as u64)
            .with_payload(true);

        if let Some(f) = filter {
            if let Some(qdrant_filter) = f.to_qdrant_filter() {
                builder = builder.filter(qdrant_filter);
            }
        }

        let response = self.client.search_points(builder).await?;

        let hits = response
            .result
            .into_iter()
            .map(|p| {
                let map: serde_json::Map<String, Value> = p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect();
                VectorHit {
                    point_id: point_id_to_string(p.id),
                    score: p.score,
                    payload: ChunkPayload::from_json_map(map),
                }
            })
            .collect();

        Ok(hits)
    }

    pub async fn get_stats(&self) -> Result<IndexStats> {
        let info = self.client.collection_info(&self.collection).await?;

        let points_count = info
            .result
            .map(|r| r.points_count.unwrap_or(0))
            .unwrap_or(0);

        Ok(IndexStats {
            collection: self.collection.clone(),
            points_count: points_count as usize,
        })
    }

    async fn collection_vector_size(&self) -> Result<Option<usize>> {
        use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;

        let info = self.client.collection_info(&self.collection).await?;
        let size = info
            .result
            .as_ref()
            .and_then(|r| r.config.as_ref())
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .and_then(|c| match c {
                VectorsConfig::Params(params) => Some(params.size as usize),
                VectorsConfig::ParamsMap(_) => None,
            });
        Ok(size)
    }
}

/// Flatten a point id (uuid or numeric) into its textual form
fn point_id_to_string(id: Option<PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;

    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// Rebuild a `serde_json` value from Qdrant's protobuf value kinds
fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builds_difficulty_range() {
        let filter = IndexFilter {
            subject: Some("mathematics".to_string()),
            difficulty_min: Some(0.2),
            difficulty_max: Some(0.7),
            ..Default::default()
        };

        let qdrant_filter = filter.to_qdrant_filter().expect("filter should build");
        assert_eq!(qdrant_filter.must.len(), 2);
    }

    #[test]
    fn test_empty_filter_builds_nothing() {
        assert!(IndexFilter::default().to_qdrant_filter().is_none());
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_mismatch() {
        let index = VectorIndex::new("http://127.0.0.1:6334", "test_collection", 3)
            .await
            .expect("index should initialize");

        let point = ChunkPoint {
            id: Uuid::new_v4(),
            vector: vec![0.1, 0.2],
            payload: ChunkPayload {
                chunk_id: "c1".into(),
                document_id: "d1".into(),
                chapter_id: "ch1".into(),
                section_id: "s1".into(),
                subject: "test".into(),
                content_type: "narrative".into(),
                difficulty: 0.5,
                quality: 0.5,
                concepts: vec![],
                page_start: 1,
                page_end: 1,
                word_count: 10,
                created_at: "2025-01-01T00:00:00Z".into(),
            },
        };

        let err = index
            .upsert_points(vec![point])
            .await
            .expect_err("should reject mismatched vector length");

        match err {
            Error::DimensionMismatch { expected, got } => {
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("expected dimension mismatch, got {other:?}"),
        }
    }
}
