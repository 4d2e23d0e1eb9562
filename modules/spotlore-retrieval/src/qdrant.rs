//! Qdrant-backed implementation of the `VectorIndex` contract.

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, CreateCollectionBuilder,
    DeletePointsBuilder, Distance, Filter, PointStruct, Query, QueryPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::info;

use crate::vector::{LoadState, SearchHit, VectorError, VectorFilter, VectorIndex, VectorRecord};

pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    pub fn connect(url: &str) -> Result<Self, VectorError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    fn map_err(collection: &str, e: qdrant_client::QdrantError) -> VectorError {
        let text = e.to_string();
        if text.contains("doesn't exist") || text.contains("Not found") {
            VectorError::MissingCollection(collection.to_string())
        } else {
            VectorError::Connection(text)
        }
    }

    fn filter_for(filter: &VectorFilter) -> Filter {
        match filter {
            VectorFilter::TextId(text_id) => {
                Filter::must([Condition::matches("text_id", text_id.clone())])
            }
            VectorFilter::AttractionId(id) => {
                Filter::must([Condition::matches("attraction_id", *id)])
            }
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn create_or_get(&self, collection: &str, dim: u64) -> Result<(), VectorError> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| Self::map_err(collection, e))?;
        if exists {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection.to_string())
                    .vectors_config(VectorParamsBuilder::new(dim, Distance::Cosine)),
            )
            .await
            .map_err(|e| Self::map_err(collection, e))?;
        info!(collection, dim, "created vector collection");
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), VectorError> {
        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|r| {
                let mut payload = Payload::new();
                payload.insert("text_id", r.text_id);
                match r.attraction_id {
                    Some(id) => payload.insert("attraction_id", id),
                    None => payload.insert("attraction_id", serde_json::Value::Null),
                }
                PointStruct::new(r.id, r.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection.to_string(), points).wait(true))
            .await
            .map_err(|e| Self::map_err(collection, e))?;
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &VectorFilter) -> Result<(), VectorError> {
        let delete = DeletePointsBuilder::new(collection.to_string())
            .points(Self::filter_for(filter))
            .wait(true);
        match self.client.delete_points(delete).await {
            Ok(_) => Ok(()),
            // Deleting from a missing collection means there is nothing to
            // delete; the next upsert recreates it.
            Err(e) => match Self::map_err(collection, e) {
                VectorError::MissingCollection(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, VectorError> {
        let response = self
            .client
            .query(
                QueryPointsBuilder::new(collection.to_string())
                    .query(Query::new_nearest(vector))
                    .limit(top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| Self::map_err(collection, e))?;

        let hits = response
            .result
            .into_iter()
            .map(|point| {
                let id = point
                    .id
                    .as_ref()
                    .and_then(|pid| match &pid.point_id_options {
                        Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
                        Some(PointIdOptions::Num(n)) => Some(n.to_string()),
                        None => None,
                    })
                    .unwrap_or_default();
                let text_id = match point.payload.get("text_id").and_then(|v| v.kind.as_ref()) {
                    Some(Kind::StringValue(text)) => text.clone(),
                    _ => String::new(),
                };
                let attraction_id =
                    match point.payload.get("attraction_id").and_then(|v| v.kind.as_ref()) {
                        Some(Kind::IntegerValue(n)) => Some(*n),
                        _ => None,
                    };
                // Qdrant reports cosine similarity; convert to a distance so
                // scoring stays uniform across index backends.
                let distance = 1.0 - point.score;
                SearchHit::new(id, text_id, attraction_id, distance)
            })
            .collect();
        Ok(hits)
    }

    async fn load(&self, _collection: &str) -> Result<(), VectorError> {
        // Qdrant serves collections without an explicit load step; readiness
        // is reflected in collection status instead.
        Ok(())
    }

    async fn load_state(&self, collection: &str) -> Result<LoadState, VectorError> {
        let response = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| Self::map_err(collection, e))?;
        let loaded = response
            .result
            .map(|info| {
                use qdrant_client::qdrant::CollectionStatus;
                matches!(
                    info.status(),
                    CollectionStatus::Green | CollectionStatus::Yellow
                )
            })
            .unwrap_or(false);
        Ok(if loaded {
            LoadState::Loaded
        } else {
            LoadState::NotLoaded
        })
    }
}
