//! Store-facing seams consumed by the retriever.
//!
//! The concrete implementations live in spotlore-graph; tests inject
//! in-memory fakes so retrieval behavior stays hermetically testable.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    AttractionDetail, GraphHit, SpotClusterSummary, SpotKey, SpotRef, Subgraph,
};

/// Read-side graph lookups used during hybrid retrieval.
#[async_trait]
pub trait GraphSearch: Send + Sync {
    /// Outgoing relations for a single entity name.
    async fn search_one(
        &self,
        entity_name: &str,
        relation_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GraphHit>>;

    /// Batched traversal over up to 10 names in one round trip. Hits are
    /// tagged with the originating name.
    async fn search_many(
        &self,
        entity_names: &[String],
        relation_type: Option<&str>,
        per_entity_limit: usize,
    ) -> Result<Vec<GraphHit>>;

    /// Neighborhood expansion around up to 3 entities, depth clamped to
    /// [1, 3], at most 50 rows.
    async fn subgraph(&self, entity_names: &[String], depth: u8) -> Result<Subgraph>;
}

/// Cluster-level reads used for context expansion.
#[async_trait]
pub trait ClusterRead: Send + Sync {
    async fn spot_summary(&self, key: &SpotKey) -> Result<Option<SpotClusterSummary>>;

    async fn spot_by_name(&self, name: &str) -> Result<Option<SpotRef>>;

    /// Owning scenic spot of an attraction, via its belongs-to edge.
    async fn parent_spot(&self, attraction_id: i64) -> Result<Option<SpotRef>>;

    async fn attraction_detail(&self, attraction_id: i64) -> Result<Option<AttractionDetail>>;

    /// Stored prose for an uploaded text, if the Text node exists.
    async fn text_content(&self, text_id: &str) -> Result<Option<String>>;

    /// Attraction described by a text, if any.
    async fn attraction_for_text(&self, text_id: &str) -> Result<Option<i64>>;
}
