//! Wires the concrete stores and model clients into a retrieval service.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use llm_client::OpenAi;
use spotlore_common::{Config, SpotKey, SpotloreError};
use spotlore_graph::{BuildReport, ClusterBuilder, ClusterReader, GraphClient, GraphSearcher};

use crate::answer::AnswerOrchestrator;
use crate::entity::EntityExtractor;
use crate::qdrant::QdrantIndex;
use crate::retriever::HybridRetriever;
use crate::session::{ConversationStore, InMemoryConversationStore};
use crate::vector::{VectorFilter, VectorSearchClient};

/// Fully wired service: retriever, answer orchestrator, cluster builder,
/// and session store, each behind the seams tests fake out.
pub struct SpotloreService {
    pub retriever: Arc<HybridRetriever>,
    pub orchestrator: AnswerOrchestrator,
    pub cluster_builder: ClusterBuilder,
    pub sessions: Arc<dyn ConversationStore>,
    pub vector: Arc<VectorSearchClient>,
    pub vector_collection: String,
}

impl SpotloreService {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let graph_client =
            GraphClient::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
                .await
                .map_err(|e| SpotloreError::Graph(e.to_string()))?;

        let index = Arc::new(
            QdrantIndex::connect(&config.qdrant_url)
                .map_err(|e| SpotloreError::VectorIndex(e.to_string()))?,
        );
        let embedder = Arc::new(
            OpenAi::new(&config.embedding_api_key, &config.llm_model)
                .with_base_url(&config.embedding_base_url)
                .with_embedding_model(&config.embedding_model),
        );
        let vector = Arc::new(VectorSearchClient::new(index, embedder, config.vector_dim));

        let searcher = Arc::new(GraphSearcher::new(graph_client.clone()));
        let reader = Arc::new(ClusterReader::new(graph_client.clone()));

        let retriever = Arc::new(HybridRetriever::new(
            Arc::clone(&vector),
            searcher,
            reader,
            EntityExtractor::new(None),
            config.vector_collection.clone(),
        ));

        let model = Arc::new(
            OpenAi::new(&config.llm_api_key, &config.llm_model)
                .with_base_url(&config.llm_base_url),
        );
        let orchestrator = AnswerOrchestrator::new(
            Arc::clone(&retriever),
            model,
            config.audit_log_path.clone(),
        );

        info!(
            collection = %config.vector_collection,
            "retrieval service wired"
        );

        Ok(Self {
            retriever,
            orchestrator,
            cluster_builder: ClusterBuilder::new(graph_client),
            sessions: Arc::new(InMemoryConversationStore::new()),
            vector,
            vector_collection: config.vector_collection.clone(),
        })
    }

    /// Remove an attraction from both stores: vector entries first (payload
    /// filter plus the synthetic key), then the graph cluster cascade.
    pub async fn cascade_delete_attraction(&self, attraction_id: i64) -> BuildReport {
        let mut report = BuildReport::new(format!("cascade:attraction:{attraction_id}"));

        let filters = [
            VectorFilter::AttractionId(attraction_id),
            VectorFilter::TextId(format!("attraction:{attraction_id}")),
        ];
        for filter in filters {
            match self
                .vector
                .delete_entries(&self.vector_collection, &filter)
                .await
            {
                Ok(()) => report.ok("purge_vector_entries"),
                Err(e) => report.fail("purge_vector_entries", e),
            }
        }

        let graph = self.cluster_builder.delete_attraction_cluster(attraction_id).await;
        report.steps.extend(graph.steps);
        report
    }

    /// Remove a scenic spot from both stores. The describing text ids are
    /// collected up front so their vector entries can be purged before the
    /// graph cascade takes the Text nodes with it.
    pub async fn cascade_delete_spot(&self, key: &SpotKey) -> BuildReport {
        let mut report = BuildReport::new(format!("cascade:{key}"));

        match self.cluster_builder.describing_text_ids(key).await {
            Ok(text_ids) => {
                report.ok("collect_text_ids");
                for text_id in text_ids {
                    match self
                        .vector
                        .delete_entries(&self.vector_collection, &VectorFilter::TextId(text_id))
                        .await
                    {
                        Ok(()) => report.ok("purge_vector_entries"),
                        Err(e) => report.fail("purge_vector_entries", e),
                    }
                }
            }
            Err(e) => report.fail("collect_text_ids", e),
        }

        let graph = self.cluster_builder.delete_spot_cluster(key).await;
        report.steps.extend(graph.steps);
        report
    }
}
