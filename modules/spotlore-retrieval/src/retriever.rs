//! Intent-driven hybrid retrieval: vector search and graph lookups fused
//! into one context block.
//!
//! Every sub-lookup is best-effort. Failures land in the output's `errors`
//! map and never abort the overall call; the caller always gets whatever
//! partial context was assembled.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use spotlore_common::{ClusterRead, Entity, GraphSearch, SpotClusterSummary, Subgraph};

use crate::entity::{dedupe_by_surface, EntityExtractor};
use crate::intent::{QueryIntent, Strategy, DEFAULT_TOP_K};
use crate::vector::{degrade_to_empty, SearchHit, VectorSearchClient};

/// Prefix of synthetic `text_id`s that encode an attraction id directly
/// instead of pointing at stored prose.
const ATTRACTION_TEXT_PREFIX: &str = "attraction:";

/// At most this many top vector hits contribute stored prose to entity
/// extraction and context rendering.
const MAX_CONTENT_FETCHES: usize = 3;

/// At most this many entity names go into the batched graph lookup.
const MAX_GRAPH_NAMES: usize = 5;

/// At most this many entities seed the subgraph expansion.
const MAX_SUBGRAPH_SEEDS: usize = 3;

const PER_ENTITY_GRAPH_LIMIT: usize = 5;

/// One vector hit plus its stored prose when it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredText {
    pub hit: SearchHit,
    pub content: Option<String>,
}

/// Everything a retrieval produced, fused and structured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutput {
    pub intent: QueryIntent,
    pub strategy: Strategy,
    pub vector_results: Vec<ScoredText>,
    pub graph_results: Vec<spotlore_common::GraphHit>,
    pub subgraph: Subgraph,
    pub entities: Vec<Entity>,
    pub enhanced_context: String,
    pub attraction_ids: Vec<i64>,
    pub primary_attraction_id: Option<i64>,
    /// Sub-operation name to failure reason. Observability only; partial
    /// results are always returned.
    pub errors: HashMap<String, String>,
}

pub struct HybridRetriever {
    vector: Arc<VectorSearchClient>,
    graph: Arc<dyn GraphSearch>,
    clusters: Arc<dyn ClusterRead>,
    extractor: EntityExtractor,
    collection: String,
}

impl HybridRetriever {
    pub fn new(
        vector: Arc<VectorSearchClient>,
        graph: Arc<dyn GraphSearch>,
        clusters: Arc<dyn ClusterRead>,
        extractor: EntityExtractor,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            vector,
            graph,
            clusters,
            extractor,
            collection: collection.into(),
        }
    }

    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> RetrievalOutput {
        let intent = QueryIntent::classify(query);
        let strategy = intent.strategy();
        // An explicit override equal to the default means the caller did not
        // actually tune anything; the strategy's own top_k wins.
        let effective_top_k = match top_k {
            Some(k) if k != DEFAULT_TOP_K => k,
            _ => strategy.top_k,
        };
        debug!(intent = intent.as_str(), top_k = effective_top_k, "retrieval started");

        let mut errors: HashMap<String, String> = HashMap::new();

        // Vector search, degraded to empty on failure.
        let raw_hits = degrade_to_empty(
            self.vector
                .search(query, &self.collection, effective_top_k)
                .await,
            "vector_search",
            &mut errors,
        );
        let hits = filter_hits(raw_hits, strategy.relevance_threshold, strategy.force_at_least_one);

        // Stored prose for the top non-synthetic hits.
        let mut vector_results: Vec<ScoredText> = hits
            .into_iter()
            .map(|hit| ScoredText { hit, content: None })
            .collect();
        let mut fetched = 0usize;
        for result in vector_results.iter_mut() {
            if fetched >= MAX_CONTENT_FETCHES {
                break;
            }
            if result.hit.text_id.starts_with(ATTRACTION_TEXT_PREFIX)
                || result.hit.text_id.is_empty()
            {
                continue;
            }
            match self.clusters.text_content(&result.hit.text_id).await {
                Ok(content) => result.content = content,
                Err(e) => {
                    errors.insert(format!("text_fetch:{}", result.hit.text_id), e.to_string());
                }
            }
            fetched += 1;
        }

        // Attraction ids carried by hits, synthetic keys first. Stored
        // texts whose payload carries no owner fall back to the graph's
        // describes edge.
        let mut attraction_ids: Vec<i64> = Vec::new();
        for result in &vector_results {
            let text_id = &result.hit.text_id;
            let mut id = text_id
                .strip_prefix(ATTRACTION_TEXT_PREFIX)
                .and_then(|rest| rest.parse::<i64>().ok())
                .or(result.hit.attraction_id);
            if id.is_none()
                && !text_id.is_empty()
                && !text_id.starts_with(ATTRACTION_TEXT_PREFIX)
            {
                match self.clusters.attraction_for_text(text_id).await {
                    Ok(found) => id = found,
                    Err(e) => {
                        errors.insert(format!("text_owner:{text_id}"), e.to_string());
                    }
                }
            }
            if let Some(id) = id {
                if !attraction_ids.contains(&id) {
                    attraction_ids.push(id);
                }
            }
        }
        let primary_attraction_id = attraction_ids.first().copied();

        // Entities from the query plus fetched prose.
        let mut entities = self.extractor.extract(query);
        for result in &vector_results {
            if let Some(content) = &result.content {
                entities.extend(self.extractor.extract(content));
            }
        }
        let entities = dedupe_by_surface(entities);

        // Graph lookups, concurrently; either side failing leaves the other
        // intact.
        let names: Vec<String> = entities
            .iter()
            .take(MAX_GRAPH_NAMES)
            .map(|e| e.text.clone())
            .collect();
        let seeds: Vec<String> = entities
            .iter()
            .take(MAX_SUBGRAPH_SEEDS)
            .map(|e| e.text.clone())
            .collect();
        let want_subgraph = entities.len() > 1 && strategy.graph_depth > 1;

        let (many, sub) = tokio::join!(
            self.graph
                .search_many(&names, None, PER_ENTITY_GRAPH_LIMIT),
            async {
                if want_subgraph {
                    self.graph.subgraph(&seeds, strategy.graph_depth).await
                } else {
                    Ok(Subgraph::default())
                }
            }
        );
        let graph_results = match many {
            Ok(hits) => hits,
            Err(e) => {
                errors.insert("graph_search".to_string(), e.to_string());
                Vec::new()
            }
        };
        let subgraph = match sub {
            Ok(sub) => sub,
            Err(e) => {
                errors.insert("subgraph".to_string(), e.to_string());
                Subgraph::default()
            }
        };

        // Cluster expansion around the primary attraction.
        let mut expansion_lines: Vec<String> = Vec::new();
        if strategy.expand_cluster {
            if let Some(attraction_id) = primary_attraction_id {
                self.expand_cluster(
                    attraction_id,
                    &attraction_ids,
                    strategy.max_items,
                    &mut expansion_lines,
                    &mut errors,
                )
                .await;
            }
        }

        // "Which scenic spot is this" gets the full cluster summary up front.
        let mut preface: Option<String> = None;
        if asks_which_spot(query) {
            match self
                .resolve_spot_summary(primary_attraction_id, &entities, &subgraph)
                .await
            {
                Ok(Some(summary)) => preface = Some(summary.render()),
                Ok(None) => {}
                Err(e) => {
                    errors.insert("spot_summary".to_string(), e.to_string());
                }
            }
        }

        let enhanced_context = fuse_context(
            preface.as_deref(),
            &vector_results,
            &graph_results,
            &entities,
            &expansion_lines,
        );

        info!(
            intent = intent.as_str(),
            vector_hits = vector_results.len(),
            graph_hits = graph_results.len(),
            entities = entities.len(),
            failures = errors.len(),
            "retrieval finished"
        );

        RetrievalOutput {
            intent,
            strategy,
            vector_results,
            graph_results,
            subgraph,
            entities,
            enhanced_context,
            attraction_ids,
            primary_attraction_id,
            errors,
        }
    }

    /// Append the owning spot's attraction enumeration plus per-attraction
    /// detail for up to `max_items` of the hit attractions.
    async fn expand_cluster(
        &self,
        attraction_id: i64,
        attraction_ids: &[i64],
        max_items: usize,
        lines: &mut Vec<String>,
        errors: &mut HashMap<String, String>,
    ) {
        match self.clusters.parent_spot(attraction_id).await {
            Ok(Some(spot)) => match self.clusters.spot_summary(&spot.key).await {
                Ok(Some(summary)) => lines.push(summary.enumeration_sentence()),
                Ok(None) => {}
                Err(e) => {
                    errors.insert("cluster_summary".to_string(), e.to_string());
                }
            },
            Ok(None) => {}
            Err(e) => {
                errors.insert("parent_spot".to_string(), e.to_string());
            }
        }

        let detail_futures = attraction_ids
            .iter()
            .take(max_items)
            .map(|id| self.clusters.attraction_detail(*id));
        for (id, detail) in attraction_ids
            .iter()
            .take(max_items)
            .zip(futures::future::join_all(detail_futures).await)
        {
            match detail {
                Ok(Some(detail)) => lines.push(detail.render()),
                Ok(None) => {}
                Err(e) => {
                    errors.insert(format!("attraction_detail:{id}"), e.to_string());
                }
            }
        }
    }

    /// Enumeration sentence for the spot owning the primary attraction, or
    /// failing that, any extracted entity that names a spot. Used by the
    /// listing top-up in the answer layer.
    pub async fn spot_enumeration(
        &self,
        primary_attraction_id: Option<i64>,
        entities: &[Entity],
    ) -> anyhow::Result<Option<String>> {
        if let Some(attraction_id) = primary_attraction_id {
            if let Some(spot) = self.clusters.parent_spot(attraction_id).await? {
                if let Some(summary) = self.clusters.spot_summary(&spot.key).await? {
                    return Ok(Some(summary.enumeration_sentence()));
                }
            }
        }
        for entity in entities {
            if let Some(spot) = self.clusters.spot_by_name(&entity.text).await? {
                if let Some(summary) = self.clusters.spot_summary(&spot.key).await? {
                    return Ok(Some(summary.enumeration_sentence()));
                }
            }
        }
        Ok(None)
    }

    /// Resolve a spot summary for "which scenic spot" queries, trying the
    /// primary attraction's parent, then entity names, then subgraph nodes.
    async fn resolve_spot_summary(
        &self,
        primary_attraction_id: Option<i64>,
        entities: &[Entity],
        subgraph: &Subgraph,
    ) -> anyhow::Result<Option<SpotClusterSummary>> {
        if let Some(attraction_id) = primary_attraction_id {
            if let Some(spot) = self.clusters.parent_spot(attraction_id).await? {
                if let Some(summary) = self.clusters.spot_summary(&spot.key).await? {
                    return Ok(Some(summary));
                }
            }
        }
        for entity in entities {
            if let Some(spot) = self.clusters.spot_by_name(&entity.text).await? {
                if let Some(summary) = self.clusters.spot_summary(&spot.key).await? {
                    return Ok(Some(summary));
                }
            }
        }
        for node in &subgraph.nodes {
            if node.label == "ScenicSpot" {
                if let Some(spot) = self.clusters.spot_by_name(&node.name).await? {
                    if let Some(summary) = self.clusters.spot_summary(&spot.key).await? {
                        return Ok(Some(summary));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Drop hits below the threshold; when all fall below it but raw hits exist
/// and the strategy insists on context, keep the single best hit.
pub fn filter_hits(raw: Vec<SearchHit>, threshold: f32, force_at_least_one: bool) -> Vec<SearchHit> {
    let mut sorted = raw;
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let kept: Vec<SearchHit> = sorted
        .iter()
        .filter(|h| h.score >= threshold)
        .cloned()
        .collect();
    if kept.is_empty() && force_at_least_one && !sorted.is_empty() {
        return vec![sorted.remove(0)];
    }
    kept
}

/// Whether the query asks which scenic spot the current context belongs to.
fn asks_which_spot(query: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"这是哪个景区|这里是哪个景区|这是什么景区|属于哪个景区|是哪个景区").unwrap()
    });
    re.is_match(query)
}

/// Fuse ranked vector hits, deduplicated graph relations, the entity list,
/// and any cluster-expansion lines into one text block.
fn fuse_context(
    preface: Option<&str>,
    vector_results: &[ScoredText],
    graph_results: &[spotlore_common::GraphHit],
    entities: &[Entity],
    expansion_lines: &[String],
) -> String {
    let mut blocks: Vec<String> = Vec::new();

    if let Some(preface) = preface {
        blocks.push(preface.to_string());
    }

    // Hits without fetched prose carry nothing a reader (or the model)
    // should see; internal text ids stay out of the prompt.
    let lines: Vec<String> = vector_results
        .iter()
        .filter_map(|result| {
            result
                .content
                .as_ref()
                .map(|content| format!("[相似度{:.2}] {}", result.hit.score, content))
        })
        .collect();
    if !lines.is_empty() {
        blocks.push(format!("【相关资料】\n{}", lines.join("\n")));
    }

    if !graph_results.is_empty() {
        let mut seen = HashSet::new();
        let mut lines = vec!["【知识图谱】".to_string()];
        for hit in graph_results {
            let line = hit.render();
            if seen.insert(line.clone()) {
                lines.push(line);
            }
        }
        if lines.len() > 1 {
            blocks.push(lines.join("\n"));
        }
    }

    if !expansion_lines.is_empty() {
        blocks.push(expansion_lines.join("\n"));
    }

    if !entities.is_empty() {
        let listed: Vec<String> = entities
            .iter()
            .map(|e| format!("{}({})", e.text, e.kind))
            .collect();
        blocks.push(format!("提取实体：{}", listed.join("、")));
    }

    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotlore_common::{EntityKind, GraphHit};

    fn hit(id: &str, score_distance: f32) -> SearchHit {
        SearchHit::new(id.to_string(), format!("text-{id}"), None, score_distance)
    }

    #[test]
    fn threshold_filters_low_hits() {
        // distances 0.5 and 4.0 give scores ~0.67 and 0.2
        let hits = filter_hits(vec![hit("a", 0.5), hit("b", 4.0)], 0.4, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn force_keeps_single_best_when_all_below() {
        let hits = filter_hits(vec![hit("a", 4.0), hit("b", 9.0)], 0.4, true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn no_force_returns_empty_when_all_below() {
        let hits = filter_hits(vec![hit("a", 4.0)], 0.4, false);
        assert!(hits.is_empty());
    }

    #[test]
    fn filtered_hits_stay_ordered_by_score() {
        let hits = filter_hits(vec![hit("worse", 1.0), hit("best", 0.1)], 0.1, false);
        assert_eq!(hits[0].id, "best");
        assert_eq!(hits[1].id, "worse");
    }

    #[test]
    fn which_spot_phrasings() {
        assert!(asks_which_spot("这是哪个景区"));
        assert!(asks_which_spot("仙寓洞属于哪个景区"));
        assert!(!asks_which_spot("蜀南竹海在哪里"));
    }

    #[test]
    fn fused_context_orders_blocks_and_dedupes_graph_lines() {
        let vector_results = vec![ScoredText {
            hit: SearchHit::new("a".into(), "t1".into(), None, 0.5),
            content: Some("竹海很美".into()),
        }];
        let graph_hit = GraphHit {
            query_name: "竹海".into(),
            source: "蜀南竹海".into(),
            relation: "HAS_FEATURE".into(),
            target: "竹林".into(),
        };
        let graph_results = vec![graph_hit.clone(), graph_hit];
        let entities = vec![Entity {
            text: "竹海".into(),
            kind: EntityKind::Location,
            confidence: 0.8,
        }];

        let context = fuse_context(None, &vector_results, &graph_results, &entities, &[]);
        assert!(context.contains("【相关资料】"));
        assert!(context.contains("竹海很美"));
        assert_eq!(context.matches("蜀南竹海 -HAS_FEATURE-> 竹林").count(), 1);
        assert!(context.contains("提取实体：竹海(LOCATION)"));
        let vector_pos = context.find("【相关资料】").unwrap();
        let graph_pos = context.find("【知识图谱】").unwrap();
        assert!(vector_pos < graph_pos);
    }

    #[test]
    fn unfetched_hits_never_leak_identifiers() {
        let vector_results = vec![ScoredText {
            hit: SearchHit::new("p7".into(), "attraction:7".into(), None, 0.1),
            content: None,
        }];
        let context = fuse_context(None, &vector_results, &[], &[], &[]);
        assert!(!context.contains("attraction:7"));
        assert!(!context.contains("【相关资料】"));
    }

    #[test]
    fn preface_comes_first() {
        let context = fuse_context(Some("【景区】蜀南竹海"), &[], &[], &[], &[]);
        assert!(context.starts_with("【景区】蜀南竹海"));
    }
}
