use std::sync::OnceLock;

use anyhow::Result;
use async_trait::async_trait;
use neo4rs::query;
use regex::Regex;
use tracing::debug;

use spotlore_common::{GraphHit, GraphSearch, Subgraph, SubgraphNode};

use crate::GraphClient;

/// Hard cap on names per batched lookup.
const MAX_BATCH_NAMES: usize = 10;

/// Hard cap on entities per subgraph expansion.
const MAX_SUBGRAPH_ENTITIES: usize = 3;

/// Row bound for subgraph expansion.
const SUBGRAPH_ROW_LIMIT: i64 = 50;

/// A relationship type vetted against a strict identifier pattern.
///
/// Relation types are interpolated into query templates (Cypher cannot
/// parameterize them), so this is the injection boundary: anything that is
/// not a plain identifier is rejected before it reaches a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationType(String);

impl RelationType {
    pub fn parse(raw: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
        if re.is_match(raw) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Read-side graph lookups over named entities.
#[derive(Clone)]
pub struct GraphSearcher {
    client: GraphClient,
}

impl GraphSearcher {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// `:TYPE` fragment for a validated relation type, or empty for any.
    /// Invalid input is dropped rather than forwarded.
    fn relation_fragment(relation_type: Option<&str>) -> String {
        match relation_type.and_then(RelationType::parse) {
            Some(rel) => format!(":{}", rel.as_str()),
            None => String::new(),
        }
    }
}

#[async_trait]
impl GraphSearch for GraphSearcher {
    async fn search_one(
        &self,
        entity_name: &str,
        relation_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GraphHit>> {
        let rel = Self::relation_fragment(relation_type);
        let cypher = format!(
            "MATCH (n)-[r{rel}]->(m)
             WHERE n.name = $name
             RETURN n.name AS source, type(r) AS relation,
                    coalesce(m.name, m.content, m.url, toString(m.id)) AS target
             LIMIT $limit"
        );
        let q = query(&cypher)
            .param("name", entity_name)
            .param("limit", limit as i64);

        let mut hits = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            let source: String = row.get("source").unwrap_or_default();
            let relation: String = row.get("relation").unwrap_or_default();
            let target: String = row.get("target").unwrap_or_default();
            if !target.is_empty() {
                hits.push(GraphHit {
                    query_name: entity_name.to_string(),
                    source,
                    relation,
                    target,
                });
            }
        }

        debug!(entity = entity_name, hits = hits.len(), "graph search_one");
        Ok(hits)
    }

    async fn search_many(
        &self,
        entity_names: &[String],
        relation_type: Option<&str>,
        per_entity_limit: usize,
    ) -> Result<Vec<GraphHit>> {
        if entity_names.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = entity_names
            .iter()
            .take(MAX_BATCH_NAMES)
            .cloned()
            .collect();

        // One traversal covering all names; the per-entity cap is applied by
        // slicing the collected relations so a prolific entity cannot starve
        // the rest.
        let rel = Self::relation_fragment(relation_type);
        let cypher = format!(
            "UNWIND $names AS qname
             MATCH (n)-[r{rel}]->(m)
             WHERE n.name = qname
             WITH qname,
                  collect({{source: n.name, relation: type(r),
                           target: coalesce(m.name, m.content, m.url, toString(m.id))}})[0..$per_limit] AS rels
             UNWIND rels AS rel
             RETURN qname, rel.source AS source, rel.relation AS relation, rel.target AS target"
        );
        let q = query(&cypher)
            .param("names", names.clone())
            .param("per_limit", per_entity_limit as i64);

        let mut hits = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            let query_name: String = row.get("qname").unwrap_or_default();
            let source: String = row.get("source").unwrap_or_default();
            let relation: String = row.get("relation").unwrap_or_default();
            let target: String = row.get("target").unwrap_or_default();
            if !target.is_empty() {
                hits.push(GraphHit {
                    query_name,
                    source,
                    relation,
                    target,
                });
            }
        }

        debug!(
            names = names.len(),
            hits = hits.len(),
            "graph search_many"
        );
        Ok(hits)
    }

    async fn subgraph(&self, entity_names: &[String], depth: u8) -> Result<Subgraph> {
        if entity_names.is_empty() {
            return Ok(Subgraph::default());
        }
        let names: Vec<String> = entity_names
            .iter()
            .take(MAX_SUBGRAPH_ENTITIES)
            .cloned()
            .collect();
        // Depth is interpolated; clamping keeps it a safe literal.
        let depth = depth.clamp(1, 3);

        let cypher = format!(
            "MATCH (n) WHERE n.name IN $names
             MATCH path = (n)-[*1..{depth}]-(m)
             UNWIND relationships(path) AS r
             RETURN DISTINCT
                    coalesce(startNode(r).name, startNode(r).content, '') AS source,
                    type(r) AS relation,
                    coalesce(endNode(r).name, endNode(r).content, endNode(r).url, '') AS target,
                    labels(startNode(r))[0] AS source_label,
                    labels(endNode(r))[0] AS target_label
             LIMIT $row_limit"
        );
        let q = query(&cypher)
            .param("names", names)
            .param("row_limit", SUBGRAPH_ROW_LIMIT);

        let mut sub = Subgraph::default();
        let mut seen_nodes = std::collections::HashSet::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            let source: String = row.get("source").unwrap_or_default();
            let relation: String = row.get("relation").unwrap_or_default();
            let target: String = row.get("target").unwrap_or_default();
            let source_label: String = row.get("source_label").unwrap_or_default();
            let target_label: String = row.get("target_label").unwrap_or_default();

            if !source.is_empty() && seen_nodes.insert(source.clone()) {
                sub.nodes.push(SubgraphNode {
                    name: source.clone(),
                    label: source_label,
                });
            }
            if !target.is_empty() && seen_nodes.insert(target.clone()) {
                sub.nodes.push(SubgraphNode {
                    name: target.clone(),
                    label: target_label,
                });
            }
            if !source.is_empty() && !target.is_empty() {
                sub.relationships.push(GraphHit {
                    query_name: source.clone(),
                    source,
                    relation,
                    target,
                });
            }
        }

        debug!(
            nodes = sub.nodes.len(),
            relationships = sub.relationships.len(),
            "subgraph expansion"
        );
        Ok(sub)
    }
}
