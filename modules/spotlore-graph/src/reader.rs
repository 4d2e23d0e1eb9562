use anyhow::Result;
use async_trait::async_trait;
use neo4rs::query;

use spotlore_common::{
    AttractionDetail, ClusterRead, SpotClusterSummary, SpotKey, SpotRef,
};

use crate::name::normalize_spot_name;
use crate::GraphClient;

/// Read-side cluster summaries for context expansion.
#[derive(Clone)]
pub struct ClusterReader {
    client: GraphClient,
}

impl ClusterReader {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    fn spot_ref_from_row(row: &neo4rs::Row) -> Option<SpotRef> {
        let name: String = row.get("name").unwrap_or_default();
        if name.is_empty() {
            return None;
        }
        let key = match row.get::<i64>("id") {
            Ok(id) => SpotKey::Id(id),
            Err(_) => SpotKey::LegacyName(name.clone()),
        };
        Some(SpotRef { key, name })
    }

    /// Root-matching clause shared by the summary queries. Id-keyed roots are
    /// matched by id; legacy roots by raw or normalized name.
    fn spot_match(key: &SpotKey) -> &'static str {
        match key {
            SpotKey::Id(_) => "MATCH (s:ScenicSpot) WHERE s.scenic_spot_id = $id",
            SpotKey::LegacyName(_) => {
                "MATCH (s:ScenicSpot) WHERE s.name = $name OR s.name = $normalized"
            }
        }
    }
}

#[async_trait]
impl ClusterRead for ClusterReader {
    async fn spot_summary(&self, key: &SpotKey) -> Result<Option<SpotClusterSummary>> {
        let match_clause = Self::spot_match(key);
        let cypher = format!(
            "{match_clause}
             OPTIONAL MATCH (s)-[:HAS_SPOT]->(a)
             WITH s, [x IN collect(DISTINCT a.name) WHERE x IS NOT NULL] AS attractions
             OPTIONAL MATCH (s)-[:HAS_FEATURE]->(f:Feature)
             WITH s, attractions,
                  [x IN collect(DISTINCT f.name) WHERE x IS NOT NULL] AS features
             OPTIONAL MATCH (s)-[:HAS_HONOR]->(h:Honor)
             RETURN s.scenic_spot_id AS id, s.name AS name, s.area AS area,
                    s.location AS location, attractions, features,
                    [x IN collect(DISTINCT h.name) WHERE x IS NOT NULL] AS honors
             LIMIT 1"
        );
        let q = match key {
            SpotKey::Id(id) => query(&cypher).param("id", *id),
            SpotKey::LegacyName(name) => query(&cypher)
                .param("name", name.as_str())
                .param("normalized", normalize_spot_name(name)),
        };

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            let Some(spot) = Self::spot_ref_from_row(&row) else {
                return Ok(None);
            };
            let area: Option<String> = row.get::<String>("area").ok().filter(|s| !s.is_empty());
            let location: Option<String> =
                row.get::<String>("location").ok().filter(|s| !s.is_empty());
            let attractions: Vec<String> = row.get("attractions").unwrap_or_default();
            let features: Vec<String> = row.get("features").unwrap_or_default();
            let honors: Vec<String> = row.get("honors").unwrap_or_default();

            return Ok(Some(SpotClusterSummary {
                spot,
                area,
                location,
                attractions,
                features,
                honors,
            }));
        }
        Ok(None)
    }

    async fn spot_by_name(&self, name: &str) -> Result<Option<SpotRef>> {
        let q = query(
            "MATCH (s:ScenicSpot)
             WHERE s.name = $name OR s.name = $normalized
             RETURN s.scenic_spot_id AS id, s.name AS name
             LIMIT 1",
        )
        .param("name", name)
        .param("normalized", normalize_spot_name(name));

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            return Ok(Self::spot_ref_from_row(&row));
        }
        Ok(None)
    }

    async fn parent_spot(&self, attraction_id: i64) -> Result<Option<SpotRef>> {
        // belongs-to is authoritative; has-spot covers legacy clusters where
        // only the spot-side edge was written.
        let q = query(
            "MATCH (a:Attraction {id: $id})
             OPTIONAL MATCH (a)-[:BELONGS_TO]->(s1:ScenicSpot)
             OPTIONAL MATCH (s2:ScenicSpot)-[:HAS_SPOT]->(a)
             WITH coalesce(s1, s2) AS s
             WHERE s IS NOT NULL
             RETURN s.scenic_spot_id AS id, s.name AS name
             LIMIT 1",
        )
        .param("id", attraction_id);

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            return Ok(Self::spot_ref_from_row(&row));
        }
        Ok(None)
    }

    async fn attraction_detail(&self, attraction_id: i64) -> Result<Option<AttractionDetail>> {
        let q = query(
            "MATCH (a:Attraction {id: $id})
             OPTIONAL MATCH (a)-[:HAS_FEATURE]->(f:Feature)
             RETURN a.id AS id, a.name AS name, a.description AS description,
                    a.category AS category, a.location AS location,
                    [x IN collect(DISTINCT f.name) WHERE x IS NOT NULL] AS features
             LIMIT 1",
        )
        .param("id", attraction_id);

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            let name: String = row.get("name").unwrap_or_default();
            if name.is_empty() {
                return Ok(None);
            }
            return Ok(Some(AttractionDetail {
                id: row.get("id").unwrap_or(attraction_id),
                name,
                description: row
                    .get::<String>("description")
                    .ok()
                    .filter(|s| !s.is_empty()),
                category: row.get::<String>("category").ok().filter(|s| !s.is_empty()),
                location: row.get::<String>("location").ok().filter(|s| !s.is_empty()),
                features: row.get("features").unwrap_or_default(),
            }));
        }
        Ok(None)
    }

    async fn text_content(&self, text_id: &str) -> Result<Option<String>> {
        let q = query("MATCH (t:Text {text_id: $id}) RETURN t.content AS content LIMIT 1")
            .param("id", text_id);

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            let content: String = row.get("content").unwrap_or_default();
            if !content.is_empty() {
                return Ok(Some(content));
            }
        }
        Ok(None)
    }

    async fn attraction_for_text(&self, text_id: &str) -> Result<Option<i64>> {
        let q = query(
            "MATCH (t:Text {text_id: $id})-[:DESCRIBES]->(a:Attraction)
             RETURN a.id AS id
             LIMIT 1",
        )
        .param("id", text_id);

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            if let Ok(id) = row.get::<i64>("id") {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}
