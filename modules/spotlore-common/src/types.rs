use serde::{Deserialize, Serialize};

// --- Identifiers ---

/// Identity of a scenic spot cluster root. Spots created before numeric ids
/// existed are keyed by name; id-keyed nodes are the source of truth and
/// legacy name-keyed nodes are merged into them exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotKey {
    Id(i64),
    LegacyName(String),
}

impl SpotKey {
    pub fn id(&self) -> Option<i64> {
        match self {
            SpotKey::Id(id) => Some(*id),
            SpotKey::LegacyName(_) => None,
        }
    }
}

impl std::fmt::Display for SpotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpotKey::Id(id) => write!(f, "spot:{id}"),
            SpotKey::LegacyName(name) => write!(f, "spot:{name}"),
        }
    }
}

// --- Relational records (read from the source-of-truth store by callers) ---

/// Full scenic-spot row, passed into cluster builds by the write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenicSpotRecord {
    pub id: Option<i64>,
    pub name: String,
    pub area: Option<String>,
    pub location: Option<String>,
}

/// Full attraction row, passed into cluster builds by the write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttractionRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub scenic_spot_id: Option<i64>,
    pub scenic_spot_name: Option<String>,
}

/// A unit of uploaded source prose. `text_id` is stable across re-uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub text_id: String,
    pub content: String,
    pub attraction_id: Option<i64>,
    pub scenic_spot: Option<ScenicSpotRecord>,
}

/// Structured data parsed upstream from a knowledge upload. Any field may be
/// empty when the parse step returned nothing usable; builds skip that
/// enrichment and continue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedKnowledge {
    pub features: Vec<String>,
    pub honors: Vec<String>,
    pub categories: Vec<String>,
    pub images: Vec<String>,
    pub audios: Vec<String>,
    pub location: Option<String>,
}

impl ParsedKnowledge {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
            && self.honors.is_empty()
            && self.categories.is_empty()
            && self.images.is_empty()
            && self.audios.is_empty()
            && self.location.is_none()
    }
}

// --- Entity extraction ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Location,
    Person,
    Org,
    Other,
    Keyword,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Location => write!(f, "LOCATION"),
            EntityKind::Person => write!(f, "PERSON"),
            EntityKind::Org => write!(f, "ORG"),
            EntityKind::Other => write!(f, "OTHER"),
            EntityKind::Keyword => write!(f, "KEYWORD"),
        }
    }
}

/// A candidate entity mention extracted from text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub kind: EntityKind,
    pub confidence: f32,
}

// --- Graph lookup results ---

/// One outgoing relation found for a queried entity name. `query_name` tags
/// which name in a batched lookup produced the hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphHit {
    pub query_name: String,
    pub source: String,
    pub relation: String,
    pub target: String,
}

impl GraphHit {
    /// Render as the deduplicated "A -relation-> B" line used in fused context.
    pub fn render(&self) -> String {
        format!("{} -{}-> {}", self.source, self.relation, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphNode {
    pub name: String,
    pub label: String,
}

/// Bounded neighborhood expansion around a set of entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<SubgraphNode>,
    pub relationships: Vec<GraphHit>,
}

// --- Cluster summaries ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRef {
    pub key: SpotKey,
    pub name: String,
}

/// Everything a visitor-facing summary of one scenic-spot cluster needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotClusterSummary {
    pub spot: SpotRef,
    pub area: Option<String>,
    pub location: Option<String>,
    pub attractions: Vec<String>,
    pub features: Vec<String>,
    pub honors: Vec<String>,
}

impl SpotClusterSummary {
    /// One-sentence enumeration of the attractions under this spot.
    pub fn enumeration_sentence(&self) -> String {
        if self.attractions.is_empty() {
            format!("{}暂无已登记的景点。", self.spot.name)
        } else {
            format!(
                "{}包含以下景点：{}。",
                self.spot.name,
                self.attractions.join("、")
            )
        }
    }

    /// Full cluster summary block prepended for "which scenic spot" queries.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("【景区】{}", self.spot.name)];
        if let Some(area) = &self.area {
            lines.push(format!("面积：{area}"));
        }
        if let Some(location) = &self.location {
            lines.push(format!("位置：{location}"));
        }
        if !self.attractions.is_empty() {
            lines.push(format!("下辖景点：{}", self.attractions.join("、")));
        }
        if !self.features.is_empty() {
            lines.push(format!("特色：{}", self.features.join("、")));
        }
        if !self.honors.is_empty() {
            lines.push(format!("荣誉：{}", self.honors.join("、")));
        }
        lines.join("\n")
    }
}

/// Cluster detail for a single attraction, used during expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttractionDetail {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub features: Vec<String>,
}

impl AttractionDetail {
    pub fn render(&self) -> String {
        let mut parts = vec![format!("【景点】{}", self.name)];
        if let Some(category) = &self.category {
            parts.push(format!("类别：{category}"));
        }
        if let Some(location) = &self.location {
            parts.push(format!("位置：{location}"));
        }
        if !self.features.is_empty() {
            parts.push(format!("特色：{}", self.features.join("、")));
        }
        if let Some(description) = &self.description {
            parts.push(description.clone());
        }
        parts.join("；")
    }
}
