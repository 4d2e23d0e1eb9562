use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{info, warn};

use spotlore_common::{
    AttractionRecord, KnowledgeRecord, ParsedKnowledge, ScenicSpotRecord, SpotKey,
};

use crate::exec::{CypherValue, GraphExec, Statement};
use crate::location::parse_location_hierarchy;
use crate::name::{normalize_spot_name, same_spot_name};
use crate::GraphClient;

/// Edge types wiped and rebuilt on every attraction build.
const ATTRACTION_EDGE_TYPES: &str =
    "HAS_CATEGORY|HAS_FEATURE|HAS_HONOR|HAS_IMAGE|HAS_AUDIO|LOCATED_IN|BELONGS_TO";

/// Edge types wiped and rebuilt on every scenic-spot build.
const SPOT_EDGE_TYPES: &str = "HAS_SPOT|HAS_FEATURE|HAS_HONOR|LOCATED_IN";

/// Root-matching clause plus the parameters it binds. `build` prepends the
/// clause to a statement tail.
struct RootMatch {
    clause: String,
    params: Vec<(&'static str, CypherValue)>,
}

impl RootMatch {
    fn attraction(id: i64) -> Self {
        Self {
            clause: "MATCH (root:Attraction {id: $id})".to_string(),
            params: vec![("id", CypherValue::Int(id))],
        }
    }

    fn scenic_spot(key: &SpotKey) -> Self {
        match key {
            SpotKey::Id(id) => Self {
                clause: "MATCH (root:ScenicSpot {scenic_spot_id: $spot_id})".to_string(),
                params: vec![("spot_id", CypherValue::Int(*id))],
            },
            SpotKey::LegacyName(name) => Self {
                clause: "MATCH (root:ScenicSpot) WHERE root.name IN [$name, $normalized]"
                    .to_string(),
                params: vec![
                    ("name", CypherValue::Str(name.clone())),
                    ("normalized", CypherValue::Str(normalize_spot_name(name))),
                ],
            },
        }
    }

    fn build(&self, tail: &str) -> Statement {
        let mut statement = Statement::new(format!("{}\n{}", self.clause, tail));
        for (name, value) in &self.params {
            statement = statement.param(name, value.clone());
        }
        statement
    }
}

/// Outcome of one step in a cluster build. Builds are best-effort sequences
/// of idempotent writes; a failed step is recorded and the build continues.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: &'static str,
    pub ok: bool,
    pub detail: Option<String>,
}

/// Per-step record of a cluster build or cascade delete.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub target: String,
    pub steps: Vec<StepOutcome>,
}

impl BuildReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            steps: Vec::new(),
        }
    }

    pub fn ok(&mut self, step: &'static str) {
        self.steps.push(StepOutcome {
            step,
            ok: true,
            detail: None,
        });
    }

    pub fn fail(&mut self, step: &'static str, err: impl std::fmt::Display) {
        warn!(target = %self.target, step, error = %err, "cluster build step failed");
        self.steps.push(StepOutcome {
            step,
            ok: false,
            detail: Some(err.to_string()),
        });
    }

    pub fn failed_steps(&self) -> Vec<&StepOutcome> {
        self.steps.iter().filter(|s| !s.ok).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "build {}: {} steps", self.target, self.steps.len())?;
        for s in &self.steps {
            match &s.detail {
                Some(detail) => writeln!(f, "  {} FAILED: {detail}", s.step)?,
                None => writeln!(f, "  {} ok", s.step)?,
            }
        }
        Ok(())
    }
}

/// Builds and repairs graph clusters so every descriptive fact stays
/// reachable from its owning scenic-spot root.
///
/// The graph store has no multi-statement transactions, so builds are never
/// rolled back; every build is an idempotent wipe-then-rebuild over stable
/// keys and can simply be re-run after a partial failure. Concurrent builds
/// against the same root key are serialized through a per-key lock because
/// wipe-then-rebuild is not safe under interleaving.
pub struct ClusterBuilder {
    exec: Arc<dyn GraphExec>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ClusterBuilder {
    pub fn new(client: GraphClient) -> Self {
        Self::with_exec(Arc::new(client))
    }

    pub fn with_exec(exec: Arc<dyn GraphExec>) -> Self {
        Self {
            exec,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_key(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap();
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    async fn run_step(&self, report: &mut BuildReport, step: &'static str, statement: Statement) {
        match self.exec.run(statement).await {
            Ok(()) => report.ok(step),
            Err(e) => report.fail(step, e),
        }
    }

    /// Ids of nodes currently attached through the given edge types,
    /// collected before the wipe so the orphan sweep knows its candidates.
    async fn collect_edge_targets(
        &self,
        root: &RootMatch,
        report: &mut BuildReport,
        edge_types: &str,
    ) -> Vec<i64> {
        let statement = root.build(&format!(
            "MATCH (root)-[:{edge_types}]->(m) RETURN DISTINCT id(m) AS nid"
        ));
        match self.exec.fetch_ints(statement, "nid").await {
            Ok(ids) => {
                report.ok("collect_leaves");
                ids
            }
            Err(e) => {
                report.fail("collect_leaves", e);
                Vec::new()
            }
        }
    }

    /// Delete candidate nodes left with degree <= 1. Location-hierarchy
    /// nodes and scenic-spot roots are never swept; with
    /// `spare_location_anchored` set, candidates that still hold a
    /// located-in edge survive as well.
    async fn sweep_orphans(&self, ids: &[i64], spare_location_anchored: bool) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let anchored_clause = if spare_location_anchored {
            "AND NOT (m)-[:LOCATED_IN]->()"
        } else {
            ""
        };
        let cypher = format!(
            "UNWIND $ids AS nid
             MATCH (m) WHERE id(m) = nid
               AND NOT (m:ScenicSpot OR m:Province OR m:City OR m:County)
             OPTIONAL MATCH (m)--(o)
             WITH m, count(o) AS deg
             WHERE deg <= 1 {anchored_clause}
             DETACH DELETE m
             RETURN count(m) AS removed"
        );
        let statement = Statement::new(cypher).param("ids", ids.to_vec());

        let removed = self
            .exec
            .fetch_row(statement, &["removed"])
            .await?
            .and_then(|row| row.int("removed"))
            .unwrap_or(0);
        Ok(removed as u64)
    }

    /// Merge leaf nodes by key and attach them under the matched root.
    /// MERGE on both node and edge keeps rebuilds duplicate-free.
    async fn attach_leaves(
        &self,
        report: &mut BuildReport,
        step: &'static str,
        root: &RootMatch,
        label: &str,
        key_prop: &str,
        relation: &str,
        values: &[String],
    ) {
        if values.is_empty() {
            return;
        }
        let statement = root
            .build(&format!(
                "UNWIND $values AS v
                 MERGE (leaf:{label} {{{key_prop}: v}})
                 MERGE (root)-[:{relation}]->(leaf)"
            ))
            .param("values", values.to_vec());
        self.run_step(report, step, statement).await;
    }

    /// Merge the location hierarchy derived from a location string and point
    /// the root's single located-in edge at the most specific level.
    async fn attach_location(&self, report: &mut BuildReport, root: &RootMatch, location: &str) {
        let levels = parse_location_hierarchy(location);
        let Some(most_specific) = levels.last() else {
            // Nothing recognizable; skip this enrichment and continue.
            return;
        };

        // Chain subordinate-to edges, more specific pointing upward.
        for pair in levels.windows(2) {
            let cypher = format!(
                "MERGE (child:{child} {{name: $child_name}})
                 MERGE (parent:{parent} {{name: $parent_name}})
                 MERGE (child)-[:SUBORDINATE_TO]->(parent)",
                child = pair[1].label,
                parent = pair[0].label,
            );
            let statement = Statement::new(cypher)
                .param("child_name", pair[1].name.as_str())
                .param("parent_name", pair[0].name.as_str());
            self.run_step(report, "link_location_hierarchy", statement)
                .await;
        }

        let statement = root
            .build(&format!(
                "MERGE (loc:{label} {{name: $loc_name}})
                 MERGE (root)-[:LOCATED_IN]->(loc)",
                label = most_specific.label,
            ))
            .param("loc_name", most_specific.name.as_str());
        self.run_step(report, "link_located_in", statement).await;
    }

    // --- Attraction cluster build ---

    /// Idempotently create or repair the cluster around one attraction.
    /// Re-running with identical input produces an identical edge set.
    pub async fn build_attraction_cluster(
        &self,
        rec: &AttractionRecord,
        parsed: &ParsedKnowledge,
    ) -> BuildReport {
        let key = format!("attraction:{}", rec.id);
        let _guard = self.lock_key(&key).await;
        let mut report = BuildReport::new(&key);
        let root = RootMatch::attraction(rec.id);

        // Upsert scalar attributes on the stable id key.
        let statement = Statement::new(
            "MERGE (root:Attraction {id: $id})
             SET root.name = $name,
                 root.description = $description,
                 root.location = $location,
                 root.latitude = $latitude,
                 root.longitude = $longitude,
                 root.category = $category,
                 root.image_url = $image_url,
                 root.audio_url = $audio_url,
                 root.scenic_spot_id = $scenic_spot_id",
        )
        .param("id", rec.id)
        .param("name", rec.name.as_str())
        .param("description", rec.description.clone().unwrap_or_default())
        .param("location", rec.location.clone().unwrap_or_default())
        .param("latitude", rec.latitude.unwrap_or_default())
        .param("longitude", rec.longitude.unwrap_or_default())
        .param("category", rec.category.clone().unwrap_or_default())
        .param("image_url", rec.image_url.clone().unwrap_or_default())
        .param("audio_url", rec.audio_url.clone().unwrap_or_default())
        .param("scenic_spot_id", rec.scenic_spot_id.unwrap_or_default());
        self.run_step(&mut report, "upsert_attraction", statement)
            .await;

        // Remember the current leaves, wipe outgoing edges, then sweep
        // whatever the wipe disconnected.
        let leaves = self
            .collect_edge_targets(&root, &mut report, ATTRACTION_EDGE_TYPES)
            .await;

        let statement =
            root.build(&format!("MATCH (root)-[r:{ATTRACTION_EDGE_TYPES}]->() DELETE r"));
        self.run_step(&mut report, "wipe_edges", statement).await;

        match self.sweep_orphans(&leaves, false).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(target = %key, removed, "swept orphan leaves");
                }
                report.ok("sweep_orphans");
            }
            Err(e) => report.fail("sweep_orphans", e),
        }

        // Re-link to the owning scenic spot by id.
        if let Some(spot_id) = rec.scenic_spot_id {
            let statement = root
                .build(
                    "MERGE (s:ScenicSpot {scenic_spot_id: $spot_id})
                     ON CREATE SET s.name = $spot_name
                     MERGE (root)-[:BELONGS_TO]->(s)
                     MERGE (s)-[:HAS_SPOT]->(root)",
                )
                .param("spot_id", spot_id)
                .param(
                    "spot_name",
                    rec.scenic_spot_name.clone().unwrap_or_default(),
                );
            self.run_step(&mut report, "link_scenic_spot", statement)
                .await;
        }

        // A legacy Spot node with the same name predates this attraction
        // record; fold its spot-side edges onto the attraction and drop it.
        let statement = root
            .build(
                "MATCH (sp:Spot {name: $spot_leaf_name})
                 OPTIONAL MATCH (s:ScenicSpot)-[:HAS_SPOT]->(sp)
                 FOREACH (x IN CASE WHEN s IS NULL THEN [] ELSE [s] END |
                     MERGE (x)-[:HAS_SPOT]->(root))
                 DETACH DELETE sp",
            )
            .param("spot_leaf_name", rec.name.as_str());
        self.run_step(&mut report, "merge_legacy_spot", statement)
            .await;

        // Location hierarchy from the record, falling back to parsed data.
        let location = rec
            .location
            .clone()
            .or_else(|| parsed.location.clone())
            .unwrap_or_default();
        if !location.is_empty() {
            self.attach_location(&mut report, &root, &location).await;
        }

        // Structured leaves from parsed knowledge plus the record's own
        // category and media references.
        let mut categories = parsed.categories.clone();
        if let Some(c) = &rec.category {
            if !c.is_empty() && !categories.contains(c) {
                categories.push(c.clone());
            }
        }
        let mut images = parsed.images.clone();
        if let Some(u) = &rec.image_url {
            if !u.is_empty() && !images.contains(u) {
                images.push(u.clone());
            }
        }
        let mut audios = parsed.audios.clone();
        if let Some(u) = &rec.audio_url {
            if !u.is_empty() && !audios.contains(u) {
                audios.push(u.clone());
            }
        }

        self.attach_leaves(&mut report, "attach_categories", &root, "Category", "name", "HAS_CATEGORY", &categories)
            .await;
        self.attach_leaves(&mut report, "attach_features", &root, "Feature", "name", "HAS_FEATURE", &parsed.features)
            .await;
        self.attach_leaves(&mut report, "attach_honors", &root, "Honor", "name", "HAS_HONOR", &parsed.honors)
            .await;
        self.attach_leaves(&mut report, "attach_images", &root, "Image", "url", "HAS_IMAGE", &images)
            .await;
        self.attach_leaves(&mut report, "attach_audios", &root, "Audio", "url", "HAS_AUDIO", &audios)
            .await;

        info!(target = %key, clean = report.is_clean(), "attraction cluster build finished");
        report
    }

    // --- Scenic-spot cluster build ---

    /// Idempotently create or repair the cluster rooted at one scenic spot.
    /// `attractions` are the spot's children with real records; `spot_names`
    /// are lightweight named sub-features without one.
    pub async fn build_spot_cluster(
        &self,
        rec: &ScenicSpotRecord,
        attractions: &[AttractionRecord],
        spot_names: &[String],
        parsed: &ParsedKnowledge,
    ) -> BuildReport {
        let key = match rec.id {
            Some(id) => SpotKey::Id(id),
            None => SpotKey::LegacyName(normalize_spot_name(&rec.name)),
        };
        let lock_name = key.to_string();
        let _guard = self.lock_key(&lock_name).await;
        let mut report = BuildReport::new(&lock_name);

        // Upsert the root on its stable key. Legacy roots keep the
        // normalized name as their key so variant spellings coalesce.
        let statement = match &key {
            SpotKey::Id(id) => Statement::new(
                "MERGE (root:ScenicSpot {scenic_spot_id: $spot_id})
                 SET root.name = $name, root.area = $area, root.location = $location",
            )
            .param("spot_id", *id)
            .param("name", rec.name.as_str()),
            SpotKey::LegacyName(normalized) => Statement::new(
                "MERGE (root:ScenicSpot {name: $normalized})
                 SET root.area = $area, root.location = $location",
            )
            .param("normalized", normalized.as_str()),
        }
        .param("area", rec.area.clone().unwrap_or_default())
        .param("location", rec.location.clone().unwrap_or_default());
        self.run_step(&mut report, "upsert_scenic_spot", statement)
            .await;

        // Once an id is known, legacy name-keyed roots stop being a second
        // source of truth: their edges move to the id-keyed node exactly
        // once, then the legacy node goes away.
        if let SpotKey::Id(id) = &key {
            self.migrate_legacy_root(&mut report, *id, &rec.name).await;
        }

        let root = RootMatch::scenic_spot(&key);

        // Wipe-then-rebuild with a three-stage sweep: Spot leaves go first,
        // then feature/honor leaves, then anything else the wipe
        // disconnected that no location edge anchors.
        let children = self
            .collect_edge_targets(&root, &mut report, SPOT_EDGE_TYPES)
            .await;

        let statement = root.build(&format!("MATCH (root)-[r:{SPOT_EDGE_TYPES}]->() DELETE r"));
        self.run_step(&mut report, "wipe_edges", statement).await;

        let mut swept = 0u64;
        for stage in ["sweep_spots", "sweep_leaves", "sweep_unanchored"] {
            match self.sweep_orphans(&children, true).await {
                Ok(removed) => {
                    swept += removed;
                    report.ok(stage);
                    if removed == 0 {
                        break;
                    }
                }
                Err(e) => {
                    report.fail(stage, e);
                    break;
                }
            }
        }
        if swept > 0 {
            info!(target = %lock_name, swept, "swept orphan children");
        }

        // Rebuild has-spot edges to real attractions (by id, so a later
        // attraction build merges onto the same node).
        for a in attractions {
            let statement = root
                .build(
                    "MERGE (a:Attraction {id: $attraction_id})
                     ON CREATE SET a.name = $attraction_name
                     MERGE (root)-[:HAS_SPOT]->(a)
                     MERGE (a)-[:BELONGS_TO]->(root)",
                )
                .param("attraction_id", a.id)
                .param("attraction_name", a.name.as_str());
            self.run_step(&mut report, "link_attraction", statement)
                .await;
        }

        // Lightweight named sub-features without an attraction record.
        let named: Vec<String> = spot_names
            .iter()
            .filter(|n| !attractions.iter().any(|a| same_spot_name(&a.name, n)))
            .cloned()
            .collect();
        self.attach_leaves(&mut report, "attach_spots", &root, "Spot", "name", "HAS_SPOT", &named)
            .await;

        self.attach_leaves(&mut report, "attach_features", &root, "Feature", "name", "HAS_FEATURE", &parsed.features)
            .await;
        self.attach_leaves(&mut report, "attach_honors", &root, "Honor", "name", "HAS_HONOR", &parsed.honors)
            .await;

        let location = rec
            .location
            .clone()
            .or_else(|| parsed.location.clone())
            .unwrap_or_default();
        if !location.is_empty() {
            self.attach_location(&mut report, &root, &location).await;
        }

        info!(target = %lock_name, clean = report.is_clean(), "scenic-spot cluster build finished");
        report
    }

    /// Move a legacy name-keyed root's edges onto the id-keyed node, then
    /// delete the legacy node. Idempotent: once the legacy node is gone this
    /// is a no-op.
    async fn migrate_legacy_root(&self, report: &mut BuildReport, spot_id: i64, name: &str) {
        let normalized = normalize_spot_name(name);

        // One relocation query per edge type keeps each statement a plain
        // MERGE the store can retry safely.
        for rel in ["HAS_SPOT", "HAS_FEATURE", "HAS_HONOR", "LOCATED_IN"] {
            let cypher = format!(
                "MATCH (legacy:ScenicSpot)
                 WHERE legacy.scenic_spot_id IS NULL
                   AND legacy.name IN [$name, $normalized]
                 MATCH (root:ScenicSpot {{scenic_spot_id: $spot_id}})
                 MATCH (legacy)-[r:{rel}]->(x)
                 MERGE (root)-[:{rel}]->(x)
                 DELETE r"
            );
            let statement = Statement::new(cypher)
                .param("name", name)
                .param("normalized", normalized.as_str())
                .param("spot_id", spot_id);
            self.run_step(report, "migrate_outgoing", statement).await;
        }

        for rel in ["BELONGS_TO", "DESCRIBES"] {
            let cypher = format!(
                "MATCH (legacy:ScenicSpot)
                 WHERE legacy.scenic_spot_id IS NULL
                   AND legacy.name IN [$name, $normalized]
                 MATCH (root:ScenicSpot {{scenic_spot_id: $spot_id}})
                 MATCH (x)-[r:{rel}]->(legacy)
                 MERGE (x)-[:{rel}]->(root)
                 DELETE r"
            );
            let statement = Statement::new(cypher)
                .param("name", name)
                .param("normalized", normalized.as_str())
                .param("spot_id", spot_id);
            self.run_step(report, "migrate_incoming", statement).await;
        }

        let statement = Statement::new(
            "MATCH (legacy:ScenicSpot)
             WHERE legacy.scenic_spot_id IS NULL
               AND legacy.name IN [$name, $normalized]
             DETACH DELETE legacy",
        )
        .param("name", name)
        .param("normalized", normalized.as_str());
        self.run_step(report, "delete_legacy_root", statement).await;
    }

    // --- Text attach / detach ---

    /// Attach or refresh the describing Text node for a knowledge upload.
    /// A text describes exactly one owner; previous describes-edges are
    /// detached first so re-uploads move cleanly.
    pub async fn attach_text(&self, knowledge: &KnowledgeRecord) -> BuildReport {
        let lock_name = format!("text:{}", knowledge.text_id);
        let _guard = self.lock_key(&lock_name).await;
        let mut report = BuildReport::new(&lock_name);

        let statement = Statement::new(
            "MERGE (t:Text {text_id: $text_id})
             SET t.content = $content",
        )
        .param("text_id", knowledge.text_id.as_str())
        .param("content", knowledge.content.as_str());
        self.run_step(&mut report, "upsert_text", statement).await;

        let statement =
            Statement::new("MATCH (t:Text {text_id: $text_id})-[r:DESCRIBES]->() DELETE r")
                .param("text_id", knowledge.text_id.as_str());
        self.run_step(&mut report, "detach_previous", statement)
            .await;

        if let Some(attraction_id) = knowledge.attraction_id {
            let statement = Statement::new(
                "MATCH (t:Text {text_id: $text_id})
                 MERGE (a:Attraction {id: $attraction_id})
                 MERGE (t)-[:DESCRIBES]->(a)",
            )
            .param("text_id", knowledge.text_id.as_str())
            .param("attraction_id", attraction_id);
            self.run_step(&mut report, "describe_attraction", statement)
                .await;
        } else if let Some(spot) = &knowledge.scenic_spot {
            let statement = match spot.id {
                Some(id) => Statement::new(
                    "MATCH (t:Text {text_id: $text_id})
                     MERGE (s:ScenicSpot {scenic_spot_id: $spot_id})
                     ON CREATE SET s.name = $spot_name
                     MERGE (t)-[:DESCRIBES]->(s)",
                )
                .param("spot_id", id)
                .param("spot_name", spot.name.as_str()),
                None => Statement::new(
                    "MATCH (t:Text {text_id: $text_id})
                     MERGE (s:ScenicSpot {name: $spot_name})
                     MERGE (t)-[:DESCRIBES]->(s)",
                )
                .param("spot_name", normalize_spot_name(&spot.name)),
            }
            .param("text_id", knowledge.text_id.as_str());
            self.run_step(&mut report, "describe_scenic_spot", statement)
                .await;
        } else {
            report.fail("describe_owner", "knowledge record names no owner");
        }

        report
    }

    /// Delete a Text node. When it was the last description of a scenic
    /// spot, the whole cluster goes with it; siblings keep it alive.
    pub async fn delete_text(&self, text_id: &str) -> BuildReport {
        let lock_name = format!("text:{text_id}");
        let _guard = self.lock_key(&lock_name).await;
        let mut report = BuildReport::new(&lock_name);

        // Find the owner and how many sibling texts still describe it.
        let statement = Statement::new(
            "MATCH (t:Text {text_id: $text_id})
             OPTIONAL MATCH (t)-[:DESCRIBES]->(o)
             OPTIONAL MATCH (sib:Text)-[:DESCRIBES]->(o)
             WHERE sib.text_id <> $text_id
             RETURN labels(o)[0] AS owner_label, o.scenic_spot_id AS spot_id,
                    o.name AS owner_name, count(DISTINCT sib) AS siblings",
        )
        .param("text_id", text_id);

        let mut owner = None;
        match self
            .exec
            .fetch_row(statement, &["owner_label", "spot_id", "owner_name", "siblings"])
            .await
        {
            Ok(Some(row)) => {
                report.ok("resolve_owner");
                let label = row.text("owner_label").unwrap_or_default();
                let siblings = row.int("siblings").unwrap_or(0);
                let spot_id = row.int("spot_id");
                let owner_name = row.text("owner_name").unwrap_or_default();
                owner = Some((label, spot_id, owner_name, siblings));
            }
            Ok(None) => report.ok("resolve_owner"),
            Err(e) => report.fail("resolve_owner", e),
        }

        let statement = Statement::new("MATCH (t:Text {text_id: $text_id}) DETACH DELETE t")
            .param("text_id", text_id);
        self.run_step(&mut report, "delete_text", statement).await;

        if let Some((label, spot_id, owner_name, siblings)) = owner {
            if label == "ScenicSpot" && siblings == 0 {
                let key = match spot_id {
                    Some(id) => SpotKey::Id(id),
                    None => SpotKey::LegacyName(owner_name),
                };
                let cascade = self.delete_spot_cluster(&key).await;
                report.steps.extend(cascade.steps);
            }
        }

        report
    }

    // --- Cascade deletes ---

    /// Stable ids of every Text node describing this spot or one of its
    /// attractions. Collected before a cascade so the caller can purge the
    /// matching vector entries first.
    pub async fn describing_text_ids(&self, key: &SpotKey) -> Result<Vec<String>> {
        let root = RootMatch::scenic_spot(key);
        let statement = root.build(
            "MATCH (t:Text)-[:DESCRIBES]->(o)
             WHERE o = root OR (root)-[:HAS_SPOT]->(o)
             RETURN DISTINCT t.text_id AS text_id",
        );
        self.exec.fetch_texts(statement, "text_id").await
    }

    /// Administrative cascade: remove an attraction, its describing texts,
    /// and any leaves only it was holding up.
    pub async fn delete_attraction_cluster(&self, attraction_id: i64) -> BuildReport {
        let lock_name = format!("attraction:{attraction_id}");
        let _guard = self.lock_key(&lock_name).await;
        let mut report = BuildReport::new(&lock_name);
        let root = RootMatch::attraction(attraction_id);

        let candidates = self
            .collect_edge_targets(&root, &mut report, ATTRACTION_EDGE_TYPES)
            .await;

        let statement = root.build(
            "OPTIONAL MATCH (t:Text)-[:DESCRIBES]->(root)
             DETACH DELETE t, root",
        );
        self.run_step(&mut report, "delete_root", statement).await;

        match self.sweep_orphans(&candidates, false).await {
            Ok(removed) => {
                info!(target = %lock_name, removed, "cascade delete swept leaves");
                report.ok("sweep_orphans");
            }
            Err(e) => report.fail("sweep_orphans", e),
        }

        report
    }

    /// Administrative cascade: remove a scenic-spot root and everything
    /// reachable only through it.
    pub async fn delete_spot_cluster(&self, key: &SpotKey) -> BuildReport {
        let lock_name = key.to_string();
        let _guard = self.lock_key(&lock_name).await;
        let mut report = BuildReport::new(format!("delete:{lock_name}"));
        let root = RootMatch::scenic_spot(key);

        // Candidates reach two hops out so attraction children and their own
        // leaves can be swept once the root is gone.
        let statement = root.build("MATCH (root)-[*1..2]-(m) RETURN DISTINCT id(m) AS nid");
        let candidates = match self.exec.fetch_ints(statement, "nid").await {
            Ok(ids) => {
                report.ok("collect_cluster");
                ids
            }
            Err(e) => {
                report.fail("collect_cluster", e);
                Vec::new()
            }
        };

        let statement = root.build("DETACH DELETE root");
        self.run_step(&mut report, "delete_root", statement).await;

        // Repeated sweeps converge: deleting an attraction child in one pass
        // can orphan its leaves for the next.
        for _ in 0..3 {
            match self.sweep_orphans(&candidates, false).await {
                Ok(0) => {
                    report.ok("sweep_orphans");
                    break;
                }
                Ok(_) => report.ok("sweep_orphans"),
                Err(e) => {
                    report.fail("sweep_orphans", e);
                    break;
                }
            }
        }

        report
    }
}
