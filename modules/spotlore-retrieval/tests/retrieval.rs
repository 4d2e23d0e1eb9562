//! Behavior tests for the retrieval stack against in-memory fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use llm_client::{ChatModel, Message, TextEmbedder};
use spotlore_common::{
    AttractionDetail, ClusterRead, GraphHit, GraphSearch, SpotClusterSummary, SpotKey, SpotRef,
    Subgraph,
};
use spotlore_graph::{ClusterBuilder, GraphExec, Statement, ValueRow};
use spotlore_retrieval::cache::Clock;
use spotlore_retrieval::entity::EntityExtractor;
use spotlore_retrieval::{
    AnswerOrchestrator, HybridRetriever, InMemoryConversationStore, LoadState, SearchHit,
    SpotloreService, TtlCache, VectorError, VectorFilter, VectorIndex, VectorRecord,
    VectorSearchClient, NO_CONTEXT_MARKER,
};

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// --- Fakes ---

#[derive(Default)]
struct FakeEmbedder {
    embed_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

fn vector_for(text: &str) -> Vec<f32> {
    let sum: u32 = text.bytes().map(u32::from).sum();
    vec![sum as f32, text.len() as f32, 1.0]
}

#[async_trait]
impl TextEmbedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vector_for(text))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(texts.len());
        Ok(texts.iter().map(|t| vector_for(t)).collect())
    }
}

struct FakeIndex {
    hits: Vec<SearchHit>,
    not_loaded_failures: AtomicUsize,
    search_calls: AtomicUsize,
    load_calls: AtomicUsize,
    create_calls: AtomicUsize,
    deletes: Mutex<Vec<VectorFilter>>,
    fail_connection: bool,
}

impl FakeIndex {
    fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            not_loaded_failures: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
            fail_connection: false,
        }
    }

    fn failing_not_loaded(hits: Vec<SearchHit>, failures: usize) -> Self {
        let index = Self::with_hits(hits);
        index.not_loaded_failures.store(failures, Ordering::SeqCst);
        index
    }

    fn down() -> Self {
        Self {
            hits: Vec::new(),
            not_loaded_failures: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
            fail_connection: true,
        }
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn create_or_get(&self, _collection: &str, _dim: u64) -> Result<(), VectorError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connection {
            return Err(VectorError::Connection("index down".into()));
        }
        Ok(())
    }

    async fn upsert(&self, _c: &str, _records: Vec<VectorRecord>) -> Result<(), VectorError> {
        Ok(())
    }

    async fn delete(&self, _c: &str, filter: &VectorFilter) -> Result<(), VectorError> {
        self.deletes.lock().unwrap().push(filter.clone());
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        _vector: Vec<f32>,
        _top_k: usize,
    ) -> Result<Vec<SearchHit>, VectorError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.not_loaded_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.not_loaded_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(VectorError::NotLoaded(collection.to_string()));
        }
        Ok(self.hits.clone())
    }

    async fn load(&self, _collection: &str) -> Result<(), VectorError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_state(&self, _collection: &str) -> Result<LoadState, VectorError> {
        Ok(LoadState::Loaded)
    }
}

#[derive(Default)]
struct FakeGraph {
    relations: HashMap<String, Vec<(String, String)>>,
}

impl FakeGraph {
    fn with_relation(mut self, name: &str, relation: &str, target: &str) -> Self {
        self.relations
            .entry(name.to_string())
            .or_default()
            .push((relation.to_string(), target.to_string()));
        self
    }
}

#[async_trait]
impl GraphSearch for FakeGraph {
    async fn search_one(
        &self,
        entity_name: &str,
        _relation_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GraphHit>> {
        Ok(self
            .relations
            .get(entity_name)
            .map(|rels| {
                rels.iter()
                    .take(limit)
                    .map(|(relation, target)| GraphHit {
                        query_name: entity_name.to_string(),
                        source: entity_name.to_string(),
                        relation: relation.clone(),
                        target: target.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn search_many(
        &self,
        entity_names: &[String],
        relation_type: Option<&str>,
        per_entity_limit: usize,
    ) -> Result<Vec<GraphHit>> {
        let mut out = Vec::new();
        for name in entity_names {
            out.extend(self.search_one(name, relation_type, per_entity_limit).await?);
        }
        Ok(out)
    }

    async fn subgraph(&self, _entity_names: &[String], _depth: u8) -> Result<Subgraph> {
        Ok(Subgraph::default())
    }
}

struct FakeClusters {
    summary: Option<SpotClusterSummary>,
    texts: HashMap<String, String>,
    parent_of: HashMap<i64, SpotRef>,
    text_owner: HashMap<String, i64>,
    match_any_name: bool,
}

impl FakeClusters {
    fn empty() -> Self {
        Self {
            summary: None,
            texts: HashMap::new(),
            parent_of: HashMap::new(),
            text_owner: HashMap::new(),
            match_any_name: false,
        }
    }

    fn bamboo_sea() -> Self {
        let spot = SpotRef {
            key: SpotKey::Id(1),
            name: "蜀南竹海".to_string(),
        };
        let summary = SpotClusterSummary {
            spot: spot.clone(),
            area: Some("120平方公里".to_string()),
            location: Some("四川省宜宾市长宁县".to_string()),
            attractions: vec!["仙寓洞".to_string(), "观云台".to_string()],
            features: vec!["竹林".to_string()],
            honors: vec![],
        };
        let mut parent_of = HashMap::new();
        parent_of.insert(7, spot);
        Self {
            summary: Some(summary),
            texts: HashMap::new(),
            parent_of,
            text_owner: HashMap::new(),
            match_any_name: false,
        }
    }
}

#[async_trait]
impl ClusterRead for FakeClusters {
    async fn spot_summary(&self, _key: &SpotKey) -> Result<Option<SpotClusterSummary>> {
        Ok(self.summary.clone())
    }

    async fn spot_by_name(&self, name: &str) -> Result<Option<SpotRef>> {
        match &self.summary {
            Some(summary) if self.match_any_name || summary.spot.name == name => {
                Ok(Some(summary.spot.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn parent_spot(&self, attraction_id: i64) -> Result<Option<SpotRef>> {
        Ok(self.parent_of.get(&attraction_id).cloned())
    }

    async fn attraction_detail(&self, attraction_id: i64) -> Result<Option<AttractionDetail>> {
        if attraction_id == 7 {
            Ok(Some(AttractionDetail {
                id: 7,
                name: "仙寓洞".to_string(),
                description: Some("崖壁上的古洞".to_string()),
                category: Some("洞穴".to_string()),
                location: None,
                features: vec!["悬崖栈道".to_string()],
            }))
        } else {
            Ok(None)
        }
    }

    async fn text_content(&self, text_id: &str) -> Result<Option<String>> {
        Ok(self.texts.get(text_id).cloned())
    }

    async fn attraction_for_text(&self, text_id: &str) -> Result<Option<i64>> {
        Ok(self.text_owner.get(text_id).copied())
    }
}

/// Records graph statements and answers reads with canned text ids.
#[derive(Default)]
struct FakeExec {
    statements: Mutex<Vec<Statement>>,
    text_ids: Vec<String>,
}

impl FakeExec {
    fn with_text_ids(text_ids: Vec<String>) -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            text_ids,
        }
    }
}

#[async_trait]
impl GraphExec for FakeExec {
    async fn run(&self, statement: Statement) -> Result<()> {
        self.statements.lock().unwrap().push(statement);
        Ok(())
    }

    async fn fetch_ints(&self, statement: Statement, _column: &str) -> Result<Vec<i64>> {
        self.statements.lock().unwrap().push(statement);
        Ok(Vec::new())
    }

    async fn fetch_texts(&self, statement: Statement, _column: &str) -> Result<Vec<String>> {
        self.statements.lock().unwrap().push(statement);
        Ok(self.text_ids.clone())
    }

    async fn fetch_row(&self, statement: Statement, _columns: &[&str]) -> Result<Option<ValueRow>> {
        self.statements.lock().unwrap().push(statement);
        Ok(None)
    }
}

struct FakeChat {
    reply: Option<String>,
    last_messages: Mutex<Vec<Message>>,
}

impl FakeChat {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    fn broken() -> Self {
        Self {
            reply: None,
            last_messages: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(
        &self,
        messages: &[Message],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        *self.last_messages.lock().unwrap() = messages.to_vec();
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => anyhow::bail!("model endpoint unreachable"),
        }
    }
}

// --- Helpers ---

fn manual_clock() -> (Clock, Arc<AtomicI64>) {
    let offset = Arc::new(AtomicI64::new(0));
    let o = Arc::clone(&offset);
    let base = Utc::now();
    let clock: Clock = Arc::new(move || base + Duration::seconds(o.load(Ordering::SeqCst)));
    (clock, offset)
}

fn client_with(
    index: Arc<FakeIndex>,
    embedder: Arc<FakeEmbedder>,
    clock: Clock,
) -> VectorSearchClient {
    VectorSearchClient::with_caches(
        index,
        embedder,
        3,
        TtlCache::with_clock(100, Some(Duration::seconds(60)), clock.clone()),
        TtlCache::with_clock(100, Some(Duration::seconds(60)), clock),
    )
}

fn retriever_with(
    index: FakeIndex,
    graph: FakeGraph,
    clusters: FakeClusters,
) -> Arc<HybridRetriever> {
    let client = VectorSearchClient::new(Arc::new(index), Arc::new(FakeEmbedder::default()), 3);
    Arc::new(HybridRetriever::new(
        Arc::new(client),
        Arc::new(graph),
        Arc::new(clusters),
        EntityExtractor::new(None),
        "spot_knowledge",
    ))
}

fn service_with(index: Arc<FakeIndex>, exec: Arc<FakeExec>) -> SpotloreService {
    let vector = Arc::new(VectorSearchClient::new(
        index,
        Arc::new(FakeEmbedder::default()),
        3,
    ));
    let retriever = Arc::new(HybridRetriever::new(
        Arc::clone(&vector),
        Arc::new(FakeGraph::default()),
        Arc::new(FakeClusters::empty()),
        EntityExtractor::new(None),
        "spot_knowledge",
    ));
    SpotloreService {
        orchestrator: AnswerOrchestrator::new(
            Arc::clone(&retriever),
            Arc::new(FakeChat::replying("好的。")),
            audit_path(),
        ),
        retriever,
        cluster_builder: ClusterBuilder::with_exec(exec),
        sessions: Arc::new(InMemoryConversationStore::new()),
        vector,
        vector_collection: "spot_knowledge".to_string(),
    }
}

fn attraction_hit(id: i64, distance: f32) -> SearchHit {
    SearchHit::new(
        format!("p{id}"),
        format!("attraction:{id}"),
        None,
        distance,
    )
}

fn audit_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("audit-{}.jsonl", uuid::Uuid::new_v4()))
}

// --- Cache behavior ---

#[tokio::test]
async fn batch_embedding_is_reused_by_single_embed() {
    let (clock, _) = manual_clock();
    let embedder = Arc::new(FakeEmbedder::default());
    let client = client_with(
        Arc::new(FakeIndex::with_hits(Vec::new())),
        Arc::clone(&embedder),
        clock,
    );

    let texts = vec!["竹海".to_string(), "仙寓洞".to_string()];
    client.embed_batch(&texts).await.unwrap();
    assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);

    let v = client.embed("竹海").await.unwrap();
    assert_eq!(v, vector_for("竹海"));
    // Served from cache, not recomputed.
    assert_eq!(embedder.embed_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn embedding_cache_misses_after_ttl() {
    let (clock, offset) = manual_clock();
    let embedder = Arc::new(FakeEmbedder::default());
    let client = client_with(
        Arc::new(FakeIndex::with_hits(Vec::new())),
        Arc::clone(&embedder),
        clock,
    );

    client.embed("竹海").await.unwrap();
    assert_eq!(embedder.embed_calls.load(Ordering::SeqCst), 1);

    offset.store(61, Ordering::SeqCst);
    client.embed("竹海").await.unwrap();
    assert_eq!(embedder.embed_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn batch_sends_only_uncached_texts() {
    let (clock, _) = manual_clock();
    let embedder = Arc::new(FakeEmbedder::default());
    let client = client_with(
        Arc::new(FakeIndex::with_hits(Vec::new())),
        Arc::clone(&embedder),
        clock,
    );

    client.embed("竹海").await.unwrap();
    let vectors = client
        .embed_batch(&["竹海".to_string(), "观云台".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], vector_for("竹海"));
    assert_eq!(vectors[1], vector_for("观云台"));
    assert_eq!(*embedder.batch_sizes.lock().unwrap(), vec![1]);
}

// --- Not-loaded retry ---

#[tokio::test]
async fn not_loaded_triggers_exactly_one_reload_and_retry() {
    let (clock, _) = manual_clock();
    let index = Arc::new(FakeIndex::failing_not_loaded(
        vec![attraction_hit(7, 0.1)],
        1,
    ));
    let client = client_with(Arc::clone(&index), Arc::new(FakeEmbedder::default()), clock);

    let hits = client.search("介绍一下蜀南竹海", "spot_knowledge", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(index.search_calls.load(Ordering::SeqCst), 2);
    assert_eq!(index.load_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn persistent_not_loaded_fails_after_single_retry() {
    let (clock, _) = manual_clock();
    let index = Arc::new(FakeIndex::failing_not_loaded(Vec::new(), 10));
    let client = client_with(Arc::clone(&index), Arc::new(FakeEmbedder::default()), clock);

    let result = client.search("q", "spot_knowledge", 5).await;
    assert!(matches!(result, Err(VectorError::NotLoaded(_))));
    assert_eq!(index.search_calls.load(Ordering::SeqCst), 2);
    assert_eq!(index.load_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clear_loaded_forces_collection_recheck() {
    let (clock, _) = manual_clock();
    let index = Arc::new(FakeIndex::with_hits(Vec::new()));
    let client = client_with(Arc::clone(&index), Arc::new(FakeEmbedder::default()), clock);

    client.search("甲", "spot_knowledge", 5).await.unwrap();
    client.search("乙", "spot_knowledge", 5).await.unwrap();
    // Loaded-state membership is cached per collection.
    assert_eq!(index.create_calls.load(Ordering::SeqCst), 1);

    client.clear_loaded();
    client.search("甲", "spot_knowledge", 5).await.unwrap();
    assert_eq!(index.create_calls.load(Ordering::SeqCst), 2);
}

// --- Graph batching equivalence ---

#[tokio::test]
async fn search_many_matches_sequential_single_searches() {
    let graph = FakeGraph::default()
        .with_relation("A", "HAS_FEATURE", "竹林")
        .with_relation("B", "LOCATED_IN", "长宁县");

    let names = vec!["A".to_string(), "B".to_string()];
    let batched = graph.search_many(&names, None, 5).await.unwrap();

    let mut sequential = graph.search_one("A", None, 5).await.unwrap();
    sequential.extend(graph.search_one("B", None, 5).await.unwrap());

    assert_eq!(batched, sequential);
    assert!(batched.iter().any(|h| h.query_name == "A"));
    assert!(batched.iter().any(|h| h.query_name == "B"));
}

// --- Hybrid retrieval ---

#[tokio::test]
async fn vector_failure_degrades_and_graph_still_contributes() {
    init_logging();
    let graph = FakeGraph::default().with_relation("蜀南竹海", "HAS_FEATURE", "竹林");
    let retriever = retriever_with(FakeIndex::down(), graph, FakeClusters::empty());

    let output = retriever.retrieve("蜀南竹海，好玩吗", None).await;

    assert!(output.errors.contains_key("vector_search"));
    assert!(output.vector_results.is_empty());
    assert!(!output.graph_results.is_empty());
    assert!(output.enhanced_context.contains("蜀南竹海 -HAS_FEATURE-> 竹林"));
}

#[tokio::test]
async fn detail_query_expands_owning_cluster() {
    let index = FakeIndex::with_hits(vec![attraction_hit(7, 0.1)]);
    let retriever = retriever_with(index, FakeGraph::default(), FakeClusters::bamboo_sea());

    let output = retriever.retrieve("介绍一下仙寓洞", None).await;

    assert_eq!(output.primary_attraction_id, Some(7));
    assert_eq!(output.attraction_ids, vec![7]);
    // Expansion adds the spot enumeration and per-attraction detail.
    assert!(output.enhanced_context.contains("包含以下景点"));
    assert!(output.enhanced_context.contains("仙寓洞"));
    assert!(output.errors.is_empty());
}

#[tokio::test]
async fn which_spot_query_prepends_cluster_summary() {
    let index = FakeIndex::with_hits(vec![attraction_hit(7, 0.1)]);
    let retriever = retriever_with(index, FakeGraph::default(), FakeClusters::bamboo_sea());

    let output = retriever.retrieve("这是哪个景区", None).await;

    assert!(output.enhanced_context.starts_with("【景区】蜀南竹海"));
    assert!(output.enhanced_context.contains("四川省宜宾市长宁县"));
}

#[tokio::test]
async fn below_threshold_hits_are_dropped_entirely_without_force() {
    // General intent: threshold 0.45, force_at_least_one false. A hit at
    // distance 4.0 scores 0.2 and must vanish.
    let index = FakeIndex::with_hits(vec![attraction_hit(7, 4.0)]);
    let retriever = retriever_with(index, FakeGraph::default(), FakeClusters::empty());

    let output = retriever.retrieve("随便聊聊大熊猫", None).await;
    assert!(output.vector_results.is_empty());
    assert!(output.primary_attraction_id.is_none());
}

#[tokio::test]
async fn forced_intent_keeps_single_best_low_hit() {
    // Location intent forces at least one hit even below threshold.
    let index = FakeIndex::with_hits(vec![attraction_hit(7, 4.0), attraction_hit(8, 9.0)]);
    let retriever = retriever_with(index, FakeGraph::default(), FakeClusters::empty());

    let output = retriever.retrieve("仙寓洞在哪里", None).await;
    assert_eq!(output.vector_results.len(), 1);
    assert_eq!(output.primary_attraction_id, Some(7));
}

#[tokio::test]
async fn stored_text_hits_resolve_their_owning_attraction() {
    let mut clusters = FakeClusters::bamboo_sea();
    clusters
        .texts
        .insert("t-xianyu".to_string(), "仙寓洞开凿于明代".to_string());
    clusters.text_owner.insert("t-xianyu".to_string(), 7);
    let index = FakeIndex::with_hits(vec![SearchHit::new(
        "p1".to_string(),
        "t-xianyu".to_string(),
        None,
        0.1,
    )]);
    let retriever = retriever_with(index, FakeGraph::default(), clusters);

    let output = retriever.retrieve("介绍一下仙寓洞", None).await;

    // Hit payload carried no owner; the describes edge resolved it.
    assert_eq!(output.primary_attraction_id, Some(7));
    assert_eq!(output.attraction_ids, vec![7]);
    assert!(output.enhanced_context.contains("仙寓洞开凿于明代"));
}

// --- Two-store cascade deletes ---

#[tokio::test]
async fn attraction_cascade_purges_vector_entries_then_graph() {
    let index = Arc::new(FakeIndex::with_hits(Vec::new()));
    let exec = Arc::new(FakeExec::default());
    let service = service_with(Arc::clone(&index), Arc::clone(&exec));

    let report = service.cascade_delete_attraction(7).await;

    let deletes = index.deletes.lock().unwrap().clone();
    assert!(deletes.contains(&VectorFilter::AttractionId(7)));
    assert!(deletes.contains(&VectorFilter::TextId("attraction:7".to_string())));

    // Vector purge steps come before any graph step in the report.
    let purge = report
        .steps
        .iter()
        .position(|s| s.step == "purge_vector_entries")
        .unwrap();
    let root = report
        .steps
        .iter()
        .position(|s| s.step == "delete_root")
        .unwrap();
    assert!(purge < root);
    assert!(exec
        .statements
        .lock()
        .unwrap()
        .iter()
        .any(|s| s.cypher.contains("DETACH DELETE")));
}

#[tokio::test]
async fn spot_cascade_purges_each_describing_text() {
    let index = Arc::new(FakeIndex::with_hits(Vec::new()));
    let exec = Arc::new(FakeExec::with_text_ids(vec![
        "t-1".to_string(),
        "t-2".to_string(),
    ]));
    let service = service_with(Arc::clone(&index), Arc::clone(&exec));

    let report = service.cascade_delete_spot(&SpotKey::Id(1)).await;

    let deletes = index.deletes.lock().unwrap().clone();
    assert!(deletes.contains(&VectorFilter::TextId("t-1".to_string())));
    assert!(deletes.contains(&VectorFilter::TextId("t-2".to_string())));

    let purge = report
        .steps
        .iter()
        .position(|s| s.step == "purge_vector_entries")
        .unwrap();
    let root = report
        .steps
        .iter()
        .position(|s| s.step == "delete_root")
        .unwrap();
    assert!(purge < root);
}

// --- Answer orchestration ---

#[tokio::test]
async fn small_talk_skips_retrieval() {
    let retriever = retriever_with(
        FakeIndex::down(),
        FakeGraph::default(),
        FakeClusters::empty(),
    );
    let chat = Arc::new(FakeChat::replying("你好呀，欢迎来到蜀南竹海。"));
    let orchestrator = AnswerOrchestrator::new(retriever, Arc::clone(&chat) as Arc<dyn ChatModel>, audit_path());

    let output = orchestrator.answer("你好", &[], None, true).await;

    assert_eq!(output.context, NO_CONTEXT_MARKER);
    assert!(output.primary_attraction_id.is_none());
    assert_eq!(output.answer, "你好呀，欢迎来到蜀南竹海。");
}

#[tokio::test]
async fn model_failure_returns_fixed_apology() {
    init_logging();
    let retriever = retriever_with(
        FakeIndex::with_hits(Vec::new()),
        FakeGraph::default(),
        FakeClusters::empty(),
    );
    let orchestrator =
        AnswerOrchestrator::new(retriever, Arc::new(FakeChat::broken()), audit_path());

    let output = orchestrator.answer("介绍一下蜀南竹海", &[], None, true).await;
    assert!(output.answer.starts_with("抱歉"));
}

#[tokio::test]
async fn listing_query_gets_enumeration_top_up() {
    // No vector hits at all, so expansion never runs; the listing top-up
    // must still find the spot through the extracted entity name.
    let mut clusters = FakeClusters::bamboo_sea();
    clusters.match_any_name = true;
    let retriever = retriever_with(FakeIndex::with_hits(Vec::new()), FakeGraph::default(), clusters);
    let chat = Arc::new(FakeChat::replying("一共有两个景点。"));
    let orchestrator = AnswerOrchestrator::new(retriever, chat, audit_path());

    let output = orchestrator
        .answer("这个景区有多少个景点", &[], None, true)
        .await;

    assert!(output.context.contains("包含以下景点"));
}

#[tokio::test]
async fn audit_log_keeps_last_five_records() {
    let retriever = retriever_with(
        FakeIndex::with_hits(Vec::new()),
        FakeGraph::default(),
        FakeClusters::empty(),
    );
    let chat = Arc::new(FakeChat::replying("好的。"));
    let path = audit_path();
    let orchestrator = AnswerOrchestrator::new(retriever, chat, path.clone());

    for i in 0..7 {
        orchestrator
            .answer(&format!("第{i}个问题"), &[], None, false)
            .await;
    }

    let body = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 5);
    // Oldest two were dropped.
    assert!(lines[0].contains("第2个问题"));
    assert!(lines[4].contains("第6个问题"));
    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn persona_and_context_reach_the_model() {
    let index = FakeIndex::with_hits(vec![attraction_hit(7, 0.1)]);
    let retriever = retriever_with(index, FakeGraph::default(), FakeClusters::bamboo_sea());
    let chat = Arc::new(FakeChat::replying("仙寓洞在悬崖上。"));
    let orchestrator = AnswerOrchestrator::new(retriever, Arc::clone(&chat) as Arc<dyn ChatModel>, audit_path());

    orchestrator
        .answer("介绍一下仙寓洞", &[], Some("熊猫向导"), true)
        .await;

    let messages = chat.last_messages.lock().unwrap();
    assert!(messages[0].content.contains("熊猫向导"));
    let user_turn = &messages.last().unwrap().content;
    assert!(user_turn.contains("介绍一下仙寓洞"));
    assert!(user_turn.contains("包含以下景点"));
}
