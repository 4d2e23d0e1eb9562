pub mod answer;
pub mod cache;
pub mod entity;
pub mod intent;
pub mod qdrant;
pub mod retriever;
pub mod service;
pub mod session;
pub mod vector;

pub use answer::{AnswerOrchestrator, AnswerOutput, NO_CONTEXT_MARKER};
pub use cache::{CacheStats, TtlCache};
pub use entity::{EntityExtractor, PosTagger, TaggedWord};
pub use intent::{QueryIntent, Strategy, DEFAULT_TOP_K};
pub use qdrant::QdrantIndex;
pub use retriever::{HybridRetriever, RetrievalOutput, ScoredText};
pub use service::SpotloreService;
pub use session::{ConversationStore, InMemoryConversationStore, Turn};
pub use vector::{
    LoadState, SearchHit, VectorError, VectorFilter, VectorIndex, VectorRecord,
    VectorSearchClient,
};
