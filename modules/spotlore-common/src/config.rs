use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Neo4j
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    // Vector index
    pub qdrant_url: String,
    pub vector_collection: String,
    pub vector_dim: u64,

    // LLM / embeddings (OpenAI-compatible endpoints)
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub embedding_api_key: String,
    pub embedding_base_url: String,
    pub embedding_model: String,

    // Answer audit log
    pub audit_log_path: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            neo4j_uri: required_env("NEO4J_URI"),
            neo4j_user: required_env("NEO4J_USER"),
            neo4j_password: required_env("NEO4J_PASSWORD"),
            qdrant_url: required_env("QDRANT_URL"),
            vector_collection: env::var("VECTOR_COLLECTION")
                .unwrap_or_else(|_| "spot_knowledge".to_string()),
            vector_dim: env::var("VECTOR_DIM")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .expect("VECTOR_DIM must be a number"),
            llm_api_key: required_env("LLM_API_KEY"),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_api_key: env::var("EMBEDDING_API_KEY")
                .unwrap_or_else(|_| required_env("LLM_API_KEY")),
            embedding_base_url: env::var("EMBEDDING_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-large".to_string()),
            audit_log_path: env::var("AUDIT_LOG_PATH")
                .unwrap_or_else(|_| "answer_audit.jsonl".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
