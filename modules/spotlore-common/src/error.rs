use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpotloreError {
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
