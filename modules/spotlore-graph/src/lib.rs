pub mod client;
pub mod cluster;
pub mod exec;
pub mod location;
pub mod name;
pub mod reader;
pub mod search;

pub use client::GraphClient;
pub use cluster::{BuildReport, ClusterBuilder, StepOutcome};
pub use exec::{CypherValue, GraphExec, Statement, ValueRow};
pub use reader::ClusterReader;
pub use search::{GraphSearcher, RelationType};
