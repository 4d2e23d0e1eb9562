pub mod config;
pub mod contracts;
pub mod error;
pub mod types;

pub use config::Config;
pub use contracts::{ClusterRead, GraphSearch};
pub use error::SpotloreError;
pub use types::*;
