//! Typed statement seam over the graph driver.
//!
//! Cluster maintenance issues sequences of parameterized write statements.
//! Routing them through this trait lets tests assert the emitted sequences
//! against an in-memory recorder, while `GraphClient` carries them to the
//! live store.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::GraphClient;

/// A parameter value carried by a [`Statement`].
#[derive(Debug, Clone, PartialEq)]
pub enum CypherValue {
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    StrList(Vec<String>),
}

impl From<i64> for CypherValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for CypherValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for CypherValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for CypherValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<i64>> for CypherValue {
    fn from(v: Vec<i64>) -> Self {
        Self::IntList(v)
    }
}

impl From<Vec<String>> for CypherValue {
    fn from(v: Vec<String>) -> Self {
        Self::StrList(v)
    }
}

/// One parameterized Cypher statement. Parameters keep insertion order so
/// two statements built the same way compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cypher: String,
    pub params: Vec<(String, CypherValue)>,
}

impl Statement {
    pub fn new(cypher: impl Into<String>) -> Self {
        Self {
            cypher: cypher.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<CypherValue>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    fn to_query(&self) -> neo4rs::Query {
        let mut q = neo4rs::query(&self.cypher);
        for (name, value) in &self.params {
            q = match value {
                CypherValue::Int(v) => q.param(name.as_str(), *v),
                CypherValue::Float(v) => q.param(name.as_str(), *v),
                CypherValue::Str(v) => q.param(name.as_str(), v.as_str()),
                CypherValue::IntList(v) => q.param(name.as_str(), v.clone()),
                CypherValue::StrList(v) => q.param(name.as_str(), v.clone()),
            };
        }
        q
    }
}

/// A single fetched row, reduced to the typed values callers read.
#[derive(Debug, Clone, Default)]
pub struct ValueRow {
    values: HashMap<String, CypherValue>,
}

impl ValueRow {
    pub fn with(mut self, column: &str, value: impl Into<CypherValue>) -> Self {
        self.values.insert(column.to_string(), value.into());
        self
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        match self.values.get(column) {
            Some(CypherValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, column: &str) -> Option<String> {
        match self.values.get(column) {
            Some(CypherValue::Str(v)) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Statement execution seam consumed by the cluster builder.
#[async_trait]
pub trait GraphExec: Send + Sync {
    /// Execute a write statement, discarding any result rows.
    async fn run(&self, statement: Statement) -> Result<()>;

    /// Collect an integer column from every result row.
    async fn fetch_ints(&self, statement: Statement, column: &str) -> Result<Vec<i64>>;

    /// Collect a non-empty string column from every result row.
    async fn fetch_texts(&self, statement: Statement, column: &str) -> Result<Vec<String>>;

    /// Fetch the first result row, keeping the named columns.
    async fn fetch_row(&self, statement: Statement, columns: &[&str]) -> Result<Option<ValueRow>>;
}

#[async_trait]
impl GraphExec for GraphClient {
    async fn run(&self, statement: Statement) -> Result<()> {
        self.graph.run(statement.to_query()).await?;
        Ok(())
    }

    async fn fetch_ints(&self, statement: Statement, column: &str) -> Result<Vec<i64>> {
        let mut out = Vec::new();
        let mut stream = self.graph.execute(statement.to_query()).await?;
        while let Some(row) = stream.next().await? {
            if let Ok(v) = row.get::<i64>(column) {
                out.push(v);
            }
        }
        Ok(out)
    }

    async fn fetch_texts(&self, statement: Statement, column: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut stream = self.graph.execute(statement.to_query()).await?;
        while let Some(row) = stream.next().await? {
            let v: String = row.get(column).unwrap_or_default();
            if !v.is_empty() {
                out.push(v);
            }
        }
        Ok(out)
    }

    async fn fetch_row(&self, statement: Statement, columns: &[&str]) -> Result<Option<ValueRow>> {
        let mut stream = self.graph.execute(statement.to_query()).await?;
        if let Some(row) = stream.next().await? {
            let mut out = ValueRow::default();
            for column in columns {
                if let Ok(v) = row.get::<i64>(column) {
                    out = out.with(column, v);
                } else if let Ok(v) = row.get::<String>(column) {
                    out = out.with(column, v);
                }
            }
            return Ok(Some(out));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_params_keep_insertion_order() {
        let s = Statement::new("RETURN 1").param("a", 1i64).param("b", "x");
        assert_eq!(s.params[0].0, "a");
        assert_eq!(s.params[1].1, CypherValue::Str("x".into()));
    }

    #[test]
    fn identical_builds_compare_equal() {
        let a = Statement::new("MATCH (n) RETURN n").param("k", 7i64);
        let b = Statement::new("MATCH (n) RETURN n").param("k", 7i64);
        assert_eq!(a, b);
    }

    #[test]
    fn row_getters_are_typed() {
        let row = ValueRow::default().with("n", 7i64).with("name", "竹海");
        assert_eq!(row.int("n"), Some(7));
        assert_eq!(row.text("name"), Some("竹海".into()));
        assert_eq!(row.int("name"), None);
        assert_eq!(row.text("missing"), None);
    }
}
