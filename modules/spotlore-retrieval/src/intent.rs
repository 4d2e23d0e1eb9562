//! Intent classification and per-intent retrieval strategy.
//!
//! The strategy table is the single place where recall/precision tradeoffs
//! are tuned per intent. Classification is ordered pattern matching: route
//! and listing run before the more generic detail/feature checks, first
//! match wins, blank input falls through to general.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Caller-facing default `top_k`. An explicit override equal to this value
/// is treated as "not overridden" and the strategy's own `top_k` applies.
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Route,
    Listing,
    Detail,
    Comparison,
    Location,
    Feature,
    General,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Route => "route",
            QueryIntent::Listing => "listing",
            QueryIntent::Detail => "detail",
            QueryIntent::Comparison => "comparison",
            QueryIntent::Location => "location",
            QueryIntent::Feature => "feature",
            QueryIntent::General => "general",
        }
    }
}

/// Retrieval parameters resolved from an intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub top_k: usize,
    pub relevance_threshold: f32,
    pub graph_depth: u8,
    pub expand_cluster: bool,
    pub max_items: usize,
    pub force_at_least_one: bool,
}

impl QueryIntent {
    /// Classify a raw query. Order matters: route and listing phrasings are
    /// specific and must win over the broad detail/feature patterns.
    pub fn classify(query: &str) -> Self {
        let query = query.trim();
        if query.is_empty() {
            return QueryIntent::General;
        }
        for (intent, pattern) in patterns() {
            if pattern.is_match(query) {
                return *intent;
            }
        }
        QueryIntent::General
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            QueryIntent::Route => Strategy {
                top_k: 5,
                relevance_threshold: 0.35,
                graph_depth: 2,
                expand_cluster: false,
                max_items: 3,
                force_at_least_one: true,
            },
            QueryIntent::Listing => Strategy {
                top_k: 8,
                relevance_threshold: 0.30,
                graph_depth: 1,
                expand_cluster: true,
                max_items: 10,
                force_at_least_one: true,
            },
            QueryIntent::Detail => Strategy {
                top_k: 5,
                relevance_threshold: 0.40,
                graph_depth: 2,
                expand_cluster: true,
                max_items: 5,
                force_at_least_one: true,
            },
            QueryIntent::Comparison => Strategy {
                top_k: 8,
                relevance_threshold: 0.35,
                graph_depth: 2,
                expand_cluster: false,
                max_items: 6,
                force_at_least_one: false,
            },
            QueryIntent::Location => Strategy {
                top_k: 3,
                relevance_threshold: 0.40,
                graph_depth: 1,
                expand_cluster: false,
                max_items: 3,
                force_at_least_one: true,
            },
            QueryIntent::Feature => Strategy {
                top_k: 6,
                relevance_threshold: 0.35,
                graph_depth: 2,
                expand_cluster: true,
                max_items: 5,
                force_at_least_one: false,
            },
            QueryIntent::General => Strategy {
                top_k: 5,
                relevance_threshold: 0.45,
                graph_depth: 1,
                expand_cluster: false,
                max_items: 3,
                force_at_least_one: false,
            },
        }
    }
}

fn patterns() -> &'static [(QueryIntent, Regex)] {
    static PATTERNS: OnceLock<Vec<(QueryIntent, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: &[(QueryIntent, &str)] = &[
            (
                QueryIntent::Route,
                r"怎么走|怎么去|怎样去|路线|导航|从.+到",
            ),
            (
                QueryIntent::Listing,
                r"有多少|有哪些|有几个|几个景点|都有什么|列举",
            ),
            (
                QueryIntent::Comparison,
                r"对比|比较|区别|和.+哪个|跟.+哪个",
            ),
            (
                QueryIntent::Location,
                r"在哪里|在哪儿|在哪|什么地方|地址|位于",
            ),
            (
                QueryIntent::Feature,
                r"特色|特点|好玩|有名|著名|亮点|值得",
            ),
            (
                QueryIntent::Detail,
                r"介绍|详细|是什么|讲讲|讲一下|说说|简介|历史",
            ),
        ];
        table
            .iter()
            .map(|(intent, pat)| (*intent, Regex::new(pat).unwrap()))
            .collect()
    })
}
