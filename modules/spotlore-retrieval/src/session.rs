//! In-memory conversation store with TTL and per-session turn trimming.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{system_clock, Clock};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 1800;
const DEFAULT_MAX_TURNS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Narrow session-store contract; the core only reads and appends turns.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self) -> String;
    async fn get(&self, session_id: &str) -> Option<Vec<Turn>>;
    async fn append(&self, session_id: &str, role: &str, content: &str);
}

struct Session {
    turns: Vec<Turn>,
    last_seen: DateTime<Utc>,
}

pub struct InMemoryConversationStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
    max_turns: usize,
    clock: Clock,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::with_clock(
            Duration::seconds(DEFAULT_SESSION_TTL_SECONDS),
            DEFAULT_MAX_TURNS,
            system_clock(),
        )
    }

    pub fn with_clock(ttl: Duration, max_turns: usize, clock: Clock) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_turns: max_turns.max(1),
            clock,
        }
    }

    fn evict_expired(&self, sessions: &mut HashMap<String, Session>, now: DateTime<Utc>) {
        sessions.retain(|_, s| now - s.last_seen < self.ttl);
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let now = (self.clock)();
        let mut sessions = self.sessions.lock().unwrap();
        self.evict_expired(&mut sessions, now);
        sessions.insert(
            id.clone(),
            Session {
                turns: Vec::new(),
                last_seen: now,
            },
        );
        id
    }

    async fn get(&self, session_id: &str) -> Option<Vec<Turn>> {
        let now = (self.clock)();
        let mut sessions = self.sessions.lock().unwrap();
        self.evict_expired(&mut sessions, now);
        sessions.get_mut(session_id).map(|s| {
            s.last_seen = now;
            s.turns.clone()
        })
    }

    async fn append(&self, session_id: &str, role: &str, content: &str) {
        let now = (self.clock)();
        let mut sessions = self.sessions.lock().unwrap();
        self.evict_expired(&mut sessions, now);
        let session = sessions.entry(session_id.to_string()).or_insert(Session {
            turns: Vec::new(),
            last_seen: now,
        });
        session.last_seen = now;
        session.turns.push(Turn {
            role: role.to_string(),
            content: content.to_string(),
            at: now,
        });
        // Keep only the most recent turns.
        if session.turns.len() > self.max_turns {
            let excess = session.turns.len() - self.max_turns;
            session.turns.drain(0..excess);
        }
    }
}
