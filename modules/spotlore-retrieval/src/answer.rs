//! Turns fused retrieval context into a sanitized, persona-voiced answer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use llm_client::{ChatModel, Message};

use crate::intent::QueryIntent;
use crate::retriever::{HybridRetriever, RetrievalOutput};
use crate::session::Turn;

/// Context marker substituted when retrieval is skipped entirely.
pub const NO_CONTEXT_MARKER: &str = "无需检索";

/// Fixed degraded answer when the language model call fails.
const FALLBACK_ANSWER: &str = "抱歉，我这边暂时出了点小状况，请稍后再问我一次。";

/// Audit log keeps only this many most recent records.
const AUDIT_CAP: usize = 5;

const ANSWER_AUDIT_TRUNCATE: usize = 200;

const BASE_SYSTEM_PROMPT: &str = "你是一位热情专业的景区导览员，\
根据提供的参考资料回答游客的问题。资料不足时坦诚说明，不要编造。\
回答使用简体中文，口语自然，不要提及参考资料、检索或任何内部编号。";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutput {
    pub answer: String,
    pub primary_attraction_id: Option<i64>,
    pub context: String,
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    query: &'a str,
    persona: Option<&'a str>,
    use_rag: bool,
    retrieval: serde_json::Value,
    answer: String,
}

pub struct AnswerOrchestrator {
    retriever: Arc<HybridRetriever>,
    model: Arc<dyn ChatModel>,
    audit_path: PathBuf,
}

impl AnswerOrchestrator {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        model: Arc<dyn ChatModel>,
        audit_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            retriever,
            model,
            audit_path: audit_path.into(),
        }
    }

    pub async fn answer(
        &self,
        query: &str,
        history: &[Turn],
        persona: Option<&str>,
        use_rag: bool,
    ) -> AnswerOutput {
        let retrieval = if use_rag && !is_small_talk(query) {
            let retrieval = self.retrieve_with_listing_top_up(query).await;
            log_retrieval_failures(&retrieval.errors);
            Some(retrieval)
        } else {
            None
        };

        let (context, primary_attraction_id) = match &retrieval {
            Some(r) => (r.enhanced_context.clone(), r.primary_attraction_id),
            None => (NO_CONTEXT_MARKER.to_string(), None),
        };

        let intent = retrieval.as_ref().map(|r| r.intent);
        let messages = build_messages(query, history, persona, intent, &context);

        let answer = match self.model.complete(&messages, 0.7, 800).await {
            Ok(raw) => sanitize_answer(&raw),
            Err(e) => {
                warn!(error = %e, "language model call failed, returning fallback");
                FALLBACK_ANSWER.to_string()
            }
        };

        self.append_audit(query, persona, use_rag, &retrieval, &answer)
            .await;

        info!(
            use_rag,
            intent = intent.map(|i| i.as_str()).unwrap_or("skipped"),
            answer_len = answer.chars().count(),
            "answer produced"
        );

        AnswerOutput {
            answer,
            primary_attraction_id,
            context,
        }
    }

    /// Run retrieval; listing queries that came back without an attraction
    /// enumeration get one extra cluster lookup appended.
    async fn retrieve_with_listing_top_up(&self, query: &str) -> RetrievalOutput {
        let mut retrieval = self.retriever.retrieve(query, None).await;
        if retrieval.intent == QueryIntent::Listing
            && !retrieval.enhanced_context.contains("包含以下景点")
        {
            if let Some(line) = self.lookup_enumeration(&retrieval).await {
                if retrieval.enhanced_context.is_empty() {
                    retrieval.enhanced_context = line;
                } else {
                    retrieval.enhanced_context =
                        format!("{}\n\n{}", retrieval.enhanced_context, line);
                }
            }
        }
        retrieval
    }

    async fn lookup_enumeration(&self, retrieval: &RetrievalOutput) -> Option<String> {
        self.retriever
            .spot_enumeration(retrieval.primary_attraction_id, &retrieval.entities)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "listing top-up lookup failed");
                None
            })
    }

    /// One JSON object per line, capped to the last few records.
    async fn append_audit(
        &self,
        query: &str,
        persona: Option<&str>,
        use_rag: bool,
        retrieval: &Option<RetrievalOutput>,
        answer: &str,
    ) {
        let record = AuditRecord {
            timestamp: Utc::now().to_rfc3339(),
            query,
            persona,
            use_rag,
            retrieval: retrieval
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok())
                .unwrap_or(serde_json::Value::Null),
            answer: answer.chars().take(ANSWER_AUDIT_TRUNCATE).collect(),
        };
        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };

        let existing = tokio::fs::read_to_string(&self.audit_path)
            .await
            .unwrap_or_default();
        let mut lines: Vec<&str> = existing.lines().filter(|l| !l.is_empty()).collect();
        lines.push(&line);
        if lines.len() > AUDIT_CAP {
            lines.drain(0..lines.len() - AUDIT_CAP);
        }
        let body = lines.join("\n") + "\n";
        if let Err(e) = tokio::fs::write(&self.audit_path, body).await {
            warn!(path = %self.audit_path.display(), error = %e, "audit write failed");
        }
    }
}

/// Small-talk needs no retrieval: greetings, thanks, farewells, identity.
/// Every alternative spans the whole query, so a thanks followed by a real
/// question still goes through retrieval.
pub fn is_small_talk(query: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^(你好|您好|嗨|哈喽|hi|hello|早上好|下午好|晚上好)[!！。~～\s]*$
            |^(谢谢|多谢|感谢)[\x{4e00}-\x{9fa5}]{0,5}[!！。~～\s]*$
            |^(再见|拜拜)[!！。~～\s]*$
            |^(你是谁|你叫什么)[\x{4e00}-\x{9fa5}]{0,2}[?？!！。\s]*$",
        )
        .unwrap()
    });
    re.is_match(query.trim())
}

fn build_messages(
    query: &str,
    history: &[Turn],
    persona: Option<&str>,
    intent: Option<QueryIntent>,
    context: &str,
) -> Vec<Message> {
    let system = match persona {
        Some(persona) if !persona.trim().is_empty() => {
            format!("{BASE_SYSTEM_PROMPT}\n\n你的人设：{persona}")
        }
        _ => BASE_SYSTEM_PROMPT.to_string(),
    };

    let mut messages = vec![Message::system(system)];
    for turn in history {
        match turn.role.as_str() {
            "assistant" => messages.push(Message::assistant(turn.content.clone())),
            _ => messages.push(Message::user(turn.content.clone())),
        }
    }

    let hint = intent.map(intent_hint).unwrap_or("自然地回应游客。");
    messages.push(Message::user(format!(
        "游客问题：{query}\n\n回答要求：{hint}\n\n参考资料：\n{context}"
    )));
    messages
}

fn intent_hint(intent: QueryIntent) -> &'static str {
    match intent {
        QueryIntent::Route => "给出清晰的路线指引，按顺序说明怎么走。",
        QueryIntent::Listing => "完整列出相关景点，不要遗漏资料中提到的条目。",
        QueryIntent::Detail => "做一段生动的介绍，突出资料中的具体信息。",
        QueryIntent::Comparison => "逐项对比两者的异同，最后给出建议。",
        QueryIntent::Location => "先直接说出位置，再补充必要的周边信息。",
        QueryIntent::Feature => "重点讲特色和亮点，让游客有兴趣前往。",
        QueryIntent::General => "自然地回应游客。",
    }
}

/// Strip leaked internal identifiers, emoji, and markdown decoration from a
/// model answer, and guarantee terminal punctuation.
pub fn sanitize_answer(raw: &str) -> String {
    static INTERNAL_ID: OnceLock<Regex> = OnceLock::new();
    static EMOJI: OnceLock<Regex> = OnceLock::new();
    static MARKDOWN: OnceLock<Regex> = OnceLock::new();

    let internal_id = INTERNAL_ID.get_or_init(|| {
        Regex::new(r"attraction:\d+|text[-_][0-9a-fA-F-]{8,}|\b[0-9a-f]{32,}\b").unwrap()
    });
    let emoji = EMOJI.get_or_init(|| {
        Regex::new(r"[\x{1F300}-\x{1FAFF}\x{2600}-\x{27BF}\x{FE0F}\x{2B00}-\x{2BFF}]").unwrap()
    });
    let markdown = MARKDOWN.get_or_init(|| Regex::new(r"[*#`_]{1,3}|^\s*[-•]\s*").unwrap());

    let mut text = internal_id.replace_all(raw, "").to_string();
    text = emoji.replace_all(&text, "").to_string();
    let cleaned: Vec<String> = text
        .lines()
        .map(|line| markdown.replace_all(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    let mut text = cleaned.join("\n");

    if let Some(last) = text.chars().last() {
        if !"。！？.!?…".contains(last) {
            text.push('。');
        }
    }
    text
}

/// Diagnostics view over a retrieval errors map for logging.
pub fn log_retrieval_failures(errors: &HashMap<String, String>) {
    for (operation, reason) in errors {
        warn!(operation = operation.as_str(), reason = reason.as_str(), "retrieval sub-operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_talk_matches_closed_set() {
        assert!(is_small_talk("你好"));
        assert!(is_small_talk("你好！"));
        assert!(is_small_talk("谢谢你的介绍"));
        assert!(is_small_talk("再见"));
        assert!(is_small_talk("你是谁"));
        assert!(is_small_talk("你叫什么名字"));
        assert!(!is_small_talk("蜀南竹海在哪里"));
        assert!(!is_small_talk("介绍一下蜀南竹海"));
    }

    #[test]
    fn thanks_followed_by_a_question_still_retrieves() {
        assert!(!is_small_talk("谢谢，再问一下蜀南竹海在哪里"));
        assert!(!is_small_talk("感谢大家这次蜀南竹海一日游的配合"));
        assert!(!is_small_talk("你是谁的导游"));
        assert!(!is_small_talk("再见面时带我去仙寓洞吧"));
    }

    #[test]
    fn sanitizer_strips_internal_ids() {
        let out = sanitize_answer("这里是attraction:42号景点，编号text-0a1b2c3d4e。");
        assert!(!out.contains("attraction:"));
        assert!(!out.contains("text-"));
    }

    #[test]
    fn sanitizer_strips_emoji_and_markdown() {
        let out = sanitize_answer("**蜀南竹海**很美🎋\n# 亮点\n- 竹林小道");
        assert!(!out.contains('*'));
        assert!(!out.contains('#'));
        assert!(!out.contains('🎋'));
        assert!(!out.contains('-'));
        assert!(out.contains("蜀南竹海很美"));
    }

    #[test]
    fn sanitizer_guarantees_terminal_punctuation() {
        assert!(sanitize_answer("竹海很美").ends_with('。'));
        assert!(sanitize_answer("竹海很美！").ends_with('！'));
    }

    #[test]
    fn persona_lands_in_system_prompt() {
        let messages = build_messages("问题", &[], Some("活泼的熊猫向导"), None, "ctx");
        assert!(messages[0].content.contains("活泼的熊猫向导"));
    }

    #[test]
    fn history_turns_precede_the_query() {
        let history = vec![
            Turn {
                role: "user".into(),
                content: "第一问".into(),
                at: Utc::now(),
            },
            Turn {
                role: "assistant".into(),
                content: "第一答".into(),
                at: Utc::now(),
            },
        ];
        let messages = build_messages("第二问", &history, None, Some(QueryIntent::Detail), "ctx");
        assert_eq!(messages.len(), 4);
        assert!(messages[3].content.contains("第二问"));
        assert!(messages[3].content.contains("ctx"));
    }
}
