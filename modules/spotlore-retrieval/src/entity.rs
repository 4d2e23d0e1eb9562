//! Candidate entity extraction from queries and stored prose.
//!
//! The primary path runs a part-of-speech tagger when one is wired in; the
//! fallback is a contiguous-CJK regex. Both paths filter through the same
//! stop-word set and de-duplicate by surface form, keeping the highest
//! confidence seen for each.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::debug;

use spotlore_common::{Entity, EntityKind};

const TAGGED_CONFIDENCE: f32 = 0.8;
const FALLBACK_CONFIDENCE: f32 = 0.6;

/// One segmented token with its part-of-speech tag.
#[derive(Debug, Clone)]
pub struct TaggedWord {
    pub word: String,
    pub tag: String,
}

/// Part-of-speech segmentation seam. Implementations may shell out to an
/// external segmenter; extraction falls back to the regex path when no
/// tagger is configured or tagging fails.
pub trait PosTagger: Send + Sync {
    fn tag(&self, text: &str) -> anyhow::Result<Vec<TaggedWord>>;
}

pub struct EntityExtractor {
    tagger: Option<Arc<dyn PosTagger>>,
}

impl EntityExtractor {
    pub fn new(tagger: Option<Arc<dyn PosTagger>>) -> Self {
        Self { tagger }
    }

    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let raw = match &self.tagger {
            Some(tagger) => match tagger.tag(text) {
                Ok(words) => tagged_entities(&words),
                Err(e) => {
                    debug!(error = %e, "tagger failed, using regex fallback");
                    fallback_entities(text)
                }
            },
            None => fallback_entities(text),
        };
        dedupe_by_surface(raw)
    }
}

fn tagged_entities(words: &[TaggedWord]) -> Vec<Entity> {
    words
        .iter()
        .filter(|w| w.word.chars().count() >= 2 && !is_stop_word(&w.word))
        .map(|w| Entity {
            text: w.word.clone(),
            kind: kind_for_tag(&w.tag),
            confidence: TAGGED_CONFIDENCE,
        })
        .collect()
}

/// Segmenter tag prefixes: ns place, nr person, nt organization, nz other
/// proper noun; anything else is a plain keyword.
fn kind_for_tag(tag: &str) -> EntityKind {
    if tag.starts_with("ns") {
        EntityKind::Location
    } else if tag.starts_with("nr") {
        EntityKind::Person
    } else if tag.starts_with("nt") {
        EntityKind::Org
    } else if tag.starts_with("nz") {
        EntityKind::Other
    } else {
        EntityKind::Keyword
    }
}

fn fallback_entities(text: &str) -> Vec<Entity> {
    static CJK_RUN: OnceLock<Regex> = OnceLock::new();
    let re = CJK_RUN.get_or_init(|| Regex::new(r"[\x{4e00}-\x{9fa5}]{2,}").unwrap());
    re.find_iter(text)
        .map(|m| m.as_str())
        .filter(|run| !is_stop_word(run))
        .map(|run| Entity {
            text: run.to_string(),
            kind: EntityKind::Keyword,
            confidence: FALLBACK_CONFIDENCE,
        })
        .collect()
}

/// Merge entity lists, keeping one entry per surface form with the highest
/// confidence seen. First-seen order is preserved.
pub fn dedupe_by_surface(entities: Vec<Entity>) -> Vec<Entity> {
    let mut best: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Entity> = Vec::new();
    for entity in entities {
        match best.get(&entity.text) {
            Some(&idx) => {
                if entity.confidence > out[idx].confidence {
                    out[idx] = entity;
                }
            }
            None => {
                best.insert(entity.text.clone(), out.len());
                out.push(entity);
            }
        }
    }
    out
}

fn is_stop_word(word: &str) -> bool {
    static STOP_WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    let set = STOP_WORDS.get_or_init(|| {
        [
            "什么", "哪里", "哪儿", "怎么", "怎样", "可以", "这个", "那个", "这里",
            "那里", "我们", "你们", "他们", "现在", "时候", "知道", "介绍", "一下",
            "以及", "还有", "没有", "多少", "几个", "哪些", "请问", "谢谢", "景区",
            "景点", "地方", "位于", "地址",
        ]
        .into_iter()
        .collect()
    });
    set.contains(word)
}
