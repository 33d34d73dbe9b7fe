//! Constrained example-sentence generation for one vocabulary row.
//!
//! The model is asked for a JSON object; its reply is decoded with a strict
//! parse followed by a single retry on the outermost `{...}` span. A sentence
//! that does not contain the target word is logged and kept.

mod prompt;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::errors::PipelineError;
use crate::core::llm::{self, LlmProvider, TextRequest};
use crate::core::vocab::VocabularyEntry;
use crate::core::vocab::known_set::grammar_whitelist;

pub use prompt::build_sentence_messages;

/// Decoded model output for one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedSentence {
    pub sentence: String,
    pub translation: String,
    pub transliteration: String,
    pub explanation: String,
}

#[async_trait]
pub trait SentenceGenerator: Send + Sync {
    async fn generate(
        &self,
        entry: &VocabularyEntry,
        known: &BTreeSet<String>,
    ) -> Result<GeneratedSentence>;
}

pub struct TextGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    reasoning_effort: Option<String>,
    whitelist: BTreeSet<String>,
}

impl TextGenerator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: String,
        reasoning_effort: Option<String>,
    ) -> Self {
        Self {
            provider,
            model,
            reasoning_effort,
            whitelist: grammar_whitelist(),
        }
    }
}

#[async_trait]
impl SentenceGenerator for TextGenerator {
    async fn generate(
        &self,
        entry: &VocabularyEntry,
        known: &BTreeSet<String>,
    ) -> Result<GeneratedSentence> {
        let request = TextRequest {
            model: self.model.clone(),
            messages: build_sentence_messages(entry, known, &self.whitelist),
            reasoning_effort: self.reasoning_effort.clone(),
        };
        let response = self.provider.respond(&request).await?;
        if let Some(message) = llm::error_message(&response) {
            return Err(PipelineError::GenerationApi(message).into());
        }
        let raw = llm::extract_text(&response);
        let generated = parse_generated(&raw)?;
        check_contains_target(entry, &generated);
        Ok(generated)
    }
}

/// Decode a JSON object from model text.
///
/// Strict parse first; on failure, one retry on the substring from the first
/// `{` to the last `}`. An array yields its first element. Anything that is
/// not an object in the end is `None`.
pub fn recover_json(raw: &str) -> Option<Map<String, Value>> {
    let value = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(v) => v,
        Err(_) => {
            let start = raw.find('{')?;
            let end = raw.rfind('}')?;
            if end <= start {
                return None;
            }
            serde_json::from_str::<Value>(&raw[start..=end]).ok()?
        }
    };
    let value = match value {
        Value::Array(items) => items.into_iter().next()?,
        other => other,
    };
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

pub fn parse_generated(raw: &str) -> Result<GeneratedSentence, PipelineError> {
    let map = recover_json(raw).ok_or_else(|| PipelineError::parse_failure(raw))?;
    Ok(GeneratedSentence {
        sentence: field(&map, &["sentence_jp", "sentence"]),
        translation: field(&map, &["sentence_en", "translation"]),
        transliteration: field(&map, &["sentence_romaji", "romaji", "transliteration"]),
        explanation: field(&map, &["explanation"]),
    })
}

fn field(map: &Map<String, Value>, keys: &[&str]) -> String {
    for key in keys {
        match map.get(*key) {
            Some(Value::String(s)) => return s.trim().to_string(),
            Some(Value::Null) | None => continue,
            Some(other) => return other.to_string(),
        }
    }
    String::new()
}

/// Which form of the generated sentence contains the target surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMatch {
    /// Found in the sentence as written.
    Sentence,
    /// Found only once readings are stripped (`日本[にほん]語` → `日本語`).
    Stripped,
    Missing,
}

/// Locate the target word in the generated sentence. A miss is logged, never
/// fatal.
pub fn check_contains_target(
    entry: &VocabularyEntry,
    generated: &GeneratedSentence,
) -> TargetMatch {
    if generated.sentence.contains(&entry.surface) {
        return TargetMatch::Sentence;
    }
    let plain = crate::core::vocab::furigana::strip_furigana(&generated.sentence);
    if plain.contains(&entry.surface) {
        debug!(
            "Target '{}' matched only after stripping readings: {}",
            entry.surface, plain
        );
        return TargetMatch::Stripped;
    }
    warn!(
        "Generated sentence for '{}' contains the target word neither as written nor with readings stripped: {}",
        entry.surface, generated.sentence
    );
    TargetMatch::Missing
}
