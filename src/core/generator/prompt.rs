use std::collections::BTreeSet;

use crate::core::llm::ChatMessage;
use crate::core::vocab::VocabularyEntry;

const SYSTEM_PROMPT: &str = "You write example sentences for a Japanese vocabulary deck. \
Every sentence must be short, natural and grammatical. You answer with a single JSON object \
and nothing else.";

/// Build the messages for one vocabulary row.
///
/// `known` is the accumulated vocabulary snapshot and `whitelist` the grammar
/// words that are always allowed. Both are rendered in sorted order so the
/// prompt for a given state is stable.
pub fn build_sentence_messages(
    entry: &VocabularyEntry,
    known: &BTreeSet<String>,
    whitelist: &BTreeSet<String>,
) -> Vec<ChatMessage> {
    let known_list = if known.is_empty() {
        "(none yet)".to_string()
    } else {
        known.iter().cloned().collect::<Vec<_>>().join("、")
    };
    let whitelist_list = whitelist.iter().cloned().collect::<Vec<_>>().join("、");

    let user = format!(
        "TARGET WORD: {surface} ({gloss})\n\
         TARGET WITH READINGS: {annotated}\n\n\
         KNOWN WORDS:\n{known_list}\n\n\
         ALWAYS ALLOWED GRAMMAR:\n{whitelist_list}\n\n\
         RULES:\n\
         - Write one short, natural Japanese sentence.\n\
         - Use ONLY the known words, the allowed grammar, and the target word.\n\
         - The sentence must contain the target word exactly as written: {surface}\n\
         - Annotate every kanji span with its reading in square brackets, with a space \
           before the annotated span, e.g. これは 日本[にほん]語[ご]です。\n\
         - Give an English translation and a full romaji transliteration.\n\
         - Optionally add a one-line explanation of grammar a beginner might miss; \
           otherwise use an empty string.\n\n\
         Respond with JSON only:\n\
         {{\"sentence_jp\": \"...\", \"sentence_en\": \"...\", \"sentence_romaji\": \"...\", \
         \"explanation\": \"...\"}}",
        surface = entry.surface,
        gloss = entry.gloss,
        annotated = entry.annotated,
    );

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}
