use std::collections::BTreeSet;

use super::VocabularyEntry;

/// Function words and punctuation a generated sentence may always use.
pub const GRAMMAR_WHITELIST: &[&str] = &[
    "は", "が", "を", "に", "で", "と", "も", "の", "へ", "や", "か", "ね", "よ", "な",
    "から", "まで", "より", "だけ", "です", "だ", "ます", "ました", "ません", "でした",
    "ない", "た", "て", "ている", "する", "します", "いる", "います", "ある", "あります",
    "この", "その", "あの", "これ", "それ", "あれ", "ここ", "そこ", "あそこ", "、", "。",
    "！", "？", "「", "」",
];

pub fn grammar_whitelist() -> BTreeSet<String> {
    GRAMMAR_WHITELIST.iter().map(|w| w.to_string()).collect()
}

/// Vocabulary usable in generated sentences.
///
/// Grows only through [`KnownSet::commit`], which must be called in row order.
/// The grammar whitelist is not stored here; the generator merges it per call.
#[derive(Debug, Clone, Default)]
pub struct KnownSet {
    words: BTreeSet<String>,
}

impl KnownSet {
    pub fn seeded<I, S>(initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: initial
                .into_iter()
                .map(Into::into)
                .filter(|w: &String| !w.is_empty())
                .collect(),
        }
    }

    pub fn commit(&mut self, entry: &VocabularyEntry) {
        self.words.insert(entry.surface.clone());
        self.words.insert(entry.annotated.clone());
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.words.clone()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
