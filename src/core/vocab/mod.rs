pub mod furigana;
pub mod known_set;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

pub use known_set::KnownSet;

/// One row of the vocabulary list. `annotated` carries inline bracket
/// readings and defaults to `surface` when the source omits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyEntry {
    pub surface: String,
    pub gloss: String,
    pub annotated: String,
}

impl VocabularyEntry {
    pub fn new(surface: &str, gloss: &str, annotated: &str) -> Self {
        Self {
            surface: surface.to_string(),
            gloss: gloss.to_string(),
            annotated: annotated.to_string(),
        }
    }

    /// Reading of the entry, falling back to the surface form.
    pub fn pronunciation(&self) -> String {
        furigana::derive_pronunciation(&self.annotated, &self.surface, &self.surface)
    }
}

/// Parse tab-separated `surface<TAB>gloss[<TAB>annotated]` lines. Blank lines
/// are skipped; lines with fewer than two fields are skipped with a warning.
pub fn parse_vocabulary(text: &str) -> Vec<VocabularyEntry> {
    let mut entries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() < 2 || fields[0].is_empty() {
            warn!(
                "Skipping malformed vocabulary line {}: {:?}",
                line_no + 1,
                line
            );
            continue;
        }
        let annotated = fields
            .get(2)
            .copied()
            .filter(|a| !a.is_empty())
            .unwrap_or(fields[0]);
        entries.push(VocabularyEntry::new(fields[0], fields[1], annotated));
    }
    entries
}

pub fn load_vocabulary(path: &Path) -> Result<Vec<VocabularyEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read vocabulary file {}", path.display()))?;
    Ok(parse_vocabulary(&text))
}

/// Newline-delimited seed words. A missing file is an empty seed.
pub fn load_seed(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read known-seed file {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}
