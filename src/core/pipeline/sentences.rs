//! Sequential sentence generation over the vocabulary list.
//!
//! Row `i` may only use vocabulary from rows `1..i`, so rows run strictly in
//! order in a single task. Progress lives in the output CSV: a rerun with the
//! default start index resumes after the last persisted row, and every row
//! before the start index is still committed to the known set.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::core::generator::{GeneratedSentence, SentenceGenerator};
use crate::core::store::{self, SentenceRecord, SentenceStore};
use crate::core::vocab::furigana::{derive_pronunciation, strip_furigana};
use crate::core::vocab::{self, KnownSet, VocabularyEntry};

#[derive(Debug, Clone)]
pub struct SentenceRunConfig {
    pub vocab_path: PathBuf,
    pub seed_path: PathBuf,
    pub output_path: PathBuf,
    pub start_index: usize,
    pub limit: Option<usize>,
    pub image_ext: String,
}

/// Inclusive 1-based row range to generate. Empty when `start > last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    pub start: usize,
    pub last: usize,
}

impl RowWindow {
    pub fn is_empty(&self) -> bool {
        self.start > self.last
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.last - self.start + 1
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.last
    }
}

/// Effective start index: resume after `existing_rows` when the configured
/// start is the default (1), otherwise the configured start.
pub fn resume_start(configured_start: usize, existing_rows: usize) -> usize {
    if configured_start <= 1 && existing_rows > 0 {
        existing_rows + 1
    } else {
        configured_start.max(1)
    }
}

/// Window over `total` rows starting at `start`, at most `limit` rows long.
pub fn row_window(total: usize, start: usize, limit: Option<usize>) -> RowWindow {
    let last = match limit {
        Some(limit) => total.min(start.saturating_add(limit).saturating_sub(1)),
        None => total,
    };
    RowWindow { start, last }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceRunSummary {
    pub total_rows: usize,
    pub existing_rows: usize,
    pub window: RowWindow,
    pub generated: usize,
}

/// Build the persisted record for a generated row.
pub fn build_record(
    id: u64,
    rank: usize,
    entry: &VocabularyEntry,
    generated: &GeneratedSentence,
    image_ext: &str,
) -> SentenceRecord {
    SentenceRecord {
        id,
        rank,
        surface: entry.surface.clone(),
        gloss: entry.gloss.clone(),
        annotated: entry.annotated.clone(),
        pronunciation: entry.pronunciation(),
        sentence: generated.sentence.clone(),
        translation: generated.translation.clone(),
        romaji: generated.transliteration.clone(),
        sentence_pronunciation: derive_pronunciation(
            &generated.sentence,
            "",
            &strip_furigana(&generated.sentence),
        ),
        explanation: generated.explanation.clone(),
        image: store::image_reference(id, image_ext),
    }
}

/// Load inputs from disk and run the pipeline.
pub async fn run_sentence_pipeline(
    config: &SentenceRunConfig,
    generator: &dyn SentenceGenerator,
) -> Result<SentenceRunSummary> {
    let entries = vocab::load_vocabulary(&config.vocab_path)?;
    let seed = vocab::load_seed(&config.seed_path)?;
    info!(
        "Loaded {} vocabulary rows and {} seed words",
        entries.len(),
        seed.len()
    );
    let known = KnownSet::seeded(seed);
    if known.is_empty() {
        warn!(
            "No seed words in {}; early rows can only use grammar words",
            config.seed_path.display()
        );
    }
    generate_rows(config, &entries, known, generator).await
}

/// Drive generation over `entries` with an already seeded known set.
pub async fn generate_rows(
    config: &SentenceRunConfig,
    entries: &[VocabularyEntry],
    mut known: KnownSet,
    generator: &dyn SentenceGenerator,
) -> Result<SentenceRunSummary> {
    let existing_rows = store::count_rows(&config.output_path)?;
    let start = resume_start(config.start_index, existing_rows);
    let window = row_window(entries.len(), start, config.limit);
    let mut summary = SentenceRunSummary {
        total_rows: entries.len(),
        existing_rows,
        window,
        generated: 0,
    };

    if existing_rows > 0 {
        info!(
            "Found {} existing rows in {}; starting at row {}",
            existing_rows,
            config.output_path.display(),
            start
        );
    }
    if window.is_empty() {
        info!("Nothing to generate (rows {}..{})", window.start, window.last);
        return Ok(summary);
    }

    let mut out = SentenceStore::open(&config.output_path)?;
    let mut next_id = existing_rows as u64 + 1;

    for (offset, entry) in entries.iter().enumerate() {
        let index = offset + 1;
        if index > window.last {
            break;
        }
        if index < window.start {
            known.commit(entry);
            continue;
        }

        info!(
            "[{}/{}] Generating sentence for {} ({})",
            index, window.last, entry.surface, entry.gloss
        );
        debug!("Known set holds {} words", known.len());
        let snapshot = known.snapshot();
        let generated = match generator.generate(entry, &snapshot).await {
            Ok(g) => g,
            Err(e) => {
                error!("Generation failed at row {} ({}): {:#}", index, entry.surface, e);
                close_after_failure(out, &config.output_path);
                return Err(e.context(format!("row {} ({})", index, entry.surface)));
            }
        };

        let record = build_record(next_id, index, entry, &generated, &config.image_ext);
        if let Err(e) = out.append(&record) {
            close_after_failure(out, &config.output_path);
            return Err(e);
        }
        info!("  -> #{} {}", record.id, record.sentence);

        known.commit(entry);
        next_id += 1;
        summary.generated += 1;
    }

    out.close()
        .with_context(|| format!("Failed to close {}", config.output_path.display()))?;
    Ok(summary)
}

/// Close the store on an abort path. A close failure is logged so the
/// original error is the one returned.
fn close_after_failure(out: SentenceStore, path: &Path) {
    if let Err(e) = out.close() {
        error!("Failed to close {} after an aborted run: {:#}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::PipelineError;
    use crate::core::vocab::known_set::grammar_whitelist;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every snapshot it is handed and fails on a chosen surface.
    struct RecordingGenerator {
        snapshots: Mutex<Vec<(String, BTreeSet<String>)>>,
        fail_on: Option<String>,
    }

    impl RecordingGenerator {
        fn new() -> Self {
            Self {
                snapshots: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(surface: &str) -> Self {
            Self {
                fail_on: Some(surface.to_string()),
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.snapshots
                .lock()
                .unwrap()
                .iter()
                .map(|(s, _)| s.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SentenceGenerator for RecordingGenerator {
        async fn generate(
            &self,
            entry: &VocabularyEntry,
            known: &BTreeSet<String>,
        ) -> Result<GeneratedSentence> {
            self.snapshots
                .lock()
                .unwrap()
                .push((entry.surface.clone(), known.clone()));
            if self.fail_on.as_deref() == Some(entry.surface.as_str()) {
                return Err(anyhow!(PipelineError::GenerationApi("boom".to_string())));
            }
            Ok(GeneratedSentence {
                sentence: format!("{}です。", entry.annotated),
                translation: format!("It is {}.", entry.gloss),
                transliteration: "desu".to_string(),
                explanation: String::new(),
            })
        }
    }

    fn entries() -> Vec<VocabularyEntry> {
        vec![
            VocabularyEntry::new("私", "I", "私[わたし]"),
            VocabularyEntry::new("猫", "cat", "猫[ねこ]"),
            VocabularyEntry::new("犬", "dog", "犬[いぬ]"),
            VocabularyEntry::new("水", "water", "水[みず]"),
            VocabularyEntry::new("本", "book", "本[ほん]"),
        ]
    }

    fn config(dir: &TempDir) -> SentenceRunConfig {
        SentenceRunConfig {
            vocab_path: dir.path().join("vocab.tsv"),
            seed_path: dir.path().join("seed.txt"),
            output_path: dir.path().join("sentences.csv"),
            start_index: 1,
            limit: None,
            image_ext: "png".to_string(),
        }
    }

    fn ids(cfg: &SentenceRunConfig) -> Vec<u64> {
        store::read_records(&cfg.output_path)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect()
    }

    #[test]
    fn resume_start_rules() {
        assert_eq!(resume_start(1, 0), 1);
        assert_eq!(resume_start(1, 3), 4);
        assert_eq!(resume_start(0, 0), 1);
        assert_eq!(resume_start(0, 2), 3);
        assert_eq!(resume_start(5, 3), 5);
        assert_eq!(resume_start(2, 0), 2);
    }

    #[test]
    fn window_respects_limit_and_total() {
        assert_eq!(row_window(10, 1, None), RowWindow { start: 1, last: 10 });
        assert_eq!(row_window(10, 3, Some(4)), RowWindow { start: 3, last: 6 });
        assert_eq!(row_window(10, 8, Some(5)), RowWindow { start: 8, last: 10 });
        assert!(row_window(10, 11, None).is_empty());
        assert!(row_window(10, 3, Some(0)).is_empty());
        assert_eq!(row_window(10, 3, Some(4)).len(), 4);
    }

    #[test]
    fn huge_limit_saturates_to_total() {
        assert_eq!(
            row_window(5, 2, Some(usize::MAX)),
            RowWindow { start: 2, last: 5 }
        );
        assert_eq!(
            row_window(5, usize::MAX, Some(usize::MAX)),
            RowWindow { start: usize::MAX, last: 5 }
        );
    }

    #[tokio::test]
    async fn known_set_grows_monotonically_in_row_order() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let generator = RecordingGenerator::new();
        let seed = KnownSet::seeded(["あなた"]);
        generate_rows(&cfg, &entries(), seed, &generator).await.unwrap();

        let snapshots = generator.snapshots.lock().unwrap();
        assert_eq!(snapshots.len(), 5);
        let whitelist = grammar_whitelist();
        let base: BTreeSet<String> = ["あなた".to_string()].into();
        for (i, (_, snap)) in snapshots.iter().enumerate() {
            assert!(snap.is_superset(&base));
            let with_grammar: BTreeSet<String> = snap.union(&whitelist).cloned().collect();
            assert!(with_grammar.is_superset(&whitelist));
            if i > 0 {
                assert!(snap.is_superset(&snapshots[i - 1].1));
            }
            // Row i sees exactly the seed plus rows 1..i.
            assert_eq!(snap.len(), 1 + 2 * i);
            assert!(!snap.contains(&entries()[i].surface));
        }
    }

    #[tokio::test]
    async fn records_have_contiguous_ids_and_derived_fields() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let generator = RecordingGenerator::new();
        let summary = generate_rows(&cfg, &entries(), KnownSet::default(), &generator)
            .await
            .unwrap();
        assert_eq!(summary.generated, 5);

        let records = store::read_records(&cfg.output_path).unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        let cat = &records[1];
        assert_eq!(cat.rank, 2);
        assert_eq!(cat.pronunciation, "ねこ");
        assert_eq!(cat.sentence_pronunciation, "ねこです。");
        assert_eq!(cat.image, "<img src=\"2.png\">");
    }

    #[tokio::test]
    async fn rerun_after_completion_adds_nothing() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        generate_rows(&cfg, &entries(), KnownSet::default(), &RecordingGenerator::new())
            .await
            .unwrap();

        let second = RecordingGenerator::new();
        let summary = generate_rows(&cfg, &entries(), KnownSet::default(), &second)
            .await
            .unwrap();
        assert_eq!(summary.generated, 0);
        assert!(second.calls().is_empty());
        assert_eq!(ids(&cfg), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn limited_runs_resume_with_full_known_set() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.limit = Some(2);

        let first = RecordingGenerator::new();
        generate_rows(&cfg, &entries(), KnownSet::default(), &first)
            .await
            .unwrap();
        assert_eq!(first.calls(), vec!["私", "猫"]);

        let second = RecordingGenerator::new();
        generate_rows(&cfg, &entries(), KnownSet::default(), &second)
            .await
            .unwrap();
        assert_eq!(second.calls(), vec!["犬", "水"]);
        let snaps = second.snapshots.lock().unwrap();
        assert!(snaps[0].1.contains("私") && snaps[0].1.contains("猫[ねこ]"));
        assert!(!snaps[0].1.contains("水"));
        drop(snaps);

        cfg.limit = None;
        generate_rows(&cfg, &entries(), KnownSet::default(), &RecordingGenerator::new())
            .await
            .unwrap();
        assert_eq!(ids(&cfg), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn failure_halts_run_and_keeps_flushed_rows() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let failing = RecordingGenerator::failing_on("犬");
        let err = generate_rows(&cfg, &entries(), KnownSet::default(), &failing)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::GenerationApi(_))
        ));
        assert_eq!(err.to_string(), "row 3 (犬)");
        assert_eq!(failing.calls(), vec!["私", "猫", "犬"]);
        assert_eq!(ids(&cfg), vec![1, 2]);

        let retry = RecordingGenerator::new();
        generate_rows(&cfg, &entries(), KnownSet::default(), &retry)
            .await
            .unwrap();
        assert_eq!(retry.calls(), vec!["犬", "水", "本"]);
        assert_eq!(ids(&cfg), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn explicit_start_skips_earlier_rows_but_commits_them() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.start_index = 4;
        let generator = RecordingGenerator::new();
        generate_rows(&cfg, &entries(), KnownSet::default(), &generator)
            .await
            .unwrap();
        assert_eq!(generator.calls(), vec!["水", "本"]);
        let snaps = generator.snapshots.lock().unwrap();
        assert!(snaps[0].1.contains("犬"));

        let records = store::read_records(&cfg.output_path).unwrap();
        assert_eq!(records.iter().map(|r| (r.id, r.rank)).collect::<Vec<_>>(), vec![(1, 4), (2, 5)]);
    }

    #[tokio::test]
    async fn run_sentence_pipeline_reads_inputs_from_disk() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        std::fs::write(&cfg.vocab_path, "猫\tcat\t猫[ねこ]\nbroken\n犬\tdog\n").unwrap();
        std::fs::write(&cfg.seed_path, "私\n").unwrap();
        let generator = RecordingGenerator::new();
        let summary = run_sentence_pipeline(&cfg, &generator).await.unwrap();
        assert_eq!(summary.total_rows, 2);
        assert_eq!(summary.generated, 2);
        let snaps = generator.snapshots.lock().unwrap();
        assert!(snaps[0].1.contains("私"));
        assert!(snaps[1].1.contains("猫[ねこ]"));
    }
}
